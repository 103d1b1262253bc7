// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 opkg contributors

//! Apply command - run platform flows between a package and a workspace

use colored::Colorize;
use miette::Result;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use super::{load_config, load_platforms, package_name};
use crate::flow::{ChangeKind, DiskStore, Direction, Flow, FlowContext, FlowExecutor, FlowReport};
use crate::platforms::PlatformDefinition;
use crate::transforms::TransformRegistry;
use crate::utils::{change_marker, create_spinner, print_error, print_header, print_info, print_warning};

/// Options for the apply command
#[derive(Debug, Clone)]
pub struct ApplyOptions {
    pub platforms: Vec<String>,
    pub package_root: PathBuf,
    pub workspace_root: PathBuf,
    pub name: Option<String>,
    pub save: bool,
    pub dry_run: bool,
    pub vars: Vec<String>,
}

#[derive(Default)]
struct Tally {
    created: usize,
    modified: usize,
    unchanged: usize,
    failed: usize,
}

/// Run the apply command
pub async fn run(options: ApplyOptions, verbose: bool) -> Result<()> {
    let config = load_config()?;
    let registry = load_platforms(&config)?;

    let platforms = if options.platforms.is_empty() {
        config.default_platforms.clone()
    } else {
        options.platforms.clone()
    };
    if platforms.is_empty() {
        return Err(miette::miette!(
            "No platform given.\n\n\
             Pass --platform, or set default_platforms in .opkg.yaml."
        ));
    }

    let vars = parse_vars(&options.vars)?;
    let name = options
        .name
        .clone()
        .unwrap_or_else(|| package_name(&options.package_root));
    let direction = if options.save { Direction::Save } else { Direction::Install };
    let executor = FlowExecutor::new(Arc::new(TransformRegistry::with_builtins()));

    let mut tally = Tally::default();

    for id in &platforms {
        let platform = registry.require(id)?;
        let flows = flows_for(platform, direction, verbose);

        let context = FlowContext::new(&platform.id, direction)
            .with_roots(&options.package_root, &options.workspace_root)
            .with_package_name(&name)
            .with_variables(config.variables.clone())
            .with_variables(vars.clone())
            .with_dry_run(options.dry_run);
        let source = DiskStore::new(context.source_root());
        let target = DiskStore::new(context.target_root());

        let spinner = create_spinner(&format!("Running {} flow(s) for {}", flows.len(), platform.display_name()));
        let results = executor.execute_all(&flows, &context, &source, &target).await;
        spinner.finish_and_clear();

        let verb = if options.save { "Saving from" } else { "Installing for" };
        print_header(&format!("{} {}", verb, platform.display_name()));

        for (flow, result) in flows.iter().zip(results?) {
            match result {
                Ok(report) => print_report(flow, &report, &mut tally, verbose),
                Err(e) => {
                    print_error(&format!("{}: {}", flow.from, e));
                    tally.failed += 1;
                }
            }
        }
        println!();
    }

    let summary = format!(
        "{} created, {} modified, {} unchanged",
        tally.created, tally.modified, tally.unchanged
    );
    if options.dry_run {
        println!("{} {}", summary.bold(), "(dry run, nothing written)".dimmed());
    } else {
        println!("{}", summary.bold());
    }

    if tally.failed > 0 {
        Err(miette::miette!("{} flow(s) or file(s) failed", tally.failed))
    } else {
        Ok(())
    }
}

fn flows_for(platform: &PlatformDefinition, direction: Direction, verbose: bool) -> Vec<Flow> {
    match direction {
        Direction::Install => platform.export.clone(),
        Direction::Save => platform
            .import_flows()
            .into_iter()
            .map(|inverted| {
                if verbose {
                    for note in &inverted.notes {
                        print_info(&format!("{}: {}", note.location, note.message));
                    }
                }
                inverted.flow
            })
            .collect(),
    }
}

fn print_report(flow: &Flow, report: &FlowReport, tally: &mut Tally, verbose: bool) {
    if report.is_skipped() {
        if verbose {
            for warning in &report.warnings {
                print_info(warning);
            }
        }
        return;
    }

    for warning in &report.warnings {
        print_warning(&format!("{}: {}", flow.from, warning));
    }

    for write in report.writes() {
        match write.change {
            ChangeKind::Created => tally.created += 1,
            ChangeKind::Modified => tally.modified += 1,
            ChangeKind::Unchanged => tally.unchanged += 1,
        }
        if write.change != ChangeKind::Unchanged || verbose {
            println!("  {} {}", change_marker(write.change), write.path);
        }
    }

    for outcome in &report.files {
        if let Some(note) = &outcome.note {
            print_warning(&format!("{}: {}", outcome.source, note));
        }
    }

    for (source, error) in report.failures() {
        print_error(&format!("{}: {}", source, error));
        tally.failed += 1;
    }
}

/// Parse `key=value` pairs
fn parse_vars(vars: &[String]) -> Result<BTreeMap<String, String>> {
    vars.iter()
        .map(|var| {
            var.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.to_string()))
                .filter(|(k, _)| !k.is_empty())
                .ok_or_else(|| miette::miette!("Invalid variable '{}', expected KEY=VALUE", var))
        })
        .collect()
}
