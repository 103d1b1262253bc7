// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 opkg contributors

//! Validate command - check flow definitions

use colored::Colorize;
use miette::Result;
use std::path::PathBuf;

use crate::flow::{Flow, FlowValidator};
use crate::transforms::TransformRegistry;

/// Run the validate command
pub async fn run(flows_path: PathBuf, verbose: bool) -> Result<()> {
    println!("{}", "Validating flows...".bold());
    println!();

    let content = tokio::fs::read_to_string(&flows_path)
        .await
        .map_err(|e| miette::miette!("Failed to read {}: {}", flows_path.display(), e))?;

    // A file holds either a list of flows or a single one
    let flows = match Flow::list_from_yaml(&content) {
        Ok(flows) => flows,
        Err(list_error) => match Flow::from_yaml(&content) {
            Ok(flow) => vec![flow],
            Err(_) => {
                eprintln!("  {} Failed to parse {}", "✗".red(), flows_path.display());
                eprintln!();
                return Err(miette::miette!("Parse error: {}", list_error));
            }
        },
    };

    println!("  {} Parsed {} flow(s)", "✓".green(), flows.len());

    let registry = TransformRegistry::with_builtins();
    let validator = FlowValidator::with_registry(&registry);

    let mut invalid = 0;
    let mut warned = 0;

    for (idx, flow) in flows.iter().enumerate() {
        let result = validator.validate(flow);
        let label = format!("[{}] {}", idx, flow.from);

        if result.is_valid() && !result.has_warnings() {
            if verbose {
                println!("  {} {}", "✓".green(), label);
            }
            continue;
        }

        println!();
        println!("{}:", label.bold());
        for error in &result.errors {
            println!("  {} {}", "✗".red(), error);
        }
        for warning in &result.warnings {
            println!("  {} {}", "⚠".yellow(), warning);
        }

        if !result.is_valid() {
            invalid += 1;
        } else {
            warned += 1;
        }
    }

    println!();

    if invalid > 0 {
        Err(miette::miette!("{} of {} flow(s) are invalid", invalid, flows.len()))
    } else if warned > 0 {
        println!("{}", "Flows are valid but have warnings.".yellow().bold());
        Ok(())
    } else {
        println!("{}", "All flows are valid!".green().bold());
        Ok(())
    }
}
