// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 opkg contributors

//! Platforms command - list registered platforms or transforms

use colored::Colorize;
use miette::Result;

use super::{load_config, load_platforms};
use crate::transforms::TransformRegistry;
use crate::utils::{code, print_header};

/// Run the platforms command
pub async fn run(transforms: bool, verbose: bool) -> Result<()> {
    if transforms {
        list_transforms();
        return Ok(());
    }

    let config = load_config()?;
    let registry = load_platforms(&config)?;

    print_header("Platforms");
    for platform in registry.iter() {
        let root = platform.root_dir.as_deref().unwrap_or("-");
        println!(
            "{:<10} {:<14} root {:<10} {} flow(s){}",
            code(&platform.id),
            platform.display_name(),
            root,
            platform.export.len(),
            if platform.detection.is_some() { ", detectable" } else { "" }
        );

        if verbose {
            if let Some(file) = &platform.root_file {
                println!("    root file: {}", file);
            }
            for flow in &platform.export {
                println!("    {} → {}", flow.from, describe_to(flow).dimmed());
            }
        }
    }

    if let Some(path) = &config.platforms {
        println!();
        println!("{}", format!("Custom definitions: {}", path.display()).dimmed());
    }

    Ok(())
}

fn describe_to(flow: &crate::flow::Flow) -> String {
    flow.targets()
        .iter()
        .map(|t| t.pattern.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn list_transforms() {
    let registry = TransformRegistry::with_builtins();
    let mut transforms = registry.list();
    transforms.sort_by(|a, b| a.kind().to_string().cmp(&b.kind().to_string()).then(a.name().cmp(b.name())));

    print_header("Transforms");
    for transform in transforms {
        println!(
            "{:<20} {:<11} {}",
            code(transform.name()),
            transform.kind().to_string().dimmed(),
            transform.description()
        );
    }
}
