// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 opkg contributors

//! Convert command - turn a platform package into the universal layout

use colored::Colorize;
use miette::Result;
use std::path::PathBuf;
use std::sync::Arc;

use super::{load_config, load_platforms, package_name, read_package};
use crate::convert::{ConversionCoordinator, ConversionOptions};
use crate::flow::{DiskStore, FileStore};
use crate::transforms::TransformRegistry;
use crate::utils::{create_spinner, print_error, print_header, print_info, print_section, print_success, print_warning};

/// Run the convert command
pub async fn run(
    dir: PathBuf,
    output: Option<PathBuf>,
    name: Option<String>,
    dry_run: bool,
    verbose: bool,
) -> Result<()> {
    if !dir.is_dir() {
        return Err(miette::miette!("Package directory not found: {}", dir.display()));
    }

    let config = load_config()?;
    let platforms = Arc::new(load_platforms(&config)?);
    let coordinator = ConversionCoordinator::new(platforms, Arc::new(TransformRegistry::with_builtins()))
        .with_path_boost(config.conversion.path_boost);

    let options = ConversionOptions {
        skip_conversion: !config.conversion.enabled,
        package_name: name.unwrap_or_else(|| package_name(&dir)),
        variables: config.variables.clone(),
    };

    let spinner = create_spinner(&format!("Converting {}", dir.display()));
    let files = read_package(&DiskStore::new(&dir)).await?;
    let input_count = files.len();
    let result = coordinator.convert(files, &options).await;
    spinner.finish_and_clear();

    print_header(&format!("Converting {}", dir.display()));

    if options.skip_conversion {
        print_info("Conversion is disabled in configuration");
    } else if !result.converted {
        print_success(&format!("{} file(s), already universal", input_count));
    } else {
        print_success(&format!("{} file(s) in, {} file(s) out", input_count, result.files.len()));
    }

    if verbose || result.converted {
        print_section("Files");
        for file in &result.files {
            println!("  {}", file.path);
        }
    }

    if !result.warnings.is_empty() {
        print_section("Warnings");
        for warning in &result.warnings {
            print_warning(warning);
        }
    }

    if !result.errors.is_empty() {
        print_section("Errors");
        for error in &result.errors {
            let location = error.path.as_deref().unwrap_or(&error.platform);
            print_error(&format!("{}: {}", location, error.message));
        }
    }

    println!();

    match output {
        Some(output) if dry_run => {
            println!(
                "{}",
                format!("Dry run: would write {} file(s) to {}", result.files.len(), output.display()).dimmed()
            );
        }
        Some(output) => {
            let writes: Vec<(String, String)> = result
                .files
                .iter()
                .map(|f| (f.path.clone(), f.content.clone()))
                .collect();
            DiskStore::new(&output).write_batch(&writes).await?;
            print_success(&format!("Wrote {} file(s) to {}", writes.len(), output.display()));
        }
        None => {}
    }

    Ok(())
}
