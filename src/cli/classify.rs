// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 opkg contributors

//! Classify command - detect the platform format of files

use colored::Colorize;
use miette::Result;
use serde_json::json;
use std::path::PathBuf;

use super::{load_config, load_platforms, OutputFormat};
use crate::classifier::{Classification, SchemaCache};
use crate::package::PackageFile;

/// Run the classify command
pub async fn run(files: Vec<PathBuf>, format: OutputFormat, verbose: bool) -> Result<()> {
    if files.is_empty() {
        return Err(miette::miette!(
            "No files specified.\n\n\
             Usage: opkg classify <file>..."
        ));
    }

    let config = load_config()?;
    let platforms = load_platforms(&config)?;
    let classifier = platforms.classifier(&SchemaCache::new(), config.conversion.path_boost)?;

    let mut results = Vec::new();
    for file in &files {
        let content = match tokio::fs::read_to_string(file).await {
            Ok(content) => content,
            Err(e) => {
                eprintln!("{}: Failed to read {}: {}", "Warning".yellow(), file.display(), e);
                continue;
            }
        };
        let package_file = PackageFile::new(file.to_string_lossy(), content);
        let classification = classifier.classify(&package_file);
        results.push((package_file.path, classification));
    }

    match format {
        OutputFormat::Text => {
            for (path, classification) in &results {
                print_text(path, classification, verbose);
            }
        }
        OutputFormat::Json => {
            let entries: Vec<_> = results
                .iter()
                .map(|(path, c)| {
                    json!({
                        "file": path,
                        "platform": c.platform,
                        "confidence": c.confidence,
                        "matchedFields": c.matched_fields,
                        "scores": c.scores,
                    })
                })
                .collect();
            let out = serde_json::to_string_pretty(&entries).map_err(|e| miette::miette!("JSON error: {}", e))?;
            println!("{}", out);
        }
    }

    Ok(())
}

fn print_text(path: &str, classification: &Classification, verbose: bool) {
    let platform = if classification.is_platform() {
        classification.platform.green().bold()
    } else {
        classification.platform.dimmed()
    };
    println!(
        "{}  {} {}",
        path,
        platform,
        format!("({:.2})", classification.confidence).dimmed()
    );

    if verbose {
        if !classification.matched_fields.is_empty() {
            println!("    matched: {}", classification.matched_fields.join(", "));
        }
        for (platform, score) in &classification.scores {
            println!("    {}: {:.2}", platform, score);
        }
    }
}
