// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 opkg contributors

//! Invert command - print a platform's import flows

use miette::Result;

use super::{load_config, load_platforms};

/// Run the invert command
///
/// Prints YAML: a list of `{flow, notes}` entries, one per export flow.
pub async fn run(platform: String, verbose: bool) -> Result<()> {
    let config = load_config()?;
    let registry = load_platforms(&config)?;
    let definition = registry.require(&platform)?;

    let inverted = definition.import_flows();
    if verbose {
        let notes: usize = inverted.iter().map(|i| i.notes.len()).sum();
        eprintln!("Inverted {} flow(s), {} note(s)", inverted.len(), notes);
    }

    let value = serde_json::to_value(&inverted).map_err(|e| miette::miette!("JSON error: {}", e))?;
    let yaml = serde_yaml::to_string(&value).map_err(|e| miette::miette!("YAML error: {}", e))?;
    print!("{}", yaml);

    Ok(())
}
