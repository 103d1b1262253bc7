// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 opkg contributors

//! opkg - portable AI-assistant packages
//!
//! Install, convert and inspect agents, rules, commands and skills across
//! host tools.

use clap::Parser;
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use opkg::cli::apply::ApplyOptions;
use opkg::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let default_filter = if cli.verbose { "opkg=debug" } else { "opkg=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    // Change to specified directory if provided
    if let Some(ref dir) = cli.directory {
        std::env::set_current_dir(dir).map_err(|e| {
            miette::miette!("Failed to change to directory '{}': {}", dir.display(), e)
        })?;
    }

    // Dispatch to command handlers
    match cli.command {
        Commands::Classify { files, format } => {
            opkg::cli::classify::run(files, format, cli.verbose).await
        }
        Commands::Convert {
            dir,
            output,
            name,
            dry_run,
        } => opkg::cli::convert::run(dir, output, name, dry_run, cli.verbose).await,
        Commands::Apply {
            platform,
            package_root,
            workspace_root,
            name,
            save,
            dry_run,
            vars,
        } => {
            let options = ApplyOptions {
                platforms: platform,
                package_root,
                workspace_root,
                name,
                save,
                dry_run,
                vars,
            };
            opkg::cli::apply::run(options, cli.verbose).await
        }
        Commands::Invert { platform } => opkg::cli::invert::run(platform, cli.verbose).await,
        Commands::Validate { flows } => opkg::cli::validate::run(flows, cli.verbose).await,
        Commands::Platforms { transforms } => {
            opkg::cli::platforms::run(transforms, cli.verbose).await
        }
    }
}
