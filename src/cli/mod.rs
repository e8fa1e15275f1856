// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// Car Damage Node CLI
#[derive(Parser, Debug)]
#[command(name = "damage-cli")]
#[command(version)]
#[command(about = "Operator tools for the car damage classifier", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the full pipeline on one image and print the prediction
    Classify(commands::ClassifyArgs),

    /// Report how a weights file matches the known architectures
    Inspect(commands::InspectArgs),

    /// Measure classifier accuracy over an image-folder dataset
    Evaluate(commands::EvaluateArgs),
}

/// Execute CLI command
pub fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Classify(args) => commands::classify(args),
        Commands::Inspect(args) => commands::inspect(args),
        Commands::Evaluate(args) => commands::evaluate(args),
    }
}
