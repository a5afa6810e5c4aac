// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use std::io::Write;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use cmd::commands::{DeployArgs, RunArgs, deploy_command, run_command};
use cmd::common::{cancel_on_ctrl_c, exit_code};
use diagnostics::{LOG_ENV, LogLevel};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "siteforge")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Debug logging to stderr (when SITEFORGE_LOG is unset)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the site from its configuration
    Run(RunArgs),
    /// Deploy the existing output tree without rebuilding
    Deploy(DeployArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.verbose && std::env::var_os(LOG_ENV).is_none() {
        diagnostics::init_with_level(LogLevel::Debug);
    } else {
        diagnostics::init();
    }

    let mut stdout = std::io::stdout().lock();
    let result = match &cli.command {
        Commands::Run(args) => run_command(args, cancel_on_ctrl_c(), &mut stdout).await,
        Commands::Deploy(args) => deploy_command(args, &mut stdout).await,
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            _ = writeln!(std::io::stderr(), "Error: {e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}
