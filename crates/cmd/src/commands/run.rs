// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Run command - builds the site once, or keeps rebuilding it
//!
//! Example:
//!   siteforge run --config site.yaml --clean
//!   siteforge run --watch
//!
//! A single run deploys the result when a deploy adapter is configured and the
//! build had no errors. Watch mode never deploys and exits with the code of
//! its last build.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use diagnostics::*;
use pipeline::CancellationToken;
use sitegen::BuildOptions;

use crate::common::{EXIT_OK, open_site, outcome_code, write_summary};

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Remove files in the output directory that this build did not produce
    #[arg(long)]
    pub clean: bool,

    /// Rebuild whenever the input tree changes, until interrupted
    #[arg(long)]
    pub watch: bool,

    /// Configuration file (defaults to site.yaml in the current directory)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Execute `run`, returning the process exit code.
pub async fn run_command<W: Write>(
    args: &RunArgs,
    cancel: CancellationToken,
    out: &mut W,
) -> Result<u8> {
    let site = open_site(args.config.as_deref())?;

    if args.watch {
        let input = site.config().input.display().to_string();
        info!("Watching {input}");
        let mut last = EXIT_OK;
        site.watch(
            BuildOptions {
                clean: args.clean,
                cancel,
                ..BuildOptions::default()
            },
            |outcome| {
                last = outcome_code(outcome);
                if let Err(e) = write_summary(out, outcome) {
                    let err = e.to_string();
                    warn!("Cannot print build summary: {err: err.as_str()}");
                }
            },
        )
        .await?;
        return Ok(last);
    }

    let outcome = site
        .build(BuildOptions {
            clean: args.clean,
            deploy: true,
            cancel,
            ..BuildOptions::default()
        })
        .await?;
    write_summary(out, &outcome)?;
    Ok(outcome_code(&outcome))
}
