// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Deploy command - ships the existing output tree without rebuilding

use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::common::{EXIT_OK, open_site, write_deployed};

#[derive(Args, Debug, Clone, Default)]
pub struct DeployArgs {
    /// Configuration file (defaults to site.yaml in the current directory)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

pub async fn deploy_command<W: Write>(args: &DeployArgs, out: &mut W) -> Result<u8> {
    let site = open_site(args.config.as_deref())?;
    let deployed = site.deploy().await?;
    write_deployed(out, &deployed)?;
    Ok(EXIT_OK)
}
