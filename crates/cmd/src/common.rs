// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use pipeline::{CancellationToken, DeployResult, Error, StageStatus};
use sitegen::{BuildOutcome, Site, SiteConfig};

/// Build finished without errors.
pub const EXIT_OK: u8 = 0;
/// A stage, the output writer or the cache failed.
pub const EXIT_FAILURE: u8 = 1;
/// Configuration or graph errors; nothing ran.
pub const EXIT_CONFIG: u8 = 2;

/// Load the configuration and set up the site with its deploy adapter.
pub fn open_site(config: Option<&Path>) -> Result<Site> {
    let config = SiteConfig::load(config)?;
    let adapter = sitegen::adapter_for(&config)?;
    let site = Site::new(config, adapter).context("Cannot set up site")?;
    Ok(site)
}

/// Exit code for an error that stopped a command.
#[must_use]
pub fn exit_code(err: &anyhow::Error) -> u8 {
    let fatal = err
        .chain()
        .filter_map(|cause| cause.downcast_ref::<Error>())
        .any(Error::is_fatal);
    if fatal { EXIT_CONFIG } else { EXIT_FAILURE }
}

/// Exit code for a finished build.
#[must_use]
pub fn outcome_code(outcome: &BuildOutcome) -> u8 {
    if outcome.succeeded() {
        EXIT_OK
    } else {
        EXIT_FAILURE
    }
}

/// A token cancelled by the first Ctrl-C.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    _ = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            diagnostics::info!("Interrupted; finishing running stages");
            token.cancel();
        }
    });
    cancel
}

/// Human-readable summary of one build.
pub fn write_summary<W: Write>(out: &mut W, outcome: &BuildOutcome) -> std::io::Result<()> {
    let execution = outcome.execution();
    for stage in execution.stages() {
        let marker = match stage.status {
            StageStatus::Succeeded | StageStatus::Cached => "ok",
            StageStatus::Failed => "FAIL",
            StageStatus::Skipped | StageStatus::Cancelled => "--",
        };
        writeln!(
            out,
            "{marker:>4} {:<14} {:<9} {:>4} docs {:>6}ms",
            stage.name,
            stage.status.to_string(),
            stage.documents.len(),
            stage.elapsed.as_millis()
        )?;
    }

    if let Some(report) = outcome.write_report() {
        writeln!(
            out,
            "Wrote {} files ({} unchanged, {} removed)",
            report.written.len(),
            report.unchanged,
            report.removed.len()
        )?;
    }
    if let Some(deployed) = outcome.deployed() {
        write_deployed(out, deployed)?;
    }

    let errors: Vec<&Error> = outcome.errors().collect();
    if outcome.cancelled() {
        writeln!(out, "Build cancelled")?;
    } else if errors.is_empty() {
        writeln!(out, "Build succeeded in {}ms", execution.elapsed().as_millis())?;
    } else {
        writeln!(out, "Build finished with {} errors:", errors.len())?;
        for err in errors {
            writeln!(out, "  {err}")?;
        }
    }
    Ok(())
}

pub fn write_deployed<W: Write>(out: &mut W, deployed: &DeployResult) -> std::io::Result<()> {
    writeln!(
        out,
        "Deployed {} files with {} to {} ({})",
        deployed.files, deployed.adapter, deployed.location, deployed.deploy_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline::GraphError;

    #[test]
    fn test_exit_codes() {
        let config = anyhow::Error::from(Error::Configuration("bad".into()));
        assert_eq!(exit_code(&config), EXIT_CONFIG);

        let graph = anyhow::Error::from(Error::from(GraphError::DuplicateStage("a".into())))
            .context("building");
        assert_eq!(exit_code(&graph), EXIT_CONFIG);

        let io = anyhow::Error::from(Error::io(
            "out/index.html",
            std::io::Error::other("disk full"),
        ));
        assert_eq!(exit_code(&io), EXIT_FAILURE);
        assert_eq!(exit_code(&anyhow::anyhow!("other")), EXIT_FAILURE);
    }

    #[test]
    fn test_missing_explicit_config_is_fatal() {
        let err = open_site(Some(Path::new("/nonexistent/siteforge/site.yaml")))
            .err()
            .expect("missing config");
        assert_eq!(exit_code(&err), EXIT_CONFIG);
    }
}
