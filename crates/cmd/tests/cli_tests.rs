// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use cmd::commands::{DeployArgs, RunArgs, deploy_command, run_command};
use cmd::common::{EXIT_CONFIG, EXIT_FAILURE, EXIT_OK, exit_code};
use pipeline::CancellationToken;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn write(root: &Path, relative: &str, body: &str) -> Result<()> {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, body)?;
    Ok(())
}

fn site(root: &Path, deploy: &str) -> Result<PathBuf> {
    write(root, "input/index.md", "# Home\n")?;
    write(root, "input/about.md", "---\ntitle: About\n---\nAbout us.\n")?;
    let config = format!(
        "site:\n  title: CLI Site\ninput: input\noutput: public\nworkers: 2\n{deploy}"
    );
    write(root, "site.yaml", &config)?;
    Ok(root.join("site.yaml"))
}

fn run_args(config: PathBuf) -> RunArgs {
    RunArgs {
        config: Some(config),
        ..RunArgs::default()
    }
}

#[tokio::test]
async fn test_run_builds_site() -> Result<()> {
    let tmp = tempdir()?;
    let config = site(tmp.path(), "")?;

    let mut out = Vec::new();
    let code = run_command(&run_args(config), CancellationToken::new(), &mut out).await?;
    assert_eq!(code, EXIT_OK);

    let summary = String::from_utf8(out)?;
    assert!(summary.contains("Build succeeded"), "got: {summary}");
    assert!(summary.contains("markdown"));
    assert!(tmp.path().join("public/index.html").is_file());
    assert!(tmp.path().join("public/about.html").is_file());
    Ok(())
}

#[tokio::test]
async fn test_run_reports_stage_failure() -> Result<()> {
    let tmp = tempdir()?;
    let config = site(tmp.path(), "")?;
    write(tmp.path(), "input/broken.md", "---\ntitle: [\n---\n")?;

    let mut out = Vec::new();
    let code = run_command(&run_args(config), CancellationToken::new(), &mut out).await?;
    assert_eq!(code, EXIT_FAILURE);

    let summary = String::from_utf8(out)?;
    assert!(summary.contains("1 errors"), "got: {summary}");
    assert!(summary.contains("broken.md"));
    assert!(tmp.path().join("public/index.html").is_file());
    Ok(())
}

#[tokio::test]
async fn test_run_rejects_bad_config() -> Result<()> {
    let tmp = tempdir()?;
    let config = site(tmp.path(), "deploy:\n  adapter: directory\n  target: published\n")?;

    let err = run_command(&run_args(config), CancellationToken::new(), &mut Vec::new())
        .await
        .err()
        .expect("missing credentials");
    assert_eq!(exit_code(&err), EXIT_CONFIG);
    assert!(!tmp.path().join("public").exists());
    Ok(())
}

#[tokio::test]
async fn test_run_then_deploy() -> Result<()> {
    let tmp = tempdir()?;
    let config = site(
        tmp.path(),
        "deploy:\n  adapter: directory\n  target: published\n  siteId: cli\n  accessToken: t0ken\n",
    )?;

    let mut out = Vec::new();
    let code = run_command(&run_args(config.clone()), CancellationToken::new(), &mut out).await?;
    assert_eq!(code, EXIT_OK);
    assert!(String::from_utf8(out)?.contains("Deployed 2 files with directory"));
    assert!(tmp.path().join("published/cli/about.html").is_file());

    std::fs::remove_dir_all(tmp.path().join("published"))?;
    let mut out = Vec::new();
    let code = deploy_command(&DeployArgs { config: Some(config) }, &mut out).await?;
    assert_eq!(code, EXIT_OK);
    assert!(tmp.path().join("published/cli/index.html").is_file());
    Ok(())
}

#[tokio::test]
async fn test_deploy_without_adapter_fails() -> Result<()> {
    let tmp = tempdir()?;
    let config = site(tmp.path(), "")?;
    let err = deploy_command(&DeployArgs { config: Some(config) }, &mut Vec::new())
        .await
        .err()
        .expect("no adapter");
    assert_eq!(exit_code(&err), EXIT_CONFIG);
    Ok(())
}

#[tokio::test]
async fn test_watch_stops_when_cancelled() -> Result<()> {
    let tmp = tempdir()?;
    let config = site(tmp.path(), "watch:\n  interval_ms: 10\n")?;
    let cancel = CancellationToken::new();

    let args = RunArgs {
        watch: true,
        ..run_args(config)
    };
    let stopper = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            cancel.cancel();
        })
    };

    let mut out = Vec::new();
    let code = run_command(&args, cancel, &mut out).await?;
    stopper.await?;
    assert_eq!(code, EXIT_OK);
    assert!(String::from_utf8(out)?.contains("Build succeeded"));
    assert!(tmp.path().join("public/index.html").is_file());
    Ok(())
}

#[tokio::test]
async fn test_watch_exits_with_last_build_status() -> Result<()> {
    let tmp = tempdir()?;
    let config = site(tmp.path(), "watch:\n  interval_ms: 10\n")?;
    write(tmp.path(), "input/broken.md", "---\n- not a mapping\n---\n")?;
    let cancel = CancellationToken::new();

    let args = RunArgs {
        watch: true,
        ..run_args(config)
    };
    let stopper = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            cancel.cancel();
        })
    };

    let mut out = Vec::new();
    let code = run_command(&args, cancel, &mut out).await?;
    stopper.await?;
    assert_eq!(code, EXIT_FAILURE);
    assert!(String::from_utf8(out)?.contains("1 errors"));
    Ok(())
}
