// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use async_trait::async_trait;
use pipeline::{CancellationToken, DeployAdapter, DeployError, DeployResult, StageStatus};
use sitegen::{
    AdapterKind, BuildOptions, DirectoryDeploy, MANIFEST, Site, SiteConfig, web,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::{TempDir, tempdir};

struct Fixture {
    _dir: TempDir,
    root: PathBuf,
}

impl Fixture {
    fn new() -> Result<Self> {
        let dir = tempdir()?;
        let root = dir.path().to_path_buf();
        let fixture = Self { _dir: dir, root };
        fixture.write("input/index.md", "---\ntitle: Home\n---\n# Welcome\n")?;
        fixture.write("input/posts/hello.md", "# Hello\n\nFirst post.\n")?;
        fixture.write("input/posts/wip.md", "---\ndraft: true\n---\nNot yet.\n")?;
        fixture.write("input/css/site.css", "body { margin: 0 }")?;
        fixture.write("input/_notes/todo.md", "private")?;
        Ok(fixture)
    }

    fn write(&self, relative: &str, body: &str) -> Result<()> {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, body)?;
        Ok(())
    }

    fn config(&self) -> SiteConfig {
        let mut config = SiteConfig::default();
        config.site.title = "Test Site".to_string();
        config.site.url = Some("https://example.org".to_string());
        config.workers = Some(2);
        config.watch.interval_ms = 20;
        config.resolve_paths(&self.root);
        config
    }

    fn output(&self, relative: &str) -> PathBuf {
        self.root.join("output").join(relative)
    }

    fn read_output(&self, relative: &str) -> Result<String> {
        Ok(std::fs::read_to_string(self.output(relative))?)
    }
}

fn output_files(root: &Path) -> Result<Vec<String>> {
    let mut files = Vec::new();
    for entry in wax::Glob::new("**")?.walk(root) {
        let entry = entry?;
        if entry.path().is_file() {
            files.push(
                entry
                    .path()
                    .strip_prefix(root)?
                    .to_string_lossy()
                    .replace('\\', "/"),
            );
        }
    }
    files.sort();
    Ok(files)
}

#[tokio::test]
async fn test_full_build() -> Result<()> {
    let fixture = Fixture::new()?;
    let site = Site::new(fixture.config(), None)?;
    let outcome = site.build(BuildOptions::default()).await?;

    assert!(outcome.succeeded(), "errors: {:?}", outcome.errors().collect::<Vec<_>>());
    assert_eq!(
        output_files(&fixture.root.join("output"))?,
        vec!["css/site.css", "index.html", "posts/hello.html", "sitemap.xml"]
    );

    let index = fixture.read_output("index.html")?;
    assert!(index.contains("<title>Home — Test Site</title>"));
    assert!(index.contains(r#"<h1 id="welcome">"#));

    let post = fixture.read_output("posts/hello.html")?;
    assert!(post.contains("href=\"../index.html\""));

    let sitemap = fixture.read_output("sitemap.xml")?;
    assert!(sitemap.contains("<loc>https://example.org/posts/hello.html</loc>"));
    assert!(!sitemap.contains("wip"));

    assert_eq!(fixture.read_output("css/site.css")?, "body { margin: 0 }");
    assert!(fixture.root.join(".siteforge/cache.json").is_file());
    Ok(())
}

#[tokio::test]
async fn test_rebuild_reuses_cache_and_is_identical() -> Result<()> {
    let fixture = Fixture::new()?;
    let site = Site::new(fixture.config(), None)?;

    site.build(BuildOptions::default()).await?;
    let first = fixture.read_output("posts/hello.html")?;

    let outcome = site.build(BuildOptions::default()).await?;
    assert_eq!(
        outcome.execution().status(web::MARKDOWN),
        Some(StageStatus::Cached)
    );
    assert_eq!(
        outcome.execution().status(web::LAYOUT),
        Some(StageStatus::Cached)
    );
    let report = outcome.write_report().expect("written");
    assert!(report.written.is_empty());
    assert_eq!(fixture.read_output("posts/hello.html")?, first);
    Ok(())
}

#[tokio::test]
async fn test_bad_front_matter_fails_one_page() -> Result<()> {
    let fixture = Fixture::new()?;
    fixture.write("input/broken.md", "---\ntitle: [oops\n---\nbody\n")?;
    let site = Site::new(fixture.config(), None)?;
    let outcome = site.build(BuildOptions::default()).await?;

    assert!(!outcome.succeeded());
    assert_eq!(outcome.errors().count(), 1);
    assert!(fixture.output("index.html").is_file());
    assert!(!fixture.output("broken.html").exists());

    // The markdown stage is served from the cache and still reports the page.
    let again = site.build(BuildOptions::default()).await?;
    assert_eq!(
        again.execution().status(web::MARKDOWN),
        Some(StageStatus::Cached)
    );
    assert!(!again.succeeded());
    assert_eq!(again.errors().count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_clean_and_preserve_modes() -> Result<()> {
    let fixture = Fixture::new()?;
    fixture.write("output/stale.html", "old")?;
    let site = Site::new(fixture.config(), None)?;

    site.build(BuildOptions::default()).await?;
    assert!(fixture.output("stale.html").exists());

    let outcome = site
        .build(BuildOptions {
            clean: true,
            ..BuildOptions::default()
        })
        .await?;
    assert!(!fixture.output("stale.html").exists());
    let report = outcome.write_report().expect("written");
    assert_eq!(report.removed, vec![PathBuf::from("stale.html")]);
    Ok(())
}

#[tokio::test]
async fn test_directory_deploy_after_clean_build() -> Result<()> {
    let fixture = Fixture::new()?;
    let mut config = fixture.config();
    config.deploy.adapter = AdapterKind::Directory;
    config.deploy.target = Some(fixture.root.join("published"));
    config.deploy.site_id = Some("test-site".to_string());
    config.deploy.access_token = Some("token".to_string());

    let adapter = sitegen::adapter_for(&config)?;
    let site = Site::new(config, adapter)?;
    let outcome = site
        .build(BuildOptions {
            deploy: true,
            ..BuildOptions::default()
        })
        .await?;

    assert!(outcome.succeeded());
    let deployed = outcome.deployed().expect("deployed");
    assert_eq!(deployed.files, 4);
    let published = fixture.root.join("published/test-site");
    assert!(published.join("posts/hello.html").is_file());
    assert!(published.join(MANIFEST).is_file());

    // Deploying again without a build ships the same tree.
    let again = site.deploy().await?;
    assert_ne!(again.deploy_id, deployed.deploy_id);
    Ok(())
}

struct FailingDeploy;

#[async_trait]
impl DeployAdapter for FailingDeploy {
    fn name(&self) -> &str {
        "failing"
    }

    async fn deploy(
        &self,
        _output_root: &Path,
        _site_id: &str,
        _access_token: &str,
    ) -> Result<DeployResult, DeployError> {
        Err(DeployError::Unavailable("host unreachable".into()))
    }
}

#[tokio::test]
async fn test_deploy_failure_keeps_build() -> Result<()> {
    let fixture = Fixture::new()?;
    let mut config = fixture.config();
    config.deploy.site_id = Some("site".to_string());
    config.deploy.access_token = Some("token".to_string());

    let site = Site::new(config, Some(Arc::new(FailingDeploy)))?;
    let outcome = site
        .build(BuildOptions {
            deploy: true,
            ..BuildOptions::default()
        })
        .await?;

    assert!(outcome.succeeded());
    assert!(outcome.deploy_error().is_some());
    assert!(outcome.deployed().is_none());
    assert!(fixture.output("index.html").is_file());
    Ok(())
}

#[tokio::test]
async fn test_failed_build_is_not_deployed() -> Result<()> {
    let fixture = Fixture::new()?;
    fixture.write("input/broken.md", "---\n- not a mapping\n---\n")?;
    let mut config = fixture.config();
    config.deploy.site_id = Some("site".to_string());
    config.deploy.access_token = Some("token".to_string());
    let target = fixture.root.join("published");

    let site = Site::new(config, Some(Arc::new(DirectoryDeploy::new(&target))))?;
    let outcome = site
        .build(BuildOptions {
            deploy: true,
            ..BuildOptions::default()
        })
        .await?;

    assert!(!outcome.succeeded());
    assert!(outcome.deployed().is_none());
    assert!(!target.exists());
    Ok(())
}

#[test]
fn test_adapter_requires_credentials() {
    let config = SiteConfig::default();
    let adapter: Arc<dyn DeployAdapter> = Arc::new(DirectoryDeploy::new("/tmp/unused"));
    assert!(Site::new(config, Some(adapter)).is_err());
}

#[tokio::test]
async fn test_cancelled_build_writes_nothing() -> Result<()> {
    let fixture = Fixture::new()?;
    let site = Site::new(fixture.config(), None)?;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = site
        .build(BuildOptions {
            cancel,
            ..BuildOptions::default()
        })
        .await?;
    assert!(outcome.cancelled());
    assert!(!outcome.succeeded());
    assert!(outcome.write_report().is_none());
    assert!(!fixture.root.join("output").exists());
    Ok(())
}

#[tokio::test]
async fn test_watch_rebuilds_on_change() -> Result<()> {
    let fixture = Fixture::new()?;
    let site = Arc::new(Site::new(fixture.config(), None)?);
    let cancel = CancellationToken::new();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    let watcher = {
        let site = site.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            site.watch(
                BuildOptions {
                    cancel,
                    ..BuildOptions::default()
                },
                move |outcome| {
                    let _ = tx.send(outcome.succeeded());
                },
            )
            .await
        })
    };

    let first = tokio::time::timeout(Duration::from_secs(10), rx.recv()).await?;
    assert_eq!(first, Some(true));

    fixture.write("input/posts/new.md", "# New post\n")?;
    let second = tokio::time::timeout(Duration::from_secs(10), rx.recv()).await?;
    assert_eq!(second, Some(true));
    assert!(fixture.output("posts/new.html").is_file());

    cancel.cancel();
    watcher.await??;
    Ok(())
}
