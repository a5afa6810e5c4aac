// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Build, write, cache and deploy a site.

use crate::config::SiteConfig;
use crate::reader;
use crate::web;
use diagnostics::*;
use docstore::{DocumentId, DocumentStore, Fingerprint};
use pipeline::{
    BuildCache, CancellationToken, ChangeSet, DeployAdapter, DeployResult, Engine, Error,
    ExecutionResult, OutputWriter, Result, RunOptions, StageStatus, WriteMode, WriteReport,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Remove files in the output tree that this build did not produce.
    pub clean: bool,
    /// Input paths touched since the previous build (watch mode).
    pub change_set: Option<ChangeSet>,
    /// Ship the tree when the build is clean and an adapter is configured.
    pub deploy: bool,
    pub cancel: CancellationToken,
}

/// Everything one build did.
#[derive(Debug)]
pub struct BuildOutcome {
    execution: ExecutionResult,
    write: Option<WriteReport>,
    deployed: Option<DeployResult>,
    /// Failures after the engine finished: writing, cache, deploy.
    errors: Vec<Error>,
}

impl BuildOutcome {
    #[must_use]
    pub fn execution(&self) -> &ExecutionResult {
        &self.execution
    }

    /// `None` when the build was cancelled before writing.
    #[must_use]
    pub fn write_report(&self) -> Option<&WriteReport> {
        self.write.as_ref()
    }

    #[must_use]
    pub fn deployed(&self) -> Option<&DeployResult> {
        self.deployed.as_ref()
    }

    /// Every error of the build: stages first, then output, cache and deploy.
    pub fn errors(&self) -> impl Iterator<Item = &Error> {
        self.execution.errors().iter().chain(self.errors.iter())
    }

    #[must_use]
    pub fn cancelled(&self) -> bool {
        self.execution
            .stages()
            .iter()
            .any(|s| s.status == StageStatus::Cancelled)
    }

    /// True when the output tree is complete and nothing failed. A failed
    /// deploy does not count against the build.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        !self.cancelled()
            && !self.execution.has_failures()
            && self.errors.iter().all(|e| matches!(e, Error::Deploy(_)))
    }

    #[must_use]
    pub fn deploy_error(&self) -> Option<&Error> {
        self.errors.iter().find(|e| matches!(e, Error::Deploy(_)))
    }
}

pub struct Site {
    config: SiteConfig,
    adapter: Option<Arc<dyn DeployAdapter>>,
    engine: Engine,
}

impl Site {
    pub fn new(config: SiteConfig, adapter: Option<Arc<dyn DeployAdapter>>) -> Result<Self> {
        config.validate()?;
        if adapter.is_some() && config.credentials().is_none() {
            return Err(Error::Configuration(
                "a deploy adapter needs siteId and accessToken".into(),
            ));
        }
        let engine = Engine::new(config.engine_config());
        Ok(Self {
            config,
            adapter,
            engine,
        })
    }

    #[must_use]
    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    /// Run the web pipeline once and materialize its output.
    ///
    /// `Err` means nothing ran (invalid graph). Everything else is reported
    /// in the outcome.
    pub async fn build(&self, options: BuildOptions) -> Result<BuildOutcome> {
        let BuildOptions {
            clean,
            change_set,
            deploy,
            cancel,
        } = options;

        let graph = web::build_graph(&self.config)?;

        let cache_path = self.config.cache.clone();
        let prior = tokio::task::spawn_blocking(move || BuildCache::load(&cache_path))
            .await
            .map_err(|e| Error::Cache(format!("loading cache: {e}")))?;

        let store = Arc::new(DocumentStore::new());
        let execution = self
            .engine
            .run(
                &graph,
                &store,
                RunOptions {
                    change_set,
                    prior: Some(prior),
                    cancel,
                },
            )
            .await?;

        let mut outcome = BuildOutcome {
            execution,
            write: None,
            deployed: None,
            errors: Vec::new(),
        };

        if outcome.cancelled() {
            warn!("Build cancelled; output and cache left untouched");
            return Ok(outcome);
        }

        self.write_output(&mut outcome, clean).await;
        self.save_cache(&mut outcome).await;

        if deploy {
            if outcome.succeeded() {
                self.deploy_into(&mut outcome).await;
            } else {
                warn!("Build had errors; skipping deploy");
            }
        }
        Ok(outcome)
    }

    async fn write_output(&self, outcome: &mut BuildOutcome, clean: bool) {
        let mode = if clean {
            WriteMode::Clean
        } else {
            WriteMode::Preserve
        };
        let mut writer = OutputWriter::new(&self.config.output, mode);
        if let Some(keep) = inside(&self.config.output, &self.config.cache) {
            writer = writer.preserving(keep);
        }

        let documents = outcome.execution.output_documents();
        match tokio::task::spawn_blocking(move || writer.write(&documents)).await {
            Ok(Ok(mut report)) => {
                outcome.errors.append(&mut report.errors);
                outcome.write = Some(report);
            }
            Ok(Err(e)) => outcome.errors.push(e),
            Err(e) => outcome
                .errors
                .push(Error::io(&self.config.output, std::io::Error::other(e.to_string()))),
        }
    }

    async fn save_cache(&self, outcome: &mut BuildOutcome) {
        let cache = outcome.execution.cache().clone();
        let path = self.config.cache.clone();
        let saved = tokio::task::spawn_blocking(move || cache.save(&path)).await;
        let result = match saved {
            Ok(result) => result,
            Err(e) => Err(Error::Cache(format!("saving cache: {e}"))),
        };
        if let Err(e) = result {
            let err = e.to_string();
            warn!("Build cache not saved: {err: err.as_str()}");
            outcome.errors.push(e);
        }
    }

    async fn deploy_into(&self, outcome: &mut BuildOutcome) {
        let Some(adapter) = &self.adapter else {
            return;
        };
        match self.publish(adapter.as_ref()).await {
            Ok(result) => outcome.deployed = Some(result),
            Err(e) => {
                let err = e.to_string();
                error!("Deploy failed: {err: err.as_str()}");
                outcome.errors.push(e);
            }
        }
    }

    async fn publish(&self, adapter: &dyn DeployAdapter) -> Result<DeployResult> {
        let (site_id, token) = self.config.credentials().ok_or_else(|| {
            Error::Configuration("deploy needs siteId and accessToken".into())
        })?;
        let name = adapter.name().to_string();
        info!("Deploying with {name} to site {site_id}");
        Ok(adapter.deploy(&self.config.output, site_id, token).await?)
    }

    /// Ship the existing output tree without building.
    pub async fn deploy(&self) -> Result<DeployResult> {
        let adapter = self
            .adapter
            .as_ref()
            .ok_or_else(|| Error::Configuration("no deploy adapter configured".into()))?;
        self.publish(adapter.as_ref()).await
    }

    /// Build, then rebuild whenever the input tree changes, until `cancel`
    /// fires. `on_build` sees every outcome.
    pub async fn watch<F>(&self, options: BuildOptions, mut on_build: F) -> Result<()>
    where
        F: FnMut(&BuildOutcome),
    {
        let interval = Duration::from_millis(self.config.watch.interval_ms);
        let cancel = options.cancel.clone();

        let mut previous = self.snapshot().await?;
        on_build(&self.build(options.clone()).await?);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(interval) => {}
            }

            let current = match self.snapshot().await {
                Ok(current) => current,
                Err(e) => {
                    let err = e.to_string();
                    warn!("Cannot scan input: {err: err.as_str()}");
                    continue;
                }
            };
            let changes = ChangeSet::between(&previous, &current);
            if changes.is_empty() {
                continue;
            }

            let count = changes.len();
            info!("Detected {count} changed input files; rebuilding");
            previous = current;
            let outcome = self
                .build(BuildOptions {
                    change_set: Some(changes),
                    ..options.clone()
                })
                .await?;
            on_build(&outcome);
        }
        info!("Watch stopped");
        Ok(())
    }

    async fn snapshot(&self) -> Result<BTreeMap<DocumentId, Fingerprint>> {
        let input = self.config.input.clone();
        tokio::task::spawn_blocking(move || reader::snapshot(&input))
            .await
            .map_err(|e| Error::io(&self.config.input, std::io::Error::other(e.to_string())))?
            .map_err(|e| Error::io(&self.config.input, std::io::Error::other(format!("{e:#}"))))
    }
}

/// `path` relative to `root` when it lies inside it.
fn inside(root: &Path, path: &Path) -> Option<PathBuf> {
    path.strip_prefix(root).ok().map(Path::to_path_buf)
}
