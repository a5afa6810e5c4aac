// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Execution engine.
//!
//! Runs a validated [`PipelineGraph`] level by level. Stages in a level are
//! independent and run as concurrent tokio tasks, bounded by a semaphore of
//! `workers` permits; the next level starts only after every stage of the
//! current one has finished, so no stage observes a dependency in progress.
//!
//! Failures are collected, never raised: a failed stage takes its transitive
//! dependents down with it (they are skipped) while unrelated branches keep
//! going, and the [`ExecutionResult`] lists every error of the run.

use crate::cache::{BuildCache, StageRecord};
use crate::changes::ChangeSet;
use crate::error::{Error, Result};
use crate::graph::PipelineGraph;
use crate::result::{ExecutionResult, StageReport, StageStatus};
use crate::stage::{DocumentFailure, Inputs, Stage, StageContext, StageOutput};
use diagnostics::*;
use docstore::{Document, DocumentRef, DocumentStore, Fingerprint, StoreError};
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of stages running at once.
    pub workers: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
        }
    }
}

/// Per-run inputs besides the graph and the store.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Input-relative paths touched since the previous run.
    pub change_set: Option<ChangeSet>,
    /// Cache from the previous run; without it nothing is reused.
    pub prior: Option<BuildCache>,
    pub cancel: CancellationToken,
}

enum Outcome {
    Finished(anyhow::Result<StageOutput>, Duration),
    Cancelled,
}

struct Pending<'g> {
    stage: &'g Stage,
    input_fingerprint: Fingerprint,
    handle: JoinHandle<Outcome>,
}

pub struct Engine {
    config: EngineConfig,
}

impl Engine {
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn workers(&self) -> usize {
        self.config.workers.max(1)
    }

    /// Execute every stage of the graph against the store.
    ///
    /// Returns `Err` only when the graph is invalid, before any stage runs.
    /// Stage and document failures are reported in the result.
    pub async fn run(
        &self,
        graph: &PipelineGraph,
        store: &Arc<DocumentStore>,
        options: RunOptions,
    ) -> Result<ExecutionResult> {
        let plan = graph.validate()?;

        let RunOptions {
            change_set,
            prior,
            cancel,
        } = options;
        let change_set = change_set.map(Arc::new);
        let run_id = uuid7::uuid7();
        let started = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.workers()));

        let run = run_id.to_string();
        let stage_count = graph.len();
        let workers = self.workers();
        info!("Run {run} started: {stage_count} stages on {workers} workers");

        let mut run_state = RunState {
            store,
            prior: prior.as_ref(),
            reports: Vec::with_capacity(graph.len()),
            errors: Vec::new(),
            cache: BuildCache::new(),
        };

        for level in plan.levels() {
            let mut pending = Vec::new();

            for name in level {
                let Some(stage) = graph.stage(name) else {
                    continue;
                };

                if let Some(status) = run_state.blocked(stage) {
                    let dep_status = status.to_string();
                    debug!("Stage {name} not run: dependency {dep_status}");
                    run_state.not_run(stage, status);
                    continue;
                }
                if cancel.is_cancelled() {
                    run_state.not_run(stage, StageStatus::Cancelled);
                    continue;
                }

                let inputs = match run_state.inputs_for(stage) {
                    Ok(inputs) => inputs,
                    Err(e) => {
                        let message = format!("cannot resolve inputs: {e}");
                        run_state.fail(stage, message, Duration::ZERO);
                        continue;
                    }
                };
                let input_fingerprint = inputs.fingerprint(&stage.transform().cache_key());

                if let Some(record) =
                    run_state.reusable(stage, &input_fingerprint, change_set.as_deref())
                {
                    run_state.reuse(stage, record);
                    continue;
                }

                let ctx =
                    StageContext::new(name.clone(), inputs, change_set.clone(), cancel.clone());
                let transform = stage.transform().clone();
                let semaphore = semaphore.clone();
                let cancel = cancel.clone();
                let handle = tokio::spawn(async move {
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        return Outcome::Cancelled;
                    };
                    if cancel.is_cancelled() {
                        return Outcome::Cancelled;
                    }
                    let started = Instant::now();
                    let result = transform.apply(ctx).await;
                    Outcome::Finished(result, started.elapsed())
                });
                pending.push(Pending {
                    stage,
                    input_fingerprint,
                    handle,
                });
            }

            // Await in declaration order so reports and errors are
            // reproducible regardless of completion order.
            for Pending {
                stage,
                input_fingerprint,
                handle,
            } in pending
            {
                match handle.await {
                    Ok(Outcome::Finished(Ok(output), elapsed)) => {
                        run_state.accept(stage, input_fingerprint, output, elapsed);
                    }
                    Ok(Outcome::Finished(Err(e), elapsed)) => {
                        run_state.fail(stage, format!("{e:#}"), elapsed);
                    }
                    Ok(Outcome::Cancelled) => {
                        run_state.not_run(stage, StageStatus::Cancelled);
                    }
                    Err(join_err) => {
                        let message = if join_err.is_panic() {
                            "stage panicked".to_string()
                        } else {
                            format!("stage task aborted: {join_err}")
                        };
                        run_state.fail(stage, message, Duration::ZERO);
                    }
                }
            }
        }

        let RunState {
            reports,
            errors,
            cache,
            ..
        } = run_state;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let error_count = errors.len();
        if error_count == 0 {
            info!("Run {run} finished in {elapsed_ms} ms");
        } else {
            warn!("Run {run} finished in {elapsed_ms} ms with {error_count} errors");
        }

        Ok(ExecutionResult::new(
            run_id,
            reports,
            errors,
            cache,
            started.elapsed(),
        ))
    }
}

/// Mutable bookkeeping of a single run.
struct RunState<'a> {
    store: &'a Arc<DocumentStore>,
    prior: Option<&'a BuildCache>,
    reports: Vec<StageReport>,
    errors: Vec<Error>,
    cache: BuildCache,
}

impl RunState<'_> {
    fn report(&self, name: &str) -> Option<&StageReport> {
        self.reports.iter().find(|r| r.name == name)
    }

    /// Status to give a stage whose dependencies cannot feed it, if any.
    fn blocked(&self, stage: &Stage) -> Option<StageStatus> {
        let mut cancelled = false;
        for dep in stage.dependencies() {
            match self.report(dep).map(|r| r.status) {
                Some(status) if status.is_usable() => {}
                Some(StageStatus::Cancelled) => cancelled = true,
                _ => return Some(StageStatus::Skipped),
            }
        }
        cancelled.then_some(StageStatus::Cancelled)
    }

    /// Resolve the references recorded for each declared dependency. Only
    /// those stages' documents are visible.
    fn inputs_for(&self, stage: &Stage) -> std::result::Result<Inputs, StoreError> {
        let mut groups = Vec::with_capacity(stage.dependencies().len());
        for dep in stage.dependencies() {
            let docs = match self.report(dep) {
                Some(report) => report
                    .refs
                    .iter()
                    .map(|r| self.store.resolve(r))
                    .collect::<std::result::Result<Vec<_>, _>>()?,
                None => Vec::new(),
            };
            groups.push((dep.clone(), docs));
        }
        Ok(Inputs::new(groups))
    }

    /// Prior output of a cacheable stage that is still valid for this run.
    ///
    /// Source stages read outside the graph, so they are trusted only when
    /// they declare watch patterns and the caller supplied a change-set that
    /// misses all of them. Other stages compare input fingerprints.
    fn reusable(
        &self,
        stage: &Stage,
        input_fingerprint: &Fingerprint,
        change_set: Option<&ChangeSet>,
    ) -> Option<StageRecord> {
        if !stage.is_cacheable() {
            return None;
        }
        let record = self.prior?.stage(stage.name())?;
        let valid = if stage.is_source() {
            !stage.watches().is_empty()
                && change_set.is_some_and(|changes| !changes.touches(stage.watches()))
        } else {
            record.input_fingerprint == *input_fingerprint
        };
        valid.then(|| record.clone())
    }

    fn reuse(&mut self, stage: &Stage, record: StageRecord) {
        let (documents, refs) = self.store_documents(stage, record.documents.clone());
        let name = stage.name();
        let count = documents.len();
        debug!("Stage {name} reused {count} cached documents");
        self.record_failures(name, &record.failures);

        self.cache.record_stage(name, record);
        self.reports.push(StageReport {
            name: name.to_string(),
            status: StageStatus::Cached,
            documents,
            refs,
            elapsed: Duration::ZERO,
            output: stage.is_output(),
        });
    }

    fn accept(
        &mut self,
        stage: &Stage,
        input_fingerprint: Fingerprint,
        output: StageOutput,
        elapsed: Duration,
    ) {
        let name = stage.name();

        let mut seen = HashSet::new();
        if let Some(dup) = output.documents.iter().find(|d| !seen.insert(d.id().clone())) {
            let message = format!("duplicate document id '{}' in stage output", dup.id());
            self.fail(stage, message, elapsed);
            return;
        }

        self.record_failures(name, &output.failures);

        if stage.is_cacheable() {
            self.cache.record_stage(
                name,
                StageRecord {
                    input_fingerprint,
                    documents: output.documents.clone(),
                    failures: output.failures,
                },
            );
        }
        let (documents, refs) = self.store_documents(stage, output.documents);

        let count = documents.len();
        let elapsed_ms = elapsed.as_millis() as u64;
        info!("Stage {name} produced {count} documents in {elapsed_ms} ms");

        self.reports.push(StageReport {
            name: name.to_string(),
            status: StageStatus::Succeeded,
            documents,
            refs,
            elapsed,
            output: stage.is_output(),
        });
    }

    fn record_failures(&mut self, name: &str, failures: &[DocumentFailure]) {
        for failure in failures {
            let doc = failure.id.to_string();
            let message = failure.message.clone();
            error!("Stage {name} failed on {doc}: {message}");
            self.errors
                .push(Error::document(name, failure.id.clone(), failure.message.clone()));
        }
    }

    fn fail(&mut self, stage: &Stage, message: String, elapsed: Duration) {
        let name = stage.name();
        error!("Stage {name} failed: {message}");
        self.errors.push(Error::stage(name, message));
        self.carry_forward(stage);
        self.reports.push(StageReport {
            name: name.to_string(),
            status: StageStatus::Failed,
            documents: Vec::new(),
            refs: Vec::new(),
            elapsed,
            output: stage.is_output(),
        });
    }

    fn not_run(&mut self, stage: &Stage, status: StageStatus) {
        self.carry_forward(stage);
        self.reports.push(StageReport {
            name: stage.name().to_string(),
            status,
            documents: Vec::new(),
            refs: Vec::new(),
            elapsed: Duration::ZERO,
            output: stage.is_output(),
        });
    }

    /// Keep the previous record of a stage that produced nothing this run,
    /// so a later run can still reuse it.
    fn carry_forward(&mut self, stage: &Stage) {
        if let Some(record) = self.prior.and_then(|p| p.stage(stage.name())) {
            if stage.is_source() {
                for doc in &record.documents {
                    self.cache
                        .record_document(doc.id().clone(), doc.fingerprint().clone());
                }
            }
            self.cache.record_stage(stage.name(), record.clone());
        }
    }

    /// Put documents into the store, returning the shared documents and the
    /// references dependents resolve them by.
    fn store_documents(
        &mut self,
        stage: &Stage,
        documents: Vec<Document>,
    ) -> (Vec<Arc<Document>>, Vec<DocumentRef>) {
        let mut shared = Vec::with_capacity(documents.len());
        let mut refs = Vec::with_capacity(documents.len());
        for doc in documents {
            if stage.is_source() {
                self.cache
                    .record_document(doc.id().clone(), doc.fingerprint().clone());
            }
            let doc = Arc::new(doc);
            refs.push(self.store.put_shared(doc.clone()));
            shared.push(doc);
        }
        (shared, refs)
    }
}
