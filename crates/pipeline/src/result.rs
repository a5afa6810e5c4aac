// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use crate::cache::BuildCache;
use crate::error::Error;
use docstore::{Document, DocumentRef};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    /// The transform ran and returned output.
    Succeeded,
    /// Previous output was reused without running the transform.
    Cached,
    /// The transform returned an error or panicked.
    Failed,
    /// Not run because a dependency failed or was skipped.
    Skipped,
    /// Not run because the run was cancelled first.
    Cancelled,
}

impl StageStatus {
    /// Whether dependents may consume this stage's output.
    #[must_use]
    pub fn is_usable(self) -> bool {
        matches!(self, StageStatus::Succeeded | StageStatus::Cached)
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            StageStatus::Succeeded => "succeeded",
            StageStatus::Cached => "cached",
            StageStatus::Failed => "failed",
            StageStatus::Skipped => "skipped",
            StageStatus::Cancelled => "cancelled",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone)]
pub struct StageReport {
    pub name: String,
    pub status: StageStatus,
    pub documents: Vec<Arc<Document>>,
    /// Store revisions of `documents`, in the same order.
    pub refs: Vec<DocumentRef>,
    pub elapsed: Duration,
    pub output: bool,
}

/// Outcome of one [`crate::Engine::run`].
#[derive(Debug)]
pub struct ExecutionResult {
    run_id: uuid7::Uuid,
    stages: Vec<StageReport>,
    errors: Vec<Error>,
    cache: BuildCache,
    elapsed: Duration,
}

impl ExecutionResult {
    pub(crate) fn new(
        run_id: uuid7::Uuid,
        stages: Vec<StageReport>,
        errors: Vec<Error>,
        cache: BuildCache,
        elapsed: Duration,
    ) -> Self {
        Self {
            run_id,
            stages,
            errors,
            cache,
            elapsed,
        }
    }

    #[must_use]
    pub fn run_id(&self) -> uuid7::Uuid {
        self.run_id
    }

    /// Reports in execution order.
    #[must_use]
    pub fn stages(&self) -> &[StageReport] {
        &self.stages
    }

    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.name == name)
    }

    #[must_use]
    pub fn status(&self, name: &str) -> Option<StageStatus> {
        self.stage(name).map(|s| s.status)
    }

    #[must_use]
    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    /// True when every stage produced its output and no document failed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.errors.is_empty() && self.stages.iter().all(|s| s.status.is_usable())
    }

    /// True when any stage or document failed. Stages that only missed the
    /// run because of cancellation do not count.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.errors.is_empty()
            || self
                .stages
                .iter()
                .any(|s| matches!(s.status, StageStatus::Failed | StageStatus::Skipped))
    }

    /// Documents of stages marked as output, in execution order.
    #[must_use]
    pub fn output_documents(&self) -> Vec<Arc<Document>> {
        self.stages
            .iter()
            .filter(|s| s.output && s.status.is_usable())
            .flat_map(|s| s.documents.iter().cloned())
            .collect()
    }

    /// Cache reflecting this run, to be persisted for the next one.
    #[must_use]
    pub fn cache(&self) -> &BuildCache {
        &self.cache
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}
