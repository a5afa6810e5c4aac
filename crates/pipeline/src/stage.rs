// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Stages and the transforms they run.

use crate::changes::ChangeSet;
use async_trait::async_trait;
use docstore::{Document, DocumentId, Fingerprint, Fingerprinter};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Documents visible to a stage: the outputs of its declared dependencies,
/// grouped by dependency in declaration order.
#[derive(Debug, Clone, Default)]
pub struct Inputs {
    groups: Vec<(String, Vec<Arc<Document>>)>,
}

impl Inputs {
    pub(crate) fn new(groups: Vec<(String, Vec<Arc<Document>>)>) -> Self {
        Self { groups }
    }

    /// Output of one dependency; empty if the stage did not declare it.
    #[must_use]
    pub fn from_stage(&self, name: &str) -> &[Arc<Document>] {
        self.groups
            .iter()
            .find(|(stage, _)| stage == name)
            .map_or(&[], |(_, docs)| docs.as_slice())
    }

    /// Every visible document, dependency by dependency.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Document>> {
        self.groups.iter().flat_map(|(_, docs)| docs.iter())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.iter().map(|(_, docs)| docs.len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Digest of everything a cacheable stage can observe.
    pub(crate) fn fingerprint(&self, cache_key: &str) -> Fingerprint {
        let mut fp = Fingerprinter::new();
        fp.field("cache-key", cache_key.as_bytes());
        for (stage, docs) in &self.groups {
            fp.field("stage", stage.as_bytes());
            let mut sorted: Vec<&Arc<Document>> = docs.iter().collect();
            sorted.sort_by(|a, b| a.id().cmp(b.id()));
            for doc in sorted {
                fp.field("id", doc.id().as_str().as_bytes())
                    .field("fingerprint", doc.fingerprint().as_str().as_bytes());
            }
        }
        fp.finish()
    }
}

/// Everything a transform receives for one execution.
pub struct StageContext {
    stage: String,
    inputs: Inputs,
    change_set: Option<Arc<ChangeSet>>,
    cancel: CancellationToken,
}

impl StageContext {
    pub(crate) fn new(
        stage: String,
        inputs: Inputs,
        change_set: Option<Arc<ChangeSet>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            stage,
            inputs,
            change_set,
            cancel,
        }
    }

    #[must_use]
    pub fn stage(&self) -> &str {
        &self.stage
    }

    #[must_use]
    pub fn inputs(&self) -> &Inputs {
        &self.inputs
    }

    /// Paths touched since the previous run, when the caller supplied them.
    #[must_use]
    pub fn change_set(&self) -> Option<&ChangeSet> {
        self.change_set.as_deref()
    }

    /// Long-running transforms may poll this and return early.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// A document a transform could not process. The stage still succeeds with
/// the rest of its output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentFailure {
    pub id: DocumentId,
    pub message: String,
}

/// What a transform produces.
#[derive(Debug, Default)]
pub struct StageOutput {
    pub documents: Vec<Document>,
    pub failures: Vec<DocumentFailure>,
}

impl StageOutput {
    #[must_use]
    pub fn new(documents: Vec<Document>) -> Self {
        Self {
            documents,
            failures: Vec::new(),
        }
    }

    pub fn push(&mut self, document: Document) {
        self.documents.push(document);
    }

    pub fn fail<M: Into<String>>(&mut self, id: DocumentId, message: M) {
        self.failures.push(DocumentFailure {
            id,
            message: message.into(),
        });
    }
}

impl From<Vec<Document>> for StageOutput {
    fn from(documents: Vec<Document>) -> Self {
        StageOutput::new(documents)
    }
}

/// The work a stage performs. Treated as atomic by the engine: it is never
/// interrupted once started.
#[async_trait]
pub trait Transform: Send + Sync {
    async fn apply(&self, ctx: StageContext) -> anyhow::Result<StageOutput>;

    /// Mixed into the input fingerprint of cacheable stages. Change it when
    /// the transform's behavior changes so stale cached output is not reused.
    fn cache_key(&self) -> String {
        String::new()
    }
}

struct FnTransform<F>(F);

#[async_trait]
impl<F, Fut> Transform for FnTransform<F>
where
    F: Fn(StageContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<StageOutput>> + Send + 'static,
{
    async fn apply(&self, ctx: StageContext) -> anyhow::Result<StageOutput> {
        (self.0)(ctx).await
    }
}

/// Wrap an async closure as a transform.
pub fn transform_fn<F, Fut>(f: F) -> Arc<dyn Transform>
where
    F: Fn(StageContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<StageOutput>> + Send + 'static,
{
    Arc::new(FnTransform(f))
}

struct MapDocuments<F> {
    f: Arc<F>,
    cache_key: String,
}

#[async_trait]
impl<F> Transform for MapDocuments<F>
where
    F: Fn(&Document) -> anyhow::Result<Option<Document>> + Send + Sync + 'static,
{
    async fn apply(&self, ctx: StageContext) -> anyhow::Result<StageOutput> {
        let f = self.f.clone();
        let docs: Vec<Arc<Document>> = ctx.inputs().iter().cloned().collect();
        let output = tokio::task::spawn_blocking(move || {
            let mut output = StageOutput::default();
            for doc in docs {
                match f(&doc) {
                    Ok(Some(mapped)) => output.push(mapped),
                    Ok(None) => {}
                    Err(e) => output.fail(doc.id().clone(), format!("{e:#}")),
                }
            }
            output
        })
        .await?;
        Ok(output)
    }

    fn cache_key(&self) -> String {
        self.cache_key.clone()
    }
}

/// Per-document transform: `Ok(Some)` replaces, `Ok(None)` drops, `Err`
/// records a document failure without failing the stage. Runs on the
/// blocking pool.
pub fn map_documents<K, F>(cache_key: K, f: F) -> Arc<dyn Transform>
where
    K: Into<String>,
    F: Fn(&Document) -> anyhow::Result<Option<Document>> + Send + Sync + 'static,
{
    Arc::new(MapDocuments {
        f: Arc::new(f),
        cache_key: cache_key.into(),
    })
}

/// A named node of the pipeline graph.
#[derive(Clone)]
pub struct Stage {
    name: String,
    depends_on: Vec<String>,
    transform: Arc<dyn Transform>,
    cacheable: bool,
    watches: Vec<String>,
    output: bool,
}

impl Stage {
    pub fn new<S: Into<String>>(name: S, transform: Arc<dyn Transform>) -> Self {
        Self {
            name: name.into(),
            depends_on: Vec::new(),
            transform,
            cacheable: false,
            watches: Vec::new(),
            output: false,
        }
    }

    /// Declare upstream stages. Order is preserved in [`Inputs`].
    #[must_use]
    pub fn depends_on<I, S>(mut self, stages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(stages.into_iter().map(Into::into));
        self
    }

    /// Allow the engine to reuse this stage's previous output.
    #[must_use]
    pub fn cacheable(mut self) -> Self {
        self.cacheable = true;
        self
    }

    /// Glob over input-relative paths this stage reads. A change-set that
    /// touches none of them leaves a cacheable source stage untouched.
    #[must_use]
    pub fn watching<S: Into<String>>(mut self, pattern: S) -> Self {
        self.watches.push(pattern.into());
        self
    }

    /// Mark this stage's documents for the output writer.
    #[must_use]
    pub fn output(mut self) -> Self {
        self.output = true;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn dependencies(&self) -> &[String] {
        &self.depends_on
    }

    #[must_use]
    pub fn transform(&self) -> &Arc<dyn Transform> {
        &self.transform
    }

    #[must_use]
    pub fn is_cacheable(&self) -> bool {
        self.cacheable
    }

    #[must_use]
    pub fn watches(&self) -> &[String] {
        &self.watches
    }

    #[must_use]
    pub fn is_output(&self) -> bool {
        self.output
    }

    #[must_use]
    pub fn is_source(&self) -> bool {
        self.depends_on.is_empty()
    }
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name)
            .field("depends_on", &self.depends_on)
            .field("cacheable", &self.cacheable)
            .field("watches", &self.watches)
            .field("output", &self.output)
            .finish()
    }
}
