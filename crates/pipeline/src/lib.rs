// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! # Pipeline: the build core of siteforge
//!
//! Stages are named transformations over documents, wired into a
//! [`PipelineGraph`] by declared dependencies. The [`Engine`] validates the
//! graph, runs independent stages concurrently, contains failures to the
//! dependent subgraph of the failing stage, and reuses cached output for
//! cacheable stages whose inputs did not change. The [`OutputWriter`]
//! materializes the result atomically, and a [`DeployAdapter`] ships it.

mod cache;
mod changes;
mod deploy;
mod engine;
mod error;
mod graph;
mod output;
mod result;
mod stage;

pub use cache::{BuildCache, CACHE_SCHEMA_VERSION, StageRecord};
pub use changes::ChangeSet;
pub use deploy::{DeployAdapter, DeployError, DeployResult};
pub use engine::{Engine, EngineConfig, RunOptions};
pub use error::{Error, GraphError, Result};
pub use graph::{ExecutionPlan, PipelineGraph};
pub use output::{OutputWriter, WriteMode, WriteReport};
pub use result::{ExecutionResult, StageReport, StageStatus};
pub use stage::{
    DocumentFailure, Inputs, Stage, StageContext, StageOutput, Transform, map_documents,
    transform_fn,
};

pub use tokio_util::sync::CancellationToken;
