// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

// Error taxonomy for building and publishing a site
use crate::deploy::DeployError;
use docstore::DocumentId;
use std::path::{Path, PathBuf};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or invalid setting; aborts before anything executes.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Cyclic or dangling stage dependency; aborts before anything executes.
    #[error("Graph validation error: {0}")]
    GraphValidation(#[from] GraphError),

    /// A transform failed, for the whole stage or for one document.
    #[error("Stage '{stage}' failed{}: {message}", document_suffix(.document))]
    StageExecution {
        stage: String,
        document: Option<DocumentId>,
        message: String,
    },

    /// Writing one output file failed; other files are unaffected.
    #[error("IO error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Publishing failed; the local output tree is still valid.
    #[error("Deploy error: {0}")]
    Deploy(#[from] DeployError),

    #[error("Cache error: {0}")]
    Cache(String),
}

fn document_suffix(document: &Option<DocumentId>) -> String {
    match document {
        Some(id) => format!(" on '{id}'"),
        None => String::new(),
    }
}

impl Error {
    pub fn io<P: AsRef<Path>>(path: P, source: std::io::Error) -> Self {
        Error::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn stage<S: Into<String>, M: Into<String>>(stage: S, message: M) -> Self {
        Error::StageExecution {
            stage: stage.into(),
            document: None,
            message: message.into(),
        }
    }

    pub fn document<S: Into<String>, M: Into<String>>(
        stage: S,
        document: DocumentId,
        message: M,
    ) -> Self {
        Error::StageExecution {
            stage: stage.into(),
            document: Some(document),
            message: message.into(),
        }
    }

    /// Errors that abort a run before any stage executes.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Configuration(_) | Error::GraphValidation(_))
    }
}

/// Reasons a [`crate::PipelineGraph`] is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("Duplicate stage name: {0}")]
    DuplicateStage(String),

    #[error("Stage '{stage}' depends on unknown stage '{dependency}'")]
    MissingDependency { stage: String, dependency: String },

    #[error("Dependency cycle: {}", .path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("Stage '{stage}' has invalid watch pattern '{pattern}': {message}")]
    InvalidPattern {
        stage: String,
        pattern: String,
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_error_display() {
        let whole = Error::stage("markdown", "boom");
        assert_eq!(whole.to_string(), "Stage 'markdown' failed: boom");

        let one = Error::document("markdown", "a.md".into(), "bad front matter");
        assert_eq!(
            one.to_string(),
            "Stage 'markdown' failed on 'a.md': bad front matter"
        );
    }

    #[test]
    fn test_cycle_display() {
        let err = GraphError::Cycle {
            path: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "Dependency cycle: a -> b -> a");
        assert!(Error::from(err).is_fatal());
    }
}
