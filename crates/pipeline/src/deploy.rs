// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Publishing a finished output tree.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// The adapter refused the request, e.g. bad credentials.
    #[error("Deploy rejected by {adapter}: {message}")]
    Rejected { adapter: String, message: String },

    #[error("Deploy IO error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The destination cannot be reached right now.
    #[error("Deploy target unavailable: {0}")]
    Unavailable(String),
}

impl DeployError {
    pub fn io<P: AsRef<Path>>(path: P, source: std::io::Error) -> Self {
        DeployError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn rejected<A: Into<String>, M: Into<String>>(adapter: A, message: M) -> Self {
        DeployError::Rejected {
            adapter: adapter.into(),
            message: message.into(),
        }
    }
}

/// What a successful deploy reports back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployResult {
    pub adapter: String,
    pub deploy_id: String,
    /// Number of files shipped.
    pub files: usize,
    /// Where the site now lives (URL or path).
    pub location: String,
}

/// Ships an output tree to a hosting destination.
///
/// Adapters receive credentials per call and must never persist the access
/// token.
#[async_trait]
pub trait DeployAdapter: Send + Sync {
    fn name(&self) -> &str;

    async fn deploy(
        &self,
        output_root: &Path,
        site_id: &str,
        access_token: &str,
    ) -> Result<DeployResult, DeployError>;
}
