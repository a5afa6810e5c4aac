// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Deploy adapters.

use crate::config::{AdapterKind, SiteConfig};
use async_trait::async_trait;
use diagnostics::*;
use pipeline::{DeployAdapter, DeployError, DeployResult, Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use wax::Glob;

/// Name of the manifest written next to a published tree.
pub const MANIFEST: &str = ".siteforge-deploy.json";

/// Build the adapter configured for the site, if any.
pub fn adapter_for(config: &SiteConfig) -> Result<Option<Arc<dyn DeployAdapter>>> {
    match config.deploy.adapter {
        AdapterKind::None => Ok(None),
        AdapterKind::Directory => {
            let target = config.deploy.target.clone().ok_or_else(|| {
                Error::Configuration("directory deploy adapter needs a target".into())
            })?;
            Ok(Some(Arc::new(DirectoryDeploy::new(target))))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployManifest {
    pub deploy_id: String,
    pub site_id: String,
    pub deployed_at: String,
    /// Relative path → SHA-256 of the published bytes.
    pub files: BTreeMap<String, String>,
}

/// Publishes into `<target>/<site_id>/`, mirroring the output tree.
///
/// Stands in for a hosting API: the site id picks the destination and the
/// access token must be present, but it is never written anywhere.
#[derive(Debug, Clone)]
pub struct DirectoryDeploy {
    target: PathBuf,
}

impl DirectoryDeploy {
    pub fn new<P: Into<PathBuf>>(target: P) -> Self {
        Self {
            target: target.into(),
        }
    }

    #[must_use]
    pub fn site_dir(&self, site_id: &str) -> PathBuf {
        self.target.join(site_id)
    }
}

#[async_trait]
impl DeployAdapter for DirectoryDeploy {
    fn name(&self) -> &str {
        "directory"
    }

    async fn deploy(
        &self,
        output_root: &Path,
        site_id: &str,
        access_token: &str,
    ) -> std::result::Result<DeployResult, DeployError> {
        if access_token.trim().is_empty() {
            return Err(DeployError::rejected(self.name(), "access token is empty"));
        }
        if !valid_site_id(site_id) {
            return Err(DeployError::rejected(
                self.name(),
                format!("invalid site id '{site_id}'"),
            ));
        }
        if !output_root.is_dir() {
            return Err(DeployError::Unavailable(format!(
                "output tree {} does not exist",
                output_root.display()
            )));
        }

        let source = output_root.to_path_buf();
        let destination = self.site_dir(site_id);
        let site_id = site_id.to_string();
        let manifest = tokio::task::spawn_blocking(move || mirror(&source, &destination, &site_id))
            .await
            .map_err(|e| DeployError::Unavailable(format!("deploy task failed: {e}")))??;

        let location = self.site_dir(&manifest.site_id).display().to_string();
        let deploy_id = manifest.deploy_id.clone();
        let files = manifest.files.len();
        info!("Deployed {files} files to {location} as {deploy_id}");

        Ok(DeployResult {
            adapter: self.name().to_string(),
            deploy_id: manifest.deploy_id,
            files,
            location,
        })
    }
}

/// Site ids name a single directory.
fn valid_site_id(site_id: &str) -> bool {
    !site_id.is_empty()
        && site_id != "."
        && site_id != ".."
        && !site_id.contains(['/', '\\'])
}

fn relative_files(root: &Path) -> std::result::Result<Vec<String>, DeployError> {
    let glob = Glob::new("**").map_err(|e| DeployError::Unavailable(e.to_string()))?;
    let mut files = Vec::new();
    for entry in glob.walk(root) {
        let entry = entry.map_err(|e| DeployError::io(root, std::io::Error::other(e.to_string())))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if let Ok(relative) = path.strip_prefix(root) {
            files.push(relative.to_string_lossy().replace('\\', "/"));
        }
    }
    files.sort();
    Ok(files)
}

fn mirror(
    source: &Path,
    destination: &Path,
    site_id: &str,
) -> std::result::Result<DeployManifest, DeployError> {
    std::fs::create_dir_all(destination).map_err(|e| DeployError::io(destination, e))?;

    let mut files = BTreeMap::new();
    for relative in relative_files(source)? {
        let from = source.join(&relative);
        let to = destination.join(&relative);
        let bytes = std::fs::read(&from).map_err(|e| DeployError::io(&from, e))?;
        copy_atomic(&to, &bytes)?;
        files.insert(relative, hex::encode(Sha256::digest(&bytes)));
    }

    let published: BTreeSet<&str> = files.keys().map(String::as_str).collect();
    for relative in relative_files(destination)? {
        if relative != MANIFEST && !published.contains(relative.as_str()) {
            let stale = destination.join(&relative);
            std::fs::remove_file(&stale).map_err(|e| DeployError::io(&stale, e))?;
            debug!("Unpublished {relative}");
        }
    }

    let manifest = DeployManifest {
        deploy_id: uuid7::uuid7().to_string(),
        site_id: site_id.to_string(),
        deployed_at: chrono::Utc::now().to_rfc3339(),
        files,
    };
    let json = serde_json::to_vec_pretty(&manifest)
        .map_err(|e| DeployError::Unavailable(format!("manifest: {e}")))?;
    copy_atomic(&destination.join(MANIFEST), &json)?;
    Ok(manifest)
}

fn copy_atomic(path: &Path, bytes: &[u8]) -> std::result::Result<(), DeployError> {
    let parent = path.parent().unwrap_or(Path::new("."));
    std::fs::create_dir_all(parent).map_err(|e| DeployError::io(parent, e))?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|e| DeployError::io(parent, e))?;
    tmp.write_all(bytes).map_err(|e| DeployError::io(path, e))?;
    tmp.as_file().sync_all().map_err(|e| DeployError::io(path, e))?;
    tmp.persist(path).map_err(|e| DeployError::io(path, e.error))?;
    Ok(())
}
