// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Site configuration, parsed from `site.yaml`.

use pipeline::{EngineConfig, Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration file used when none is given on the command line.
pub const DEFAULT_CONFIG: &str = "site.yaml";

pub const ENV_SITE_ID: &str = "SITEFORGE_SITE_ID";
pub const ENV_ACCESS_TOKEN: &str = "SITEFORGE_ACCESS_TOKEN";
pub const ENV_OUTPUT: &str = "SITEFORGE_OUTPUT";

/// Top-level site configuration.
///
/// ```yaml
/// site:
///   title: "Caspar Water"
///   url: "https://example.org"
/// input: content
/// output: public
/// content: ["**/*.md"]
/// workers: 4
/// deploy:
///   adapter: directory
///   target: ../published
///   siteId: caspar
///   accessToken: s3cret
/// ```
///
/// Every key is optional. Relative paths are resolved against the directory
/// holding the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    pub site: SiteMeta,
    pub input: PathBuf,
    pub output: PathBuf,
    pub cache: PathBuf,
    /// Globs selecting markdown sources; everything else is an asset.
    pub content: Vec<String>,
    /// Publish pages whose front matter says `draft: true`.
    pub drafts: bool,
    /// Stage concurrency; defaults to the number of cores.
    pub workers: Option<usize>,
    pub watch: WatchConfig,
    pub deploy: DeployConfig,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            site: SiteMeta::default(),
            input: PathBuf::from("input"),
            output: PathBuf::from("output"),
            cache: PathBuf::from(".siteforge/cache.json"),
            content: vec!["**/*.md".to_string()],
            drafts: false,
            workers: None,
            watch: WatchConfig::default(),
            deploy: DeployConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteMeta {
    pub title: String,
    /// Public base URL; enables `sitemap.xml`.
    pub url: Option<String>,
}

impl Default for SiteMeta {
    fn default() -> Self {
        Self {
            title: "Untitled Site".to_string(),
            url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub interval_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { interval_ms: 500 }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterKind {
    #[default]
    None,
    Directory,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    pub adapter: AdapterKind,
    /// Destination directory for the `directory` adapter.
    pub target: Option<PathBuf>,
    #[serde(rename = "siteId", alias = "site_id")]
    pub site_id: Option<String>,
    #[serde(rename = "accessToken", alias = "access_token")]
    pub access_token: Option<String>,
}

impl SiteConfig {
    /// Load, apply environment overrides, resolve paths and validate.
    ///
    /// Without an explicit path a missing `site.yaml` yields the defaults;
    /// an explicit path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG), false),
        };

        let mut config = match std::fs::read_to_string(&path) {
            Ok(text) => Self::from_yaml(&text).map_err(|e| {
                Error::Configuration(format!("{}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !explicit => Self::default(),
            Err(e) => {
                return Err(Error::Configuration(format!(
                    "cannot read {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        config.apply_env(|key| std::env::var(key).ok());
        let base = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        config.resolve_paths(&base);
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> std::result::Result<Self, serde_yaml_ng::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml_ng::from_str(text)
    }

    /// Override settings from the environment. Non-empty values win over the
    /// file.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(site_id) = get(ENV_SITE_ID) {
            self.deploy.site_id = Some(site_id);
        }
        if let Some(token) = get(ENV_ACCESS_TOKEN) {
            self.deploy.access_token = Some(token);
        }
        if let Some(output) = get(ENV_OUTPUT) {
            self.output = PathBuf::from(output);
        }
    }

    pub fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.input);
        resolve(&mut self.output);
        resolve(&mut self.cache);
        if let Some(target) = self.deploy.target.as_mut() {
            resolve(target);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == Some(0) {
            return Err(Error::Configuration("workers must be at least 1".into()));
        }
        if self.watch.interval_ms == 0 {
            return Err(Error::Configuration(
                "watch.interval_ms must be at least 1".into(),
            ));
        }
        if self.content.is_empty() {
            return Err(Error::Configuration(
                "content needs at least one glob".into(),
            ));
        }
        for pattern in &self.content {
            if let Err(e) = wax::Glob::new(pattern) {
                return Err(Error::Configuration(format!(
                    "invalid content glob '{pattern}': {e}"
                )));
            }
        }
        if self.input == self.output {
            return Err(Error::Configuration(
                "input and output must be different directories".into(),
            ));
        }

        if self.deploy.adapter != AdapterKind::None {
            if self.deploy.site_id.as_deref().is_none_or(str::is_empty) {
                return Err(Error::Configuration(format!(
                    "deploy adapter needs siteId (or {ENV_SITE_ID})"
                )));
            }
            if self.deploy.access_token.as_deref().is_none_or(str::is_empty) {
                return Err(Error::Configuration(format!(
                    "deploy adapter needs accessToken (or {ENV_ACCESS_TOKEN})"
                )));
            }
        }
        if self.deploy.adapter == AdapterKind::Directory && self.deploy.target.is_none() {
            return Err(Error::Configuration(
                "directory deploy adapter needs a target".into(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        match self.workers {
            Some(workers) => EngineConfig { workers },
            None => EngineConfig::default(),
        }
    }

    /// `(site_id, access_token)` when both are set.
    #[must_use]
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.deploy.site_id, &self.deploy.access_token) {
            (Some(id), Some(token)) => Some((id.as_str(), token.as_str())),
            _ => None,
        }
    }
}
