// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! # Sitegen: the web pipeline of siteforge
//!
//! Turns a directory of Markdown pages and assets into a static site:
//! pages are read, split into front matter and body, rendered with
//! pulldown-cmark and wrapped in a Maud layout; assets are copied verbatim.
//! [`Site`] drives a build end to end and optionally hands the result to a
//! deploy adapter.
//!
//! ## Usage
//!
//! ```bash
//! siteforge run --config site.yaml --clean
//! ```

mod config;
mod deploy;
mod layouts;
pub mod markdown;
mod reader;
mod site;
pub mod web;

pub use config::{
    AdapterKind, DEFAULT_CONFIG, DeployConfig, ENV_ACCESS_TOKEN, ENV_OUTPUT, ENV_SITE_ID,
    SiteConfig, SiteMeta, WatchConfig,
};
pub use deploy::{DeployManifest, DirectoryDeploy, MANIFEST, adapter_for};
pub use reader::{ReadFiles, ReadKind, discover, snapshot};
pub use site::{BuildOptions, BuildOutcome, Site};
