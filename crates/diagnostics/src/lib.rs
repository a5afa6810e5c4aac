// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Diagnostics for siteforge
//!
//! Lightweight, configurable structured logging shared by every crate in the
//! workspace. Events go to stderr through `emit_term`.
//!
//! Usage:
//! - Set SITEFORGE_LOG=off (default) - no logs
//! - Set SITEFORGE_LOG=info - stage starts/finishes, files written, deploys
//! - Set SITEFORGE_LOG=debug - cache decisions, per-document detail

use std::sync::Once;

// Re-export emit so macros can use it
pub use emit;

/// Environment variable controlling the log level.
pub const LOG_ENV: &str = "SITEFORGE_LOG";

static INIT: Once = Once::new();

/// Parsed value of `SITEFORGE_LOG`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    /// Parse a level name. Unknown names yield `None`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "off" | "" => Some(LogLevel::Off),
            "error" => Some(LogLevel::Error),
            "warn" => Some(LogLevel::Warn),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            _ => None,
        }
    }

    fn emit_level(self) -> Option<emit::Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(emit::Level::Error),
            LogLevel::Warn => Some(emit::Level::Warn),
            LogLevel::Info => Some(emit::Level::Info),
            LogLevel::Debug => Some(emit::Level::Debug),
        }
    }
}

/// Initialize diagnostics from the SITEFORGE_LOG environment variable.
///
/// Safe to call multiple times; only the first call (of this function or
/// [`init_with_level`]) configures the runtime.
pub fn init_diagnostics() {
    let value = std::env::var(LOG_ENV).unwrap_or_else(|_| "off".to_string());
    match LogLevel::parse(&value) {
        Some(level) => init_with_level(level),
        None => {
            init_with_level(LogLevel::Info);
            // Bootstrap warning - shown regardless of the configured level
            eprintln!("Warning: Unknown {LOG_ENV} value '{value}', using 'info'");
        }
    }
}

/// Initialize diagnostics with an explicit level, ignoring the environment.
///
/// Used by the CLI's `--verbose` flag when SITEFORGE_LOG is unset.
pub fn init_with_level(level: LogLevel) {
    INIT.call_once(|| {
        let Some(min) = level.emit_level() else {
            return;
        };

        let rt = emit::setup()
            .emit_to(emit_term::stderr())
            .emit_when(emit::level::min_filter(min))
            .init();

        // The runtime must outlive every emitting thread, including tokio
        // workers that may still be logging at process exit.
        std::mem::forget(rt);
    });
}

/// Log basic operations (stage runs, files written, deploys)
pub use emit::info;

/// Log detailed diagnostics (cache decisions, per-document processing)
pub use emit::debug;

/// Log recoverable problems (stale cache, missing optional settings)
pub use emit::warn;

/// Log failures (stage errors, write failures, deploy failures)
pub use emit::error;

/// Re-export the init function for convenience
pub use init_diagnostics as init;
