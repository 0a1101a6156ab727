// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Mount configuration

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use uftp_logging::CliLoggingArgs;

/// Default size of a single kernel read or write request
pub const DEFAULT_IO_SIZE: u32 = 131072;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MountConfig {
    /// Filesystem name shown in the mount table
    pub fs_name: String,
    /// Attribute cache lifetime; 0 asks the kernel for fresh metadata every time
    pub attr_ttl_ms: u64,
    pub entry_ttl_ms: u64,
    pub max_read: u32,
    pub max_write: u32,
    pub allow_other: bool,
    pub auto_unmount: bool,
    /// Implement chmod through the non-standard `MFF UNIX.mode` command
    pub chmod_via_mode_command: bool,
    /// Logging defaults; command-line flags take precedence
    pub logging: CliLoggingArgs,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            fs_name: "uftp".to_string(),
            attr_ttl_ms: 0,
            entry_ttl_ms: 0,
            max_read: DEFAULT_IO_SIZE,
            max_write: DEFAULT_IO_SIZE,
            allow_other: false,
            auto_unmount: false,
            chmod_via_mode_command: true,
            logging: CliLoggingArgs::default(),
        }
    }
}

impl MountConfig {
    pub fn attr_ttl(&self) -> Duration {
        Duration::from_millis(self.attr_ttl_ms)
    }

    pub fn entry_ttl(&self) -> Duration {
        Duration::from_millis(self.entry_ttl_ms)
    }
}

/// Load a JSON configuration file, or the defaults when no path is given.
pub fn load_config(config_path: Option<&Path>) -> Result<MountConfig> {
    match config_path {
        Some(path) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            let config: MountConfig = serde_json::from_str(&content)
                .with_context(|| format!("parsing config file {}", path.display()))?;
            Ok(config)
        }
        None => Ok(MountConfig::default()),
    }
}
