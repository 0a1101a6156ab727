// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Mount a UFTP session as a local filesystem.
//!
//! [`fs::UftpFs`] implements the path-based operation table on top of
//! `uftp-client`; the `adapter` module (Linux, feature `fuse`) exposes it to
//! the kernel through `fuser`.

#[cfg(all(feature = "fuse", target_os = "linux"))]
pub mod adapter;
pub mod config;
pub mod fs;
pub mod mount;
pub mod target;

pub use config::{MountConfig, load_config};
pub use fs::{Errno, FsResult, PathFilesystem, UftpFs};
pub use mount::{Credentials, establish_session, validate_session};
pub use target::MountTarget;
