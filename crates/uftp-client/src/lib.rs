// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Blocking client for UFTP file-transfer sessions.
//!
//! A session is obtained in two steps: an HTTPS handshake with an auth
//! endpoint yields the daemon address and a one-time secret
//! ([`auth::AuthClient`]), then a [`session::ProtocolSession`] logs in to the
//! daemon with that secret. Positional file I/O goes through a
//! [`cursor::FileCursor`], which owns a dedicated session.

pub mod auth;
pub mod cursor;
pub mod error;
pub mod facts;
pub mod reply;
pub mod session;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use auth::{AuthClient, AuthConfig, SessionDescriptor, authenticate};
pub use cursor::{Direction, FileCursor};
pub use error::{FactParseError, UftpError, UftpResult};
pub use facts::{DirEntry, FileKind, StatInfo};
pub use session::ProtocolSession;
