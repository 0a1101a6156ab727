// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for the UFTP client

use std::io;

use libc::{EIO, ENOENT, c_int};

/// Malformed MLST-style fact line
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FactParseError {
    #[error("fact line is missing")]
    MissingLine,
    #[error("malformed fact entry {0:?}")]
    MalformedFact(String),
    #[error("invalid value {value:?} for fact {fact}")]
    InvalidValue { fact: String, value: String },
}

/// Client error taxonomy
#[derive(thiserror::Error, Debug)]
pub enum UftpError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("cannot open session at {address}: {reason}")]
    Connect { address: String, reason: String },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("{command} rejected: {reply}")]
    Protocol { command: String, reply: String },
    #[error("data transfer failed: {0}")]
    Transfer(#[source] io::Error),
    #[error("control channel error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed reply: {0:?}")]
    MalformedReply(String),
    #[error("bad metadata: {0}")]
    Facts(#[from] FactParseError),
}

impl UftpError {
    pub(crate) fn protocol(command: impl Into<String>, reply: impl std::fmt::Display) -> Self {
        UftpError::Protocol {
            command: command.into(),
            reply: reply.to_string(),
        }
    }

    /// Nearest POSIX errno for reporting through the filesystem layer
    pub fn errno(&self) -> c_int {
        match self {
            UftpError::NotFound(_) => ENOENT,
            _ => EIO,
        }
    }
}

pub type UftpResult<T> = Result<T, UftpError>;
