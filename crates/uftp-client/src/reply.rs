// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Control channel replies
//!
//! A reply is either a single `NNN text` line or a multi-line block opened by
//! `NNN-text` and closed by the first line that starts with `NNN ` again.

use std::fmt;
use std::io::{self, BufRead};

use crate::error::{UftpError, UftpResult};

/// One complete reply read from the control channel
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    /// Raw reply lines without line terminators
    pub lines: Vec<String>,
}

impl Reply {
    /// First digit of the status code
    pub fn class(&self) -> u16 {
        self.code / 100
    }

    pub fn is_preliminary(&self) -> bool {
        self.class() == 1
    }

    pub fn is_success(&self) -> bool {
        self.class() == 2
    }

    pub fn is_intermediate(&self) -> bool {
        self.class() == 3
    }

    /// Text of the first line after the status code
    pub fn message(&self) -> &str {
        self.lines.first().and_then(|line| line.get(4..)).unwrap_or("").trim()
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.message())
    }
}

/// Read one reply, following multi-line continuations.
pub fn read_reply<R: BufRead>(reader: &mut R) -> UftpResult<Reply> {
    let first = read_line(reader)?;
    let (code, multiline) = parse_status(&first)?;
    let mut lines = vec![first];

    if multiline {
        let terminator = format!("{:03} ", code);
        loop {
            let line = read_line(reader)?;
            let done = line.starts_with(&terminator) || line == terminator.trim_end();
            lines.push(line);
            if done {
                break;
            }
        }
    }

    Ok(Reply { code, lines })
}

fn read_line<R: BufRead>(reader: &mut R) -> UftpResult<String> {
    let mut buf = String::new();
    if reader.read_line(&mut buf)? == 0 {
        return Err(UftpError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "control connection closed by server",
        )));
    }
    let trimmed = buf.trim_end_matches(['\r', '\n']).len();
    buf.truncate(trimmed);
    Ok(buf)
}

fn parse_status(line: &str) -> UftpResult<(u16, bool)> {
    let digits = line.get(..3).filter(|d| d.bytes().all(|b| b.is_ascii_digit()));
    let code = match digits.and_then(|d| d.parse::<u16>().ok()) {
        Some(code) => code,
        None => return Err(UftpError::MalformedReply(line.to_string())),
    };
    match line.as_bytes().get(3) {
        None | Some(b' ') => Ok((code, false)),
        Some(b'-') => Ok((code, true)),
        Some(_) => Err(UftpError::MalformedReply(line.to_string())),
    }
}
