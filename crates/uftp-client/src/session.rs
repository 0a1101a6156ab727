// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Control-channel session with a UFTP daemon
//!
//! One session owns one control connection. Commands are strictly
//! request/reply; callers that share a session must serialise access to it.
//! Data channels are opened in passive mode and handed to the caller as plain
//! sockets. The completion reply of a streaming download is read lazily, right
//! before the next command goes out.

use std::collections::HashSet;
use std::io::{BufReader, Read, Write};
use std::net::{IpAddr, Shutdown, TcpStream};
use std::time::SystemTime;

use nix::unistd::{getgid, getuid};
use tracing::{debug, trace, warn};
use uftp_logging::redact;

use crate::auth::SessionDescriptor;
use crate::error::{FactParseError, UftpError, UftpResult};
use crate::facts::{DirEntry, StatInfo, format_fact_time, parse_fact_line, parse_list_line, stat_from_facts};
use crate::reply::{Reply, read_reply};

/// Login name used with one-time secrets
pub const ANONYMOUS_USER: &str = "anonymous";

/// Size announced for uploads whose final length is unknown
pub const UNBOUNDED_TRANSFER_SIZE: u64 = i64::MAX as u64;

/// Map an absolute mount path onto a path relative to the session base
/// directory.
pub fn remote_path(path: &str) -> &str {
    let trimmed = path.trim_start_matches('/');
    if trimmed.is_empty() { "." } else { trimmed }
}

pub struct ProtocolSession {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    address: String,
    peer: IpAddr,
    uid: u32,
    gid: u32,
    pending_completion: bool,
    closed: bool,
}

impl ProtocolSession {
    /// Connect to `host:port` and log in with `secret`.
    pub fn connect(host: &str, port: u16, secret: &str) -> UftpResult<Self> {
        let address = format!("{}:{}", host, port);
        let fail = |reason: String| UftpError::Connect {
            address: address.clone(),
            reason,
        };

        let stream = TcpStream::connect((host, port)).map_err(|e| fail(e.to_string()))?;
        let _ = stream.set_nodelay(true);
        let peer = stream.peer_addr().map_err(|e| fail(e.to_string()))?.ip();
        let writer = stream.try_clone().map_err(|e| fail(e.to_string()))?;

        let mut session = Self {
            reader: BufReader::new(stream),
            writer,
            address: address.clone(),
            peer,
            uid: getuid().as_raw(),
            gid: getgid().as_raw(),
            pending_completion: false,
            closed: false,
        };

        let greeting = session.read_reply().map_err(|e| fail(e.to_string()))?;
        if !greeting.is_success() {
            return Err(fail(format!("unexpected greeting: {}", greeting)));
        }

        session.login(secret).map_err(|e| match e {
            UftpError::Protocol { reply, .. } => fail(format!("login rejected: {}", reply)),
            other => fail(other.to_string()),
        })?;

        debug!(
            target: "uftp::session",
            address = %session.address,
            secret = %redact(secret),
            "session established"
        );
        Ok(session)
    }

    /// Connect using a descriptor obtained from the auth handshake.
    pub fn open(descriptor: &SessionDescriptor) -> UftpResult<Self> {
        Self::connect(&descriptor.host, descriptor.port, &descriptor.secret)
    }

    fn login(&mut self, secret: &str) -> UftpResult<()> {
        let mut reply = self.command(&format!("USER {}", ANONYMOUS_USER))?;
        if reply.code == 331 {
            self.send_line(&format!("PASS {}", secret), "PASS [REDACTED]")?;
            reply = self.read_reply()?;
        }
        if reply.is_success() {
            Ok(())
        } else {
            Err(UftpError::protocol("login", reply))
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Metadata of exactly one path.
    pub fn stat(&mut self, path: &str) -> UftpResult<StatInfo> {
        let reply = self.command(&format!("MLST {}", remote_path(path)))?;
        if reply.code != 250 {
            debug!(target: "uftp::session", path, reply = %reply, "stat failed");
            return Err(UftpError::NotFound(path.to_string()));
        }
        let line = reply.lines.get(1).ok_or(FactParseError::MissingLine)?;
        let facts = parse_fact_line(line)?;
        Ok(stat_from_facts(&facts, self.uid, self.gid)?)
    }

    /// Directory listing; `.`, `..` and repeated names are dropped.
    pub fn list(&mut self, path: &str) -> UftpResult<Vec<DirEntry>> {
        let mut data = self.open_data_connection(&format!("LIST {}", remote_path(path)), None)?;
        let mut raw = Vec::new();
        let received = data.read_to_end(&mut raw);
        drop(data);
        received.map_err(UftpError::Transfer)?;
        self.finish_transfer()?;

        let mut seen = HashSet::new();
        let entries: Vec<DirEntry> = String::from_utf8_lossy(&raw)
            .lines()
            .filter_map(parse_list_line)
            .filter(|entry| seen.insert(entry.name.clone()))
            .collect();
        trace!(target: "uftp::session", path, entries = entries.len(), "listed directory");
        Ok(entries)
    }

    pub fn mkdir(&mut self, path: &str) -> UftpResult<()> {
        self.expect_success(&format!("MKD {}", remote_path(path))).map(drop)
    }

    pub fn rmdir(&mut self, path: &str) -> UftpResult<()> {
        self.expect_success(&format!("RMD {}", remote_path(path))).map(drop)
    }

    pub fn delete(&mut self, path: &str) -> UftpResult<()> {
        self.expect_success(&format!("DELE {}", remote_path(path))).map(drop)
    }

    /// `RNFR` must be answered with 350 before `RNTO` is sent.
    pub fn rename(&mut self, source: &str, target: &str) -> UftpResult<()> {
        let rnfr = format!("RNFR {}", remote_path(source));
        let reply = self.command(&rnfr)?;
        if reply.code != 350 {
            return Err(UftpError::protocol(rnfr, reply));
        }
        self.expect_success(&format!("RNTO {}", remote_path(target))).map(drop)
    }

    pub fn set_mtime(&mut self, path: &str, time: SystemTime) -> UftpResult<()> {
        let command = format!("MFMT {} {}", format_fact_time(time), remote_path(path));
        self.expect_code(&command, 213)
    }

    /// Non-standard `MFF` command carrying the permission bits in octal.
    pub fn set_mode(&mut self, path: &str, mode: u32) -> UftpResult<()> {
        let command = format!("MFF UNIX.mode={:o}; {}", mode & 0o7777, remote_path(path));
        self.expect_code(&command, 213)
    }

    /// Data socket for an upload starting at `offset`.
    pub fn open_write_socket(&mut self, path: &str, offset: u64) -> UftpResult<TcpStream> {
        let announce = if offset == 0 {
            format!("ALLO {}", UNBOUNDED_TRANSFER_SIZE)
        } else {
            format!("RANG {} {}", offset, UNBOUNDED_TRANSFER_SIZE)
        };
        let reply = self.command(&announce)?;
        if !(reply.is_success() || reply.is_intermediate()) {
            return Err(UftpError::protocol(announce, reply));
        }
        self.open_data_connection(&format!("STOR {}", remote_path(path)), None)
    }

    /// Data socket for a download starting at `offset`.
    pub fn open_read_socket(&mut self, path: &str, offset: u64) -> UftpResult<TcpStream> {
        self.open_data_connection(&format!("RETR {}", remote_path(path)), Some(offset))
    }

    /// Read the completion reply of the last transfer, failing unless the
    /// daemon reports success. A no-op when nothing is pending.
    pub fn finish_transfer(&mut self) -> UftpResult<()> {
        if !self.pending_completion {
            return Ok(());
        }
        self.pending_completion = false;
        let reply = self.read_reply()?;
        if reply.is_success() {
            Ok(())
        } else {
            Err(UftpError::protocol("transfer", reply))
        }
    }

    /// Close the control connection. Safe to call more than once.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = self.writer.write_all(b"QUIT\r\n");
        let _ = self.writer.shutdown(Shutdown::Both);
        debug!(target: "uftp::session", address = %self.address, "session closed");
    }

    fn open_data_connection(&mut self, command: &str, restart: Option<u64>) -> UftpResult<TcpStream> {
        let port = self.passive_port()?;
        let data = TcpStream::connect((self.peer, port)).map_err(UftpError::Transfer)?;

        if let Some(offset) = restart {
            let rest = format!("REST {}", offset);
            let reply = self.command(&rest)?;
            if !reply.is_intermediate() {
                return Err(UftpError::protocol(rest, reply));
            }
        }

        let mut reply = self.command(command)?;
        if reply.is_success() {
            reply = self.read_reply()?;
        }
        if !reply.is_preliminary() {
            return Err(UftpError::protocol(command, reply));
        }
        self.pending_completion = true;
        trace!(target: "uftp::session", command, port, "data channel open");
        Ok(data)
    }

    fn passive_port(&mut self) -> UftpResult<u16> {
        let (command, expected) = if self.peer.is_ipv6() { ("EPSV", 229) } else { ("PASV", 227) };
        let reply = self.command(command)?;
        if reply.code != expected {
            return Err(UftpError::protocol(command, reply));
        }
        let text = reply.lines.first().map(String::as_str).unwrap_or("");
        let port = if expected == 229 { parse_epsv_port(text) } else { parse_pasv_port(text) };
        port.ok_or_else(|| UftpError::MalformedReply(text.to_string()))
    }

    fn expect_success(&mut self, command: &str) -> UftpResult<Reply> {
        let reply = self.command(command)?;
        if reply.is_success() {
            Ok(reply)
        } else {
            Err(UftpError::protocol(command, reply))
        }
    }

    fn expect_code(&mut self, command: &str, code: u16) -> UftpResult<()> {
        let reply = self.command(command)?;
        if reply.code == code {
            Ok(())
        } else {
            Err(UftpError::protocol(command, reply))
        }
    }

    fn command(&mut self, command: &str) -> UftpResult<Reply> {
        self.drain_completion()?;
        self.send_line(command, command)?;
        self.read_reply()
    }

    fn drain_completion(&mut self) -> UftpResult<()> {
        if self.pending_completion {
            self.pending_completion = false;
            let reply = self.read_reply()?;
            if !reply.is_success() {
                debug!(target: "uftp::session", reply = %reply, "transfer ended early");
            }
        }
        Ok(())
    }

    fn send_line(&mut self, line: &str, shown: &str) -> UftpResult<()> {
        if self.closed {
            return Err(UftpError::Io(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "session closed",
            )));
        }
        trace!(target: "uftp::session", command = shown, "send");
        self.writer.write_all(format!("{}\r\n", line).as_bytes())?;
        self.writer.flush()?;
        Ok(())
    }

    fn read_reply(&mut self) -> UftpResult<Reply> {
        let reply = read_reply(&mut self.reader);
        if let Err(err) = &reply {
            warn!(target: "uftp::session", address = %self.address, error = %err, "control channel failure");
        }
        reply
    }
}

impl Drop for ProtocolSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Port from `227 Entering Passive Mode (h1,h2,h3,h4,p1,p2)`.
pub fn parse_pasv_port(text: &str) -> Option<u16> {
    let start = match text.find('(') {
        Some(idx) => idx + 1,
        None => text.get(4..).and_then(|rest| rest.find(|c: char| c.is_ascii_digit()))? + 4,
    };
    let inner = &text[start..];
    let inner = &inner[..inner.find(')').unwrap_or(inner.len())];
    let numbers = inner
        .split(',')
        .map(|n| n.trim().parse::<u8>())
        .collect::<Result<Vec<_>, _>>()
        .ok()?;
    match numbers.as_slice() {
        [_, _, _, _, hi, lo] => Some(u16::from(*hi) << 8 | u16::from(*lo)),
        _ => None,
    }
}

/// Port from `229 Entering Extended Passive Mode (|||port|)`.
pub fn parse_epsv_port(text: &str) -> Option<u16> {
    let start = text.find('(')? + 1;
    let inner = &text[start..text[start..].find(')')? + start];
    let delimiter = inner.chars().next()?;
    inner.split(delimiter).nth(3)?.parse().ok()
}
