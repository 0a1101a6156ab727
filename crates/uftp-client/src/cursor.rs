// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Positional reads and writes on one remote file
//!
//! A cursor owns a private session and at most one data stream. The stream is
//! kept open across calls as long as they continue exactly where the previous
//! one stopped in the same direction; anything else reopens it at the
//! requested offset.

use std::io::{self, BufReader, BufWriter, Read, Write};
use std::net::TcpStream;

use tracing::{debug, trace, warn};

use crate::error::{UftpError, UftpResult};
use crate::session::ProtocolSession;

/// Buffer size of the data stream in either direction
pub const DATA_BUFFER_SIZE: usize = 65536;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Unset,
    Read,
    Write,
}

enum DataStream {
    Reader(BufReader<TcpStream>),
    Writer(BufWriter<TcpStream>),
}

pub struct FileCursor {
    path: String,
    position: u64,
    direction: Direction,
    // Declared before `session` so the data socket goes away first on drop.
    data: Option<DataStream>,
    session: ProtocolSession,
    channels_opened: u64,
}

impl FileCursor {
    pub fn new(session: ProtocolSession, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            position: 0,
            direction: Direction::Unset,
            data: None,
            session,
            channels_opened: 0,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Number of data streams opened so far
    pub fn channels_opened(&self) -> u64 {
        self.channels_opened
    }

    /// Read up to `size` bytes at `offset`. Fewer bytes mean end of file.
    pub fn read(&mut self, offset: u64, size: usize) -> UftpResult<Vec<u8>> {
        let result = match self.stream(offset, Direction::Read)? {
            DataStream::Reader(reader) => read_up_to(reader, size),
            DataStream::Writer(_) => Err(wrong_direction()),
        };
        match result {
            Ok(buf) => {
                self.position += buf.len() as u64;
                trace!(target: "uftp::cursor", path = %self.path, offset, len = buf.len(), "read");
                Ok(buf)
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Write all of `data` at `offset` and flush it onto the socket.
    pub fn write(&mut self, offset: u64, data: &[u8]) -> UftpResult<usize> {
        let result = match self.stream(offset, Direction::Write)? {
            DataStream::Writer(writer) => write_fully(writer, data),
            DataStream::Reader(_) => Err(wrong_direction()),
        };
        match result {
            Ok(()) => {
                self.position += data.len() as u64;
                trace!(target: "uftp::cursor", path = %self.path, offset, len = data.len(), "wrote");
                Ok(data.len())
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Close the data stream and the session. An upload that the daemon did
    /// not confirm is reported as an error.
    pub fn close(&mut self) -> UftpResult<()> {
        let finished = self.close_data();
        self.session.close();
        finished
    }

    fn stream(&mut self, offset: u64, direction: Direction) -> UftpResult<&mut DataStream> {
        let reusable = self.data.is_some() && self.direction == direction && self.position == offset;
        if !reusable {
            if let Err(err) = self.close_data() {
                warn!(target: "uftp::cursor", path = %self.path, error = %err, "previous upload not confirmed");
            }
            let socket = match direction {
                Direction::Write => self.session.open_write_socket(&self.path, offset)?,
                _ => self.session.open_read_socket(&self.path, offset)?,
            };
            self.data = Some(match direction {
                Direction::Write => DataStream::Writer(BufWriter::with_capacity(DATA_BUFFER_SIZE, socket)),
                _ => DataStream::Reader(BufReader::with_capacity(DATA_BUFFER_SIZE, socket)),
            });
            self.direction = direction;
            self.position = offset;
            self.channels_opened += 1;
            debug!(target: "uftp::cursor", path = %self.path, offset, ?direction, "data stream opened");
        }
        self.data
            .as_mut()
            .ok_or_else(|| UftpError::Transfer(io::Error::new(io::ErrorKind::NotConnected, "no data stream")))
    }

    fn close_data(&mut self) -> UftpResult<()> {
        match self.data.take() {
            Some(DataStream::Writer(mut writer)) => {
                let flushed = writer.flush();
                drop(writer);
                flushed.map_err(UftpError::Transfer)?;
                self.session.finish_transfer()
            }
            Some(DataStream::Reader(reader)) => {
                drop(reader);
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn fail(&mut self, err: io::Error) -> UftpError {
        debug!(target: "uftp::cursor", path = %self.path, error = %err, "dropping data stream");
        // The socket is unusable now; its completion reply is drained lazily.
        self.data = None;
        UftpError::Transfer(err)
    }
}

impl Drop for FileCursor {
    fn drop(&mut self) {
        self.data = None;
    }
}

fn read_up_to<R: Read>(reader: &mut R, size: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0; size];
    let mut filled = 0;
    while filled < size {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    buf.truncate(filled);
    Ok(buf)
}

fn write_fully<W: Write>(writer: &mut W, data: &[u8]) -> io::Result<()> {
    let mut written = 0;
    while written < data.len() {
        match writer.write(&data[written..]) {
            Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero)),
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    writer.flush()
}

fn wrong_direction() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, "data stream open in the other direction")
}
