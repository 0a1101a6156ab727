// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! In-process UFTP daemon for tests
//!
//! Serves a small in-memory tree over a real control connection with passive
//! data channels. Every control line received is logged so tests can assert on
//! the command sequence.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use nix::sys::socket::{setsockopt, sockopt};

use crate::auth::SessionDescriptor;

const DEFAULT_MODIFY: &str = "20240101120000";

#[derive(Debug, Default)]
struct MockState {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
    mtimes: BTreeMap<String, String>,
    modes: BTreeMap<String, u32>,
    commands: Vec<String>,
    rename_reply: Option<String>,
    /// Raw lines appended to every `LIST` response
    extra_listing: Vec<String>,
    /// Bytes sent before the next download is reset
    abort_download_after: Option<usize>,
}

impl MockState {
    fn exists(&self, key: &str) -> bool {
        key.is_empty() || self.files.contains_key(key) || self.dirs.contains(key)
    }

    fn is_dir(&self, key: &str) -> bool {
        key.is_empty() || self.dirs.contains(key)
    }

    fn children(&self, dir: &str) -> Vec<(String, bool)> {
        let dirs = self.dirs.iter().map(|d| (d, true));
        let files = self.files.keys().map(|f| (f, false));
        let mut children: Vec<(String, bool)> = dirs
            .chain(files)
            .filter(|(entry, _)| parent(entry) == dir)
            .map(|(entry, is_dir)| (basename(entry).to_string(), is_dir))
            .collect();
        children.sort();
        children
    }

    fn facts(&self, key: &str) -> Option<String> {
        let modify = self.mtimes.get(key).map(String::as_str).unwrap_or(DEFAULT_MODIFY);
        let mode = self
            .modes
            .get(key)
            .map(|m| format!("UNIX.mode={:o};", m))
            .unwrap_or_default();
        let name = if key.is_empty() { "." } else { basename(key) };
        if self.is_dir(key) {
            Some(format!(" type=dir;modify={};perm=elcmp;{} {}", modify, mode, name))
        } else {
            let size = self.files.get(key)?.len();
            Some(format!(" type=file;size={};modify={};perm=rwadf;{} {}", size, modify, mode, name))
        }
    }

    fn rename(&mut self, from: &str, to: &str) {
        if let Some(data) = self.files.remove(from) {
            self.files.insert(to.to_string(), data);
        }
        if self.dirs.remove(from) {
            self.dirs.insert(to.to_string());
            let prefix = format!("{}/", from);
            let moved: Vec<String> = self
                .files
                .keys()
                .chain(self.dirs.iter())
                .filter(|k| k.starts_with(&prefix))
                .cloned()
                .collect();
            for key in moved {
                let renamed = format!("{}/{}", to, &key[prefix.len()..]);
                if let Some(data) = self.files.remove(&key) {
                    self.files.insert(renamed.clone(), data);
                }
                if self.dirs.remove(&key) {
                    self.dirs.insert(renamed);
                }
            }
        }
        if let Some(mtime) = self.mtimes.remove(from) {
            self.mtimes.insert(to.to_string(), mtime);
        }
        if let Some(mode) = self.modes.remove(from) {
            self.modes.insert(to.to_string(), mode);
        }
    }
}

/// A running mock daemon. Connections are served on background threads for
/// the rest of the process lifetime.
#[derive(Clone)]
pub struct MockDaemon {
    addr: SocketAddr,
    secret: String,
    state: Arc<Mutex<MockState>>,
}

impl MockDaemon {
    pub fn start(secret: &str) -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let daemon = Self {
            addr: listener.local_addr()?,
            secret: secret.to_string(),
            state: Arc::new(Mutex::new(MockState::default())),
        };

        let worker = daemon.clone();
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let conn = worker.clone();
                thread::spawn(move || {
                    let _ = conn.serve(stream);
                });
            }
        });
        Ok(daemon)
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn descriptor(&self) -> SessionDescriptor {
        SessionDescriptor::new(self.host(), self.port(), self.secret.clone())
    }

    pub fn add_file(&self, path: &str, contents: &[u8]) {
        self.lock().files.insert(key(path), contents.to_vec());
    }

    pub fn add_dir(&self, path: &str) {
        self.lock().dirs.insert(key(path));
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().files.get(&key(path)).cloned()
    }

    pub fn exists(&self, path: &str) -> bool {
        self.lock().exists(&key(path))
    }

    pub fn mtime(&self, path: &str) -> Option<String> {
        self.lock().mtimes.get(&key(path)).cloned()
    }

    pub fn mode(&self, path: &str) -> Option<u32> {
        self.lock().modes.get(&key(path)).copied()
    }

    /// Reply sent to every following `RNFR` instead of the normal one
    pub fn set_rename_reply(&self, reply: &str) {
        self.lock().rename_reply = Some(reply.to_string());
    }

    /// Append `line` verbatim to every following directory listing.
    pub fn append_listing_line(&self, line: &str) {
        self.lock().extra_listing.push(line.to_string());
    }

    /// Reset the data connection of the next `RETR` after `bytes` bytes and
    /// report the transfer as aborted.
    pub fn abort_next_download_after(&self, bytes: usize) {
        self.lock().abort_download_after = Some(bytes);
    }

    /// Every control line received so far, in order
    pub fn commands(&self) -> Vec<String> {
        self.lock().commands.clone()
    }

    /// Number of received commands whose verb is `verb`
    pub fn count(&self, verb: &str) -> usize {
        self.lock()
            .commands
            .iter()
            .filter(|c| c.split(' ').next().is_some_and(|v| v.eq_ignore_ascii_case(verb)))
            .count()
    }

    pub fn clear_commands(&self) {
        self.lock().commands.clear();
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn serve(&self, stream: TcpStream) -> io::Result<()> {
        let mut out = stream.try_clone()?;
        let mut input = BufReader::new(stream);
        let mut session = ConnState::default();
        send(&mut out, "220 UFTPD mock ready")?;

        loop {
            let mut line = String::new();
            if input.read_line(&mut line)? == 0 {
                return Ok(());
            }
            let line = line.trim_end_matches(['\r', '\n']).to_string();
            self.lock().commands.push(line.clone());

            let (verb, arg) = match line.split_once(' ') {
                Some((verb, arg)) => (verb.to_ascii_uppercase(), arg.to_string()),
                None => (line.to_ascii_uppercase(), String::new()),
            };

            match verb.as_str() {
                "USER" => send(&mut out, "331 Password required")?,
                "PASS" => {
                    if arg == self.secret {
                        session.authenticated = true;
                        send(&mut out, "230 Login successful")?;
                    } else {
                        send(&mut out, "530 Login incorrect")?;
                    }
                }
                "QUIT" => {
                    let _ = send(&mut out, "221 Goodbye");
                    return Ok(());
                }
                _ if !session.authenticated => send(&mut out, "530 Not logged in")?,
                "NOOP" | "TYPE" => send(&mut out, "200 OK")?,
                "PASV" => {
                    let listener = TcpListener::bind("127.0.0.1:0")?;
                    let port = listener.local_addr()?.port();
                    session.passive = Some(listener);
                    send(
                        &mut out,
                        &format!("227 Entering Passive Mode (127,0,0,1,{},{})", port >> 8, port & 0xff),
                    )?;
                }
                "REST" => match arg.parse::<u64>() {
                    Ok(offset) => {
                        session.restart = offset;
                        send(&mut out, &format!("350 Restarting at {}", offset))?;
                    }
                    Err(_) => send(&mut out, "501 Bad offset")?,
                },
                "ALLO" => {
                    session.range_start = None;
                    send(&mut out, "200 OK")?;
                }
                "RANG" => match arg.split(' ').next().and_then(|s| s.parse::<u64>().ok()) {
                    Some(start) => {
                        session.range_start = Some(start);
                        send(&mut out, "350 Range accepted")?;
                    }
                    None => send(&mut out, "501 Bad range")?,
                },
                "MLST" => {
                    let facts = self.lock().facts(&key(&arg));
                    match facts {
                        Some(facts) => {
                            send(&mut out, &format!("250-Listing {}", arg))?;
                            send(&mut out, &facts)?;
                            send(&mut out, "250 End")?;
                        }
                        None => send(&mut out, "550 No such file or directory")?,
                    }
                }
                "LIST" => self.list(&mut out, &mut session, &arg)?,
                "RETR" => self.retrieve(&mut out, &mut session, &arg)?,
                "STOR" => self.store(&mut out, &mut session, &arg)?,
                "MKD" => {
                    let k = key(&arg);
                    let mut state = self.lock();
                    if state.exists(&k) || !state.is_dir(parent(&k)) {
                        drop(state);
                        send(&mut out, "550 Cannot create directory")?;
                    } else {
                        state.dirs.insert(k);
                        drop(state);
                        send(&mut out, &format!("257 \"{}\" created", arg))?;
                    }
                }
                "RMD" => {
                    let k = key(&arg);
                    let mut state = self.lock();
                    let ok = !k.is_empty() && state.dirs.contains(&k) && state.children(&k).is_empty();
                    if ok {
                        state.dirs.remove(&k);
                    }
                    drop(state);
                    send(&mut out, if ok { "250 Directory removed" } else { "550 Cannot remove directory" })?;
                }
                "DELE" => {
                    let removed = self.lock().files.remove(&key(&arg)).is_some();
                    send(&mut out, if removed { "250 File deleted" } else { "550 No such file" })?;
                }
                "RNFR" => {
                    let k = key(&arg);
                    let (injected, exists) = {
                        let state = self.lock();
                        (state.rename_reply.clone(), state.exists(&k))
                    };
                    match injected {
                        Some(reply) => send(&mut out, &reply)?,
                        None if exists && !k.is_empty() => {
                            session.rename_from = Some(k);
                            send(&mut out, "350 Ready for RNTO")?;
                        }
                        None => send(&mut out, "550 No such file or directory")?,
                    }
                }
                "RNTO" => match session.rename_from.take() {
                    Some(from) => {
                        self.lock().rename(&from, &key(&arg));
                        send(&mut out, "250 Rename successful")?;
                    }
                    None => send(&mut out, "503 Bad sequence of commands")?,
                },
                "MFMT" => {
                    let (time, path) = arg.split_once(' ').unwrap_or((arg.as_str(), ""));
                    let k = key(path);
                    let mut state = self.lock();
                    if state.exists(&k) {
                        state.mtimes.insert(k, time.to_string());
                        drop(state);
                        send(&mut out, &format!("213 Modify={}; {}", time, path))?;
                    } else {
                        drop(state);
                        send(&mut out, "550 No such file or directory")?;
                    }
                }
                "MFF" => {
                    let parsed = arg.split_once("; ").and_then(|(facts, path)| {
                        let mode = facts.strip_prefix("UNIX.mode=")?;
                        Some((u32::from_str_radix(mode, 8).ok()?, path.to_string()))
                    });
                    let Some((mode, path)) = parsed else {
                        send(&mut out, "501 Bad MFF arguments")?;
                        continue;
                    };
                    let applied = {
                        let mut state = self.lock();
                        let k = key(&path);
                        let exists = state.exists(&k);
                        if exists {
                            state.modes.insert(k, mode);
                        }
                        exists
                    };
                    if applied {
                        send(&mut out, &format!("213 UNIX.mode={:o}; {}", mode, path))?;
                    } else {
                        send(&mut out, "550 No such file or directory")?;
                    }
                }
                _ => send(&mut out, "500 Unknown command")?,
            }
        }
    }

    fn list(&self, out: &mut TcpStream, session: &mut ConnState, arg: &str) -> io::Result<()> {
        let k = key(arg);
        let children = {
            let state = self.lock();
            if !state.is_dir(&k) {
                None
            } else {
                let mut lines: Vec<String> = state
                    .children(&k)
                    .into_iter()
                    .map(|(name, is_dir)| {
                        if is_dir {
                            format!("drwxr-xr-x 1 uftp uftp 0 Jan 01 00:00 {}/", name)
                        } else {
                            let size = state.files.get(&join(&k, &name)).map_or(0, Vec::len);
                            format!("-rw-r--r-- 1 uftp uftp {} Jan 01 00:00 {}", size, name)
                        }
                    })
                    .collect();
                lines.extend(state.extra_listing.iter().cloned());
                Some(lines)
            }
        };
        let Some(lines) = children else {
            return send(out, "550 No such directory");
        };
        let Some(mut data) = session.accept_data(out)? else {
            return Ok(());
        };
        let mut body = String::new();
        for line in lines {
            body.push_str(&line);
            body.push_str("\r\n");
        }
        let written = data.write_all(body.as_bytes());
        drop(data);
        send(out, if written.is_ok() { "226 Transfer complete" } else { "426 Transfer aborted" })
    }

    fn retrieve(&self, out: &mut TcpStream, session: &mut ConnState, arg: &str) -> io::Result<()> {
        let offset = std::mem::take(&mut session.restart) as usize;
        let Some(contents) = self.lock().files.get(&key(arg)).cloned() else {
            return send(out, "550 No such file");
        };
        let Some(mut data) = session.accept_data(out)? else {
            return Ok(());
        };
        let body = &contents[offset.min(contents.len())..];
        let abort_after = self.lock().abort_download_after.take();
        if let Some(limit) = abort_after {
            let _ = data.write_all(&body[..limit.min(body.len())]);
            reset(data);
            return send(out, "426 Connection reset; transfer aborted");
        }
        let written = data.write_all(body);
        drop(data);
        send(out, if written.is_ok() { "226 Transfer complete" } else { "426 Transfer aborted" })
    }

    fn store(&self, out: &mut TcpStream, session: &mut ConnState, arg: &str) -> io::Result<()> {
        let k = key(arg);
        let start = session.range_start.take();
        {
            let mut state = self.lock();
            if state.is_dir(&k) || !state.is_dir(parent(&k)) {
                drop(state);
                return send(out, "553 Cannot store here");
            }
            let file = state.files.entry(k.clone()).or_default();
            if start.is_none() {
                file.clear();
            }
        }
        let Some(mut data) = session.accept_data(out)? else {
            return Ok(());
        };

        let mut position = start.unwrap_or(0) as usize;
        let mut chunk = [0u8; 8192];
        let outcome = loop {
            match data.read(&mut chunk) {
                Ok(0) => break Ok(()),
                Ok(n) => {
                    let mut state = self.lock();
                    let file = state.files.entry(k.clone()).or_default();
                    if file.len() < position + n {
                        file.resize(position + n, 0);
                    }
                    file[position..position + n].copy_from_slice(&chunk[..n]);
                    position += n;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => break Err(e),
            }
        };
        drop(data);
        send(out, if outcome.is_ok() { "226 Transfer complete" } else { "426 Transfer aborted" })
    }
}

#[derive(Default)]
struct ConnState {
    authenticated: bool,
    passive: Option<TcpListener>,
    restart: u64,
    range_start: Option<u64>,
    rename_from: Option<String>,
}

impl ConnState {
    fn accept_data(&mut self, out: &mut TcpStream) -> io::Result<Option<TcpStream>> {
        let Some(listener) = self.passive.take() else {
            send(out, "425 Use PASV first")?;
            return Ok(None);
        };
        send(out, "150 Opening data connection")?;
        let (data, _) = listener.accept()?;
        Ok(Some(data))
    }
}

/// Close with a zero linger so the peer sees a reset instead of end of file.
fn reset(stream: TcpStream) {
    let linger = libc::linger {
        l_onoff: 1,
        l_linger: 0,
    };
    let _ = setsockopt(&stream, sockopt::Linger, &linger);
    drop(stream);
}

fn send(out: &mut TcpStream, line: &str) -> io::Result<()> {
    out.write_all(format!("{}\r\n", line).as_bytes())?;
    out.flush()
}

fn key(path: &str) -> String {
    let trimmed = path.trim().trim_start_matches('/');
    let trimmed = trimmed.strip_prefix("./").unwrap_or(trimmed);
    if trimmed == "." { String::new() } else { trimmed.trim_end_matches('/').to_string() }
}

fn parent(key: &str) -> &str {
    key.rsplit_once('/').map_or("", |(parent, _)| parent)
}

fn basename(key: &str) -> &str {
    key.rsplit_once('/').map_or(key, |(_, name)| name)
}

fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() { name.to_string() } else { format!("{}/{}", dir, name) }
}
