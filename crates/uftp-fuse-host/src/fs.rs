// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Path-based filesystem operations over UFTP sessions
//!
//! Metadata and namespace operations run on a short-lived session each. Every
//! open file gets a dedicated session wrapped in a [`FileCursor`], since one
//! control connection cannot interleave commands for different files.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

use libc::{EBADF, EIO, ENOSYS, O_ACCMODE, O_RDWR, O_WRONLY, c_int};
use tracing::{debug, info, warn};
use uftp_client::{FileCursor, FileKind, ProtocolSession, SessionDescriptor, StatInfo, UftpError, UftpResult};

use crate::config::MountConfig;

/// POSIX error number reported back to the kernel
pub type Errno = c_int;

pub type FsResult<T> = Result<T, Errno>;

/// One method per filesystem callback, addressed by absolute path.
///
/// Methods take `&self`; implementations serialise work on a single handle
/// themselves. Operations without a meaningful remote counterpart default to
/// `ENOSYS`.
pub trait PathFilesystem: Send + Sync {
    fn getattr(&self, path: &str) -> FsResult<StatInfo>;

    /// Entry names and kinds, starting with `.` and `..`
    fn readdir(&self, path: &str) -> FsResult<Vec<(String, FileKind)>>;

    fn open(&self, path: &str, flags: i32) -> FsResult<u64>;

    fn create(&self, path: &str, mode: u32) -> FsResult<u64>;

    fn read(&self, path: &str, size: usize, offset: u64, fh: u64) -> FsResult<Vec<u8>>;

    fn write(&self, path: &str, data: &[u8], offset: u64, fh: u64) -> FsResult<usize>;

    fn release(&self, path: &str, fh: u64) -> FsResult<()>;

    fn mkdir(&self, path: &str, mode: u32) -> FsResult<()>;

    fn rmdir(&self, path: &str) -> FsResult<()>;

    fn unlink(&self, path: &str) -> FsResult<()>;

    fn rename(&self, old: &str, new: &str) -> FsResult<()>;

    /// `times` is `(atime, mtime)`; `None` means "now".
    fn utimens(&self, path: &str, times: Option<(SystemTime, SystemTime)>) -> FsResult<()>;

    fn chmod(&self, _path: &str, _mode: u32) -> FsResult<()> {
        Err(ENOSYS)
    }

    fn chown(&self, _path: &str, _uid: Option<u32>, _gid: Option<u32>) -> FsResult<()> {
        Err(ENOSYS)
    }

    fn symlink(&self, _target: &str, _link: &str) -> FsResult<()> {
        Err(ENOSYS)
    }

    fn readlink(&self, _path: &str) -> FsResult<String> {
        Err(ENOSYS)
    }

    fn truncate(&self, _path: &str, _size: u64) -> FsResult<()> {
        Err(ENOSYS)
    }

    /// Unmount teardown
    fn destroy(&self) {}
}

struct HandleTable {
    next_fh: u64,
    cursors: HashMap<u64, Arc<Mutex<FileCursor>>>,
}

/// UFTP-backed implementation of [`PathFilesystem`]
pub struct UftpFs {
    descriptor: SessionDescriptor,
    config: MountConfig,
    handles: Mutex<HandleTable>,
}

impl UftpFs {
    pub fn new(descriptor: SessionDescriptor, config: MountConfig) -> Self {
        Self {
            descriptor,
            config,
            handles: Mutex::new(HandleTable {
                next_fh: 1,
                cursors: HashMap::new(),
            }),
        }
    }

    pub fn config(&self) -> &MountConfig {
        &self.config
    }

    /// Number of currently open handles
    pub fn open_handles(&self) -> usize {
        self.table().cursors.len()
    }

    fn table(&self) -> MutexGuard<'_, HandleTable> {
        self.handles.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn connect(&self) -> UftpResult<ProtocolSession> {
        ProtocolSession::open(&self.descriptor)
    }

    /// Run one command on a fresh session and close it again.
    fn ad_hoc<T>(
        &self,
        op: &'static str,
        path: &str,
        f: impl FnOnce(&mut ProtocolSession) -> UftpResult<T>,
    ) -> FsResult<T> {
        let mut session = self.connect().map_err(|e| fail(op, path, e))?;
        let result = f(&mut session);
        session.close();
        result.map_err(|e| fail(op, path, e))
    }

    fn cursor(&self, fh: u64) -> FsResult<Arc<Mutex<FileCursor>>> {
        self.table().cursors.get(&fh).cloned().ok_or(EBADF)
    }

    fn insert(&self, cursor: FileCursor) -> u64 {
        let mut table = self.table();
        let fh = table.next_fh;
        table.next_fh += 1;
        table.cursors.insert(fh, Arc::new(Mutex::new(cursor)));
        fh
    }
}

impl PathFilesystem for UftpFs {
    fn getattr(&self, path: &str) -> FsResult<StatInfo> {
        self.ad_hoc("getattr", path, |s| s.stat(path))
    }

    fn readdir(&self, path: &str) -> FsResult<Vec<(String, FileKind)>> {
        let entries = self.ad_hoc("readdir", path, |s| s.list(path))?;
        let mut listing = Vec::with_capacity(entries.len() + 2);
        listing.push((".".to_string(), FileKind::Directory));
        listing.push(("..".to_string(), FileKind::Directory));
        listing.extend(entries.into_iter().map(|e| (e.name, e.kind)));
        Ok(listing)
    }

    fn open(&self, path: &str, flags: i32) -> FsResult<u64> {
        if flags & O_ACCMODE == O_RDWR {
            debug!(target: "uftp::fs", path, "read-write open rejected");
            return Err(EIO);
        }
        let session = self.connect().map_err(|e| fail("open", path, e))?;
        let fh = self.insert(FileCursor::new(session, path));
        debug!(target: "uftp::fs", path, fh, "opened");
        Ok(fh)
    }

    fn create(&self, path: &str, mode: u32) -> FsResult<u64> {
        let fh = self.open(path, O_WRONLY)?;
        if let Err(errno) = self.write(path, &[], 0, fh) {
            let _ = self.release(path, fh);
            return Err(errno);
        }
        debug!(target: "uftp::fs", path, fh, mode = %format!("{:o}", mode), "created");
        Ok(fh)
    }

    fn read(&self, path: &str, size: usize, offset: u64, fh: u64) -> FsResult<Vec<u8>> {
        let cursor = self.cursor(fh)?;
        let mut cursor = cursor.lock().unwrap_or_else(|p| p.into_inner());
        cursor.read(offset, size).map_err(|e| fail("read", path, e))
    }

    fn write(&self, path: &str, data: &[u8], offset: u64, fh: u64) -> FsResult<usize> {
        let cursor = self.cursor(fh)?;
        let mut cursor = cursor.lock().unwrap_or_else(|p| p.into_inner());
        cursor.write(offset, data).map_err(|e| fail("write", path, e))
    }

    fn release(&self, path: &str, fh: u64) -> FsResult<()> {
        let cursor = self.table().cursors.remove(&fh).ok_or(EBADF)?;
        let mut cursor = cursor.lock().unwrap_or_else(|p| p.into_inner());
        debug!(target: "uftp::fs", path, fh, "released");
        cursor.close().map_err(|e| fail("release", path, e))
    }

    fn mkdir(&self, path: &str, _mode: u32) -> FsResult<()> {
        self.ad_hoc("mkdir", path, |s| s.mkdir(path))
    }

    fn rmdir(&self, path: &str) -> FsResult<()> {
        self.ad_hoc("rmdir", path, |s| s.rmdir(path))
    }

    fn unlink(&self, path: &str) -> FsResult<()> {
        self.ad_hoc("unlink", path, |s| s.delete(path))
    }

    fn rename(&self, old: &str, new: &str) -> FsResult<()> {
        self.ad_hoc("rename", old, |s| s.rename(old, new))
    }

    fn utimens(&self, path: &str, times: Option<(SystemTime, SystemTime)>) -> FsResult<()> {
        let mtime = times.map_or_else(SystemTime::now, |(_, mtime)| mtime);
        self.ad_hoc("utimens", path, |s| s.set_mtime(path, mtime))
    }

    fn chmod(&self, path: &str, mode: u32) -> FsResult<()> {
        if !self.config.chmod_via_mode_command {
            return Err(ENOSYS);
        }
        self.ad_hoc("chmod", path, |s| s.set_mode(path, mode))
    }

    fn destroy(&self) {
        let cursors: Vec<_> = self.table().cursors.drain().collect();
        if !cursors.is_empty() {
            info!(target: "uftp::fs", open = cursors.len(), "closing handles left open at unmount");
        }
        for (fh, cursor) in cursors {
            let mut cursor = cursor.lock().unwrap_or_else(|p| p.into_inner());
            if let Err(err) = cursor.close() {
                warn!(target: "uftp::fs", fh, path = cursor.path(), error = %err, "close failed");
            }
        }
    }
}

fn fail(op: &'static str, path: &str, err: UftpError) -> Errno {
    match &err {
        UftpError::NotFound(_) => debug!(target: "uftp::fs", op, path, "not found"),
        _ => warn!(target: "uftp::fs", op, path, error = %err, "operation failed"),
    }
    err.errno()
}
