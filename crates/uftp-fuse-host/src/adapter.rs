// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! FUSE adapter
//!
//! Maps inode-based FUSE requests onto a path-based [`PathFilesystem`].

#[cfg(not(all(feature = "fuse", target_os = "linux")))]
compile_error!("This module requires the 'fuse' feature on Linux");

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::Path;
use std::time::{Duration, SystemTime};

use fuser::{
    FUSE_ROOT_ID, FileAttr, FileType, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, ReplyWrite, Request, TimeOrNow,
};
use libc::{EINVAL, ENAMETOOLONG, ENOENT, c_int};
use tracing::{debug, info, warn};
use uftp_client::{FileKind, StatInfo};

use crate::config::MountConfig;
use crate::fs::PathFilesystem;

/// Maximum single path component length
const NAME_MAX: usize = 255;

const BLOCK_SIZE: u32 = 512;

/// FUSE filesystem over any [`PathFilesystem`]
pub struct UftpFuse<F: PathFilesystem> {
    fs: F,
    config: MountConfig,
    attr_ttl: Duration,
    entry_ttl: Duration,
    /// inode -> absolute path
    inodes: HashMap<u64, String>,
    /// absolute path -> inode
    paths: HashMap<String, u64>,
    next_inode: u64,
}

impl<F: PathFilesystem> UftpFuse<F> {
    pub fn new(fs: F, config: MountConfig) -> Self {
        let mut inodes = HashMap::new();
        let mut paths = HashMap::new();
        inodes.insert(FUSE_ROOT_ID, "/".to_string());
        paths.insert("/".to_string(), FUSE_ROOT_ID);

        Self {
            fs,
            attr_ttl: config.attr_ttl(),
            entry_ttl: config.entry_ttl(),
            config,
            inodes,
            paths,
            next_inode: FUSE_ROOT_ID + 1,
        }
    }

    fn inode_to_path(&self, ino: u64) -> Option<&str> {
        self.inodes.get(&ino).map(String::as_str)
    }

    fn path_of(&self, ino: u64) -> Result<String, c_int> {
        self.inode_to_path(ino).map(str::to_string).ok_or(ENOENT)
    }

    fn child_path(&self, parent: u64, name: &OsStr) -> Result<String, c_int> {
        let name = name.to_str().ok_or(EINVAL)?;
        if name.len() > NAME_MAX {
            return Err(ENAMETOOLONG);
        }
        let parent = self.inode_to_path(parent).ok_or(ENOENT)?;
        Ok(join(parent, name))
    }

    fn get_or_alloc_inode(&mut self, path: &str) -> u64 {
        if let Some(&inode) = self.paths.get(path) {
            return inode;
        }
        let inode = self.next_inode;
        self.next_inode += 1;
        self.record_path_for_inode(path.to_string(), inode);
        inode
    }

    fn record_path_for_inode(&mut self, path: String, inode: u64) {
        self.paths.insert(path.clone(), inode);
        self.inodes.insert(inode, path);
    }

    fn remove_path_mapping(&mut self, path: &str) -> Option<u64> {
        let inode = self.paths.remove(path)?;
        self.inodes.remove(&inode);
        Some(inode)
    }

    /// Move the mapping of `old` and everything below it to `new`.
    fn rename_path_mapping(&mut self, old: &str, new: &str) {
        self.remove_path_mapping(new);
        let prefix = format!("{}/", old.trim_end_matches('/'));
        let moved: Vec<(String, u64)> = self
            .paths
            .iter()
            .filter(|(path, _)| path.as_str() == old || path.starts_with(&prefix))
            .map(|(path, &ino)| (path.clone(), ino))
            .collect();
        for (path, ino) in moved {
            self.paths.remove(&path);
            let renamed = format!("{}{}", new, &path[old.len()..]);
            self.record_path_for_inode(renamed, ino);
        }
    }

    fn forget_inode(&mut self, inode: u64) {
        if inode == FUSE_ROOT_ID {
            return;
        }
        if let Some(path) = self.inodes.remove(&inode) {
            self.paths.remove(&path);
        }
    }

    fn stat_to_file_attr(&self, stat: &StatInfo, ino: u64) -> FileAttr {
        let nlink = if stat.is_dir() { 2 } else { 1 };
        let kind = file_type(stat.kind);
        FileAttr {
            ino,
            size: stat.size,
            blocks: stat.size.div_ceil(BLOCK_SIZE as u64),
            atime: stat.atime,
            mtime: stat.mtime,
            ctime: stat.mtime,
            crtime: stat.mtime,
            kind,
            perm: stat.permissions() as u16,
            nlink,
            uid: stat.uid,
            gid: stat.gid,
            rdev: 0,
            blksize: BLOCK_SIZE,
            flags: 0,
        }
    }

    /// Stat `path` and return its attributes under a (possibly new) inode.
    fn entry_attr(&mut self, path: &str) -> Result<FileAttr, c_int> {
        let stat = self.fs.getattr(path)?;
        let ino = self.get_or_alloc_inode(path);
        Ok(self.stat_to_file_attr(&stat, ino))
    }

    /// Listing of `path` as `(inode, type, name)`, `.` and `..` first.
    fn directory_entries(&mut self, ino: u64, path: &str) -> Result<Vec<(u64, FileType, String)>, c_int> {
        let listing = self.fs.readdir(path)?;
        let parent_path = parent_of(path).to_string();
        Ok(listing
            .into_iter()
            .map(|(name, kind)| {
                let entry_ino = match name.as_str() {
                    "." => ino,
                    ".." => self.get_or_alloc_inode(&parent_path),
                    _ => self.get_or_alloc_inode(&join(path, &name)),
                };
                (entry_ino, file_type(kind), name)
            })
            .collect())
    }

    /// Plain rename only; `RENAME_NOREPLACE` and `RENAME_EXCHANGE` have no
    /// remote counterpart.
    fn rename_entry(
        &mut self,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        flags: u32,
    ) -> Result<(), c_int> {
        if flags != 0 {
            debug!(target: "uftp::fuse", flags, "rename flags not supported");
            return Err(EINVAL);
        }
        let old = self.child_path(parent, name)?;
        let new = self.child_path(newparent, newname)?;
        self.fs.rename(&old, &new)?;
        self.rename_path_mapping(&old, &new);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_setattr(
        &mut self,
        path: &str,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        fh: Option<u64>,
    ) -> Result<(), c_int> {
        if let Some(mode) = mode {
            self.fs.chmod(path, mode)?;
        }
        if uid.is_some() || gid.is_some() {
            self.fs.chown(path, uid, gid)?;
        }
        match (size, fh) {
            // Truncation on open with O_TRUNC: the upload at offset 0 that
            // follows replaces the remote file anyway.
            (Some(0), Some(_)) => debug!(target: "uftp::fuse", path, "truncate on open handle deferred to upload"),
            (Some(size), _) => self.fs.truncate(path, size)?,
            (None, _) => {}
        }
        if let Some(mtime) = mtime {
            let mtime = resolve_time(mtime);
            let atime = atime.map(resolve_time).unwrap_or(mtime);
            self.fs.utimens(path, Some((atime, mtime)))?;
        }
        Ok(())
    }
}

fn file_type(kind: FileKind) -> FileType {
    match kind {
        FileKind::Directory => FileType::Directory,
        FileKind::File => FileType::RegularFile,
    }
}

fn join(parent: &str, name: &str) -> String {
    if parent.ends_with('/') {
        format!("{}{}", parent, name)
    } else {
        format!("{}/{}", parent, name)
    }
}

fn parent_of(path: &str) -> &str {
    match path.trim_end_matches('/').rsplit_once('/') {
        Some(("", _)) | None => "/",
        Some((parent, _)) => parent,
    }
}

fn resolve_time(time: TimeOrNow) -> SystemTime {
    match time {
        TimeOrNow::SpecificTime(time) => time,
        TimeOrNow::Now => SystemTime::now(),
    }
}

fn configure_max_write(config: &mut fuser::KernelConfig, desired: u32) -> (u32, bool) {
    match config.set_max_write(desired) {
        Ok(_) => (desired, false),
        Err(limit) => {
            let _ = config.set_max_write(limit);
            (limit, true)
        }
    }
}

fn configure_max_readahead(config: &mut fuser::KernelConfig, desired: u32) -> (u32, bool) {
    match config.set_max_readahead(desired) {
        Ok(_) => (desired, false),
        Err(limit) => {
            let _ = config.set_max_readahead(limit);
            (limit, true)
        }
    }
}

impl<F: PathFilesystem> fuser::Filesystem for UftpFuse<F> {
    fn init(&mut self, _req: &Request, config: &mut fuser::KernelConfig) -> Result<(), c_int> {
        let (max_write, clamped) = configure_max_write(config, self.config.max_write);
        if clamped {
            warn!(
                target: "uftp::fuse",
                "Kernel limited max_write to {} bytes (desired {}).",
                max_write,
                self.config.max_write
            );
        }
        let (readahead, clamped) = configure_max_readahead(config, self.config.max_read);
        if clamped {
            warn!(
                target: "uftp::fuse",
                "Kernel limited max_readahead to {} bytes (desired {}).",
                readahead,
                self.config.max_read
            );
        }
        info!(
            target: "uftp::fuse",
            max_write,
            readahead,
            attr_ttl_ms = self.config.attr_ttl_ms,
            entry_ttl_ms = self.config.entry_ttl_ms,
            "UFTP FUSE adapter initialized"
        );
        Ok(())
    }

    fn destroy(&mut self) {
        self.fs.destroy();
        info!(target: "uftp::fuse", "UFTP FUSE adapter destroyed");
    }

    fn forget(&mut self, _req: &Request, ino: u64, _nlookup: u64) {
        self.forget_inode(ino);
    }

    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let result = self.child_path(parent, name).and_then(|path| self.entry_attr(&path));
        match result {
            Ok(attr) => reply.entry(&self.entry_ttl, &attr, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn getattr(&mut self, _req: &Request, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let result = self.path_of(ino).and_then(|path| self.fs.getattr(&path));
        match result {
            Ok(stat) => reply.attr(&self.attr_ttl, &self.stat_to_file_attr(&stat, ino)),
            Err(errno) => reply.error(errno),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let path = match self.path_of(ino) {
            Ok(path) => path,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };
        if let Err(errno) = self.apply_setattr(&path, mode, uid, gid, size, atime, mtime, fh) {
            reply.error(errno);
            return;
        }
        match self.fs.getattr(&path) {
            Ok(stat) => reply.attr(&self.attr_ttl, &self.stat_to_file_attr(&stat, ino)),
            Err(errno) => reply.error(errno),
        }
    }

    fn readlink(&mut self, _req: &Request, ino: u64, reply: ReplyData) {
        match self.path_of(ino).and_then(|path| self.fs.readlink(&path)) {
            Ok(target) => reply.data(target.as_bytes()),
            Err(errno) => reply.error(errno),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let result = self.child_path(parent, name).and_then(|path| {
            self.fs.mkdir(&path, mode)?;
            self.entry_attr(&path)
        });
        match result {
            Ok(attr) => reply.entry(&self.entry_ttl, &attr, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn unlink(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let result = self.child_path(parent, name).and_then(|path| {
            self.fs.unlink(&path)?;
            self.remove_path_mapping(&path);
            Ok(())
        });
        match result {
            Ok(()) => reply.ok(),
            Err(errno) => reply.error(errno),
        }
    }

    fn rmdir(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let result = self.child_path(parent, name).and_then(|path| {
            self.fs.rmdir(&path)?;
            self.remove_path_mapping(&path);
            Ok(())
        });
        match result {
            Ok(()) => reply.ok(),
            Err(errno) => reply.error(errno),
        }
    }

    fn symlink(
        &mut self,
        _req: &Request,
        parent: u64,
        link_name: &OsStr,
        target: &Path,
        reply: ReplyEntry,
    ) {
        let result = self.child_path(parent, link_name).and_then(|path| {
            let target = target.to_str().ok_or(EINVAL)?;
            self.fs.symlink(target, &path)?;
            self.entry_attr(&path)
        });
        match result {
            Ok(attr) => reply.entry(&self.entry_ttl, &attr, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn rename(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        flags: u32,
        reply: ReplyEmpty,
    ) {
        match self.rename_entry(parent, name, newparent, newname, flags) {
            Ok(()) => reply.ok(),
            Err(errno) => reply.error(errno),
        }
    }

    fn open(&mut self, _req: &Request, ino: u64, flags: i32, reply: ReplyOpen) {
        match self.path_of(ino).and_then(|path| self.fs.open(&path, flags)) {
            Ok(fh) => reply.opened(fh, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn read(
        &mut self,
        _req: &Request,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let Ok(offset) = u64::try_from(offset) else {
            reply.error(EINVAL);
            return;
        };
        let path = self.inode_to_path(ino).unwrap_or_default();
        match self.fs.read(path, size as usize, offset, fh) {
            Ok(data) => reply.data(&data),
            Err(errno) => reply.error(errno),
        }
    }

    fn write(
        &mut self,
        _req: &Request,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let Ok(offset) = u64::try_from(offset) else {
            reply.error(EINVAL);
            return;
        };
        let path = self.inode_to_path(ino).unwrap_or_default();
        match self.fs.write(path, data, offset, fh) {
            Ok(written) => reply.written(written as u32),
            Err(errno) => reply.error(errno),
        }
    }

    fn flush(&mut self, _req: &Request, _ino: u64, _fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        // Every write is already flushed onto the data channel.
        reply.ok();
    }

    fn release(
        &mut self,
        _req: &Request,
        ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        let path = self.inode_to_path(ino).unwrap_or_default();
        match self.fs.release(path, fh) {
            Ok(()) => reply.ok(),
            Err(errno) => reply.error(errno),
        }
    }

    fn fsync(&mut self, _req: &Request, _ino: u64, _fh: u64, _datasync: bool, reply: ReplyEmpty) {
        reply.ok();
    }

    fn readdir(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let entries = match self.path_of(ino).and_then(|path| self.directory_entries(ino, &path)) {
            Ok(entries) => entries,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };

        for (i, (entry_ino, kind, name)) in entries.iter().enumerate().skip(offset.max(0) as usize) {
            if reply.add(*entry_ino, (i + 1) as i64, *kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn create(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        let path = match self.child_path(parent, name) {
            Ok(path) => path,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };
        let fh = match self.fs.create(&path, mode) {
            Ok(fh) => fh,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };
        match self.entry_attr(&path) {
            Ok(attr) => reply.created(&self.entry_ttl, &attr, 0, fh, 0),
            Err(errno) => {
                let _ = self.fs.release(&path, fh);
                reply.error(errno);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::FsResult;
    use std::time::UNIX_EPOCH;

    /// Answers every metadata request with a fixed file
    struct StaticFs;

    impl PathFilesystem for StaticFs {
        fn getattr(&self, path: &str) -> FsResult<StatInfo> {
            if path.ends_with("missing") {
                return Err(ENOENT);
            }
            Ok(StatInfo {
                kind: if path == "/" { FileKind::Directory } else { FileKind::File },
                size: 1000,
                uid: 1,
                gid: 2,
                mode: 0o100640,
                mtime: UNIX_EPOCH + Duration::from_secs(10),
                atime: UNIX_EPOCH + Duration::from_secs(10),
            })
        }
        fn readdir(&self, _path: &str) -> FsResult<Vec<(String, FileKind)>> {
            Ok(vec![
                (".".into(), FileKind::Directory),
                ("..".into(), FileKind::Directory),
                ("a".into(), FileKind::File),
                ("b".into(), FileKind::Directory),
            ])
        }
        fn open(&self, _path: &str, _flags: i32) -> FsResult<u64> {
            Ok(1)
        }
        fn create(&self, _path: &str, _mode: u32) -> FsResult<u64> {
            Ok(1)
        }
        fn read(&self, _path: &str, _size: usize, _offset: u64, _fh: u64) -> FsResult<Vec<u8>> {
            Ok(Vec::new())
        }
        fn write(&self, _path: &str, data: &[u8], _offset: u64, _fh: u64) -> FsResult<usize> {
            Ok(data.len())
        }
        fn release(&self, _path: &str, _fh: u64) -> FsResult<()> {
            Ok(())
        }
        fn mkdir(&self, _path: &str, _mode: u32) -> FsResult<()> {
            Ok(())
        }
        fn rmdir(&self, _path: &str) -> FsResult<()> {
            Ok(())
        }
        fn unlink(&self, _path: &str) -> FsResult<()> {
            Ok(())
        }
        fn rename(&self, _old: &str, _new: &str) -> FsResult<()> {
            Ok(())
        }
        fn utimens(&self, _path: &str, _times: Option<(SystemTime, SystemTime)>) -> FsResult<()> {
            Ok(())
        }
    }

    #[test]
    fn cache_ttls_follow_config() {
        let config = MountConfig {
            attr_ttl_ms: 1500,
            entry_ttl_ms: 2500,
            ..MountConfig::default()
        };
        let fuse = UftpFuse::new(StaticFs, config);
        assert_eq!(fuse.attr_ttl, Duration::from_millis(1500));
        assert_eq!(fuse.entry_ttl, Duration::from_millis(2500));
    }

    #[test]
    fn inode_paths_follow_renames() {
        let mut fuse = UftpFuse::new(StaticFs, MountConfig::default());
        let dir = fuse.get_or_alloc_inode("/dir");
        let file = fuse.get_or_alloc_inode("/dir/file");
        let other = fuse.get_or_alloc_inode("/dirt");
        assert_eq!(fuse.get_or_alloc_inode("/dir"), dir);

        fuse.rename_path_mapping("/dir", "/moved");
        assert_eq!(fuse.inode_to_path(dir), Some("/moved"));
        assert_eq!(fuse.inode_to_path(file), Some("/moved/file"));
        assert_eq!(fuse.inode_to_path(other), Some("/dirt"));
        assert!(!fuse.paths.contains_key("/dir/file"));

        fuse.forget_inode(file);
        assert_eq!(fuse.inode_to_path(file), None);
        fuse.forget_inode(FUSE_ROOT_ID);
        assert_eq!(fuse.inode_to_path(FUSE_ROOT_ID), Some("/"));
    }

    #[test]
    fn child_paths_are_validated() {
        let fuse = UftpFuse::new(StaticFs, MountConfig::default());
        assert_eq!(fuse.child_path(FUSE_ROOT_ID, OsStr::new("a")), Ok("/a".to_string()));
        assert_eq!(fuse.child_path(999, OsStr::new("a")), Err(ENOENT));
        let long = "x".repeat(NAME_MAX + 1);
        assert_eq!(fuse.child_path(FUSE_ROOT_ID, OsStr::new(&long)), Err(ENAMETOOLONG));
        assert_eq!(parent_of("/a/b"), "/a");
        assert_eq!(parent_of("/a"), "/");
        assert_eq!(parent_of("/"), "/");
    }

    #[test]
    fn attributes_come_from_stat() {
        let mut fuse = UftpFuse::new(StaticFs, MountConfig::default());
        let attr = fuse.entry_attr("/f").unwrap();
        assert_eq!(attr.kind, FileType::RegularFile);
        assert_eq!(attr.perm, 0o640);
        assert_eq!(attr.size, 1000);
        assert_eq!(attr.blocks, 2);
        assert_eq!((attr.uid, attr.gid), (1, 2));
        assert_eq!(attr.nlink, 1);
        assert_eq!(fuse.entry_attr("/missing").unwrap_err(), ENOENT);
    }

    #[test]
    fn setattr_dispatch() {
        let mut fuse = UftpFuse::new(StaticFs, MountConfig::default());
        assert_eq!(
            fuse.apply_setattr("/f", Some(0o600), None, None, None, None, None, None),
            Err(libc::ENOSYS)
        );
        assert_eq!(
            fuse.apply_setattr("/f", None, None, None, Some(0), None, None, Some(1)),
            Ok(())
        );
        assert_eq!(
            fuse.apply_setattr("/f", None, None, None, Some(10), None, None, Some(1)),
            Err(libc::ENOSYS)
        );
        assert_eq!(
            fuse.apply_setattr("/f", None, None, None, None, None, Some(TimeOrNow::Now), None),
            Ok(())
        );
    }

    #[test]
    fn directory_entries_carry_listing_kinds() {
        let mut fuse = UftpFuse::new(StaticFs, MountConfig::default());
        let sub = fuse.get_or_alloc_inode("/sub");
        let entries = fuse.directory_entries(sub, "/sub").unwrap();

        let names: Vec<&str> = entries.iter().map(|(_, _, name)| name.as_str()).collect();
        assert_eq!(names, vec![".", "..", "a", "b"]);
        assert_eq!(entries[0].0, sub);
        assert_eq!(entries[1].0, FUSE_ROOT_ID);
        assert_eq!(entries[2].1, FileType::RegularFile);
        assert_eq!(entries[3].1, FileType::Directory);
        assert_eq!(fuse.inode_to_path(entries[3].0), Some("/sub/b"));
    }

    #[test]
    fn rename_with_flags_is_rejected() {
        let mut fuse = UftpFuse::new(StaticFs, MountConfig::default());
        let ino = fuse.get_or_alloc_inode("/a");
        for flags in [libc::RENAME_NOREPLACE, libc::RENAME_EXCHANGE] {
            assert_eq!(
                fuse.rename_entry(FUSE_ROOT_ID, OsStr::new("a"), FUSE_ROOT_ID, OsStr::new("b"), flags),
                Err(EINVAL)
            );
        }
        assert_eq!(fuse.inode_to_path(ino), Some("/a"));

        fuse.rename_entry(FUSE_ROOT_ID, OsStr::new("a"), FUSE_ROOT_ID, OsStr::new("b"), 0)
            .unwrap();
        assert_eq!(fuse.inode_to_path(ino), Some("/b"));
    }
}
