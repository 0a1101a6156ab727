// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! MLST fact lines, listing lines and the POSIX metadata derived from them

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};

use crate::error::FactParseError;

pub const S_IFMT: u32 = 0o170000;
pub const S_IFDIR: u32 = 0o040000;
pub const S_IFREG: u32 = 0o100000;

const READ_BITS: u32 = 0o444;
const WRITE_BITS: u32 = 0o200;
const EXEC_BITS: u32 = 0o111;

/// Timestamp layout of the `modify` fact and the MFMT argument
pub const FACT_TIME_FORMAT: &str = "%Y%m%d%H%M%S";

/// Facts of one MLST/MLSD line, keyed by lower-cased fact name
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Facts {
    pub entries: BTreeMap<String, String>,
    /// Pathname following the fact list, when present
    pub name: Option<String>,
}

impl Facts {
    pub fn get(&self, fact: &str) -> Option<&str> {
        self.entries.get(&fact.to_ascii_lowercase()).map(String::as_str)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileKind {
    File,
    Directory,
}

/// POSIX view of one remote entry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatInfo {
    pub kind: FileKind,
    pub size: u64,
    pub uid: u32,
    pub gid: u32,
    /// Type bits plus permissions, or the exact `unix.mode` value when the
    /// server reports one.
    pub mode: u32,
    pub mtime: SystemTime,
    pub atime: SystemTime,
}

impl StatInfo {
    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }

    pub fn permissions(&self) -> u32 {
        self.mode & 0o7777
    }
}

/// One `LIST` line
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: FileKind,
    pub facts: BTreeMap<String, String>,
}

/// Parse `fact=value;fact=value; pathname`.
pub fn parse_fact_line(line: &str) -> Result<Facts, FactParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(FactParseError::MissingLine);
    }

    let (fact_part, name) = match line.split_once(' ') {
        Some((facts, name)) => (facts, Some(name.trim().to_string())),
        None => (line, None),
    };

    let mut entries = BTreeMap::new();
    for entry in fact_part.split(';').filter(|e| !e.is_empty()) {
        match entry.split_once('=') {
            Some((key, value)) if !key.is_empty() => {
                entries.insert(key.to_ascii_lowercase(), value.to_string());
            }
            _ => return Err(FactParseError::MalformedFact(entry.to_string())),
        }
    }

    Ok(Facts {
        entries,
        name: name.filter(|n| !n.is_empty()),
    })
}

/// Derive POSIX metadata from parsed facts.
pub fn stat_from_facts(facts: &Facts, uid: u32, gid: u32) -> Result<StatInfo, FactParseError> {
    let size = match facts.get("size") {
        Some(raw) => raw.parse::<u64>().map_err(|_| invalid("size", raw))?,
        None => 0,
    };

    let kind = kind_of_facts(facts);

    let mode = match facts.get("unix.mode") {
        Some(raw) => u32::from_str_radix(raw, 8).map_err(|_| invalid("unix.mode", raw))?,
        None => {
            let type_bits = match kind {
                FileKind::Directory => S_IFDIR,
                FileKind::File => S_IFREG,
            };
            type_bits | facts.get("perm").map(perm_bits).unwrap_or(0)
        }
    };

    let mtime = match facts.get("modify") {
        Some(raw) => parse_fact_time(raw)?,
        None => UNIX_EPOCH,
    };

    Ok(StatInfo {
        kind,
        size,
        uid,
        gid,
        mode,
        mtime,
        atime: mtime,
    })
}

/// Permission bits for an RFC 3659 `perm` fact value. Read and execute are
/// granted to everyone, write to the owner only.
pub fn perm_bits(perm: &str) -> u32 {
    perm.chars()
        .map(|c| match c.to_ascii_lowercase() {
            'r' | 'l' => READ_BITS,
            'w' | 'a' | 'c' | 'm' | 'p' => WRITE_BITS,
            'x' | 'e' => EXEC_BITS,
            _ => 0,
        })
        .fold(0, |acc, bits| acc | bits)
}

fn kind_of_facts(facts: &Facts) -> FileKind {
    match facts.get("type") {
        Some(kind) => kind_of_type(kind),
        None => facts.get("perm").map_or(FileKind::File, kind_of_perm),
    }
}

fn kind_of_type(kind: &str) -> FileKind {
    match kind.to_ascii_lowercase().as_str() {
        "dir" | "cdir" | "pdir" => FileKind::Directory,
        _ => FileKind::File,
    }
}

/// Entry kind implied by `perm` letters when no `type` fact is present:
/// `c`, `e`, `l`, `m` and `p` only apply to directories, `a`, `r` and `w`
/// only to files.
pub fn kind_of_perm(perm: &str) -> FileKind {
    let lower = perm.to_ascii_lowercase();
    let directory_only = lower.contains(['c', 'e', 'l', 'm', 'p']);
    let file_only = lower.contains(['a', 'r', 'w']);
    if directory_only && !file_only {
        FileKind::Directory
    } else {
        FileKind::File
    }
}

/// Parse `YYYYMMDDhhmmss[.sss]` as local time.
pub fn parse_fact_time(raw: &str) -> Result<SystemTime, FactParseError> {
    let digits = raw.split('.').next().unwrap_or(raw);
    let naive =
        NaiveDateTime::parse_from_str(digits, FACT_TIME_FORMAT).map_err(|_| invalid("modify", raw))?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(SystemTime::from)
        .ok_or_else(|| invalid("modify", raw))
}

/// Format a timestamp as local `YYYYMMDDhhmmss`.
pub fn format_fact_time(time: SystemTime) -> String {
    DateTime::<Local>::from(time).format(FACT_TIME_FORMAT).to_string()
}

/// Parse one listing line. Returns `None` for blank lines, `total` headers and
/// the `.`/`..` entries.
pub fn parse_list_line(line: &str) -> Option<DirEntry> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let mut tokens = line.split_whitespace();
    let first = tokens.next()?;

    if first.contains('=') && first.contains(';') {
        if let Ok(facts) = parse_fact_line(line) {
            let kind = kind_of_facts(&facts);
            if let Facts {
                entries,
                name: Some(name),
            } = facts
            {
                return entry(&name, kind, entries);
            }
        }
    }

    if first == "total" && line.split_whitespace().count() == 2 {
        return None;
    }

    let name = line.split_whitespace().last()?;
    let kind = if first.starts_with('d') || name.ends_with('/') {
        FileKind::Directory
    } else {
        FileKind::File
    };
    entry(name, kind, BTreeMap::new())
}

fn entry(name: &str, kind: FileKind, facts: BTreeMap<String, String>) -> Option<DirEntry> {
    let name = name.trim_end_matches('/');
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }
    Some(DirEntry {
        name: name.to_string(),
        kind,
        facts,
    })
}

fn invalid(fact: &str, value: &str) -> FactParseError {
    FactParseError::InvalidValue {
        fact: fact.to_string(),
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regular_file_facts() {
        let facts = parse_fact_line(" type=file;perm=r;size=1024;modify=20230101000000; a.txt")
            .expect("parse");
        assert_eq!(facts.name.as_deref(), Some("a.txt"));

        let stat = stat_from_facts(&facts, 1000, 100).expect("stat");
        assert!(!stat.is_dir());
        assert_eq!(stat.size, 1024);
        assert_eq!(stat.mode & S_IFMT, S_IFREG);
        assert_eq!(stat.permissions(), 0o444);
        assert_eq!((stat.uid, stat.gid), (1000, 100));
        assert_eq!(stat.mtime, stat.atime);
        assert_eq!(format_fact_time(stat.mtime), "20230101000000");
    }

    #[test]
    fn directory_facts_add_traverse_and_list_bits() {
        let facts = parse_fact_line("type=dir;perm=le; data").expect("parse");
        let stat = stat_from_facts(&facts, 0, 0).expect("stat");
        assert!(stat.is_dir());
        assert_eq!(stat.mode & S_IFMT, S_IFDIR);
        assert_eq!(stat.permissions(), 0o555);
        assert_eq!(stat.size, 0);
        assert_eq!(stat.mtime, UNIX_EPOCH);
    }

    #[test]
    fn unix_mode_overrides_derived_bits() {
        let facts = parse_fact_line("type=file;perm=r;size=1;UNIX.mode=0750; f").expect("parse");
        let stat = stat_from_facts(&facts, 0, 0).expect("stat");
        assert_eq!(stat.mode, 0o750);
        assert_eq!(stat.kind, FileKind::File);
    }

    #[test]
    fn fact_names_are_case_insensitive() {
        let facts = parse_fact_line("Type=DIR;Size=7;").expect("parse");
        assert_eq!(facts.get("type"), Some("DIR"));
        assert_eq!(facts.get("SIZE"), Some("7"));
        assert!(facts.name.is_none());
        assert!(stat_from_facts(&facts, 0, 0).unwrap().is_dir());
    }

    #[test]
    fn malformed_entries_are_rejected() {
        assert_eq!(
            parse_fact_line("type=file;garbage;size=1; f"),
            Err(FactParseError::MalformedFact("garbage".to_string()))
        );
        assert_eq!(parse_fact_line("   "), Err(FactParseError::MissingLine));

        let facts = parse_fact_line("type=file;size=huge; f").unwrap();
        assert!(matches!(
            stat_from_facts(&facts, 0, 0),
            Err(FactParseError::InvalidValue { .. })
        ));

        let facts = parse_fact_line("type=file;modify=yesterday; f").unwrap();
        assert!(stat_from_facts(&facts, 0, 0).is_err());
    }

    #[test]
    fn fractional_modify_seconds_are_ignored() {
        let plain = parse_fact_time("20240229123000").unwrap();
        let fractional = parse_fact_time("20240229123000.250").unwrap();
        assert_eq!(plain, fractional);
    }

    #[test]
    fn perm_table() {
        assert_eq!(perm_bits("r"), 0o444);
        assert_eq!(perm_bits("le"), 0o555);
        assert_eq!(perm_bits("rwx"), 0o755);
        assert_eq!(perm_bits("adf"), 0o200);
        assert_eq!(perm_bits("cmp"), 0o200);
        assert_eq!(perm_bits("?"), 0);

        assert_eq!(kind_of_perm("el"), FileKind::Directory);
        assert_eq!(kind_of_perm("flcdmpe"), FileKind::Directory);
        assert_eq!(kind_of_perm("adfrw"), FileKind::File);
        assert_eq!(kind_of_perm("df"), FileKind::File);
    }

    #[test]
    fn kind_comes_from_perm_without_type_fact() {
        let facts = parse_fact_line("perm=el; d").expect("parse");
        let stat = stat_from_facts(&facts, 0, 0).expect("stat");
        assert_eq!(stat.kind, FileKind::Directory);
        assert_eq!(stat.mode, S_IFDIR | 0o555);

        let facts = parse_fact_line("perm=r;size=2; f").expect("parse");
        let stat = stat_from_facts(&facts, 0, 0).expect("stat");
        assert_eq!(stat.kind, FileKind::File);
        assert_eq!(stat.mode, S_IFREG | 0o444);
    }

    #[test]
    fn list_lines_use_last_token_without_slash() {
        let entry = parse_list_line("drwxr-xr-x 1 user group 0 Jan 01 00:00 b/").unwrap();
        assert_eq!(entry.name, "b");
        assert_eq!(entry.kind, FileKind::Directory);
        assert!(entry.facts.is_empty());

        let entry = parse_list_line("-rw-r--r-- 1 user group 0 Jan 01 00:00 c/").unwrap();
        assert_eq!(entry.kind, FileKind::Directory);

        let entry = parse_list_line("-rw-r--r-- 1 user group 12 Jan 01 00:00 a").unwrap();
        assert_eq!(entry.name, "a");
        assert_eq!(entry.kind, FileKind::File);

        assert!(parse_list_line("").is_none());
        assert!(parse_list_line("total 8").is_none());
        assert!(parse_list_line("drwx------ 1 u g 0 Jan 01 00:00 ..").is_none());
    }

    #[test]
    fn mlsd_style_list_lines_keep_facts() {
        let entry = parse_list_line("type=file;size=3;perm=rw; notes.txt").unwrap();
        assert_eq!(entry.name, "notes.txt");
        assert_eq!(entry.kind, FileKind::File);
        assert_eq!(entry.facts.get("size").map(String::as_str), Some("3"));

        let entry = parse_list_line("type=dir;perm=el; sub").unwrap();
        assert_eq!(entry.kind, FileKind::Directory);
        let entry = parse_list_line("perm=el; other").unwrap();
        assert_eq!(entry.kind, FileKind::Directory);
    }
}
