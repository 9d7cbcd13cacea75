//! Process memory maps
//!
//! This module parses `/proc/<pid>/maps` to find the executable,
//! file-backed mappings of a process, which is what the process source
//! needs to place each loaded object file in the process address space.

use log::debug;
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::{Addr, LoadError, Pid};

/// Memory range in a process's address space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRange {
    pub start: u64,
    pub end: u64,
}

impl MemoryRange {
    /// Check if an address falls within this memory range
    #[must_use]
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end
    }
}

/// One line of a maps file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapsEntry {
    pub range: MemoryRange,
    pub executable: bool,
    /// Offset into the backing file at which the mapping starts
    pub offset: u64,
    /// Backing path or pseudo-path (`[vdso]`, `[heap]`, ...); `None` for anonymous mappings
    pub path: Option<PathBuf>,
    /// The mapped file as seen through `<proc>/<pid>/map_files`, when known
    pub map_file: Option<PathBuf>,
}

impl MapsEntry {
    /// Runtime address that file offset zero of the backing file maps to
    #[must_use]
    pub fn load_address(&self) -> Addr {
        self.range.start.wrapping_sub(self.offset)
    }

    /// Executable mappings backed by a regular, still existing file
    #[must_use]
    pub fn is_symbolization_relevant(&self) -> bool {
        let Some(ref path) = self.path else {
            return false;
        };
        self.executable
            && path.is_absolute()
            && !path.to_string_lossy().ends_with(" (deleted)")
    }
}

/// Enumerates the executable, file-backed mappings of a process
pub trait MapsProvider: Send + Sync {
    /// # Errors
    /// `ProcessNotFound` if the process's mappings cannot be read.
    fn executable_mappings(&self, pid: Pid) -> Result<Vec<MapsEntry>, LoadError>;
}

/// Reads `<root>/<pid>/maps` from a procfs mount
#[derive(Debug, Clone)]
pub struct ProcMaps {
    root: PathBuf,
}

impl ProcMaps {
    #[must_use]
    pub fn new() -> Self {
        Self::with_root("/proc")
    }

    /// Use a procfs mounted (or mirrored) somewhere other than `/proc`
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn maps_path(&self, pid: Pid) -> PathBuf {
        self.root.join(pid.proc_component()).join("maps")
    }

    /// `map_files` link for one mapping; it reaches the file even when the
    /// process sees it under a path that does not exist for us
    #[must_use]
    pub fn map_file_path(&self, pid: Pid, range: MemoryRange) -> PathBuf {
        self.root
            .join(pid.proc_component())
            .join("map_files")
            .join(format!("{:x}-{:x}", range.start, range.end))
    }
}

impl Default for ProcMaps {
    fn default() -> Self {
        Self::new()
    }
}

impl MapsProvider for ProcMaps {
    fn executable_mappings(&self, pid: Pid) -> Result<Vec<MapsEntry>, LoadError> {
        let maps_path = self.maps_path(pid);
        let maps = fs::read_to_string(&maps_path).map_err(|e| {
            debug!("Failed to read {}: {e}", maps_path.display());
            LoadError::ProcessNotFound(pid)
        })?;

        Ok(parse_maps(&maps)
            .into_iter()
            .filter(MapsEntry::is_symbolization_relevant)
            .map(|entry| MapsEntry { map_file: Some(self.map_file_path(pid, entry.range)), ..entry })
            .collect())
    }
}

/// Parse the text of a maps file
///
/// Lines that do not follow `start-end perms offset dev inode [pathname]`
/// are skipped.
#[must_use]
pub fn parse_maps(maps: &str) -> Vec<MapsEntry> {
    maps.lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let entry = parse_line(line);
            if entry.is_none() {
                debug!("Skipping maps line: {line}");
            }
            entry
        })
        .collect()
}

fn parse_line(line: &str) -> Option<MapsEntry> {
    let (range, rest) = split_field(line);
    let (perms, rest) = split_field(rest);
    let (offset, rest) = split_field(rest);
    let (_dev, rest) = split_field(rest);
    let (_inode, rest) = split_field(rest);
    let pathname = rest.trim();

    let (start, end) = range.split_once('-')?;
    let range = MemoryRange {
        start: u64::from_str_radix(start, 16).ok()?,
        end: u64::from_str_radix(end, 16).ok()?,
    };
    let offset = u64::from_str_radix(offset, 16).ok()?;
    if perms.len() < 3 {
        return None;
    }

    Some(MapsEntry {
        range,
        executable: perms.as_bytes()[2] == b'x',
        offset,
        path: (!pathname.is_empty()).then(|| Path::new(pathname).to_path_buf()),
        map_file: None,
    })
}

/// Split off the first whitespace-delimited field
fn split_field(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    let end = s.find(char::is_whitespace).unwrap_or(s.len());
    s.split_at(end)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAPS: &str = "\
555555554000-555555556000 r--p 00000000 fd:01 1054 /usr/bin/app
555555556000-55555555a000 r-xp 00002000 fd:01 1054 /usr/bin/app
55555555a000-55555555c000 rw-p 00006000 fd:01 1054 /usr/bin/app
555555560000-555555581000 rw-p 00000000 00:00 0                          [heap]
7ffff7dd0000-7ffff7df5000 r-xp 00028000 fd:01 2210 /usr/lib/libc.so.6
7ffff7e00000-7ffff7e01000 r-xp 00000000 fd:01 3003 /tmp/my lib.so
7ffff7e10000-7ffff7e11000 r-xp 00000000 fd:01 3004 /tmp/gone.so (deleted)
7ffff7ff9000-7ffff7ffd000 r-xp 00000000 00:00 0                          [vdso]
7ffff7ffe000-7ffff7fff000 rwxp 00000000 00:00 0
";

    #[test]
    fn test_memory_range_contains() {
        let range = MemoryRange { start: 0x1000, end: 0x2000 };

        assert!(range.contains(0x1000));
        assert!(range.contains(0x1500));
        assert!(range.contains(0x1FFF));
        assert!(!range.contains(0x0FFF));
        assert!(!range.contains(0x2000));
        assert!(!range.contains(0x2001));
    }

    #[test]
    fn test_parse_maps_fields() {
        let entries = parse_maps(MAPS);
        assert_eq!(entries.len(), 9);

        let text = &entries[1];
        assert_eq!(text.range, MemoryRange { start: 0x5555_5555_6000, end: 0x5555_5555_a000 });
        assert!(text.executable);
        assert_eq!(text.offset, 0x2000);
        assert_eq!(text.path.as_deref(), Some(Path::new("/usr/bin/app")));
        assert_eq!(text.load_address(), 0x5555_5555_4000);

        assert_eq!(entries[5].path.as_deref(), Some(Path::new("/tmp/my lib.so")));
        assert_eq!(entries[8].path, None);
    }

    #[test]
    fn test_relevant_entries() {
        let relevant: Vec<PathBuf> = parse_maps(MAPS)
            .into_iter()
            .filter(MapsEntry::is_symbolization_relevant)
            .filter_map(|e| e.path)
            .collect();

        assert_eq!(
            relevant,
            vec![
                PathBuf::from("/usr/bin/app"),
                PathBuf::from("/usr/lib/libc.so.6"),
                PathBuf::from("/tmp/my lib.so"),
            ]
        );
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let entries = parse_maps("not a maps line\n\n1000-2000 r-xp 0 00:00 0 /bin/x\nzz-yy r-xp 0 0 0 /a\n");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].range.start, 0x1000);
    }

    #[test]
    fn test_proc_maps_missing_pid() {
        let dir = tempfile::tempdir().unwrap();
        let maps = ProcMaps::with_root(dir.path());
        let err = maps.executable_mappings(Pid(4242)).unwrap_err();
        assert!(matches!(err, LoadError::ProcessNotFound(Pid(4242))));
    }

    #[test]
    fn test_proc_maps_fills_map_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("12")).unwrap();
        std::fs::write(dir.path().join("12/maps"), MAPS).unwrap();

        let entries = ProcMaps::with_root(dir.path()).executable_mappings(Pid(12)).unwrap();
        assert_eq!(
            entries[0].map_file.as_deref(),
            Some(dir.path().join("12/map_files/555555556000-55555555a000").as_path())
        );
        assert!(parse_maps(MAPS).iter().all(|e| e.map_file.is_none()));
    }

    #[test]
    fn test_proc_maps_self() {
        // Our own maps must list the test binary as executable
        let entries = ProcMaps::new().executable_mappings(Pid::SELF).unwrap();
        let exe = std::env::current_exe().unwrap().canonicalize().unwrap();
        assert!(entries.iter().any(|e| e.path.as_deref() == Some(exe.as_path())));
    }
}
