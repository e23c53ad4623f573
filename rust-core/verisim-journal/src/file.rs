// SPDX-License-Identifier: PMPL-1.0-or-later
//
// VeriSimDB Segmented Journal - Segment file naming
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Segment files are named `{journal}-{id}.log`. A segment created to
// replace one that could not be removed gets a generation suffix,
// `{journal}-{id}-{generation}.log`; the bare form is generation 0.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::JournalResult;

/// The file extension used for segment files.
pub const SEGMENT_EXTENSION: &str = "log";

/// The identity encoded in a segment file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentFileName {
    /// Segment identifier.
    pub id: u64,
    /// Replacement generation; 0 for the bare form.
    pub generation: u64,
}

/// A segment file discovered on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentFile {
    /// The full path to the segment file.
    pub path: PathBuf,
    /// Identity parsed from the file name.
    pub name: SegmentFileName,
    /// Current file size in bytes.
    pub file_size: u64,
}

/// Build the file name for segment `id` of journal `journal`.
pub fn segment_file_name(journal: &str, id: u64, generation: u64) -> String {
    if generation == 0 {
        format!("{journal}-{id}.{SEGMENT_EXTENSION}")
    } else {
        format!("{journal}-{id}-{generation}.{SEGMENT_EXTENSION}")
    }
}

/// Parse a segment file name belonging to journal `journal`.
///
/// Returns `None` for files of other journals and for anything that is not
/// a segment file.
pub fn parse_segment_file_name(journal: &str, file_name: &str) -> Option<SegmentFileName> {
    let rest = file_name.strip_prefix(journal)?.strip_prefix('-')?;
    let rest = rest.strip_suffix(SEGMENT_EXTENSION)?.strip_suffix('.')?;

    let (id, generation) = match rest.split_once('-') {
        Some((id, generation)) => (id, parse_number(generation)?),
        None => (rest, 0),
    };
    Some(SegmentFileName {
        id: parse_number(id)?,
        generation,
    })
}

fn parse_number(digits: &str) -> Option<u64> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Path for a new segment `id`: the first generation whose file does not
/// exist yet.
pub fn next_segment_path(dir: &Path, journal: &str, id: u64) -> (PathBuf, u64) {
    let mut generation = 0;
    loop {
        let path = dir.join(segment_file_name(journal, id, generation));
        if !path.exists() {
            return (path, generation);
        }
        generation += 1;
    }
}

/// List every segment file of journal `journal` in `dir`, ordered by
/// (id, generation). Other files are ignored.
pub fn list_segment_files(dir: &Path, journal: &str) -> JournalResult<Vec<SegmentFile>> {
    let mut files = Vec::new();

    for dir_entry in fs::read_dir(dir)? {
        let dir_entry = dir_entry?;
        let file_name = dir_entry.file_name();
        let file_name = file_name.to_string_lossy();

        if let Some(name) = parse_segment_file_name(journal, &file_name) {
            let metadata = dir_entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            files.push(SegmentFile {
                path: dir_entry.path(),
                name,
                file_size: metadata.len(),
            });
        }
    }

    files.sort_by_key(|file| file.name);

    debug!(
        count = files.len(),
        dir = %dir.display(),
        journal,
        "Discovered journal segment files"
    );

    Ok(files)
}

#[cfg(test)]
mod tests {
    use std::fs::File;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_file_name_forms() {
        assert_eq!(segment_file_name("raft", 3, 0), "raft-3.log");
        assert_eq!(segment_file_name("raft", 3, 2), "raft-3-2.log");
    }

    #[test]
    fn test_parse_accepts_both_forms() {
        assert_eq!(
            parse_segment_file_name("raft", "raft-17.log"),
            Some(SegmentFileName {
                id: 17,
                generation: 0
            })
        );
        assert_eq!(
            parse_segment_file_name("raft", "raft-17-4.log"),
            Some(SegmentFileName {
                id: 17,
                generation: 4
            })
        );
    }

    #[test]
    fn test_parse_rejects_other_journals_and_junk() {
        assert_eq!(parse_segment_file_name("raft", "other-1.log"), None);
        assert_eq!(parse_segment_file_name("raft", "raftx-1.log"), None);
        assert_eq!(parse_segment_file_name("raft", "raft-1.txt"), None);
        assert_eq!(parse_segment_file_name("raft", "raft-.log"), None);
        assert_eq!(parse_segment_file_name("raft", "raft-1-.log"), None);
        assert_eq!(parse_segment_file_name("raft", "raft-a.log"), None);
        assert_eq!(parse_segment_file_name("raft", "raft-1-2-3.log"), None);
        assert_eq!(parse_segment_file_name("raft", "raft-+1.log"), None);
    }

    #[test]
    fn test_next_segment_path_skips_existing() {
        let dir = TempDir::new().unwrap();
        let (path, generation) = next_segment_path(dir.path(), "j", 1);
        assert_eq!(generation, 0);
        File::create(&path).unwrap();

        let (path, generation) = next_segment_path(dir.path(), "j", 1);
        assert_eq!(generation, 1);
        assert!(path.ends_with("j-1-1.log"));
    }

    #[test]
    fn test_list_segment_files_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        for name in ["j-10.log", "j-2.log", "j-2-1.log", "k-1.log", "notes.txt"] {
            File::create(dir.path().join(name)).unwrap();
        }
        let files = list_segment_files(dir.path(), "j").unwrap();
        let names: Vec<_> = files.iter().map(|f| (f.name.id, f.name.generation)).collect();
        assert_eq!(names, vec![(2, 0), (2, 1), (10, 0)]);
    }
}
