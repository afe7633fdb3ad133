//! On-disk layout of a test run under the root of the device:
//!
//! ```text
//! <root>/bad/<id>...            one file per block, named by content id
//! <root>/filltest_write_ok.txt  write phase finished; holds its score
//! <root>/filltest_score.txt     append-only history of finished runs
//! ```

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::block::write_durable;
use crate::error::{Result, TestError};
use crate::log::current_timestamp;
use crate::stats::PhaseScore;

pub const WORK_DIR_NAME: &str = "bad";
pub const MARKER_FILE: &str = "filltest_write_ok.txt";
pub const SCORE_LOG_FILE: &str = "filltest_score.txt";

const MIB_F: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    bad_dir: PathBuf,
    marker: PathBuf,
    score_log: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            bad_dir: root.join(WORK_DIR_NAME),
            marker: root.join(MARKER_FILE),
            score_log: root.join(SCORE_LOG_FILE),
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn bad_dir(&self) -> &Path {
        &self.bad_dir
    }

    pub fn marker_path(&self) -> &Path {
        &self.marker
    }

    pub fn score_log_path(&self) -> &Path {
        &self.score_log
    }

    pub fn block_path(&self, id: &str) -> PathBuf {
        self.bad_dir.join(id)
    }

    pub fn has_bad_dir(&self) -> bool {
        self.bad_dir.is_dir()
    }

    pub fn has_marker(&self) -> bool {
        self.marker.exists()
    }

    pub fn ensure_bad_dir(&self) -> Result<()> {
        if self.has_bad_dir() {
            return Ok(());
        }
        fs::create_dir(&self.bad_dir).map_err(|source| TestError::CreateDir {
            path: self.bad_dir.clone(),
            source,
        })
    }

    /// Names of the regular files in the block directory, sorted.
    pub fn block_files(&self) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.bad_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Ok(name) = entry.file_name().into_string() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Guess the block size of an earlier run from the files it left behind.
    /// The scan stops at the first file within half a megabyte of the current
    /// guess; every other file replaces the guess with its own size.
    pub fn detect_block_size(&self, default_mb: f64) -> f64 {
        let mut size_mb = default_mb;
        let Ok(names) = self.block_files() else {
            return size_mb;
        };
        for name in names {
            let Ok(meta) = fs::metadata(self.block_path(&name)) else {
                continue;
            };
            if meta.len() == 0 {
                continue;
            }
            let now_mb = meta.len() as f64 / MIB_F;
            if (now_mb - size_mb).abs() < 0.5 {
                break;
            }
            size_mb = now_mb;
        }
        size_mb
    }

    pub fn write_marker(&self, score: &str) -> io::Result<()> {
        write_durable(&self.marker, score.as_bytes())
    }

    pub fn read_marker(&self) -> io::Result<String> {
        fs::read_to_string(&self.marker)
    }

    pub fn remove_marker(&self) -> io::Result<()> {
        match fs::remove_file(&self.marker) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    /// Append one timestamped record to the score log.
    pub fn append_score(&self, write_score: &str, read_score: &PhaseScore) -> io::Result<()> {
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.score_log)?;
        write!(
            f,
            "{}\r\nWrite Speed:\n{}\r\nRead Speed:\n{}\n\n",
            current_timestamp(),
            write_score,
            read_score.render()
        )?;
        f.sync_all()
    }

    /// Remove the block directory if nothing is left in it.
    pub fn remove_bad_dir_if_empty(&self) -> io::Result<bool> {
        if !self.has_bad_dir() {
            return Ok(false);
        }
        if fs::read_dir(&self.bad_dir)?.next().is_some() {
            return Ok(false);
        }
        fs::remove_dir(&self.bad_dir)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_sized(ws: &Workspace, name: &str, len: usize) {
        fs::write(ws.block_path(name), vec![0u8; len]).unwrap();
    }

    #[test]
    fn layout_under_root() {
        let ws = Workspace::new("/mnt/stick");
        assert_eq!(ws.bad_dir(), Path::new("/mnt/stick/bad"));
        assert_eq!(ws.marker_path(), Path::new("/mnt/stick/filltest_write_ok.txt"));
        assert_eq!(ws.block_path("0a1b2c3d"), Path::new("/mnt/stick/bad/0a1b2c3d"));
    }

    #[test]
    fn block_files_skips_directories_and_sorts() {
        let dir = tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        ws.ensure_bad_dir().unwrap();
        ws.ensure_bad_dir().unwrap();
        write_sized(&ws, "ffff0000", 1);
        write_sized(&ws, "0000ffff", 1);
        fs::create_dir(ws.bad_dir().join("nested")).unwrap();
        assert_eq!(ws.block_files().unwrap(), vec!["0000ffff", "ffff0000"]);
    }

    #[test]
    fn create_failure_is_setup_error() {
        let dir = tempdir().unwrap();
        let ws = Workspace::new(dir.path().join("missing-parent"));
        assert!(matches!(
            ws.ensure_bad_dir(),
            Err(TestError::CreateDir { .. })
        ));
    }

    #[test]
    fn detects_size_of_previous_run() {
        let dir = tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        ws.ensure_bad_dir().unwrap();
        assert_eq!(ws.detect_block_size(10.0), 10.0);

        write_sized(&ws, "00000001", 2 * 1024 * 1024);
        write_sized(&ws, "00000002", 2 * 1024 * 1024);
        write_sized(&ws, "00000003", 512 * 1024);
        assert_eq!(ws.detect_block_size(10.0), 2.0);
        // already close to the first file: keep the guess
        assert_eq!(ws.detect_block_size(2.2), 2.2);
    }

    #[test]
    fn marker_round_trip_and_idempotent_removal() {
        let dir = tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        assert!(!ws.has_marker());
        ws.write_marker("Min: 1\n10% x").unwrap();
        assert!(ws.has_marker());
        assert_eq!(ws.read_marker().unwrap(), "Min: 1\n10% x");
        ws.remove_marker().unwrap();
        ws.remove_marker().unwrap();
        assert!(!ws.has_marker());
    }

    #[test]
    fn score_log_appends_records() {
        let dir = tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        let read = PhaseScore {
            last_line: Some("Min: 2.000M/s".into()),
            checkpoints: vec!["10% a".into()],
        };
        ws.append_score("W", &read).unwrap();
        ws.append_score("W2", &read).unwrap();

        let text = fs::read_to_string(ws.score_log_path()).unwrap();
        assert_eq!(text.matches("\r\nWrite Speed:\n").count(), 2);
        assert!(text.contains("\r\nWrite Speed:\nW\r\nRead Speed:\nMin: 2.000M/s\n10% a\n\n"));
        assert!(text.ends_with("W2\r\nRead Speed:\nMin: 2.000M/s\n10% a\n\n"));
    }

    #[test]
    fn removes_only_empty_block_dir() {
        let dir = tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        assert!(!ws.remove_bad_dir_if_empty().unwrap());
        ws.ensure_bad_dir().unwrap();
        write_sized(&ws, "00000001", 1);
        assert!(!ws.remove_bad_dir_if_empty().unwrap());
        fs::remove_file(ws.block_path("00000001")).unwrap();
        assert!(ws.remove_bad_dir_if_empty().unwrap());
        assert!(!ws.has_bad_dir());
    }
}
