//! One invocation: decide the phases, prepare the block directory, run the
//! write and read phases in order, and tidy up.

use std::fs;

use crate::config::{Mode, TestConfig};
use crate::error::{Result, TestError};
use crate::free_space::FreeSpace;
use crate::log::RunLog;
use crate::read_phase::run_read_phase;
use crate::reconnect::Reconnect;
use crate::report::RunSummary;
use crate::workspace::{Workspace, MARKER_FILE, WORK_DIR_NAME};
use crate::write_phase::run_write_phase;

/// Platform seams for a run. Tests swap both for in-process fakes.
pub struct RunContext<'a> {
    pub free_space: &'a dyn FreeSpace,
    pub reconnect: &'a dyn Reconnect,
    pub log: RunLog,
}

pub fn run(cfg: &TestConfig, ctx: &RunContext<'_>) -> Result<RunSummary> {
    // Absolute, so block paths survive the working directory moving into `bad`.
    let root = fs::canonicalize(&cfg.root).map_err(|source| TestError::EnterDir {
        path: cfg.root.clone(),
        source,
    })?;
    let ws = Workspace::new(root);
    let (write, read) = cfg.mode.resolve(ws.has_bad_dir(), ws.has_marker());
    ctx.log.simple(format!("Path: {}", ws.root().display()));
    ctx.log.simple(format!("Write: {}", write));
    ctx.log.simple(format!("Read: {}", read));
    if cfg.mode == Mode::WriteThenRead {
        ctx.log.simple(
            "Reading right after writing may be served from cache; \
             reinsert the disk between phases for a trustworthy result",
        );
    }

    let mut summary = RunSummary {
        root: ws.root().to_path_buf(),
        ..RunSummary::default()
    };
    if !write && !read {
        ctx.log.simple(format!(
            "{} found without a {} directory, nothing to read",
            MARKER_FILE, WORK_DIR_NAME
        ));
        return Ok(summary);
    }

    ws.ensure_bad_dir()?;
    ctx.reconnect
        .reenter(ws.bad_dir())
        .map_err(|source| TestError::EnterDir {
            path: ws.bad_dir().to_path_buf(),
            source,
        })?;

    let mut cfg = cfg.clone();
    if !cfg.block_size_explicit {
        cfg.block_mb = ws.detect_block_size(cfg.block_mb);
    }
    ctx.log.simple(format!("Filesize: {:.3}M", cfg.block_mb));
    summary.block_mb = cfg.block_mb;

    if write {
        summary.write = Some(run_write_phase(&ws, &cfg, ctx)?);
    }
    if read {
        summary.read = Some(run_read_phase(&ws, &cfg, ctx)?);
    }

    if let Err(e) = ctx.reconnect.release(ws.root()) {
        ctx.log.error("Connect Error", &ws.root().display().to_string(), &e.to_string());
    }
    match ws.remove_bad_dir_if_empty() {
        Ok(removed) => summary.bad_dir_removed = removed,
        Err(e) => ctx.log.error("Remove Error", WORK_DIR_NAME, &e.to_string()),
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::path::Path;
    use tempfile::tempdir;

    struct AlwaysThere;

    impl Reconnect for AlwaysThere {
        fn reenter(&self, _dir: &Path) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn missing_root_is_setup_error() {
        let dir = tempdir().unwrap();
        let no_space = |_: &Path| 0u64;
        let ctx = RunContext {
            free_space: &no_space,
            reconnect: &AlwaysThere,
            log: RunLog::stderr(),
        };
        let cfg = TestConfig {
            root: dir.path().join("unplugged"),
            ..TestConfig::default()
        };
        assert!(matches!(run(&cfg, &ctx), Err(TestError::EnterDir { .. })));
    }

    #[test]
    fn stray_marker_without_blocks_does_nothing() {
        let dir = tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        ws.write_marker("x").unwrap();
        let no_space = |_: &Path| 0u64;
        let ctx = RunContext {
            free_space: &no_space,
            reconnect: &AlwaysThere,
            log: RunLog::stderr(),
        };
        let cfg = TestConfig {
            root: dir.path().to_path_buf(),
            show_progress: false,
            ..TestConfig::default()
        };
        let summary = run(&cfg, &ctx).unwrap();
        assert!(summary.write.is_none() && summary.read.is_none());
        assert!(!ws.has_bad_dir());
        assert!(ws.has_marker());
    }

    #[test]
    fn unreachable_block_dir_is_setup_error() {
        struct Gone;
        impl Reconnect for Gone {
            fn reenter(&self, _dir: &Path) -> io::Result<()> {
                Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"))
            }
        }
        let dir = tempdir().unwrap();
        let no_space = |_: &Path| 0u64;
        let ctx = RunContext {
            free_space: &no_space,
            reconnect: &Gone,
            log: RunLog::stderr(),
        };
        let cfg = TestConfig {
            root: dir.path().to_path_buf(),
            ..TestConfig::default()
        };
        assert!(matches!(run(&cfg, &ctx), Err(TestError::EnterDir { .. })));
    }
}
