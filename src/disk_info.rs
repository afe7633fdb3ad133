//! Startup diagnostics: which host and which mounted disk the run targets.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use sysinfo::{Disks, System};

const GIB_F: f64 = 1024.0 * 1024.0 * 1024.0;

pub fn host_info() -> String {
    format!(
        "Host: {}, OS: {}, Architecture: {}",
        System::host_name().unwrap_or_else(|| "unknown".to_string()),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

/// Describe the disk whose mount point is the longest prefix of `path`.
pub fn disk_info(path: &Path) -> io::Result<String> {
    let target = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let disks = Disks::new_with_refreshed_list();
    let mounts: Vec<PathBuf> = disks
        .list()
        .iter()
        .map(|d| d.mount_point().to_path_buf())
        .collect();
    let best = best_mount(&target, &mounts)
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "Disk not found"))?;
    let disk = &disks.list()[best];
    Ok(format!(
        "Disk: {}\nName: {}\nType: {:?}\nFile System: {}\nRemovable: {}\nTotal Space: {:.2} GB\nAvailable: {:.2} GB",
        disk.mount_point().display(),
        disk.name().to_string_lossy(),
        disk.kind(),
        disk.file_system().to_string_lossy(),
        disk.is_removable(),
        disk.total_space() as f64 / GIB_F,
        disk.available_space() as f64 / GIB_F
    ))
}

/// Index of the deepest mount point containing `target`.
fn best_mount(target: &Path, mounts: &[PathBuf]) -> Option<usize> {
    mounts
        .iter()
        .enumerate()
        .filter(|(_, m)| target.starts_with(m))
        .max_by_key(|(_, m)| m.components().count())
        .map(|(i, _)| i)
}
