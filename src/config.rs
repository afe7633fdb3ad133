use std::path::PathBuf;
use std::time::Duration;

use crate::generator::default_workers;
use crate::reconnect::RECONNECT_BACKOFF;
use crate::stats::DEFAULT_CHECKPOINT_FRACTION;

pub const DEFAULT_BLOCK_MB: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Write unless a finished write phase is on the device, read if one is.
    #[default]
    Auto,
    Write,
    Read,
    WriteThenRead,
}

impl Mode {
    /// `(write, read)` for a device whose `bad` directory and completion
    /// marker are present or not.
    pub fn resolve(self, has_bad_dir: bool, has_marker: bool) -> (bool, bool) {
        match self {
            Mode::Auto => (!has_marker, has_bad_dir && has_marker),
            Mode::Write => (true, false),
            Mode::Read => (false, true),
            Mode::WriteThenRead => (true, true),
        }
    }
}

pub fn parse_mode(token: &str) -> Option<Mode> {
    match token.trim_start_matches('-').to_ascii_lowercase().as_str() {
        "w" | "write" => Some(Mode::Write),
        "r" | "t" | "read" | "test" => Some(Mode::Read),
        "rw" | "write-then-read" => Some(Mode::WriteThenRead),
        _ => None,
    }
}

/// Positive size in megabytes from a number with an optional unit letter
/// (`b` ignored, `k`, `m`, `g`).
pub fn parse_size_mb(token: &str) -> Option<f64> {
    let s = token.trim().to_ascii_lowercase();
    let s = s.strip_suffix('b').unwrap_or(s.as_str());
    let (num, scale) = match s.char_indices().last() {
        Some((idx, 'k')) => (&s[..idx], 1.0 / 1024.0),
        Some((idx, 'm')) => (&s[..idx], 1.0),
        Some((idx, 'g')) => (&s[..idx], 1024.0),
        _ => (s, 1.0),
    };
    let value = num.trim().parse::<f64>().ok()? * scale;
    (value.is_finite() && value > 0.0).then_some(value)
}

#[derive(Debug, Clone)]
pub struct TestConfig {
    /// Mounted directory of the device under test.
    pub root: PathBuf,
    pub block_mb: f64,
    /// Set from a size token; disables detection from existing files.
    pub block_size_explicit: bool,
    pub mode: Mode,
    /// Planned write volume instead of the free space.
    pub capacity_override_mb: Option<f64>,
    pub checkpoint_fraction: f64,
    pub generator_workers: usize,
    pub verifier_workers: usize,
    pub reconnect_backoff: Duration,
    pub show_progress: bool,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            block_mb: DEFAULT_BLOCK_MB,
            block_size_explicit: false,
            mode: Mode::Auto,
            capacity_override_mb: None,
            checkpoint_fraction: DEFAULT_CHECKPOINT_FRACTION,
            generator_workers: default_workers(),
            verifier_workers: default_workers(),
            reconnect_backoff: RECONNECT_BACKOFF,
            show_progress: true,
        }
    }
}

impl TestConfig {
    /// Apply the positional tokens `[filesize|mode] [filesize|mode] [maxsize]`.
    /// Unparseable tokens leave the previous value in place.
    pub fn apply_tokens<S: AsRef<str>>(&mut self, tokens: &[S]) {
        for token in tokens.iter().take(2) {
            let token = token.as_ref();
            if let Some(mode) = parse_mode(token) {
                self.mode = mode;
            } else if let Some(size) = parse_size_mb(token) {
                self.block_mb = size;
                self.block_size_explicit = true;
            }
        }
        if let Some(token) = tokens.get(2) {
            self.capacity_override_mb = token.as_ref().trim().parse::<f64>().ok();
        }
    }

    /// Fractions outside `(0, 1]` fall back to the default.
    pub fn set_checkpoint_fraction(&mut self, fraction: f64) {
        self.checkpoint_fraction = if fraction > 0.0 && fraction <= 1.0 {
            fraction
        } else {
            DEFAULT_CHECKPOINT_FRACTION
        };
    }
}
