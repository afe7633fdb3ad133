//! Rolling throughput statistics shared by the write and read phases.
//!
//! A [`PhaseSession`] is owned by the single-threaded phase loop and fed one
//! elapsed time per block. Speeds are in megabytes per second. The first block
//! only contributes time: there is no previous block to average against.

use std::fmt;
use std::time::Duration;

pub const DEFAULT_CHECKPOINT_FRACTION: f64 = 0.1;

/// Floor applied to elapsed times before dividing by them.
const MIN_ELAPSED: f64 = 1e-9;

/// `HH:MM:SS`, hours not wrapped.
pub fn format_duration(secs: f64) -> String {
    let total = secs.max(0.0) as u64;
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

/// Min/max/minavg of the current checkpoint segment.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Window {
    pub min_speed: Option<f64>,
    pub max_speed: Option<f64>,
    pub min_avg: Option<f64>,
}

impl Window {
    fn observe(&mut self, speed: f64) {
        self.min_speed = Some(self.min_speed.map_or(speed, |m| m.min(speed)));
        self.max_speed = Some(self.max_speed.map_or(speed, |m| m.max(speed)));
    }

    pub fn is_empty(&self) -> bool {
        *self == Window::default()
    }
}

#[derive(Debug, Clone)]
pub struct Sample {
    pub index: usize,
    /// Speed of this block alone.
    pub speed: f64,
    pub elapsed_secs: f64,
    /// Running average over every block since the phase started.
    pub avg: f64,
    pub window: Window,
    pub done_mb: f64,
    pub total_mb: f64,
    pub total_secs: f64,
    pub remaining_secs: f64,
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Min: {:.3}M/s Max: {:.3}M/s Avg: {:.3}M/s MinAvg: {:.3}M/s\n{:.3}M/{:.3}M {}/{} ({:.3}M/s {:.6}s)",
            self.window.min_speed.unwrap_or(0.0),
            self.window.max_speed.unwrap_or(0.0),
            self.avg,
            self.window.min_avg.unwrap_or(0.0),
            self.done_mb,
            self.total_mb,
            format_duration(self.total_secs),
            format_duration(self.remaining_secs),
            self.speed,
            self.elapsed_secs,
        )
    }
}

pub fn checkpoint_line(percent: u32, sample: &Sample) -> String {
    format!(
        "{}% Min: {:.3}M/s Max: {:.3}M/s Avg: {:.3}M/s MinAvg: {:.3}M/s ({:.3}M/s {:.6}s)",
        percent,
        sample.window.min_speed.unwrap_or(0.0),
        sample.window.max_speed.unwrap_or(0.0),
        sample.avg,
        sample.window.min_avg.unwrap_or(0.0),
        sample.speed,
        sample.elapsed_secs,
    )
}

#[derive(Debug, Clone)]
pub struct Update {
    pub sample: Sample,
    pub checkpoint: Option<String>,
}

/// Flattened result of a phase: the last progress line and every checkpoint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhaseScore {
    pub last_line: Option<String>,
    pub checkpoints: Vec<String>,
}

impl PhaseScore {
    pub fn render(&self) -> String {
        format!(
            "{}\n{}",
            self.last_line.as_deref().unwrap_or(""),
            self.checkpoints.join("\n")
        )
    }
}

#[derive(Debug, Clone)]
pub struct PhaseSession {
    block_mb: f64,
    planned: usize,
    total_mb: f64,
    fraction: f64,
    step_percent: u32,
    total_secs: f64,
    window: Window,
    save_index: usize,
    score: PhaseScore,
}

impl PhaseSession {
    /// `planned` blocks of `block_mb` each, out of `total_mb` shown as the
    /// target; a checkpoint every `fraction` of `planned`.
    pub fn new(block_mb: f64, planned: usize, total_mb: f64, fraction: f64) -> Self {
        Self {
            block_mb,
            planned,
            total_mb,
            fraction,
            step_percent: (fraction * 100.0).round() as u32,
            total_secs: 0.0,
            window: Window::default(),
            save_index: (planned as f64 * fraction) as usize,
            score: PhaseScore::default(),
        }
    }

    pub fn record(&mut self, index: usize, elapsed: Duration) -> Option<Update> {
        let nt = elapsed.as_secs_f64();
        self.total_secs += nt;
        if index == 0 {
            return None;
        }

        let avg = index as f64 * self.block_mb / self.total_secs.max(MIN_ELAPSED);
        let speed = self.block_mb / nt.max(MIN_ELAPSED);
        self.window.observe(speed);
        // Slower than the average block so far: remember the lowest running
        // average seen at such a block.
        if nt > self.total_secs / index as f64
            && self.window.min_avg.map_or(true, |m| avg < m)
        {
            self.window.min_avg = Some(avg);
        }

        let remaining_secs = if avg > 0.0 {
            self.planned.saturating_sub(index) as f64 * self.block_mb / avg
        } else {
            0.0
        };
        let sample = Sample {
            index,
            speed,
            elapsed_secs: nt,
            avg,
            window: self.window,
            done_mb: index as f64 * self.block_mb,
            total_mb: self.total_mb,
            total_secs: self.total_secs,
            remaining_secs,
        };
        self.score.last_line = Some(sample.to_string());

        let checkpoint = if index >= self.save_index {
            let taken = self.score.checkpoints.len() + 1;
            let line = checkpoint_line(taken as u32 * self.step_percent, &sample);
            self.score.checkpoints.push(line.clone());
            self.save_index = ((taken + 1) as f64 * self.fraction * self.planned as f64) as usize;
            self.window = Window::default();
            Some(line)
        } else {
            None
        };

        Some(Update { sample, checkpoint })
    }

    pub fn window(&self) -> Window {
        self.window
    }

    pub fn total_secs(&self) -> f64 {
        self.total_secs
    }

    pub fn planned(&self) -> usize {
        self.planned
    }

    pub fn score(&self) -> &PhaseScore {
        &self.score
    }

    pub fn into_score(self) -> PhaseScore {
        self.score
    }
}
