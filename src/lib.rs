//! Fill-and-verify tester for removable storage.
//!
//! A run fills the free space of a device with content-addressed blocks
//! (each file is named after a digest of its own bytes), then, after the
//! operator reinserts the device, reads every block back and deletes the
//! ones that still match their name. Whatever is left in `bad/` afterwards
//! did not survive the round trip.

pub mod block;
pub mod config;
pub mod disk_info;
pub mod error;
pub mod free_space;
pub mod generator;
pub mod log;
pub mod read_phase;
pub mod reconnect;
pub mod report;
pub mod run;
pub mod stats;
pub mod verify;
pub mod workspace;
pub mod write_phase;

pub use config::{Mode, TestConfig};
pub use error::{Result, TestError};
pub use report::RunSummary;
pub use run::{run, RunContext};
