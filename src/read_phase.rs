//! Read every stored block back, time the reads, and verify contents off the
//! reading thread.

use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use indicatif::ProgressBar;

use crate::config::TestConfig;
use crate::error::Result;
use crate::log::progress_bar;
use crate::reconnect::wait_for_device;
use crate::run::RunContext;
use crate::stats::{PhaseScore, PhaseSession};
use crate::verify::{Verifier, VerifyTally};
use crate::workspace::{Workspace, MARKER_FILE, SCORE_LOG_FILE};

/// Recorded in place of the write score when no finished write phase was
/// found: the space the write phase claimed could not be accounted for.
pub const FRAUD_NOTICE: &str = "\nData Error! Capacity fraud suspected\n";

#[derive(Debug, Clone)]
pub struct ReadOutcome {
    pub files: usize,
    pub score: PhaseScore,
    pub write_score: String,
    pub marker_found: bool,
    pub verified: usize,
    pub bad_blocks: Vec<String>,
}

pub fn run_read_phase(
    ws: &Workspace,
    cfg: &TestConfig,
    ctx: &RunContext<'_>,
) -> Result<ReadOutcome> {
    let (write_score, marker_found) = match ws.read_marker() {
        Ok(text) => {
            ctx.log.simple(format!("Write Speed:\n\n{}", text));
            (text, true)
        }
        Err(e) => {
            ctx.log.error(
                "Data Error",
                MARKER_FILE,
                &format!("no finished write phase recorded ({}), capacity fraud suspected", e),
            );
            (FRAUD_NOTICE.repeat(3), false)
        }
    };

    let files = list_blocks(ws, ctx);
    let total_mb = files.len() as f64 * cfg.block_mb;
    ctx.log.simple(format!(
        "Read phase: {} blocks of {:.3}M ({:.3}M)",
        files.len(),
        cfg.block_mb,
        total_mb
    ));

    let mut session = PhaseSession::new(cfg.block_mb, files.len(), total_mb, cfg.checkpoint_fraction);
    let pb = progress_bar(files.len() as u64, cfg.show_progress);
    ctx.log.attach(&pb);
    let mut verifier = Verifier::start(cfg.verifier_workers, &ctx.log);
    read_blocks(ws, &files, ctx, &mut session, &mut verifier, &pb);
    pb.finish();
    let tally = verifier.finish();
    ctx.log.detach();

    let score = session.into_score();
    if let Err(e) = ws.remove_marker() {
        ctx.log.error("Remove Error", MARKER_FILE, &e.to_string());
    }
    if let Err(e) = ws.append_score(&write_score, &score) {
        ctx.log.error("Write Error", SCORE_LOG_FILE, &e.to_string());
    }
    report(&tally, ctx);

    Ok(ReadOutcome {
        files: files.len(),
        score,
        write_score,
        marker_found,
        verified: tally.matched,
        bad_blocks: tally.mismatched,
    })
}

fn read_blocks(
    ws: &Workspace,
    files: &[String],
    ctx: &RunContext<'_>,
    session: &mut PhaseSession,
    verifier: &mut Verifier,
    pb: &ProgressBar,
) {
    for (index, name) in files.iter().enumerate() {
        let path = ws.block_path(name);
        let (data, elapsed) = read_block(ws, name, &path, ctx);
        verifier.dispatch(name.clone(), path, data);
        if let Some(update) = session.record(index, elapsed) {
            pb.set_message(update.sample.to_string());
            if let Some(line) = update.checkpoint {
                ctx.log.simple(line);
            }
        }
        pb.inc(1);
    }
}

/// Block names, riding out a device that is absent when the phase starts.
fn list_blocks(ws: &Workspace, ctx: &RunContext<'_>) -> Vec<String> {
    loop {
        match ws.block_files() {
            Ok(files) => return files,
            Err(e) => {
                let dir = ws.bad_dir().display().to_string();
                ctx.log.error("Read Error", &dir, &e.to_string());
                wait_for_device(ctx.reconnect, ws.bad_dir(), &ctx.log);
            }
        }
    }
}

/// Read the whole file, riding out disconnects until it succeeds.
pub(crate) fn read_block(
    ws: &Workspace,
    name: &str,
    path: &Path,
    ctx: &RunContext<'_>,
) -> (Vec<u8>, Duration) {
    loop {
        let started = Instant::now();
        match fs::read(path) {
            Ok(data) => return (data, started.elapsed()),
            Err(e) => {
                ctx.log.error("Read Error", name, &e.to_string());
                wait_for_device(ctx.reconnect, ws.bad_dir(), &ctx.log);
            }
        }
    }
}

fn report(tally: &VerifyTally, ctx: &RunContext<'_>) {
    if tally.mismatched.is_empty() {
        ctx.log.simple(format!(
            "Test complete: {} blocks verified, no bad blocks",
            tally.matched
        ));
    } else {
        ctx.log.simple(format!(
            "Test complete: {} blocks verified, {} bad blocks kept for inspection: {}",
            tally.matched,
            tally.mismatched.len(),
            tally.mismatched.join(", ")
        ));
    }
}
