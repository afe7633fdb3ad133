//! Fill the device with content-addressed blocks and time every write.

use std::fs;
use std::time::{Duration, Instant};

use indicatif::ProgressBar;

use crate::block::{block_len, write_durable, Block};
use crate::config::TestConfig;
use crate::error::{Result, TestError};
use crate::generator::GeneratorPool;
use crate::log::progress_bar;
use crate::reconnect::wait_for_device;
use crate::run::RunContext;
use crate::stats::{PhaseScore, PhaseSession};
use crate::workspace::{Workspace, MARKER_FILE};

const MIB_F: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone)]
pub struct WriteOutcome {
    pub capacity_bytes: u64,
    pub blocks_written: usize,
    pub score: PhaseScore,
    pub marker_written: bool,
    /// Id of the block sized to the space left after the planned blocks.
    pub filler: Option<String>,
}

pub fn run_write_phase(
    ws: &Workspace,
    cfg: &TestConfig,
    ctx: &RunContext<'_>,
) -> Result<WriteOutcome> {
    let block_bytes = block_len(cfg.block_mb).ok_or(TestError::InvalidBlockSize(cfg.block_mb))?;
    let capacity_bytes = match cfg.capacity_override_mb {
        Some(mb) => (mb * MIB_F).max(0.0) as u64,
        None => ctx.free_space.free_bytes(ws.bad_dir()),
    };
    let planned = (capacity_bytes / block_bytes as u64) as usize;
    let capacity_mb = capacity_bytes as f64 / MIB_F;
    ctx.log.simple(format!(
        "Write phase: {} blocks of {:.3}M into {:.3}M",
        planned, cfg.block_mb, capacity_mb
    ));

    let mut session = PhaseSession::new(cfg.block_mb, planned, capacity_mb, cfg.checkpoint_fraction);
    let pb = progress_bar(planned as u64, cfg.show_progress);
    ctx.log.attach(&pb);
    let looped = write_blocks(ws, cfg, ctx, &mut session, &pb);
    if looped.is_ok() {
        pb.finish();
    } else {
        pb.abandon();
    }
    ctx.log.detach();
    looped?;

    let score = session.into_score();
    let marker_written = match ws.write_marker(&score.render()) {
        Ok(()) => true,
        Err(e) => {
            ctx.log.error("Write Error", MARKER_FILE, &e.to_string());
            false
        }
    };

    let filler = if cfg.capacity_override_mb.is_none() {
        write_filler(ws, ctx)
    } else {
        None
    };

    ctx.log.simple(
        "Write complete, please unplug and reinsert the disk and run this program again",
    );
    Ok(WriteOutcome {
        capacity_bytes,
        blocks_written: planned,
        score,
        marker_written,
        filler,
    })
}

fn write_blocks(
    ws: &Workspace,
    cfg: &TestConfig,
    ctx: &RunContext<'_>,
    session: &mut PhaseSession,
    pb: &ProgressBar,
) -> Result<()> {
    let mut pool = GeneratorPool::start(cfg.block_mb, cfg.generator_workers, &ctx.log);
    for index in 0..session.planned() {
        let block = pool.next_block()?;
        let elapsed = persist_block(ws, &block, ctx);
        if let Some(update) = session.record(index, elapsed) {
            pb.set_message(update.sample.to_string());
            if let Some(line) = update.checkpoint {
                ctx.log.simple(line);
            }
        }
        pb.inc(1);
    }
    pool.stop();
    Ok(())
}

/// Write `block` to its file, riding out disconnects until it sticks.
/// Returns the duration of the successful attempt.
fn persist_block(ws: &Workspace, block: &Block, ctx: &RunContext<'_>) -> Duration {
    let path = ws.block_path(block.id());
    loop {
        let started = Instant::now();
        match write_durable(&path, block.data()) {
            Ok(()) => return started.elapsed(),
            Err(e) => {
                ctx.log.error("Write Error", block.id(), &e.to_string());
                wait_for_device(ctx.reconnect, ws.bad_dir(), &ctx.log);
                let _ = fs::remove_file(&path);
            }
        }
    }
}

/// One last block sized to whatever space is still free, so the read phase
/// covers the whole device.
fn write_filler(ws: &Workspace, ctx: &RunContext<'_>) -> Option<String> {
    let remaining = ctx.free_space.free_bytes(ws.bad_dir());
    if remaining == 0 {
        return None;
    }
    let block = match Block::generate(remaining as f64 / MIB_F) {
        Ok(block) => block,
        Err(e) => {
            ctx.log.simple(format!("Skipping filler block: {}", e));
            return None;
        }
    };
    let path = ws.block_path(block.id());
    match write_durable(&path, block.data()) {
        Ok(()) => {
            ctx.log.simple(format!(
                "Filler block {} ({} bytes) written",
                block.id(),
                block.len()
            ));
            Some(block.id().to_string())
        }
        Err(e) => {
            // A partial filler would read back as a bad block.
            ctx.log.error("Write Error", block.id(), &e.to_string());
            let _ = fs::remove_file(&path);
            None
        }
    }
}
