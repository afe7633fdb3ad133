//! Pool of threads that keep a bounded queue of ready-to-write blocks full.
//!
//! Filling a multi-megabyte buffer from the OS random source and hashing it
//! costs CPU time; running that ahead of the writer keeps the measured write
//! latency about the disk only. Shutdown is cooperative: dropping the shutdown
//! sender disconnects a channel every worker watches between generations and
//! while blocked on a full queue.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, select, Receiver, Sender, TryRecvError};

use crate::block::Block;
use crate::error::{Result, TestError};
use crate::log::RunLog;

/// Available parallelism, never fewer than two workers.
pub fn default_workers() -> usize {
    num_cpus::get().max(2)
}

pub struct GeneratorPool {
    blocks: Receiver<Block>,
    shutdown: Option<Sender<()>>,
    workers: Vec<JoinHandle<()>>,
    log: RunLog,
}

impl GeneratorPool {
    /// Spawn `workers` generators of `size_mb` blocks. The queue holds as many
    /// blocks as there are workers.
    pub fn start(size_mb: f64, workers: usize, log: &RunLog) -> Self {
        let workers = workers.max(1);
        let (block_tx, block_rx) = bounded(workers);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);

        let handles = (0..workers)
            .map(|id| {
                let block_tx = block_tx.clone();
                let shutdown_rx = shutdown_rx.clone();
                let worker_log = log.clone();
                thread::Builder::new()
                    .name(format!("block-gen-{}", id))
                    .spawn(move || generate_loop(size_mb, block_tx, shutdown_rx, worker_log))
                    .map_err(|e| log.simple(format!("Failed to spawn block generator {}: {}", id, e)))
            })
            .filter_map(|spawned| spawned.ok())
            .collect();

        Self {
            blocks: block_rx,
            shutdown: Some(shutdown_tx),
            workers: handles,
            log: log.clone(),
        }
    }

    /// Take the next ready block, waiting for one if the queue is empty.
    pub fn next_block(&self) -> Result<Block> {
        self.blocks
            .recv()
            .map_err(|_| TestError::GeneratorsExhausted)
    }

    /// Blocks currently waiting in the queue.
    pub fn queued(&self) -> usize {
        self.blocks.len()
    }

    /// Workers not yet joined.
    pub fn running_workers(&self) -> usize {
        self.workers.len()
    }

    /// Signal every worker to exit and wait until all of them have.
    pub fn stop(&mut self) {
        self.shutdown.take();
        for handle in self.workers.drain(..) {
            if let Err(e) = handle.join() {
                self.log
                    .simple(format!("A block generator panicked: {:?}", e));
            }
        }
    }
}

impl Drop for GeneratorPool {
    fn drop(&mut self) {
        self.stop();
    }
}

fn generate_loop(size_mb: f64, block_tx: Sender<Block>, shutdown_rx: Receiver<()>, log: RunLog) {
    loop {
        if let Err(TryRecvError::Disconnected) = shutdown_rx.try_recv() {
            return;
        }
        let block = match Block::generate(size_mb) {
            Ok(block) => block,
            Err(e) => {
                log.simple(format!("Block generator stopped: {}", e));
                return;
            }
        };
        select! {
            send(block_tx, block) -> res => {
                if res.is_err() {
                    return;
                }
            }
            recv(shutdown_rx) -> _ => return,
        }
    }
}
