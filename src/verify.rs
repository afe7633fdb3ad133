//! Asynchronous content verification for the read phase.
//!
//! The reader hands every block it has read to [`Verifier::dispatch`] and
//! moves on; verifier threads recompute the content id and delete the file
//! when it matches its name. [`Verifier::finish`] is the barrier: it returns
//! once every dispatched block has been accounted for.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex};

use crate::block::content_id;
use crate::log::RunLog;

/// How long [`Verifier::finish`] waits between progress reports.
pub const SETTLE_POLL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyTally {
    pub completed: usize,
    pub matched: usize,
    /// Ids whose content no longer hashes to the file name.
    pub mismatched: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Matched,
    Mismatched(String),
}

/// Counts finished verifications and wakes waiters on every change.
#[derive(Default)]
pub struct CompletionLatch {
    tally: Mutex<VerifyTally>,
    changed: Condvar,
}

impl CompletionLatch {
    pub fn record(&self, outcome: Outcome) {
        let mut tally = self.tally.lock();
        tally.completed += 1;
        match outcome {
            Outcome::Matched => tally.matched += 1,
            Outcome::Mismatched(id) => tally.mismatched.push(id),
        }
        self.changed.notify_all();
    }

    pub fn completed(&self) -> usize {
        self.tally.lock().completed
    }

    /// Wait up to `timeout` for `expected` completions. Returns whether the
    /// count was reached. Completions short of `expected` do not end the wait.
    pub fn wait_for(&self, expected: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut tally = self.tally.lock();
        while tally.completed < expected {
            if self.changed.wait_until(&mut tally, deadline).timed_out() {
                break;
            }
        }
        tally.completed >= expected
    }

    pub fn snapshot(&self) -> VerifyTally {
        self.tally.lock().clone()
    }
}

struct VerifyJob {
    id: String,
    path: PathBuf,
    data: Vec<u8>,
}

pub struct Verifier {
    jobs: Sender<VerifyJob>,
    workers: Vec<JoinHandle<()>>,
    latch: Arc<CompletionLatch>,
    dispatched: usize,
    log: RunLog,
}

impl Verifier {
    pub fn start(workers: usize, log: &RunLog) -> Self {
        let (job_tx, job_rx) = unbounded();
        let latch = Arc::new(CompletionLatch::default());
        let handles = (0..workers.max(1))
            .map(|id| {
                let job_rx = job_rx.clone();
                let latch = Arc::clone(&latch);
                let worker_log = log.clone();
                thread::Builder::new()
                    .name(format!("verify-{}", id))
                    .spawn(move || verify_loop(job_rx, latch, worker_log))
                    .map_err(|e| log.simple(format!("Failed to spawn verifier {}: {}", id, e)))
            })
            .filter_map(|spawned| spawned.ok())
            .collect();

        Self {
            jobs: job_tx,
            workers: handles,
            latch,
            dispatched: 0,
            log: log.clone(),
        }
    }

    /// Queue `data`, read from `path`, for checking against `id`. Never blocks.
    pub fn dispatch(&mut self, id: String, path: PathBuf, data: Vec<u8>) {
        self.dispatched += 1;
        if let Err(e) = self.jobs.send(VerifyJob { id, path, data }) {
            // No live verifier thread: check inline rather than lose the block.
            let job = e.into_inner();
            self.latch.record(verify_block(&job, &self.log));
        }
    }

    pub fn dispatched(&self) -> usize {
        self.dispatched
    }

    pub fn completed(&self) -> usize {
        self.latch.completed()
    }

    /// Wait until every dispatched block has been verified, then join the
    /// verifier threads.
    pub fn finish(self) -> VerifyTally {
        let Verifier {
            jobs,
            workers,
            latch,
            dispatched: expected,
            log,
        } = self;
        drop(jobs);

        while !latch.wait_for(expected, SETTLE_POLL) {
            if workers.iter().all(|h| h.is_finished()) {
                if latch.completed() < expected {
                    log.simple(format!(
                        "Verifiers exited with {}/{} blocks checked",
                        latch.completed(),
                        expected
                    ));
                }
                break;
            }
            log.simple(format!(
                "Waiting for verification {}/{}",
                latch.completed(),
                expected
            ));
        }
        for handle in workers {
            if let Err(e) = handle.join() {
                log.simple(format!("A verifier panicked: {:?}", e));
            }
        }
        latch.snapshot()
    }
}

fn verify_loop(job_rx: Receiver<VerifyJob>, latch: Arc<CompletionLatch>, log: RunLog) {
    for job in job_rx.iter() {
        latch.record(verify_block(&job, &log));
    }
}

fn verify_block(job: &VerifyJob, log: &RunLog) -> Outcome {
    if content_id(&job.data) == job.id {
        if let Err(e) = fs::remove_file(&job.path) {
            log.error("Remove Error", &job.id, &e.to_string());
        }
        Outcome::Matched
    } else {
        log.error("Check Error", &job.id, "content does not match its name");
        Outcome::Mismatched(job.id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Block;
    use tempfile::tempdir;

    #[test]
    fn latch_counts_and_wakes() {
        let latch = Arc::new(CompletionLatch::default());
        assert!(latch.wait_for(0, Duration::ZERO));
        assert!(!latch.wait_for(2, Duration::from_millis(1)));

        let l2 = Arc::clone(&latch);
        let h = thread::spawn(move || {
            l2.record(Outcome::Matched);
            l2.record(Outcome::Mismatched("abcd0123".into()));
        });
        while !latch.wait_for(2, Duration::from_millis(50)) {}
        h.join().unwrap();

        let tally = latch.snapshot();
        assert_eq!(tally.completed, 2);
        assert_eq!(tally.matched, 1);
        assert_eq!(tally.mismatched, vec!["abcd0123".to_string()]);
    }

    #[test]
    fn partial_completion_does_not_end_wait() {
        let latch = Arc::new(CompletionLatch::default());
        let l2 = Arc::clone(&latch);
        let h = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            l2.record(Outcome::Matched);
        });
        let started = Instant::now();
        assert!(!latch.wait_for(2, Duration::from_millis(200)));
        assert!(started.elapsed() >= Duration::from_millis(200));
        h.join().unwrap();
        assert_eq!(latch.completed(), 1);
    }

    #[test]
    fn finish_reports_progress_once_per_poll() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("run.log");
        let log = RunLog::with_file(&log_path).unwrap();
        let mut verifier = Verifier::start(1, &log);

        let data = vec![0x5au8; 1024 * 1024];
        let id = content_id(&data);
        for i in 0..100 {
            let path = dir.path().join(format!("blk{}", i));
            fs::write(&path, &data).unwrap();
            verifier.dispatch(id.clone(), path, data.clone());
        }
        let started = Instant::now();
        let tally = verifier.finish();
        let took = started.elapsed();
        assert_eq!(tally.matched, 100);

        let text = fs::read_to_string(&log_path).unwrap();
        let waiting = text.matches("Waiting for verification").count() as u128;
        assert!(
            waiting <= took.as_millis() / SETTLE_POLL.as_millis() + 1,
            "{} progress lines in {:?}",
            waiting,
            took
        );
    }

    #[test]
    fn good_blocks_deleted_bad_blocks_kept() {
        let dir = tempdir().unwrap();
        let log = RunLog::stderr();
        let mut verifier = Verifier::start(2, &log);

        let mut good = Vec::new();
        for _ in 0..4 {
            let block = Block::generate(0.01).unwrap();
            let path = dir.path().join(block.id());
            fs::write(&path, block.data()).unwrap();
            verifier.dispatch(block.id().to_string(), path.clone(), block.data().to_vec());
            good.push(path);
        }

        let bad = Block::generate(0.01).unwrap();
        let bad_path = dir.path().join(bad.id());
        let mut corrupted = bad.data().to_vec();
        corrupted[17] ^= 0xff;
        fs::write(&bad_path, &corrupted).unwrap();
        verifier.dispatch(bad.id().to_string(), bad_path.clone(), corrupted);

        assert_eq!(verifier.dispatched(), 5);
        let tally = verifier.finish();
        assert_eq!(tally.completed, 5);
        assert_eq!(tally.matched, 4);
        assert_eq!(tally.mismatched, vec![bad.id().to_string()]);
        assert!(good.iter().all(|p| !p.exists()));
        assert!(bad_path.exists());
    }

    #[test]
    fn finish_without_work() {
        let verifier = Verifier::start(3, &RunLog::stderr());
        assert_eq!(verifier.finish(), VerifyTally::default());
    }
}
