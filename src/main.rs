//! src/main.rs

use std::panic;
use std::path::PathBuf;
use std::process;

use clap::Parser;

use disk_filltest::disk_info::{disk_info, host_info};
use disk_filltest::free_space::SystemFreeSpace;
use disk_filltest::log::RunLog;
use disk_filltest::reconnect::CwdReconnect;
use disk_filltest::stats::DEFAULT_CHECKPOINT_FRACTION;
use disk_filltest::{run, Result, RunContext, RunSummary, TestConfig};

#[derive(Parser, Debug)]
#[clap(
    author,
    version,
    about = "Fill a disk with self-checking files, then read them back and keep only the bad ones",
    long_about = None
)]
struct Cli {
    /// [filesize] [w|r|t|rw] [maxsize]: block size in MB (k/m/g suffix
    /// accepted), mode, and planned write volume in MB.
    #[clap(value_name = "TOKEN", num_args = 0..=3, allow_hyphen_values = true)]
    tokens: Vec<String>,
    /// Mounted directory of the disk under test.
    #[clap(long, default_value = ".")]
    path: PathBuf,
    /// Fraction of the planned blocks between recorded checkpoints.
    #[clap(long, default_value_t = DEFAULT_CHECKPOINT_FRACTION)]
    checkpoint: f64,
    /// Also append the operator log to this file.
    #[clap(long)]
    log_file: Option<PathBuf>,
    /// Print a JSON summary of the run to stdout.
    #[clap(long)]
    json: bool,
    /// Hide the progress bar; log lines still go to stderr.
    #[clap(long)]
    no_progress: bool,
}

fn main() {
    let cli = Cli::parse();
    let log = match &cli.log_file {
        Some(path) => RunLog::with_file(path).unwrap_or_else(|e| {
            eprintln!(
                "Failed to open log file '{}': {}. Further logs will only go to stderr.",
                path.display(),
                e
            );
            RunLog::stderr()
        }),
        None => RunLog::stderr(),
    };

    let main_result = panic::catch_unwind(panic::AssertUnwindSafe(|| main_logic(&cli, &log)));
    let exit_code = match main_result {
        Ok(Ok(_)) => 0,
        Ok(Err(e)) => {
            log.simple(format!("Run failed: {}", e));
            e.exit_code()
        }
        Err(panic_payload) => {
            let mut panic_msg = String::from("A critical error occurred: run panicked!");
            if let Some(s) = panic_payload.downcast_ref::<String>() {
                panic_msg.push_str(&format!("\nPanic message: {}", s));
            } else if let Some(s) = panic_payload.downcast_ref::<&str>() {
                panic_msg.push_str(&format!("\nPanic message: {}", s));
            } else {
                panic_msg.push_str("\nPanic payload: (type not recognized as string)");
            }
            log.simple(panic_msg);
            101
        }
    };
    process::exit(exit_code);
}

fn main_logic(cli: &Cli, log: &RunLog) -> Result<RunSummary> {
    log.simple(format!("disk_filltest v{}", env!("CARGO_PKG_VERSION")));
    log.simple(format!("CLI: {:?}", cli));
    log.simple(host_info());

    let mut cfg = TestConfig {
        root: cli.path.clone(),
        show_progress: !cli.no_progress,
        ..TestConfig::default()
    };
    cfg.apply_tokens(cli.tokens.as_slice());
    cfg.set_checkpoint_fraction(cli.checkpoint);
    log.simple(format!("Mode: {:?}", cfg.mode));

    match disk_info(&cfg.root) {
        Ok(info) => log.simple(info),
        Err(_) => log.simple(format!(
            "Could not retrieve disk info for path: {}",
            cfg.root.display()
        )),
    }

    let reconnect = CwdReconnect::new(cfg.reconnect_backoff);
    let ctx = RunContext {
        free_space: &SystemFreeSpace,
        reconnect: &reconnect,
        log: log.clone(),
    };
    let summary = run(&cfg, &ctx)?;

    let bad = summary.bad_blocks();
    if !bad.is_empty() {
        log.simple(format!(
            "{} bad block(s) left in {} for inspection",
            bad.len(),
            summary.root.join(disk_filltest::workspace::WORK_DIR_NAME).display()
        ));
    }
    if cli.json {
        println!("{:#}", summary.to_json());
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn every_option_has_help_text() {
        let cmd = Cli::command();
        for arg in cmd.get_arguments() {
            assert!(arg.get_help().is_some(), "{} has no help text", arg.get_id());
        }
    }

    #[test]
    fn positional_tokens_accept_dashed_modes() {
        let cli = Cli::try_parse_from(["disk_filltest", "0.004", "-w", "100"]).unwrap();
        assert_eq!(cli.tokens, ["0.004", "-w", "100"]);
        assert!(!cli.no_progress);
    }
}
