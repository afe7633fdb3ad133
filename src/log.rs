//! Operator log shared by the phase loops and the verifier threads.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use chrono::Local;
use indicatif::{ProgressBar, ProgressStyle};
use parking_lot::Mutex;

pub fn current_timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Bar for `len` blocks with the live statistics as its message.
pub fn progress_bar(len: u64, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len);
    let style = ProgressStyle::with_template(
        "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta_precise})\n{msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("##-");
    pb.set_style(style);
    pb
}

#[derive(Clone, Default)]
pub struct RunLog {
    file: Option<Arc<Mutex<File>>>,
    progress: Arc<Mutex<Option<ProgressBar>>>,
}

impl RunLog {
    /// Log to stderr only.
    pub fn stderr() -> Self {
        Self::default()
    }

    /// Log to stderr and append to `path`.
    pub fn with_file(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Some(Arc::new(Mutex::new(file))),
            progress: Arc::default(),
        })
    }

    /// Route console output through `pb` until [`RunLog::detach`]. A hidden
    /// bar would swallow the lines, so it is not attached.
    pub fn attach(&self, pb: &ProgressBar) {
        if pb.is_hidden() {
            return;
        }
        *self.progress.lock() = Some(pb.clone());
    }

    pub fn detach(&self) {
        self.progress.lock().take();
    }

    pub fn simple<S: AsRef<str>>(&self, msg: S) {
        self.emit(format!("[{}] {}", current_timestamp(), msg.as_ref()));
    }

    pub fn error(&self, category: &str, subject: &str, err_desc: &str) {
        self.emit(format!(
            "[{}] {} {}: {}",
            current_timestamp(),
            category,
            subject,
            err_desc
        ));
    }

    fn emit(&self, full_message: String) {
        match self.progress.lock().as_ref() {
            Some(pb) => pb.println(full_message.as_str()),
            None => eprintln!("{}", full_message),
        }
        if let Some(ref lf_arc) = self.file {
            let mut lf_guard = lf_arc.lock();
            let _ = writeln!(*lf_guard, "{}", full_message);
            let _ = lf_guard.flush();
        }
    }
}
