use anyhow::Result;
use chrono::Utc;
use crossterm::style::{Color, Stylize};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Error,
    Warning,
    Info,
    Success,
}

impl Level {
    pub fn tag(self) -> &'static str {
        match self {
            Level::Error => "ERROR",
            Level::Warning => "WARNING",
            Level::Info => "INFO",
            Level::Success => "SUCCESS",
        }
    }

    fn color(self) -> Color {
        match self {
            Level::Error => Color::Red,
            Level::Warning => Color::Yellow,
            Level::Info => Color::Blue,
            Level::Success => Color::Green,
        }
    }
}

/// Notification sink for the transfer engine. The engine only reports;
/// whatever state a sink keeps is its own.
pub trait Logger: Send + Sync {
    fn log(&self, _level: Level, _msg: &str) {}

    fn error(&self, msg: &str) {
        self.log(Level::Error, msg);
    }
    fn warning(&self, msg: &str) {
        self.log(Level::Warning, msg);
    }
    fn info(&self, msg: &str) {
        self.log(Level::Info, msg);
    }
    fn success(&self, msg: &str) {
        self.log(Level::Success, msg);
    }

    fn connected(&self, peer: &str) {
        self.info(&format!("connected with {}", peer));
    }
    fn header_sent(&self, kind: &str, detail: &str) {
        self.log(Level::Info, &format!("{} sent: {}", kind, detail));
    }
    fn chunk_failed(&self, name: &str, seq: u32, reason: &str) {
        self.error(&format!("chunk {} of {} failed: {}", seq, name, reason));
    }
    fn entry_skipped(&self, path: &Path, reason: &str) {
        self.warning(&format!("skipping {}: {}", path.display(), reason));
    }
    fn file_done(&self, name: &str, bytes: u64) {
        self.success(&format!("{} ({} bytes)", name, bytes));
    }
}

pub struct NoopLogger;
impl Logger for NoopLogger {}

/// Severity-tagged, coloured lines. Errors go to stderr.
pub struct ConsoleLogger {
    verbose: bool,
}

impl ConsoleLogger {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl Logger for ConsoleLogger {
    fn log(&self, level: Level, msg: &str) {
        let prefix = format!("[{}]: ", level.tag()).with(level.color());
        match level {
            Level::Error => eprintln!("{}{}", prefix, msg),
            _ => println!("{}{}", prefix, msg),
        }
    }

    // Per-header lines are noise unless asked for
    fn header_sent(&self, kind: &str, detail: &str) {
        if self.verbose {
            self.info(&format!("{} sent: {}", kind, detail));
        }
    }
}

pub struct TextLogger {
    file: Mutex<File>,
}

impl TextLogger {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(f),
        })
    }

    fn line(&self, s: &str) {
        let mut f = self.file.lock();
        let _ = writeln!(f, "[{}] {}", Utc::now().to_rfc3339(), s);
    }
}

impl Logger for TextLogger {
    fn log(&self, level: Level, msg: &str) {
        self.line(&format!("{} {}", level.tag(), msg));
    }
}

/// Fans every notification out to several sinks.
pub struct TeeLogger {
    sinks: Vec<Arc<dyn Logger>>,
}

impl TeeLogger {
    pub fn new(sinks: Vec<Arc<dyn Logger>>) -> Self {
        Self { sinks }
    }
}

impl Logger for TeeLogger {
    fn log(&self, level: Level, msg: &str) {
        for sink in &self.sinks {
            sink.log(level, msg);
        }
    }
    fn header_sent(&self, kind: &str, detail: &str) {
        for sink in &self.sinks {
            sink.header_sent(kind, detail);
        }
    }
}
