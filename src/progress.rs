//! Per-file progress display
//!
//! The engine calls [`FileProgress::update`] once per chunk with the
//! cumulative byte count. Concurrent sender connections each get their own
//! bar inside one [`MultiProgress`].

use indicatif::{DecimalBytes, MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Instant;

pub trait Progress: Send + Sync {
    fn begin(&self, name: &str, total: u64) -> Box<dyn FileProgress>;
}

pub trait FileProgress: Send {
    fn update(&mut self, transferred: u64);
    fn finish(&mut self);
}

pub struct NoProgress;

impl Progress for NoProgress {
    fn begin(&self, _name: &str, _total: u64) -> Box<dyn FileProgress> {
        Box::new(NoFileProgress)
    }
}

struct NoFileProgress;

impl FileProgress for NoFileProgress {
    fn update(&mut self, _transferred: u64) {}
    fn finish(&mut self) {}
}

/// Terminal bars in the style `name [=====>   ] 42% 1.20 MB/2.85 MB 3.1 MB/s`.
pub struct BarProgress {
    multi: MultiProgress,
}

impl BarProgress {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::with_draw_target(ProgressDrawTarget::stdout()),
        }
    }

    fn style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{prefix} [{bar:50.green}] {percent:>3}% {msg} {binary_bytes_per_sec:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ")
    }
}

impl Default for BarProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl Progress for BarProgress {
    fn begin(&self, name: &str, total: u64) -> Box<dyn FileProgress> {
        let bar = self.multi.add(ProgressBar::new(total));
        bar.set_style(Self::style());
        bar.set_prefix(name.to_string());
        let mut progress = BarFileProgress {
            bar,
            total,
            started: Instant::now(),
        };
        progress.update(0);
        Box::new(progress)
    }
}

struct BarFileProgress {
    bar: ProgressBar,
    total: u64,
    started: Instant,
}

impl FileProgress for BarFileProgress {
    fn update(&mut self, transferred: u64) {
        let current = transferred.min(self.total);
        self.bar.set_position(current);
        self.bar.set_message(format!(
            "{}/{}",
            DecimalBytes(current),
            DecimalBytes(self.total)
        ));
    }

    fn finish(&mut self) {
        self.update(self.total);
        self.bar.finish_with_message(format!(
            "{} in {:.1}s",
            DecimalBytes(self.total),
            self.started.elapsed().as_secs_f64()
        ));
    }
}
