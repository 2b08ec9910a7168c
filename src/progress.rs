use log::info;

/// Determinate progress of a long running sweep.
pub trait ProgressReporter: Send {
    fn start(&mut self, total: usize);
    fn switch_to_determinate(&mut self, total: usize);
    fn progress(&mut self, label: &str, current: usize);
    fn finish(&mut self);
}

/// Progress reported through the log, at most every `step` units.
pub struct LogProgress {
    name: String,
    total: usize,
    step: usize,
    last_reported: usize,
}

impl LogProgress {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            total: 0,
            step: 1,
            last_reported: 0,
        }
    }
}

impl ProgressReporter for LogProgress {
    fn start(&mut self, total: usize) {
        self.total = total;
        self.last_reported = 0;
        info!("{}: started", self.name);
    }

    fn switch_to_determinate(&mut self, total: usize) {
        self.total = total;
        // about twenty progress lines per sweep
        self.step = (total / 20).max(1);
        info!("{}: {} requests", self.name, total);
    }

    fn progress(&mut self, label: &str, current: usize) {
        if current >= self.last_reported + self.step || current == self.total {
            self.last_reported = current;
            info!("{}: {} ({}/{})", self.name, label, current, self.total);
        }
    }

    fn finish(&mut self) {
        info!("{}: finished", self.name);
    }
}

/// Discards all progress.
#[derive(Debug, Default)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn start(&mut self, _total: usize) {}
    fn switch_to_determinate(&mut self, _total: usize) {}
    fn progress(&mut self, _label: &str, _current: usize) {}
    fn finish(&mut self) {}
}
