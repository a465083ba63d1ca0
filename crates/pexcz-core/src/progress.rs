//! Progress reporting module

/// Receiver of progress updates for long-running operations
pub trait ProgressSink {
    /// Called once before any work with the number of items to process
    fn start(&mut self, total: u64);

    /// Called when the number of completed items grows
    fn update(&mut self, completed: u64, total: u64);

    /// Called once when the operation has finished successfully
    fn finish(&mut self);
}

/// No-op progress sink
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn start(&mut self, _total: u64) {}
    fn update(&mut self, _completed: u64, _total: u64) {}
    fn finish(&mut self) {}
}

/// Turns fractional completion signals into monotonic item counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressTracker {
    completed: u64,
    total: u64,
}

impl ProgressTracker {
    pub fn new(total: u64) -> Self {
        Self {
            completed: 0,
            total,
        }
    }

    pub fn completed(&self) -> u64 {
        self.completed
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Record a completion fraction. Returns the new item count when it
    /// grew, `None` when the signal would not move progress forward.
    pub fn observe(&mut self, fraction: f64) -> Option<u64> {
        if fraction.is_nan() {
            return None;
        }
        let total = self.total as f64;
        let completed = (fraction * total).clamp(0.0, total).round() as u64;
        if completed > self.completed {
            self.completed = completed;
            Some(completed)
        } else {
            None
        }
    }

    /// Record a fraction and forward any growth to `sink`
    pub fn report(&mut self, fraction: f64, sink: &mut dyn ProgressSink) {
        if let Some(completed) = self.observe(fraction) {
            sink.update(completed, self.total);
        }
    }
}
