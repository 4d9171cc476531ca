use serde::Serialize;

/// Position of a bulk run: `current` of `total` messages handled so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Progress {
    pub current: usize,
    pub total: usize,
}

/// Receives progress updates from a dispatch run.
pub trait ProgressObserver: Send + Sync {
    fn report(&self, progress: Progress);
}

/// Discards updates.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn report(&self, _progress: Progress) {}
}
