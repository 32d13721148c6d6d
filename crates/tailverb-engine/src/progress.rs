use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Receives frame counters as a run advances. Presentation is up to the
/// implementor; both methods default to doing nothing.
pub trait Progress {
    /// Called after every body block. `frames_done` never exceeds `total_frames`.
    fn body(&mut self, _frames_done: u64, _total_frames: u64, _sample_rate: u32) {}
    /// Called after every appended tail block. The tail length is not known
    /// in advance.
    fn tail(&mut self, _tail_frames: u64, _sample_rate: u32) {}
}

pub struct NoProgress;

impl Progress for NoProgress {}

/// Shared flag checked between chunks.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing flag, e.g. one a signal handler sets.
    pub fn from_flag(flag: Arc<AtomicBool>) -> Self {
        Self(flag)
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
