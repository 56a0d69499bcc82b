//! Process-wide shutdown signal.
//!
//! One [`Shutdown`] is created by the process controller and handed to
//! every component at construction.  Device workers, the session loop
//! and the accept loop all observe the same token; `QUIT` and the
//! signal handler trigger it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cloneable cancellation token shared by the whole process.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown.  Idempotent; returns `true` on the first call.
    pub fn trigger(&self) -> bool {
        !self.flag.swap(true, Ordering::SeqCst)
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
