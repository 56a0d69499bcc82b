//! Cancellable background tasks owned by a device.
//!
//! Each worker runs on a named OS thread and receives a [`CancelToken`]
//! that combines a per-task stop flag with the process-wide
//! [`Shutdown`].  Workers sleep through [`CancelToken::sleep`], which
//! wakes at least once per poll interval, so a stop request is noticed
//! within one poll period.
//!
//! ## Cancel-and-replace
//!
//! [`stop_active`] implements the device-side transition protocol:
//!
//! ```text
//!   lock ─▶ take handle ─▶ request stop ─▶ unlock ─▶ bounded join
//!     ▲                                                  │
//!     └──────────── relock, repeat until slot empty ◀────┘
//! ```
//!
//! The caller gets the guard back with the slot empty and can then
//! spawn the replacement or park outputs while still holding the lock.
//! If a join exceeds its bound the task is detached and the caller is
//! told so; it must force-reset and report `BusyTransition`.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use log::{debug, warn};
use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::app::ports::HalPort;
use crate::error::{DeviceError, Result};
use crate::shutdown::Shutdown;

/// What a worker does; used for thread names and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Melody,
    Countdown,
    AutoMonitor,
}

impl TaskKind {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Melody => "melody",
            Self::Countdown => "countdown",
            Self::AutoMonitor => "auto-monitor",
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Cancellation
// ───────────────────────────────────────────────────────────────

/// Stop signal observed by a single worker.
#[derive(Debug, Clone)]
pub struct CancelToken {
    stop: Arc<AtomicBool>,
    shutdown: Shutdown,
    poll: Duration,
}

impl CancelToken {
    pub fn new(shutdown: Shutdown, poll: Duration) -> Self {
        Self {
            stop: Arc::new(AtomicBool::new(false)),
            shutdown,
            poll,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.stop.load(Ordering::Acquire) || self.shutdown.is_triggered()
    }

    pub fn cancel(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Sleep `total` in poll-sized slices.  Returns `false` as soon as
    /// cancellation is observed, `true` if the full period elapsed.
    pub fn sleep(&self, hal: &dyn HalPort, total: Duration) -> bool {
        let deadline = Instant::now() + total;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            let slice = (deadline - now).min(self.poll);
            hal.sleep_millis(slice.as_millis().max(1) as u64);
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Worker handle
// ───────────────────────────────────────────────────────────────

#[derive(Default)]
struct Completion {
    done: Mutex<bool>,
    cv: Condvar,
}

/// Marks the worker finished when dropped, including during unwinding.
struct ExitGuard(Arc<Completion>);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        *self.0.done.lock() = true;
        self.0.cv.notify_all();
    }
}

/// A running worker thread plus the means to stop and join it.
pub struct BackgroundTask {
    id: u32,
    kind: TaskKind,
    token: CancelToken,
    completion: Arc<Completion>,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundTask {
    /// Start `work` on a thread named `<kind>-<id>`.
    ///
    /// A panic inside `work` is caught and logged; the task then reads as
    /// finished like any other exit.
    pub fn spawn<F>(id: u32, kind: TaskKind, token: CancelToken, work: F) -> Result<Self>
    where
        F: FnOnce(CancelToken) + Send + 'static,
    {
        let completion = Arc::new(Completion::default());
        let guard = ExitGuard(Arc::clone(&completion));
        let worker_token = token.clone();

        let handle = std::thread::Builder::new()
            .name(format!("{}-{}", kind.name(), id))
            .spawn(move || {
                let _guard = guard;
                if catch_unwind(AssertUnwindSafe(|| work(worker_token))).is_err() {
                    warn!("{} task {} panicked; device returns to idle", kind.name(), id);
                }
            })
            .map_err(|e| DeviceError::Spawn(e.to_string()))?;

        debug!("Spawned {} task {}", kind.name(), id);
        Ok(Self {
            id,
            kind,
            token,
            completion,
            handle: Some(handle),
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn is_finished(&self) -> bool {
        *self.completion.done.lock()
    }

    pub fn request_stop(&self) {
        self.token.cancel();
    }

    /// Wait at most `bound` for the worker to exit.  Gives the task back
    /// if it is still running.
    pub fn join_timeout(mut self, bound: Duration) -> core::result::Result<(), Self> {
        let deadline = Instant::now() + bound;
        {
            let mut done = self.completion.done.lock();
            while !*done {
                if self.completion.cv.wait_until(&mut done, deadline).timed_out() {
                    break;
                }
            }
            if !*done {
                drop(done);
                return Err(self);
            }
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        debug!("Joined {} task {}", self.kind.name(), self.id);
        Ok(())
    }

    /// Abandon a worker that ignored its stop request.  The stop flag
    /// stays set, so it exits at its next check without touching outputs.
    pub fn detach(mut self) {
        self.token.cancel();
        self.handle.take();
        warn!("Detached unresponsive {} task {}", self.kind.name(), self.id);
    }
}

// ───────────────────────────────────────────────────────────────
// Per-device task slot
// ───────────────────────────────────────────────────────────────

/// At most one background task per device.
pub struct TaskSlot {
    active: Option<BackgroundTask>,
    next_id: u32,
    shutdown: Shutdown,
    poll: Duration,
}

impl TaskSlot {
    pub fn new(shutdown: Shutdown, poll: Duration) -> Self {
        Self {
            active: None,
            next_id: 1,
            shutdown,
            poll,
        }
    }

    /// True while a worker exists and has not exited yet.
    pub fn is_running(&self) -> bool {
        self.active.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Spawn into an empty slot.  Callers clear the slot with
    /// [`stop_active`] first.
    pub fn start<F>(&mut self, kind: TaskKind, work: F) -> Result<u32>
    where
        F: FnOnce(CancelToken) + Send + 'static,
    {
        debug_assert!(self.active.is_none(), "slot must be empty before spawning");
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);
        let token = CancelToken::new(self.shutdown.clone(), self.poll);
        self.active = Some(BackgroundTask::spawn(id, kind, token, work)?);
        Ok(id)
    }

    /// Id of the task occupying the slot, finished or not.
    pub fn active_id(&self) -> Option<u32> {
        self.active.as_ref().map(BackgroundTask::id)
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_none()
    }

    fn take(&mut self) -> Option<BackgroundTask> {
        self.active.take()
    }
}

/// Device state that owns a [`TaskSlot`].
pub trait TaskHost {
    fn tasks(&mut self) -> &mut TaskSlot;
}

/// How [`stop_active`] left the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Nothing was running.
    Idle,
    /// The previous worker exited and was joined.
    Stopped,
    /// The join bound elapsed; the worker was detached.
    TimedOut,
}

/// Cancel whatever runs in `state`'s slot and wait for it, returning
/// the re-acquired guard with the slot empty.
pub fn stop_active<S: TaskHost>(state: &Mutex<S>, bound: Duration) -> (MutexGuard<'_, S>, StopOutcome) {
    let mut guard = state.lock();
    let mut outcome = StopOutcome::Idle;
    loop {
        let Some(task) = guard.tasks().take() else {
            return (guard, outcome);
        };
        task.request_stop();
        drop(guard);

        let result = task.join_timeout(bound);
        guard = state.lock();
        match result {
            Ok(()) => outcome = StopOutcome::Stopped,
            Err(stuck) => {
                stuck.detach();
                return (guard, StopOutcome::TimedOut);
            }
        }
    }
}

/// Like [`stop_active`], but only if task `id` still owns the slot.
/// `None` means another task replaced it (or the slot was empty) and
/// nothing was touched.
pub fn stop_task<S: TaskHost>(
    state: &Mutex<S>,
    bound: Duration,
    id: u32,
) -> (MutexGuard<'_, S>, Option<StopOutcome>) {
    let mut guard = state.lock();
    if guard.tasks().active_id() != Some(id) {
        return (guard, None);
    }
    let Some(task) = guard.tasks().take() else {
        return (guard, None);
    };
    task.request_stop();
    drop(guard);

    let result = task.join_timeout(bound);
    let guard = state.lock();
    match result {
        Ok(()) => (guard, Some(StopOutcome::Stopped)),
        Err(stuck) => {
            stuck.detach();
            (guard, Some(StopOutcome::TimedOut))
        }
    }
}
