//! Worker-task runlevels and bounded-wait signals.
//!
//! Shutdown is cooperative: the controller flips a runlevel to
//! `Terminating`, wakes the task, and polls with a bounded wait. No
//! unbounded blocking on a shared resource anywhere.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Duration;

use tokio::sync::Notify;

// ── Runlevel ─────────────────────────────────────────────────────

/// Lifecycle state of a worker task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Runlevel {
    /// The task has not been spawned yet.
    #[default]
    Unstarted = 0,
    /// The task is running its loop.
    Running = 1,
    /// The task was asked to terminate and has not yet done so.
    Terminating = 2,
    /// The task observed the termination request and returned.
    Terminated = 3,
}

impl Runlevel {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Running,
            2 => Self::Terminating,
            3 => Self::Terminated,
            _ => Self::Unstarted,
        }
    }
}

/// Atomic holder for a worker task's [`Runlevel`].
///
/// Written by the owning task (`Unstarted → Running → Terminated`) and by
/// the controller requesting shutdown (`→ Terminating`).
#[derive(Debug, Default)]
pub struct RunlevelCell(AtomicU8);

impl RunlevelCell {
    pub fn set(&self, level: Runlevel) {
        self.0.store(level as u8, Ordering::SeqCst);
    }

    pub fn get(&self) -> Runlevel {
        Runlevel::from_u8(self.0.load(Ordering::SeqCst))
    }

    /// Whether the owning task should keep looping.
    pub fn is_running(&self) -> bool {
        self.get() == Runlevel::Running
    }

    /// Poll until the runlevel reaches `target`, up to `grace`.
    ///
    /// Returns `true` if the target was observed within the bound.
    pub async fn wait_for(&self, target: Runlevel, grace: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + grace;
        loop {
            if self.get() == target {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

// ── Signal ───────────────────────────────────────────────────────

/// A raised/cleared flag paired with a wakeup, the condition-variable
/// half of each producer/consumer pair.
///
/// The flag survives wakeups (a raise before anyone waits is not lost),
/// and every wait is bounded.
#[derive(Debug, Default)]
pub struct Signal {
    flag: AtomicBool,
    notify: Notify,
}

impl Signal {
    /// Raise the flag and wake all waiters.
    pub fn raise(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Wake waiters without raising the flag (used for shutdown).
    pub fn wake(&self) {
        self.notify.notify_waiters();
    }

    /// Clear the flag.
    pub fn clear(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    /// Whether the flag is currently raised.
    pub fn is_raised(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Wait up to `bound` for the flag; returns whether it is raised.
    ///
    /// The flag is re-checked after registering for notification so a
    /// raise racing the wait cannot be missed.
    pub async fn wait_timeout(&self, bound: Duration) -> bool {
        if self.is_raised() {
            return true;
        }
        let notified = self.notify.notified();
        if self.is_raised() {
            return true;
        }
        let _ = tokio::time::timeout(bound, notified).await;
        self.is_raised()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn runlevel_wait_observes_target() {
        let cell = Arc::new(RunlevelCell::default());
        let c = Arc::clone(&cell);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            c.set(Runlevel::Running);
        });
        assert!(cell.wait_for(Runlevel::Running, Duration::from_millis(500)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn runlevel_wait_gives_up() {
        let cell = RunlevelCell::default();
        assert!(!cell.wait_for(Runlevel::Running, Duration::from_millis(100)).await);
        assert_eq!(cell.get(), Runlevel::Unstarted);
    }

    #[tokio::test]
    async fn signal_raise_before_wait_is_not_lost() {
        let sig = Signal::default();
        sig.raise();
        assert!(sig.wait_timeout(Duration::from_millis(1)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn signal_wait_times_out_clear() {
        let sig = Signal::default();
        assert!(!sig.wait_timeout(Duration::from_millis(100)).await);
    }

    #[tokio::test]
    async fn signal_wakes_concurrent_waiter() {
        let sig = Arc::new(Signal::default());
        let s = Arc::clone(&sig);
        let waiter =
            tokio::spawn(async move { s.wait_timeout(Duration::from_secs(5)).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        sig.raise();
        assert!(waiter.await.unwrap());
    }
}
