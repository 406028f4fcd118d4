use crate::utils::lock;
use crate::worker::CancelToken;
use std::sync::{Condvar, Mutex, PoisonError};

#[allow(unused_imports)]
use crate::schedule::Schedule;

/// [`Monitor`] is the condition-variable primitive a completed task uses to publish
/// its completion to every dependent waiting across threads. Completion is carried
/// by a **monotone epoch counter** rather than a boolean: each publication bumps the
/// epoch, and a dependent waits until the epoch moves past the last value it
/// observed. Under a repeating schedule this makes per-iteration resets implicit,
/// the dependent simply requires one fresh publication per iteration
///
/// # Constructor(s)
/// Monitors are created via [`Monitor::new`] with the epoch at zero. The schedule
/// runtime resets them through [`Monitor::reset`] whenever a run begins, so a
/// finished schedule can be started again
///
/// # Usage Note(s)
/// [`Monitor::interrupt`] acquires the epoch lock before broadcasting. A waiter
/// checks its [`CancelToken`] only while holding that same lock, so a cancel
/// followed by an interrupt can never slip between the waiter's check and its wait,
/// the wake is never missed
///
/// # See Also
/// - [`Monitor::publish`]
/// - [`Monitor::wait_past`]
/// - [`CancelToken`]
#[derive(Debug, Default)]
pub struct Monitor {
    epoch: Mutex<u64>,
    signal: Condvar,
}

impl Monitor {
    /// Creates / Constructs a new [`Monitor`] instance with its epoch at zero
    ///
    /// # See Also
    /// - [`Monitor`]
    pub fn new() -> Self {
        Self { epoch: Mutex::new(0), signal: Condvar::new() }
    }

    /// The epoch as currently published
    pub fn epoch(&self) -> u64 {
        *lock(&self.epoch)
    }

    /// Publishes one completion: bumps the epoch and broadcasts to every waiter.
    /// Broadcast (rather than single wake) matters because a task with several
    /// dependents must release all of them at once, none may be starved
    ///
    /// # See Also
    /// - [`Monitor::wait_past`]
    pub fn publish(&self) {
        let mut epoch = lock(&self.epoch);
        *epoch += 1;
        self.signal.notify_all();
    }

    /// Broadcasts to every waiter without publishing a completion. The schedule
    /// runtime calls this on every monitor when stopping, waiters then observe
    /// their cancelled token and wind down
    ///
    /// # See Also
    /// - [`Monitor::wait_past`]
    /// - [`CancelToken`]
    pub fn interrupt(&self) {
        let _epoch = lock(&self.epoch);
        self.signal.notify_all();
    }

    /// Rewinds the epoch to zero. Only sanctioned while no worker can be waiting,
    /// which [`Schedule::start`] guarantees by resetting before any worker spawns
    ///
    /// # See Also
    /// - [`Schedule::start`]
    pub fn reset(&self) {
        *lock(&self.epoch) = 0;
    }

    /// Blocks until the epoch moves past ``seen`` or ``token`` is cancelled,
    /// whichever comes first
    ///
    /// # Argument(s)
    /// This method accepts two arguments, those being ``seen``, the epoch the caller
    /// observed on its previous pass (zero on the first), and the ``token`` that can
    /// cut the wait short
    ///
    /// # Returns
    /// ``Some`` carrying the newly observed epoch, which the caller must remember
    /// as its next ``seen``, or ``None`` when the wait was cancelled
    ///
    /// # See Also
    /// - [`Monitor::publish`]
    /// - [`Monitor::interrupt`]
    pub fn wait_past(&self, seen: u64, token: &CancelToken) -> Option<u64> {
        let mut epoch = lock(&self.epoch);
        loop {
            if token.is_cancelled() {
                return None;
            }
            if *epoch > seen {
                return Some(*epoch);
            }
            epoch = self
                .signal
                .wait(epoch)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// [`IdleGate`] tracks how many workers a schedule currently owns in the running
/// state and lets a caller block until that count drains to zero. Workers arrive
/// before they are spawned (so a wait that races the spawn cannot observe a
/// spurious zero) and depart as the very last step of their loop
///
/// # See Also
/// - [`Schedule::wait_idle`]
#[derive(Debug, Default)]
pub struct IdleGate {
    active: Mutex<usize>,
    all_idle: Condvar,
}

impl IdleGate {
    /// Creates / Constructs a new [`IdleGate`] instance with no active workers
    ///
    /// # See Also
    /// - [`IdleGate`]
    pub fn new() -> Self {
        Self { active: Mutex::new(0), all_idle: Condvar::new() }
    }

    /// Records one more active worker
    pub fn arrive(&self) {
        *lock(&self.active) += 1;
    }

    /// Records one worker leaving the running state, broadcasting once the
    /// count reaches zero
    pub fn depart(&self) {
        let mut active = lock(&self.active);
        *active = active.saturating_sub(1);
        if *active == 0 {
            self.all_idle.notify_all();
        }
    }

    /// The number of workers currently accounted active
    pub fn active(&self) -> usize {
        *lock(&self.active)
    }

    /// Blocks the caller until every accounted worker has departed. Returns
    /// immediately when nothing is active
    ///
    /// # See Also
    /// - [`IdleGate::depart`]
    pub fn wait_idle(&self) {
        let mut active = lock(&self.active);
        while *active > 0 {
            active = self
                .all_idle
                .wait(active)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}
