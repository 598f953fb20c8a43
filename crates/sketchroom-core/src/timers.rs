//! Cancellable scheduled tasks driving the session's timed behavior.

use std::time::{Duration, Instant};

/// What a scheduled task does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Re-open the realtime channel after a drop.
    Reconnect,
    /// Send the next heartbeat ping.
    Heartbeat,
    /// Declare the connection dead unless a pong arrived.
    Liveness,
    /// Flush the pending debounced cursor update.
    CursorFlush,
}

#[derive(Debug, Clone, Copy)]
struct Timer {
    kind: TimerKind,
    deadline: Instant,
}

/// Pending timers, at most one per kind. Re-scheduling a kind moves
/// its deadline; `cancel_all` clears every outstanding timer in one
/// call so teardown paths cannot leak one.
#[derive(Debug, Default)]
pub struct TimerQueue {
    timers: Vec<Timer>,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `kind` to fire `delay` after `now`, replacing any
    /// pending timer of the same kind.
    pub fn schedule(&mut self, kind: TimerKind, delay: Duration, now: Instant) {
        self.cancel(kind);
        self.timers.push(Timer {
            kind,
            deadline: now + delay,
        });
    }

    pub fn cancel(&mut self, kind: TimerKind) {
        self.timers.retain(|t| t.kind != kind);
    }

    pub fn cancel_all(&mut self) {
        self.timers.clear();
    }

    pub fn is_scheduled(&self, kind: TimerKind) -> bool {
        self.timers.iter().any(|t| t.kind == kind)
    }

    /// Remove and return every timer due at `now`, in deadline order.
    pub fn due(&mut self, now: Instant) -> Vec<TimerKind> {
        let mut fired: Vec<Timer> = Vec::new();
        self.timers.retain(|t| {
            if t.deadline <= now {
                fired.push(*t);
                false
            } else {
                true
            }
        });
        fired.sort_by_key(|t| t.deadline);
        fired.into_iter().map(|t| t.kind).collect()
    }
}
