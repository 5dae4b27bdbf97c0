//! Retransmission timer.
//!
//! Go-Back-N keeps a **single** logical countdown tied to the oldest
//! unacknowledged packet (`base`).  It is started when the first packet
//! enters an empty window, restarted every time `base` advances while
//! packets remain in flight, cancelled when the window drains, and restarted
//! after every timeout-driven resend.
//!
//! [`RetransmitTimer`] wraps a pinned [`tokio::time::Sleep`] so it can sit in
//! a `tokio::select!` loop next to the socket.  The state machine in
//! [`crate::gbn_sender`] never touches the timer directly; it hands back a
//! [`TimerAction`] which the driver applies here.
//!
//! The timeout is a fixed constant taken from [`crate::config::ArqConfig`];
//! there is no RTT estimation or back-off.

use std::future::pending;
use std::pin::Pin;
use std::time::Duration;

use tokio::time::{sleep, Instant, Sleep};

/// What the driver should do with the timer after a sender operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerAction {
    /// Arm the timer unless it is already running.
    Start,
    /// Rearm from now (the window advanced but is not empty).
    Restart,
    /// Disarm (the window drained).
    Stop,
    /// Leave the timer alone.
    Keep,
}

/// A single-shot, cancellable, restartable countdown.
pub struct RetransmitTimer {
    timeout: Duration,
    sleep: Pin<Box<Sleep>>,
    armed: bool,
}

impl RetransmitTimer {
    /// Create a disarmed timer that fires `timeout` after each (re)start.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            sleep: Box::pin(sleep(timeout)),
            armed: false,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Instant at which the timer will fire, if armed.
    pub fn deadline(&self) -> Option<Instant> {
        self.armed.then(|| self.sleep.deadline())
    }

    /// Arm the timer if it is not already running.
    pub fn start(&mut self) {
        if !self.armed {
            self.restart();
        }
    }

    /// Arm the timer to fire one timeout from now, discarding any pending
    /// deadline.
    pub fn restart(&mut self) {
        self.sleep.as_mut().reset(Instant::now() + self.timeout);
        self.armed = true;
    }

    pub fn cancel(&mut self) {
        self.armed = false;
    }

    pub fn apply(&mut self, action: TimerAction) {
        match action {
            TimerAction::Start => self.start(),
            TimerAction::Restart => self.restart(),
            TimerAction::Stop => self.cancel(),
            TimerAction::Keep => {}
        }
    }

    /// Resolve once the armed deadline passes.
    ///
    /// Never resolves while the timer is disarmed.  On completion the timer
    /// disarms itself (single-shot); the caller restarts it after resending.
    /// Dropping the future early leaves the timer untouched.
    pub async fn expired(&mut self) {
        if !self.armed {
            pending::<()>().await;
        }
        self.sleep.as_mut().await;
        self.armed = false;
    }
}

impl std::fmt::Debug for RetransmitTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetransmitTimer")
            .field("timeout", &self.timeout)
            .field("deadline", &self.deadline())
            .finish()
    }
}
