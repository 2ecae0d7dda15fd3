//! Reconnect bookkeeping for the agent.
//!
//! The controller holds no timers; it only decides what happens after a
//! connection closes. The client loop does the sleeping.

use crate::ws::protocol::CLOSE_GOING_AWAY;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    /// `min(initial * 2^attempt, max)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

/// What to do after a close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The hub is going away on purpose
    Shutdown,
    /// Retry budget exhausted
    GiveUp,
    Retry { attempt: u32, delay: Duration },
}

#[derive(Debug)]
pub struct ReconnectController {
    policy: ReconnectPolicy,
    attempt: u32,
    connected_this_cycle: bool,
}

impl ReconnectController {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            attempt: 0,
            connected_this_cycle: false,
        }
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// The handshake completed.
    pub fn on_open(&mut self) {
        self.connected_this_cycle = true;
    }

    /// The session reached the synced state.
    pub fn on_synced(&mut self) {
        self.attempt = 0;
    }

    /// A connection closed, or a connect attempt failed (`code` is `None`).
    pub fn on_close(&mut self, code: Option<u16>) -> Decision {
        if code == Some(CLOSE_GOING_AWAY) {
            return Decision::Shutdown;
        }

        let attempt = if self.connected_this_cycle {
            0
        } else {
            self.attempt + 1
        };
        self.connected_this_cycle = false;
        self.attempt = attempt;

        if attempt >= self.policy.max_attempts {
            return Decision::GiveUp;
        }
        Decision::Retry {
            attempt,
            delay: self.policy.delay_for(attempt),
        }
    }
}
