use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleState {
    Disabled,
    Armed { deadline: Instant },
    Countdown { deadline: Instant },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleEvent {
    /// The idle deadline passed; the session ends after `grace` without input.
    CountdownStarted { grace: Duration },
    /// Input arrived during the countdown.
    Resumed,
    /// The countdown ran out. Emitted once; the monitor disables itself.
    TimedOut,
}

/// AFK detection driven purely by activity notifications and a clock.
///
/// The monitor owns no timer. The session loop sleeps until
/// [`next_deadline`](Self::next_deadline) and then calls [`poll`](Self::poll).
#[derive(Debug)]
pub struct IdleMonitor {
    timeout: Duration,
    grace: Duration,
    state: IdleState,
}

impl IdleMonitor {
    pub fn new(timeout: Duration, grace: Duration) -> Self {
        Self {
            timeout,
            grace,
            state: IdleState::Disabled,
        }
    }

    pub fn state(&self) -> IdleState {
        self.state
    }

    pub fn is_enabled(&self) -> bool {
        self.state != IdleState::Disabled
    }

    pub fn enable(&mut self, now: Instant) {
        debug!("Idle monitor armed for {:?}", self.timeout);
        self.state = IdleState::Armed {
            deadline: now + self.timeout,
        };
    }

    pub fn disable(&mut self) {
        self.state = IdleState::Disabled;
    }

    /// Register input activity.
    pub fn activity(&mut self, now: Instant) -> Option<IdleEvent> {
        match self.state {
            IdleState::Disabled => None,
            IdleState::Armed { .. } => {
                self.state = IdleState::Armed {
                    deadline: now + self.timeout,
                };
                None
            }
            IdleState::Countdown { .. } => {
                info!("Activity during idle countdown, re-arming");
                self.state = IdleState::Armed {
                    deadline: now + self.timeout,
                };
                Some(IdleEvent::Resumed)
            }
        }
    }

    /// Advance the state machine to `now`.
    pub fn poll(&mut self, now: Instant) -> Option<IdleEvent> {
        match self.state {
            IdleState::Armed { deadline } if now >= deadline => {
                info!("Idle deadline passed, countdown of {:?} started", self.grace);
                self.state = IdleState::Countdown {
                    deadline: now + self.grace,
                };
                Some(IdleEvent::CountdownStarted { grace: self.grace })
            }
            IdleState::Countdown { deadline } if now >= deadline => {
                info!("Idle countdown expired");
                self.state = IdleState::Disabled;
                Some(IdleEvent::TimedOut)
            }
            _ => None,
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        match self.state {
            IdleState::Disabled => None,
            IdleState::Armed { deadline } | IdleState::Countdown { deadline } => Some(deadline),
        }
    }
}
