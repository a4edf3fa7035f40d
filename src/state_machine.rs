//! State machine for the outcome of capability announcements.
//!
//! The machine records the result of the most recent PUBLISH and latches a
//! sticky block when the network reports that the line is not provisioned.
//! Other components consult it to avoid redundant announcements.
//!
//! # States
//!
//! - **NotPublished**: initial state, and the state after any full reset
//! - **Ok200**: the last PUBLISH was accepted
//! - **RequestTimeout**: the last PUBLISH timed out (408)
//! - **OtherError**: any other in-range SIP failure
//! - **VolteProvisionError**: the network rejected the line for VoLTE
//! - **RcsProvisionError**: the network rejected the line for RCS presence
//!
//! # State Transitions
//!
//! ```text
//! any -- response 200 --> Ok200
//! any -- response 408 --> RequestTimeout
//! any -- response 4xx/5xx/6xx --> OtherError
//! any -- volte provision pattern --> VolteProvisionError (+ block)
//! any -- rcs provision pattern --> RcsProvisionError (+ block)
//! any -- reset() --> NotPublished (block untouched)
//! ```
//!
//! The block is only lifted by [`PublishStateMachine::clear_block`], which the
//! engine calls on restart, on SIM reload and when provisioning is confirmed.

use std::fmt::Display;

use log::info;

/// Receives notifications about publish outcomes.
pub trait StateChangeHandler: Send + Sync {
    /// Called when the publish state changes.
    fn on_state_changed(&self, state: PublishState);

    /// Called after a successful PUBLISH so cached peer availability can be
    /// refreshed.
    fn on_availability_refresh(&self) {}
}

/// Handler that drops every notification.
pub struct NoopStateChangeHandler;

impl StateChangeHandler for NoopStateChangeHandler {
    fn on_state_changed(&self, _state: PublishState) {}
}

/// Result of the last publish request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PublishState {
    #[default]
    NotPublished,
    Ok200,
    RequestTimeout,
    OtherError,
    VolteProvisionError,
    RcsProvisionError,
}

impl PublishState {
    /// Provision errors stop all further announcements.
    pub fn is_provision_error(self) -> bool {
        matches!(
            self,
            PublishState::VolteProvisionError | PublishState::RcsProvisionError
        )
    }
}

impl Display for PublishState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self {
            PublishState::NotPublished => "NotPublished",
            PublishState::Ok200 => "Ok200",
            PublishState::RequestTimeout => "RequestTimeout",
            PublishState::OtherError => "OtherError",
            PublishState::VolteProvisionError => "VolteProvisionError",
            PublishState::RcsProvisionError => "RcsProvisionError",
        };
        write!(f, "{state}")
    }
}

#[derive(Debug, Clone, Default)]
pub struct PublishStateMachine {
    /// Result of the last publish request.
    state: PublishState,
    /// Set by a provision error, cleared only by an explicit restart signal.
    blocked_until_restart: bool,
}

impl PublishStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_state(&self) -> PublishState {
        self.state
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked_until_restart
    }

    /// Move to `state`. Returns `true` if the state actually changed.
    /// Entering a provision error latches the block.
    pub fn transition(&mut self, state: PublishState) -> bool {
        if state.is_provision_error() {
            self.blocked_until_restart = true;
        }
        if self.state == state {
            return false;
        }
        info!("[transition] {} -> {}", self.state, state);
        self.state = state;
        true
    }

    /// Force `NotPublished`. The block is kept.
    pub fn reset(&mut self) -> bool {
        self.transition(PublishState::NotPublished)
    }

    /// Lift the sticky block. Returns `true` if it was set.
    pub fn clear_block(&mut self) -> bool {
        if self.blocked_until_restart {
            info!("[clear_block] Publishing allowed again");
        }
        std::mem::replace(&mut self.blocked_until_restart, false)
    }
}
