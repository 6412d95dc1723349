use crate::error::OwnershipError;
use std::fmt;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Quality,
    Input,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Quality => write!(f, "quality"),
            Capability::Input => write!(f, "input"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenState {
    #[default]
    Unowned,
    Requested,
    Owned,
    Denied,
}

/// Result of applying a peer grant/deny/revoke message.
#[derive(Debug, Clone, PartialEq)]
pub struct OwnershipChange {
    pub capability: Capability,
    pub from: TokenState,
    pub to: TokenState,
    /// Set when a pending request was refused.
    pub denied: Option<OwnershipError>,
}

/// Single-holder tokens for quality and input control, as seen by this
/// session. Only the peer can grant; locally we request or release.
#[derive(Debug, Default)]
pub struct OwnershipArbiter {
    quality: TokenState,
    input: TokenState,
    input_arbitrated: bool,
}

impl OwnershipArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, capability: Capability) -> TokenState {
        match capability {
            Capability::Quality => self.quality,
            Capability::Input => self.input,
        }
    }

    fn slot(&mut self, capability: Capability) -> &mut TokenState {
        match capability {
            Capability::Quality => &mut self.quality,
            Capability::Input => &mut self.input,
        }
    }

    /// Record that a request was sent. Returns false if the token is
    /// already held.
    pub fn request(&mut self, capability: Capability) -> bool {
        let slot = self.slot(capability);
        if *slot == TokenState::Owned {
            return false;
        }
        *slot = TokenState::Requested;
        true
    }

    /// Apply the peer's ownership flag for `capability`.
    ///
    /// `true` grants from any state. `false` denies a pending request, revokes
    /// a held token, and is otherwise a no-op.
    pub fn on_peer_flag(&mut self, capability: Capability, owned: bool) -> Option<OwnershipChange> {
        if capability == Capability::Input {
            self.input_arbitrated = true;
        }

        let slot = self.slot(capability);
        let from = *slot;
        let to = match (from, owned) {
            (TokenState::Owned, true) => return None,
            (_, true) => TokenState::Owned,
            (TokenState::Requested, false) => TokenState::Denied,
            (TokenState::Owned, false) => TokenState::Unowned,
            (TokenState::Unowned | TokenState::Denied, false) => return None,
        };
        *slot = to;

        let denied = (to == TokenState::Denied).then(|| {
            let err = OwnershipError::Denied(capability);
            warn!("{}", err);
            err
        });
        info!("{} control: {:?} -> {:?}", capability, from, to);

        Some(OwnershipChange {
            capability,
            from,
            to,
            denied,
        })
    }

    /// Voluntarily give up a token.
    pub fn release(&mut self, capability: Capability) -> Option<OwnershipChange> {
        let slot = self.slot(capability);
        let from = *slot;
        if from == TokenState::Unowned {
            return None;
        }
        *slot = TokenState::Unowned;
        Some(OwnershipChange {
            capability,
            from,
            to: TokenState::Unowned,
            denied: None,
        })
    }

    /// Whether actions gated on `capability` may proceed.
    ///
    /// Input is only enforced once the peer has sent an input-control
    /// message; before that the peer does not arbitrate input.
    pub fn gate(&self, capability: Capability) -> Result<(), OwnershipError> {
        let allowed = match capability {
            Capability::Quality => self.quality == TokenState::Owned,
            Capability::Input => !self.input_arbitrated || self.input == TokenState::Owned,
        };
        if allowed {
            Ok(())
        } else {
            Err(OwnershipError::NotOwned(capability))
        }
    }

    pub fn holds(&self, capability: Capability) -> bool {
        self.state(capability) == TokenState::Owned
    }

    /// Session teardown: every token returns to unowned.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
