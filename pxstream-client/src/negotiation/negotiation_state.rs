use std::fmt;

/// Lifecycle of one negotiation attempt. Apart from `Failed`, states only
/// ever move forward.
///
/// Local candidate gathering begins as soon as a peer config is accepted,
/// which is also when `DescriptionExchanging` is entered: the transport is
/// created there and the gathering deadline starts. `CandidateGathering`
/// covers the remainder once both descriptions are set, until ICE
/// connectivity and the data channels complete the attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NegotiationState {
    #[default]
    Idle,
    SignalingConnecting,
    SignalingOpen,
    /// Peer config accepted, transport gathering, descriptions in flight.
    DescriptionExchanging,
    /// Descriptions complete; waiting for connectivity and open channels.
    CandidateGathering,
    Connected,
    Disconnecting,
    Closed,
    Failed,
}

impl NegotiationState {
    fn rank(self) -> u8 {
        match self {
            NegotiationState::Idle => 0,
            NegotiationState::SignalingConnecting => 1,
            NegotiationState::SignalingOpen => 2,
            NegotiationState::DescriptionExchanging => 3,
            NegotiationState::CandidateGathering => 4,
            NegotiationState::Connected => 5,
            NegotiationState::Disconnecting => 6,
            NegotiationState::Closed => 7,
            NegotiationState::Failed => 8,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, NegotiationState::Closed | NegotiationState::Failed)
    }

    /// A session exists between `connect` and the end of teardown.
    pub fn is_live(self) -> bool {
        !matches!(
            self,
            NegotiationState::Idle | NegotiationState::Closed | NegotiationState::Failed
        )
    }

    /// Whether moving from `self` to `next` is allowed.
    pub fn can_advance_to(self, next: NegotiationState) -> bool {
        if next == self {
            return false;
        }
        match next {
            NegotiationState::Failed => !self.is_terminal(),
            NegotiationState::Disconnecting | NegotiationState::Closed => {
                self != NegotiationState::Closed && next.rank() > self.rank().min(5)
            }
            _ => !self.is_terminal() && next.rank() > self.rank(),
        }
    }
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
