use crate::channel::{Diagnostics, MessageHandler};
use crate::error::SessionError;
use crate::input::InputEvent;
use crate::ownership::Capability;
use crate::session::SessionSnapshot;
use pxstream_core::SessionId;
use std::fmt;
use tokio::sync::oneshot;

pub(crate) type Reply<T> = oneshot::Sender<T>;

/// Requests sent from a [`SessionHandle`](crate::SessionHandle) to the session loop.
pub(crate) enum SessionCommand {
    Connect {
        reply: Option<Reply<Result<SessionId, SessionError>>>,
    },
    Disconnect {
        reason: String,
        reply: Option<Reply<()>>,
    },
    Send {
        event: InputEvent,
        reply: Option<Reply<Result<(), SessionError>>>,
    },
    Subscribe {
        streamer_id: String,
    },
    RequestQualityControl,
    Release {
        capability: Capability,
    },
    LatencyTest,
    CollectStats,
    SetIdleDetection {
        enabled: bool,
    },
    Activity,
    RegisterHandler {
        name: String,
        handler: MessageHandler,
    },
    Snapshot {
        reply: Reply<SessionSnapshot>,
    },
    Diagnostics {
        reply: Reply<Diagnostics>,
    },
    Shutdown,
}

impl fmt::Debug for SessionCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionCommand::Connect { .. } => write!(f, "Connect"),
            SessionCommand::Disconnect { reason, .. } => write!(f, "Disconnect({reason})"),
            SessionCommand::Send { event, .. } => write!(f, "Send({event:?})"),
            SessionCommand::Subscribe { streamer_id } => write!(f, "Subscribe({streamer_id})"),
            SessionCommand::RequestQualityControl => write!(f, "RequestQualityControl"),
            SessionCommand::Release { capability } => write!(f, "Release({capability})"),
            SessionCommand::LatencyTest => write!(f, "LatencyTest"),
            SessionCommand::CollectStats => write!(f, "CollectStats"),
            SessionCommand::SetIdleDetection { enabled } => write!(f, "SetIdleDetection({enabled})"),
            SessionCommand::Activity => write!(f, "Activity"),
            SessionCommand::RegisterHandler { name, .. } => write!(f, "RegisterHandler({name})"),
            SessionCommand::Snapshot { .. } => write!(f, "Snapshot"),
            SessionCommand::Diagnostics { .. } => write!(f, "Diagnostics"),
            SessionCommand::Shutdown => write!(f, "Shutdown"),
        }
    }
}
