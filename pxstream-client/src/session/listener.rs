use crate::session::{SessionEvent, SessionHandle};
use crate::transport::MediaTrack;
use async_trait::async_trait;

/// Application logic that observes a session.
///
/// Called from inside the session loop. Use the fire-and-forget handle
/// methods (`queue`, `request_disconnect`, `subscribe`, ...) from here; the
/// ones that wait for a reply would wait on the loop that is calling you.
///
/// Listeners are called in registration order and each call is awaited
/// before the loop moves on, so a slow listener delays the session.
#[async_trait]
pub trait SessionListener: Send + Sync + 'static {
    /// One session event. State transitions arrive in the order they
    /// happened, before any event they caused.
    async fn on_event(&self, handle: &SessionHandle, event: &SessionEvent);
}

/// Rendering side. Only learns that the data path is ready and which
/// remote tracks arrived.
#[async_trait]
pub trait MediaSink: Send + Sync + 'static {
    /// The data path is open. `relay` is true when it is split into a
    /// send and a receive channel by an intermediary.
    async fn on_channel_ready(&self, relay: bool);

    /// A remote track arrived on the current transport.
    async fn on_track(&self, track: MediaTrack);
}
