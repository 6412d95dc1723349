use async_trait::async_trait;
use pxstream_client::{
    MediaSink, MediaTrack, NegotiationState, SessionEvent, SessionHandle, SessionListener,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

type Reaction = Arc<dyn Fn(&SessionHandle, &SessionEvent) + Send + Sync>;

/// A test implementation of SessionListener that records all events.
#[derive(Clone)]
pub struct RecordingListener {
    events: Arc<Mutex<Vec<SessionEvent>>>,
    /// Optional callback run for every event
    reaction: Option<Reaction>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            reaction: None,
        }
    }

    /// Record events and also run `callback` for each one.
    pub fn with_reaction<F>(callback: F) -> Self
    where
        F: Fn(&SessionHandle, &SessionEvent) + Send + Sync + 'static,
    {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            reaction: Some(Arc::new(callback)),
        }
    }

    pub async fn get_events(&self) -> Vec<SessionEvent> {
        self.events.lock().await.clone()
    }

    pub async fn count<F>(&self, pred: F) -> usize
    where
        F: Fn(&SessionEvent) -> bool,
    {
        self.events.lock().await.iter().filter(|e| pred(e)).count()
    }

    /// Wait until an event matching `pred` was recorded.
    pub async fn wait_for<F>(&self, pred: F, timeout_ms: u64) -> Option<SessionEvent>
    where
        F: Fn(&SessionEvent) -> bool,
    {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            if let Some(found) = self.events.lock().await.iter().find(|e| pred(e)) {
                return Some(found.clone());
            }
            if Instant::now() > deadline {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    pub async fn wait_for_state(&self, state: NegotiationState, timeout_ms: u64) -> bool {
        self.wait_for(
            |e| matches!(e, SessionEvent::StateChanged { to, .. } if *to == state),
            timeout_ms,
        )
        .await
        .is_some()
    }

    /// Every state entered, in order.
    pub async fn states(&self) -> Vec<NegotiationState> {
        self.events
            .lock()
            .await
            .iter()
            .filter_map(|e| match e {
                SessionEvent::StateChanged { to, .. } => Some(*to),
                _ => None,
            })
            .collect()
    }

    pub async fn clear(&self) {
        self.events.lock().await.clear();
    }
}

impl Default for RecordingListener {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionListener for RecordingListener {
    async fn on_event(&self, handle: &SessionHandle, event: &SessionEvent) {
        tracing::info!("[RecordingListener] {:?}", event);
        self.events.lock().await.push(event.clone());

        if let Some(reaction) = &self.reaction {
            reaction(handle, event);
        }
    }
}

/// Media sink that only remembers what it was told.
#[derive(Clone, Default)]
pub struct RecordingMediaSink {
    ready: Arc<Mutex<Vec<bool>>>,
    tracks: Arc<Mutex<Vec<MediaTrack>>>,
}

impl RecordingMediaSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// One entry per channel-ready notification, true in relay mode.
    pub async fn ready_calls(&self) -> Vec<bool> {
        self.ready.lock().await.clone()
    }

    pub async fn tracks(&self) -> Vec<MediaTrack> {
        self.tracks.lock().await.clone()
    }
}

#[async_trait]
impl MediaSink for RecordingMediaSink {
    async fn on_channel_ready(&self, relay: bool) {
        self.ready.lock().await.push(relay);
    }

    async fn on_track(&self, track: MediaTrack) {
        self.tracks.lock().await.push(track);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_listener_tracks_states_in_order() {
        let listener = RecordingListener::new();
        listener.events.lock().await.extend([
            SessionEvent::StateChanged {
                from: NegotiationState::Idle,
                to: NegotiationState::SignalingConnecting,
            },
            SessionEvent::PlayerCount { count: 2 },
            SessionEvent::StateChanged {
                from: NegotiationState::SignalingConnecting,
                to: NegotiationState::SignalingOpen,
            },
        ]);

        assert_eq!(
            listener.states().await,
            vec![NegotiationState::SignalingConnecting, NegotiationState::SignalingOpen]
        );
        assert!(listener.wait_for_state(NegotiationState::SignalingOpen, 10).await);
        assert_eq!(listener.count(|e| matches!(e, SessionEvent::PlayerCount { .. })).await, 1);
    }
}
