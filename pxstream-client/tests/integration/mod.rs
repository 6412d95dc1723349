//! Integration tests for pxstream-client.
//!
//! Tests are organized by functionality:
//! - `negotiation_tests` - signalling and session establishment
//! - `messaging_tests` - data channel protocol traffic
//! - `control_tests` - ownership tokens and idle detection
//! - `lifecycle_tests` - connect, disconnect and stale events

pub mod control_tests;
pub mod lifecycle_tests;
pub mod messaging_tests;

use std::sync::Arc;

use bytes::Bytes;
use pxstream_client::{NegotiationState, SessionHandle, SessionOrchestrator};
use pxstream_core::utils::DIRECT_CHANNEL_LABEL;
use pxstream_core::protocol::{decode_fields, split_frame};
use pxstream_core::{
    Direction, FromPeerMessage, IceServerConfig, MessageCatalog, PeerConfig, PeerOptions,
    SignalMessage, StreamConfig, ToPeerMessage,
};
use tracing::Level;

use crate::utils::{
    MockSignaling, MockTransportFactory, RecordingChannel, RecordingListener, RecordingMediaSink,
};

pub const STREAMER: &str = "Streamer1";
pub const REMOTE_OFFER: &str = "v=0\r\nremote-offer\r\n";

/// Initialize tracing for tests (call once per test).
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// A running session loop plus the mocks around it.
pub struct TestSession {
    pub handle: SessionHandle,
    pub signaling: MockSignaling,
    pub transport: MockTransportFactory,
    pub listener: RecordingListener,
    pub media: RecordingMediaSink,
}

/// Create a session with recording listener and mock signalling/transport.
pub fn create_test_session(config: StreamConfig) -> TestSession {
    create_test_session_with(config, RecordingListener::new())
}

pub fn create_test_session_with(config: StreamConfig, listener: RecordingListener) -> TestSession {
    let signaling = MockSignaling::new();
    let transport = MockTransportFactory::new();
    let media = RecordingMediaSink::new();

    let (mut session, handle) = SessionOrchestrator::new(
        config,
        Arc::new(signaling.clone()),
        Arc::new(transport.clone()),
    );
    session.add_listener(Arc::new(listener.clone()));
    session.set_media_sink(Arc::new(media.clone()));

    // Spawn session event loop
    tokio::spawn(async move {
        session.run().await;
    });

    TestSession {
        handle,
        signaling,
        transport,
        listener,
        media,
    }
}

pub fn stun_config() -> PeerConfig {
    PeerConfig {
        relay_servers: vec![IceServerConfig {
            urls: vec!["stun:stun.example.org:19302".into()],
            username: None,
            credential: None,
        }],
        options: PeerOptions::default(),
    }
}

pub fn turn_config() -> PeerConfig {
    PeerConfig {
        relay_servers: vec![IceServerConfig {
            urls: vec!["turn:turn.example.org:3478".into()],
            username: Some("user".into()),
            credential: Some("secret".into()),
        }],
        options: PeerOptions::default(),
    }
}

/// Connect and subscribe to the single streamer the server lists.
pub async fn open_signaling(session: &TestSession) {
    session.handle.connect().await.expect("connect failed");
    session
        .signaling
        .wait_for_sent(|m| *m == SignalMessage::ListStreamers, 5000)
        .await
        .expect("list-streamers never sent");

    session
        .signaling
        .deliver(SignalMessage::StreamerList {
            ids: vec![STREAMER.into()],
        })
        .await;
    session
        .signaling
        .wait_for_sent(|m| matches!(m, SignalMessage::Subscribe { .. }), 5000)
        .await
        .expect("subscribe never sent");
}

/// Drive a direct (single channel) session all the way to `Connected` and
/// return the channel the session writes to.
pub async fn connect_direct(session: &TestSession) -> RecordingChannel {
    open_signaling(session).await;

    session
        .signaling
        .deliver(SignalMessage::PeerConfig {
            config: stun_config(),
        })
        .await;
    session
        .signaling
        .deliver(SignalMessage::Offer {
            sdp: REMOTE_OFFER.into(),
        })
        .await;
    session
        .signaling
        .wait_for_sent(|m| matches!(m, SignalMessage::Answer { .. }), 5000)
        .await
        .expect("answer never sent");

    session.transport.peer_connected().await;
    let channel = session.transport.open_channel(DIRECT_CHANNEL_LABEL).await;

    assert!(
        session
            .listener
            .wait_for_state(NegotiationState::Connected, 5000)
            .await,
        "session never connected"
    );
    // initial settings request goes out last on connect
    channel
        .wait_for_frame(7, 5000)
        .await
        .expect("initial settings never requested");
    channel
}

/// Encode a peer-to-client message with the built-in catalog.
pub fn peer_frame(message: FromPeerMessage) -> Bytes {
    message
        .encode(&MessageCatalog::new())
        .expect("peer message encodes")
}

/// Decode a frame the session wrote, using the built-in catalog.
pub fn decode_sent(frame: &[u8]) -> ToPeerMessage {
    let catalog = MessageCatalog::new();
    let (id, body) = split_frame(frame).expect("empty frame");
    let spec = catalog.get(Direction::ToPeer, id).expect("unknown id");
    let fields = decode_fields(&spec.layout, body).expect("frame decodes");
    ToPeerMessage::from_fields(&spec.name, fields).expect("known message")
}
