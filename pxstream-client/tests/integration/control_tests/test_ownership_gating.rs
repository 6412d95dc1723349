use pxstream_client::{
    Capability, InputEvent, OwnershipChange, OwnershipError, SessionError, SessionEvent, TokenState,
};
use pxstream_core::utils::DIRECT_CHANNEL_LABEL;
use pxstream_core::{FromPeerMessage, StreamConfig, ToPeerMessage};

use crate::integration::{connect_direct, create_test_session, decode_sent, init_tracing, peer_frame};
use crate::utils::RecordingChannel;

fn not_owned(capability: Capability) -> SessionError {
    SessionError::Ownership(OwnershipError::NotOwned(capability))
}

async fn sent_messages(channel: &RecordingChannel) -> Vec<ToPeerMessage> {
    channel.frames().await.iter().map(|f| decode_sent(f)).collect()
}

#[tokio::test]
async fn test_quality_control_gating() {
    init_tracing();

    let config = StreamConfig {
        initial_fps: Some(30),
        initial_max_bitrate_kbps: Some(5000),
        ..StreamConfig::default()
    };
    let session = create_test_session(config);
    let channel = connect_direct(&session).await;

    let snapshot = session.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.quality_control, TokenState::Requested);

    // requested is not owned
    assert_eq!(
        session.handle.send(InputEvent::SetMaxFps(20)).await,
        Err(not_owned(Capability::Quality))
    );

    session
        .transport
        .deliver_frame(
            DIRECT_CHANNEL_LABEL,
            peer_frame(FromPeerMessage::QualityControlOwnership { owned: true }),
        )
        .await;
    let granted = session
        .listener
        .wait_for(|e| matches!(e, SessionEvent::OwnershipChanged(_)), 5000)
        .await
        .expect("grant not reported");
    assert_eq!(
        granted,
        SessionEvent::OwnershipChanged(OwnershipChange {
            capability: Capability::Quality,
            from: TokenState::Requested,
            to: TokenState::Owned,
            denied: None,
        })
    );

    // configured initial settings follow the first grant
    channel.wait_for_frame(3, 5000).await.expect("initial bitrate not sent");
    session.handle.send(InputEvent::SetMaxFps(20)).await.unwrap();
    assert_eq!(
        sent_messages(&channel).await,
        vec![
            ToPeerMessage::RequestQualityControl,
            ToPeerMessage::RequestInitialSettings,
            ToPeerMessage::FpsRequest { fps: 30 },
            ToPeerMessage::BitrateRequest {
                max_bitrate_kbps: 5000
            },
            ToPeerMessage::FpsRequest { fps: 20 },
        ]
    );

    // revoked by the peer
    session
        .transport
        .deliver_frame(
            DIRECT_CHANNEL_LABEL,
            peer_frame(FromPeerMessage::QualityControlOwnership { owned: false }),
        )
        .await;
    session
        .listener
        .wait_for(
            |e| matches!(e, SessionEvent::OwnershipChanged(c) if c.to == TokenState::Unowned),
            5000,
        )
        .await
        .expect("revoke not reported");
    assert_eq!(
        session
            .handle
            .send(InputEvent::SetMaxBitrate { kbps: 1000 })
            .await,
        Err(not_owned(Capability::Quality))
    );

    // asking again and being refused
    session.handle.request_quality_control().unwrap();
    session
        .transport
        .deliver_frame(
            DIRECT_CHANNEL_LABEL,
            peer_frame(FromPeerMessage::QualityControlOwnership { owned: false }),
        )
        .await;
    let denied = session
        .listener
        .wait_for(|e| matches!(e, SessionEvent::Error(_)), 5000)
        .await
        .expect("denial not reported");
    assert_eq!(
        denied,
        SessionEvent::Error(SessionError::Ownership(OwnershipError::Denied(Capability::Quality)))
    );

    let snapshot = session.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.quality_control, TokenState::Denied);
    assert_eq!(session.handle.diagnostics().await.unwrap().rejected_sends, 2);
}

#[tokio::test]
async fn test_input_control_gating() {
    init_tracing();

    let session = create_test_session(StreamConfig::default());
    let channel = connect_direct(&session).await;
    let key = InputEvent::KeyDown {
        key_code: 65,
        repeat: false,
    };

    // the peer has not arbitrated input yet
    session.handle.send(key.clone()).await.unwrap();
    channel.wait_for_frame(60, 5000).await.expect("key not sent");

    session
        .transport
        .deliver_frame(
            DIRECT_CHANNEL_LABEL,
            peer_frame(FromPeerMessage::InputControlOwnership { owned: false }),
        )
        .await;
    session
        .listener
        .wait_for(
            |e| matches!(e, SessionEvent::Message(FromPeerMessage::InputControlOwnership { .. })),
            5000,
        )
        .await
        .expect("input control message not delivered");
    assert_eq!(
        session.handle.send(key.clone()).await,
        Err(not_owned(Capability::Input))
    );

    session
        .transport
        .deliver_frame(
            DIRECT_CHANNEL_LABEL,
            peer_frame(FromPeerMessage::InputControlOwnership { owned: true }),
        )
        .await;
    session
        .listener
        .wait_for(
            |e| matches!(e, SessionEvent::OwnershipChanged(c) if c.capability == Capability::Input),
            5000,
        )
        .await
        .expect("input grant not reported");
    session.handle.send(key).await.unwrap();

    let keys = channel
        .sent_ids()
        .await
        .into_iter()
        .filter(|id| *id == 60)
        .count();
    assert_eq!(keys, 2);

    // teardown hands every token back
    session.handle.disconnect("done").await.unwrap();
    let events = session.listener.get_events().await;
    let released: Vec<&OwnershipChange> = events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::OwnershipChanged(c) if c.to == TokenState::Unowned => Some(c),
            _ => None,
        })
        .collect();
    assert_eq!(released.len(), 2);
    assert!(matches!(events.last(), Some(SessionEvent::Disconnected { reason }) if reason == "done"));
}
