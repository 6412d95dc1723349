use pxstream_client::{NegotiationState, SessionEvent};
use pxstream_core::utils::DIRECT_CHANNEL_LABEL;
use pxstream_core::{FromPeerMessage, StreamConfig};

use crate::integration::{connect_direct, create_test_session, init_tracing, peer_frame};

#[tokio::test]
async fn test_unknown_type_is_dropped() {
    init_tracing();

    let session = create_test_session(StreamConfig::default());
    connect_direct(&session).await;

    session
        .transport
        .deliver_frame(DIRECT_CHANNEL_LABEL, vec![250u8, 1, 2, 3])
        .await;
    // response declaring more text than the frame holds
    session
        .transport
        .deliver_frame(DIRECT_CHANNEL_LABEL, vec![1u8, 4, 0, b'a', 0])
        .await;
    session
        .transport
        .deliver_frame(
            DIRECT_CHANNEL_LABEL,
            peer_frame(FromPeerMessage::VideoEncoderAvgQp { qp: 31 }),
        )
        .await;

    let message = session
        .listener
        .wait_for(|e| matches!(e, SessionEvent::Message(_)), 5000)
        .await
        .expect("valid frame after the bad ones not delivered");
    assert_eq!(
        message,
        SessionEvent::Message(FromPeerMessage::VideoEncoderAvgQp { qp: 31 })
    );

    let diagnostics = session.handle.diagnostics().await.unwrap();
    assert_eq!(diagnostics.unknown_type, 1);
    assert_eq!(diagnostics.truncated, 1);

    let snapshot = session.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.state, NegotiationState::Connected);
    assert_eq!(
        session
            .listener
            .count(|e| matches!(e, SessionEvent::Message(_)))
            .await,
        1
    );
}
