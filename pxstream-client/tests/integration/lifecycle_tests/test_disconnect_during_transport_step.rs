use pxstream_client::transport::SdpKind;
use pxstream_client::{NegotiationState, SessionEvent};
use pxstream_core::{SignalMessage, StreamConfig};
use std::time::Duration;

use crate::integration::{REMOTE_OFFER, TestSession, create_test_session, init_tracing, open_signaling, stun_config};
use crate::utils::TransportCall;

/// Negotiate until the transport is stuck applying the remote offer.
async fn stall_on_remote_offer(session: &TestSession) {
    session.transport.hang_remote_descriptions(true);
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
        .transport
        .wait_for_call(|c| matches!(c, TransportCall::SetRemote(SdpKind::Offer, _)), 5000)
        .await
        .expect("remote offer never applied");
}

#[tokio::test]
async fn test_disconnect_while_transport_step_hangs() {
    init_tracing();

    let session = create_test_session(StreamConfig::default());
    stall_on_remote_offer(&session).await;

    let disconnected = tokio::time::timeout(Duration::from_secs(3), session.handle.disconnect("user")).await;
    assert_eq!(disconnected, Ok(Ok(())), "disconnect blocked behind the transport");

    let snapshot = session.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.state, NegotiationState::Closed);
    assert_eq!(snapshot.last_disconnect_reason.as_deref(), Some("user"));

    let calls = session.transport.calls().await;
    assert_eq!(calls.last(), Some(&TransportCall::Close { generation: 1 }));
    assert!(!calls.contains(&TransportCall::CreateAnswer));
    assert_eq!(
        session
            .signaling
            .count_sent(|m| matches!(m, SignalMessage::Answer { .. }))
            .await,
        0
    );
    assert_eq!(
        session.listener.get_events().await.last(),
        Some(&SessionEvent::Disconnected {
            reason: "user".into()
        })
    );
}

#[tokio::test]
async fn test_shutdown_while_transport_step_hangs() {
    init_tracing();

    let session = create_test_session(StreamConfig::default());
    stall_on_remote_offer(&session).await;

    session.handle.shutdown().unwrap();

    let mut stopped = false;
    for _ in 0..300 {
        if session.handle.is_closed() {
            stopped = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(stopped, "session loop still running");
    assert!(
        session
            .transport
            .calls()
            .await
            .contains(&TransportCall::Close { generation: 1 })
    );
    assert!(
        session
            .listener
            .wait_for(|e| matches!(e, SessionEvent::Disconnected { reason } if reason == "shutdown"), 1000)
            .await
            .is_some()
    );
}
