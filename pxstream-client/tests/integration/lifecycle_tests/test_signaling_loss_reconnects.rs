use pxstream_client::{NegotiationError, SessionError, SessionEvent, SignalingError};
use pxstream_core::{SignalMessage, StreamConfig};
use std::time::Duration;

use crate::integration::{connect_direct, create_test_session, init_tracing};

#[tokio::test(start_paused = true)]
async fn test_signaling_loss_reconnects() {
    init_tracing();

    let session = create_test_session(StreamConfig::default());
    let channel = connect_direct(&session).await;

    session.signaling.drop_connection("server restarted").await;

    let error = session
        .listener
        .wait_for(|e| matches!(e, SessionEvent::Error(_)), 5000)
        .await
        .expect("loss not reported");
    assert_eq!(
        error,
        SessionEvent::Error(SessionError::Negotiation(NegotiationError::Signaling(
            SignalingError::TransportLost("server restarted".into())
        )))
    );
    assert!(channel.is_closed());

    // reconnect waits out the configured delay
    let mut reconnected = false;
    for _ in 0..1000 {
        if session
            .signaling
            .count_sent(|m| *m == SignalMessage::ListStreamers)
            .await
            == 2
        {
            reconnected = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(reconnected, "signalling never reopened");
    assert_eq!(session.signaling.connect_count(), 2);
    assert_eq!(
        session
            .listener
            .count(|e| matches!(e, SessionEvent::Disconnected { .. }))
            .await,
        0
    );
}

#[tokio::test(start_paused = true)]
async fn test_refused_reconnect_gives_up() {
    init_tracing();

    let session = create_test_session(StreamConfig::default());
    connect_direct(&session).await;

    session.signaling.refuse_connections(true);
    session.signaling.drop_connection("server gone").await;

    let event = session
        .listener
        .wait_for(|e| matches!(e, SessionEvent::Disconnected { .. }), 30_000)
        .await
        .expect("session never gave up");
    assert_eq!(
        event,
        SessionEvent::Disconnected {
            reason: "signalling failed: signalling connection failed: connection refused".into()
        }
    );
    assert_eq!(session.signaling.connect_count(), 2);
}
