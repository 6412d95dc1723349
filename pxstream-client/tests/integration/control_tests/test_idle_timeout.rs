use pxstream_client::{InputEvent, MouseButton, NegotiationState, SessionEvent};
use pxstream_core::StreamConfig;
use std::time::Duration;

use crate::integration::{connect_direct, create_test_session, init_tracing};
use crate::utils::TransportCall;

fn afk_config() -> StreamConfig {
    StreamConfig {
        afk_enabled: true,
        afk_timeout_secs: 60,
        afk_grace_secs: 10,
        ..StreamConfig::default()
    }
}

fn is_countdown(e: &SessionEvent) -> bool {
    matches!(e, SessionEvent::IdleCountdown { .. })
}

#[tokio::test(start_paused = true)]
async fn test_idle_timeout() {
    init_tracing();

    let session = create_test_session(afk_config());
    connect_direct(&session).await;

    let countdown = session
        .listener
        .wait_for(is_countdown, 120_000)
        .await
        .expect("countdown never started");
    assert_eq!(
        countdown,
        SessionEvent::IdleCountdown {
            grace: Duration::from_secs(10)
        }
    );

    // input during the countdown resumes the session
    session.handle.notify_activity().unwrap();
    session
        .listener
        .wait_for(|e| *e == SessionEvent::IdleResumed, 5000)
        .await
        .expect("activity did not resume");

    let disconnected = session
        .listener
        .wait_for(|e| matches!(e, SessionEvent::Disconnected { .. }), 200_000)
        .await
        .expect("idle session never dropped");
    assert_eq!(
        disconnected,
        SessionEvent::Disconnected {
            reason: "afk".into()
        }
    );

    assert_eq!(session.listener.count(is_countdown).await, 2);
    assert_eq!(
        session
            .listener
            .count(|e| *e == SessionEvent::IdleTimeout)
            .await,
        1
    );
    assert!(session.listener.wait_for_state(NegotiationState::Closed, 5000).await);
    assert!(
        session
            .transport
            .calls()
            .await
            .iter()
            .any(|c| matches!(c, TransportCall::Close { .. }))
    );

    // nothing else fires once the session is gone
    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(
        session
            .listener
            .count(|e| *e == SessionEvent::IdleTimeout)
            .await,
        1
    );
}

#[tokio::test(start_paused = true)]
async fn test_input_keeps_session_alive() {
    init_tracing();

    let session = create_test_session(afk_config());
    connect_direct(&session).await;

    for _ in 0..4 {
        tokio::time::sleep(Duration::from_secs(45)).await;
        session
            .handle
            .send(InputEvent::MouseDown {
                button: MouseButton::Main,
                x: 0.5,
                y: 0.5,
            })
            .await
            .unwrap();
    }
    assert_eq!(session.listener.count(is_countdown).await, 0);

    // switched off at runtime
    session.handle.set_idle_detection(false).unwrap();
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(session.listener.count(is_countdown).await, 0);
    assert_eq!(
        session.handle.snapshot().await.unwrap().state,
        NegotiationState::Connected
    );
}
