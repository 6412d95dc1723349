use pxstream_client::SessionEvent;
use pxstream_core::{SignalMessage, StreamConfig};
use std::time::Duration;

use crate::integration::{create_test_session, create_test_session_with, init_tracing};
use crate::utils::RecordingListener;

fn streamers() -> SignalMessage {
    SignalMessage::StreamerList {
        ids: vec!["Left".into(), "Right".into()],
    }
}

#[tokio::test]
async fn test_several_streamers_wait_for_a_choice() {
    init_tracing();

    let session = create_test_session(StreamConfig::default());
    session.handle.connect().await.unwrap();
    session.signaling.deliver(streamers()).await;

    let listed = session
        .listener
        .wait_for(|e| matches!(e, SessionEvent::StreamerListReceived { .. }), 5000)
        .await
        .expect("streamer list not reported");
    assert_eq!(
        listed,
        SessionEvent::StreamerListReceived {
            ids: vec!["Left".into(), "Right".into()],
            auto_selected: None,
        }
    );

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        session
            .signaling
            .count_sent(|m| matches!(m, SignalMessage::Subscribe { .. }))
            .await,
        0
    );
    assert_eq!(session.handle.snapshot().await.unwrap().streamer_id, None);
}

#[tokio::test]
async fn test_listener_picks_a_streamer() {
    init_tracing();

    let listener = RecordingListener::with_reaction(|handle, event| {
        if let SessionEvent::StreamerListReceived {
            ids,
            auto_selected: None,
        } = event
        {
            if let Some(last) = ids.last() {
                handle.subscribe(last.clone()).unwrap();
            }
        }
    });
    let session = create_test_session_with(StreamConfig::default(), listener);
    session.handle.connect().await.unwrap();
    session.signaling.deliver(streamers()).await;

    let subscribe = session
        .signaling
        .wait_for_sent(|m| matches!(m, SignalMessage::Subscribe { .. }), 5000)
        .await
        .expect("listener choice not subscribed");
    assert_eq!(
        subscribe,
        SignalMessage::Subscribe {
            streamer_id: "Right".into()
        }
    );
    assert_eq!(
        session.handle.snapshot().await.unwrap().streamer_id.as_deref(),
        Some("Right")
    );
}
