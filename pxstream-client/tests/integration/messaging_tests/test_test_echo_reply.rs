use pxstream_client::SessionEvent;
use pxstream_core::utils::DIRECT_CHANNEL_LABEL;
use pxstream_core::{FromPeerMessage, StreamConfig, ToPeerMessage};

use crate::integration::{connect_direct, create_test_session, decode_sent, init_tracing, peer_frame};

#[tokio::test]
async fn test_test_echo_reply() {
    init_tracing();

    let session = create_test_session(StreamConfig::default());
    let channel = connect_direct(&session).await;

    session
        .transport
        .deliver_frame(
            DIRECT_CHANNEL_LABEL,
            peer_frame(FromPeerMessage::TestEcho {
                text: "ping ✓".into(),
            }),
        )
        .await;

    let reply = channel.wait_for_frame(8, 5000).await.expect("echo never sent back");
    assert_eq!(
        decode_sent(&reply),
        ToPeerMessage::TestEcho {
            text: "ping ✓".into()
        }
    );

    // listeners still see the inbound echo
    assert!(
        session
            .listener
            .wait_for(
                |e| matches!(e, SessionEvent::Message(FromPeerMessage::TestEcho { .. })),
                5000
            )
            .await
            .is_some()
    );
}
