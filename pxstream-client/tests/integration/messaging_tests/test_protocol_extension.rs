use pxstream_client::SessionEvent;
use pxstream_core::utils::DIRECT_CHANNEL_LABEL;
use pxstream_core::{FieldValue, FromPeerMessage, StreamConfig, ToPeerMessage};

use crate::integration::{connect_direct, create_test_session, init_tracing, peer_frame};

#[tokio::test]
async fn test_protocol_extension() {
    init_tracing();

    let session = create_test_session(StreamConfig::default());
    let channel = connect_direct(&session).await;

    let inbound = r#"{"Direction": 1, "Telemetry": {"id": 200, "structure": ["uint8", "string"]}}"#;
    let outbound = r#"{"Direction": 0, "Teleport": {"id": 120, "structure": ["uint16", "uint16"]}}"#;
    for definition in [inbound, outbound] {
        session
            .transport
            .deliver_frame(
                DIRECT_CHANNEL_LABEL,
                peer_frame(FromPeerMessage::Protocol {
                    definition: definition.into(),
                }),
            )
            .await;
    }

    // 200: uint8 7, string "ok" (two UTF-16 code units)
    session
        .transport
        .deliver_frame(DIRECT_CHANNEL_LABEL, vec![200u8, 7, 2, 0, b'o', 0, b'k', 0])
        .await;

    let message = session
        .listener
        .wait_for(|e| matches!(e, SessionEvent::Message(_)), 5000)
        .await
        .expect("extended message not dispatched");
    assert_eq!(
        message,
        SessionEvent::Message(FromPeerMessage::Custom {
            name: "Telemetry".into(),
            fields: vec![FieldValue::U8(7), FieldValue::Text("ok".into())],
        })
    );
    assert_eq!(session.handle.diagnostics().await.unwrap().handler_less, 1);

    session
        .handle
        .send(ToPeerMessage::Custom {
            name: "Teleport".into(),
            fields: vec![FieldValue::U16(3), FieldValue::U16(4)],
        })
        .await
        .expect("extended message not sent");
    let frame = channel.wait_for_frame(120, 5000).await.expect("no frame written");
    assert_eq!(frame.as_ref(), &[120u8, 3, 0, 4, 0]);
}
