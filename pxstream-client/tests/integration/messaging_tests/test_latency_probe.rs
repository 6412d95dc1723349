use pxstream_client::SessionEvent;
use pxstream_core::utils::DIRECT_CHANNEL_LABEL;
use pxstream_core::{FromPeerMessage, StreamConfig, ToPeerMessage};

use crate::integration::{connect_direct, create_test_session, decode_sent, init_tracing, peer_frame};

const REPORT: &str = r#"{"ReceiptTimeMs": 1000.5, "EncodeMs": 3.0, "TransmissionTimeMs": 12.25}"#;

fn is_probe(e: &SessionEvent) -> bool {
    matches!(e, SessionEvent::LatencyProbe(_))
}

#[tokio::test]
async fn test_latency_probe() {
    init_tracing();

    let session = create_test_session(StreamConfig::default());
    let channel = connect_direct(&session).await;

    // a report nobody asked for is not turned into a measurement
    session
        .transport
        .deliver_frame(
            DIRECT_CHANNEL_LABEL,
            peer_frame(FromPeerMessage::LatencyTest {
                report: REPORT.into(),
            }),
        )
        .await;
    session
        .listener
        .wait_for(|e| matches!(e, SessionEvent::Message(FromPeerMessage::LatencyTest { .. })), 5000)
        .await
        .expect("report not delivered");
    assert_eq!(session.listener.count(is_probe).await, 0);

    session.handle.latency_test().unwrap();
    let probe = channel.wait_for_frame(6, 5000).await.expect("probe never sent");
    let ToPeerMessage::LatencyTest { probe } = decode_sent(&probe) else {
        panic!("frame 6 is not a latency probe");
    };
    let probe: serde_json::Value = serde_json::from_str(&probe).unwrap();
    assert!(probe["StartTime"].is_u64());

    session
        .transport
        .deliver_frame(
            DIRECT_CHANNEL_LABEL,
            peer_frame(FromPeerMessage::LatencyTest {
                report: REPORT.into(),
            }),
        )
        .await;

    let result = session
        .listener
        .wait_for(is_probe, 5000)
        .await
        .expect("no latency result");
    let SessionEvent::LatencyProbe(result) = result else {
        unreachable!();
    };
    assert_eq!(result.receipt_time_ms, Some(1000.5));
    assert_eq!(result.encode_ms, Some(3.0));
    assert_eq!(result.transmission_time_ms, Some(12.25));
    assert_eq!(result.pre_capture_time_ms, None);
}
