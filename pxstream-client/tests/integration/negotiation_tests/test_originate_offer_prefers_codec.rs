use pxstream_client::NegotiationState;
use pxstream_client::transport::SdpKind;
use pxstream_core::utils::DIRECT_CHANNEL_LABEL;
use pxstream_core::{SignalMessage, StreamConfig};

use crate::integration::{create_test_session, init_tracing, open_signaling, stun_config};
use crate::utils::TransportCall;

const REMOTE_ANSWER: &str = "v=0\r\nremote-answer\r\n";

#[tokio::test]
async fn test_originate_offer_prefers_codec() {
    init_tracing();

    let config = StreamConfig {
        originate_offer: true,
        preferred_codec: Some("H264".into()),
        ..StreamConfig::default()
    };
    let session = create_test_session(config);
    open_signaling(&session).await;

    session
        .signaling
        .deliver(SignalMessage::PeerConfig {
            config: stun_config(),
        })
        .await;

    let offer = session
        .signaling
        .wait_for_sent(|m| matches!(m, SignalMessage::Offer { .. }), 5000)
        .await
        .expect("offer never sent");
    let SignalMessage::Offer { sdp } = offer else {
        unreachable!();
    };
    assert!(sdp.contains("m=video 9 UDP/TLS/RTP/SAVPF 102 96\r\n"), "{sdp}");

    let calls = session.transport.calls().await;
    assert_eq!(
        calls[1],
        TransportCall::CreateDataChannel {
            label: DIRECT_CHANNEL_LABEL.into(),
            negotiated_id: None
        }
    );
    assert_eq!(calls[2], TransportCall::CreateOffer);
    // the munged offer is what was applied locally
    assert_eq!(calls[3], TransportCall::SetLocal(SdpKind::Offer, sdp.clone()));

    // an answer is only applied while an offer is outstanding
    session
        .signaling
        .deliver(SignalMessage::Answer {
            sdp: REMOTE_ANSWER.into(),
        })
        .await;
    session
        .signaling
        .deliver(SignalMessage::Answer {
            sdp: REMOTE_ANSWER.into(),
        })
        .await;
    assert!(
        session
            .listener
            .wait_for_state(NegotiationState::CandidateGathering, 5000)
            .await
    );

    session.transport.peer_connected().await;
    session.transport.open_channel(DIRECT_CHANNEL_LABEL).await;
    assert!(session.listener.wait_for_state(NegotiationState::Connected, 5000).await);

    let remote_answers = session
        .transport
        .calls()
        .await
        .into_iter()
        .filter(|c| matches!(c, TransportCall::SetRemote(SdpKind::Answer, _)))
        .count();
    assert_eq!(remote_answers, 1);
}
