use pxstream_client::transport::SdpKind;
use pxstream_client::{NegotiationState, SessionEvent};
use pxstream_core::{SignalMessage, StreamConfig, ToPeerMessage};

use crate::integration::{
    REMOTE_OFFER, STREAMER, connect_direct, create_test_session, decode_sent, init_tracing,
};
use crate::utils::{MOCK_ANSWER, TransportCall};

#[tokio::test]
async fn test_direct_session_connects() {
    init_tracing();

    let session = create_test_session(StreamConfig::default());
    let channel = connect_direct(&session).await;

    assert_eq!(
        session.listener.states().await,
        vec![
            NegotiationState::SignalingConnecting,
            NegotiationState::SignalingOpen,
            NegotiationState::DescriptionExchanging,
            NegotiationState::CandidateGathering,
            NegotiationState::Connected,
        ]
    );

    let sent = session.signaling.sent().await;
    assert_eq!(sent[0], SignalMessage::ListStreamers);
    assert_eq!(
        sent[1],
        SignalMessage::Subscribe {
            streamer_id: STREAMER.into()
        }
    );
    // no codec preference: the answer goes out as the transport produced it
    assert_eq!(
        sent[2],
        SignalMessage::Answer {
            sdp: MOCK_ANSWER.into()
        }
    );

    let calls = session.transport.calls().await;
    assert!(matches!(&calls[0], TransportCall::Created(request) if !request.relay_only));
    assert_eq!(calls[1], TransportCall::SetRemote(SdpKind::Offer, REMOTE_OFFER.into()));
    assert_eq!(calls[2], TransportCall::CreateAnswer);
    assert_eq!(calls[3], TransportCall::SetLocal(SdpKind::Answer, MOCK_ANSWER.into()));

    let requests: Vec<ToPeerMessage> = channel.frames().await.iter().map(|f| decode_sent(f)).collect();
    assert_eq!(
        requests,
        vec![ToPeerMessage::RequestQualityControl, ToPeerMessage::RequestInitialSettings]
    );

    assert_eq!(session.media.ready_calls().await, vec![false]);
    let snapshot = session.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.state, NegotiationState::Connected);
    assert_eq!(snapshot.streamer_id.as_deref(), Some(STREAMER));
    assert!(!snapshot.relay);

    assert_eq!(
        session
            .listener
            .count(|e| matches!(e, SessionEvent::Error(_)))
            .await,
        0
    );
}
