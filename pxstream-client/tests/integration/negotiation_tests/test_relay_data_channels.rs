use pxstream_client::{NegotiationState, SessionEvent};
use pxstream_core::utils::{RELAY_RECV_LABEL, RELAY_SEND_LABEL};
use pxstream_core::{FromPeerMessage, SignalMessage, StreamConfig};

use crate::integration::{
    REMOTE_OFFER, create_test_session, init_tracing, open_signaling, peer_frame, stun_config,
};
use crate::utils::TransportCall;

#[tokio::test]
async fn test_relay_data_channels() {
    init_tracing();

    let session = create_test_session(StreamConfig::default());
    open_signaling(&session).await;

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
        .signaling
        .deliver(SignalMessage::PeerDataChannels {
            send_id: 1,
            recv_id: 2,
        })
        .await;

    // ids are given from the relay's side: its send stream is our receive stream
    session
        .transport
        .wait_for_call(
            |c| matches!(c, TransportCall::CreateDataChannel { label, .. } if label == RELAY_RECV_LABEL),
            5000,
        )
        .await
        .expect("relay channels never created");
    let created: Vec<TransportCall> = session
        .transport
        .calls()
        .await
        .into_iter()
        .filter(|c| matches!(c, TransportCall::CreateDataChannel { .. }))
        .collect();
    assert_eq!(
        created,
        vec![
            TransportCall::CreateDataChannel {
                label: RELAY_SEND_LABEL.into(),
                negotiated_id: Some(2)
            },
            TransportCall::CreateDataChannel {
                label: RELAY_RECV_LABEL.into(),
                negotiated_id: Some(1)
            },
        ]
    );

    let send = session.transport.open_channel(RELAY_SEND_LABEL).await;
    assert!(
        session
            .signaling
            .wait_for_sent(|m| *m == SignalMessage::PeerDataChannelsReady, 200)
            .await
            .is_none(),
        "ready sent with one channel still closed"
    );
    let recv = session.transport.open_channel(RELAY_RECV_LABEL).await;

    session
        .signaling
        .wait_for_sent(|m| *m == SignalMessage::PeerDataChannelsReady, 5000)
        .await
        .expect("peer-data-channels-ready never sent");
    assert!(session.listener.wait_for_state(NegotiationState::Connected, 5000).await);
    send.wait_for_frame(7, 5000).await.expect("no initial settings request");

    assert_eq!(send.sent_ids().await, vec![1, 7]);
    assert!(recv.frames().await.is_empty());
    assert_eq!(session.media.ready_calls().await, vec![true]);
    assert!(session.handle.snapshot().await.unwrap().relay);

    // frames are only taken from the receive side
    session
        .transport
        .deliver_frame(
            RELAY_SEND_LABEL,
            peer_frame(FromPeerMessage::Response { text: "wrong".into() }),
        )
        .await;
    session
        .transport
        .deliver_frame(
            RELAY_RECV_LABEL,
            peer_frame(FromPeerMessage::Response { text: "right".into() }),
        )
        .await;

    session
        .listener
        .wait_for(|e| matches!(e, SessionEvent::Message(_)), 5000)
        .await
        .expect("no message dispatched");
    let messages: Vec<SessionEvent> = session
        .listener
        .get_events()
        .await
        .into_iter()
        .filter(|e| matches!(e, SessionEvent::Message(_)))
        .collect();
    assert_eq!(
        messages,
        vec![SessionEvent::Message(FromPeerMessage::Response {
            text: "right".into()
        })]
    );
}
