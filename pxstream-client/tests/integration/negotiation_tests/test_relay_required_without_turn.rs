use pxstream_client::{NegotiationError, NegotiationState, SessionError, SessionEvent};
use pxstream_core::{SignalMessage, StreamConfig};

use crate::integration::{REMOTE_OFFER, create_test_session, init_tracing, open_signaling, stun_config};

#[tokio::test]
async fn test_relay_required_without_turn() {
    init_tracing();

    let config = StreamConfig {
        force_relay: true,
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

    let error = session
        .listener
        .wait_for(|e| matches!(e, SessionEvent::Error(_)), 5000)
        .await
        .expect("no error reported");
    assert_eq!(
        error,
        SessionEvent::Error(SessionError::Negotiation(NegotiationError::RelayUnavailable))
    );

    assert!(session.listener.wait_for_state(NegotiationState::Closed, 5000).await);
    let states = session.listener.states().await;
    assert!(states.contains(&NegotiationState::Failed));
    assert!(!states.contains(&NegotiationState::DescriptionExchanging));

    // relay is never retried and nothing was gathered
    assert_eq!(session.transport.created().await, 0);
    assert!(
        session
            .listener
            .wait_for(|e| matches!(e, SessionEvent::Disconnected { .. }), 5000)
            .await
            .is_some()
    );
    assert_eq!(
        session
            .signaling
            .count_sent(|m| matches!(m, SignalMessage::Subscribe { .. }))
            .await,
        1
    );
}

#[tokio::test]
async fn test_relay_required_peer_config_after_offer() {
    init_tracing();

    let config = StreamConfig {
        force_relay: true,
        ..StreamConfig::default()
    };
    let session = create_test_session(config);
    open_signaling(&session).await;

    // the streamer's offer is held until a peer config arrives
    session
        .signaling
        .deliver(SignalMessage::Offer {
            sdp: REMOTE_OFFER.into(),
        })
        .await;
    session
        .signaling
        .deliver(SignalMessage::PeerConfig {
            config: stun_config(),
        })
        .await;

    let error = session
        .listener
        .wait_for(|e| matches!(e, SessionEvent::Error(_)), 5000)
        .await
        .expect("no error reported");
    assert_eq!(
        error,
        SessionEvent::Error(SessionError::Negotiation(NegotiationError::RelayUnavailable))
    );
    assert!(session.listener.wait_for_state(NegotiationState::Closed, 5000).await);

    // the held offer is never answered and nothing was gathered
    assert_eq!(session.transport.created().await, 0);
    assert!(session.transport.calls().await.is_empty());
    assert_eq!(
        session
            .signaling
            .count_sent(|m| matches!(m, SignalMessage::Answer { .. }))
            .await,
        0
    );
    assert!(
        !session
            .listener
            .states()
            .await
            .contains(&NegotiationState::DescriptionExchanging)
    );
}

#[tokio::test]
async fn test_relay_required_with_turn_restricts_candidates() {
    init_tracing();

    let config = StreamConfig {
        force_relay: true,
        ..StreamConfig::default()
    };
    let session = create_test_session(config);
    open_signaling(&session).await;

    session
        .signaling
        .deliver(SignalMessage::PeerConfig {
            config: crate::integration::turn_config(),
        })
        .await;

    let created = session
        .transport
        .wait_for_call(|c| matches!(c, crate::utils::TransportCall::Created(_)), 5000)
        .await
        .expect("transport never created");
    let crate::utils::TransportCall::Created(request) = created else {
        unreachable!();
    };
    assert!(request.relay_only);
    assert_eq!(request.ice_servers, crate::integration::turn_config().relay_servers);
}
