use bytes::Bytes;
use pxstream_client::{CompletedTransfer, SessionEvent, TransferKind};
use pxstream_core::utils::DIRECT_CHANNEL_LABEL;
use pxstream_core::{FromPeerMessage, StreamConfig};

use crate::integration::{TestSession, connect_direct, create_test_session, init_tracing, peer_frame};

fn freeze_header(total_len: u32, first: &'static [u8]) -> FromPeerMessage {
    FromPeerMessage::FreezeFrame {
        total_len,
        chunk: Bytes::from_static(first),
    }
}

fn freeze_chunk(chunk: &'static [u8]) -> FromPeerMessage {
    FromPeerMessage::FreezeFrameChunk {
        chunk: Bytes::from_static(chunk),
    }
}

fn is_transfer(e: &SessionEvent) -> bool {
    matches!(e, SessionEvent::TransferComplete(_))
}

async fn deliver_all(session: &TestSession, messages: impl IntoIterator<Item = FromPeerMessage>) {
    for message in messages {
        session
            .transport
            .deliver_frame(DIRECT_CHANNEL_LABEL, peer_frame(message))
            .await;
    }
}

/// Frames are handled in order, so once this marker is reported every
/// frame delivered before it has been processed.
async fn settle(session: &TestSession, marker: &str) {
    deliver_all(session, [FromPeerMessage::Response { text: marker.into() }]).await;
    session
        .listener
        .wait_for(
            |e| matches!(e, SessionEvent::Message(FromPeerMessage::Response { text }) if text == marker),
            5000,
        )
        .await
        .expect("marker never dispatched");
}

#[tokio::test]
async fn test_freeze_frame_delivered_once() {
    init_tracing();

    let session = create_test_session(StreamConfig::default());
    connect_direct(&session).await;

    deliver_all(&session, [freeze_header(9, b"abcd"), freeze_chunk(b"efghi")]).await;
    let done = session
        .listener
        .wait_for(is_transfer, 5000)
        .await
        .expect("freeze frame never completed");
    assert_eq!(
        done,
        SessionEvent::TransferComplete(CompletedTransfer {
            kind: TransferKind::FreezeFrame,
            data: Bytes::from_static(b"abcdefghi"),
            overrun: 0,
            extension: None,
            mime_type: None,
        })
    );

    // a stray chunk after completion starts nothing
    deliver_all(&session, [freeze_chunk(b"xyz")]).await;
    settle(&session, "after-stray").await;

    let diagnostics = session.handle.diagnostics().await.unwrap();
    assert_eq!(diagnostics.orphan_chunks, 1);
    assert_eq!(diagnostics.superseded_transfers, 0);
    assert_eq!(session.listener.count(is_transfer).await, 1);
    // transfer pieces are not reported as plain messages
    assert_eq!(
        session
            .listener
            .count(|e| matches!(e, SessionEvent::Message(_)))
            .await,
        1
    );
}

#[tokio::test]
async fn test_same_length_header_supersedes() {
    init_tracing();

    let session = create_test_session(StreamConfig::default());
    connect_direct(&session).await;

    deliver_all(
        &session,
        [
            freeze_header(9, b"AAAA"),
            freeze_header(9, b"BBBB"),
            freeze_chunk(b"BBBBB"),
        ],
    )
    .await;

    let done = session
        .listener
        .wait_for(is_transfer, 5000)
        .await
        .expect("second frame never completed");
    let SessionEvent::TransferComplete(done) = done else {
        unreachable!();
    };
    assert_eq!(done.data, Bytes::from_static(b"BBBBBBBBB"));
    assert_eq!(done.overrun, 0);

    let diagnostics = session.handle.diagnostics().await.unwrap();
    assert_eq!(diagnostics.superseded_transfers, 1);
    assert_eq!(diagnostics.transfer_overruns, 0);
    assert_eq!(session.listener.count(is_transfer).await, 1);
}

#[tokio::test]
async fn test_unfreeze_discards_partial_frame() {
    init_tracing();

    let session = create_test_session(StreamConfig::default());
    connect_direct(&session).await;

    deliver_all(
        &session,
        [freeze_header(9, b"abcd"), FromPeerMessage::UnfreezeFrame],
    )
    .await;
    session
        .listener
        .wait_for(|e| *e == SessionEvent::FreezeFrameCleared, 5000)
        .await
        .expect("unfreeze not reported");

    // the rest of the dropped frame has nothing to join
    deliver_all(&session, [freeze_chunk(b"efghi")]).await;

    // a header may carry no bytes of its own
    deliver_all(
        &session,
        [freeze_header(5, b""), freeze_chunk(b"xyz"), freeze_chunk(b"12")],
    )
    .await;

    let done = session
        .listener
        .wait_for(is_transfer, 5000)
        .await
        .expect("fresh frame never completed");
    let SessionEvent::TransferComplete(done) = done else {
        unreachable!();
    };
    assert_eq!(done.data, Bytes::from_static(b"xyz12"));

    let diagnostics = session.handle.diagnostics().await.unwrap();
    assert_eq!(diagnostics.orphan_chunks, 1);
    assert_eq!(diagnostics.superseded_transfers, 0);
    assert_eq!(session.listener.count(is_transfer).await, 1);
}

#[tokio::test]
async fn test_file_transfer_carries_metadata() {
    init_tracing();

    let session = create_test_session(StreamConfig::default());
    connect_direct(&session).await;

    deliver_all(
        &session,
        [
            // empty transfers are refused outright
            FromPeerMessage::FileContents {
                total_len: 0,
                chunk: Bytes::new(),
            },
            FromPeerMessage::FileExtension {
                extension: "csv".into(),
            },
            FromPeerMessage::FileMimeType {
                mime_type: "text/csv".into(),
            },
            FromPeerMessage::FileContents {
                total_len: 4,
                chunk: Bytes::from_static(b"a,"),
            },
            FromPeerMessage::FileContentsChunk {
                chunk: Bytes::from_static(b"b\nextra"),
            },
        ],
    )
    .await;

    let done = session
        .listener
        .wait_for(is_transfer, 5000)
        .await
        .expect("file never completed");
    let SessionEvent::TransferComplete(done) = done else {
        unreachable!();
    };
    assert_eq!(done.kind, TransferKind::File);
    assert_eq!(done.data, Bytes::from_static(b"a,b\n"));
    assert_eq!(done.overrun, 5);
    assert_eq!(done.extension.as_deref(), Some("csv"));
    assert_eq!(done.mime_type.as_deref(), Some("text/csv"));

    let diagnostics = session.handle.diagnostics().await.unwrap();
    assert_eq!(diagnostics.transfer_overruns, 1);
    assert_eq!(diagnostics.malformed, 1);
    assert_eq!(diagnostics.orphan_chunks, 0);
}
