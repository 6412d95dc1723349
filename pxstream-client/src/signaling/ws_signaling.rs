use crate::error::SignalingError;
use crate::signaling::{SignalingConnector, SignalingEvent, SignalingOutput};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use pxstream_core::SignalMessage;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// WebSocket signalling over `tokio-tungstenite`, one JSON message per text frame.
#[derive(Debug, Default, Clone)]
pub struct WsSignaling;

impl WsSignaling {
    pub fn new() -> Self {
        Self
    }
}

struct WsSignalingOutput {
    tx: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
}

#[async_trait]
impl SignalingOutput for WsSignalingOutput {
    async fn send_signal(&self, message: SignalMessage) -> Result<(), SignalingError> {
        let text = serde_json::to_string(&message)
            .map_err(|e| SignalingError::MalformedFrame(e.to_string()))?;
        debug!("-> signalling {}", message.kind());
        self.tx.send(text).map_err(|_| SignalingError::NotOpen)
    }

    async fn close(&self) {
        self.cancel.cancel();
    }
}

#[async_trait]
impl SignalingConnector for WsSignaling {
    async fn connect(
        &self,
        url: &str,
        generation: u64,
        events: mpsc::Sender<SignalingEvent>,
        cancel: CancellationToken,
    ) -> Result<Box<dyn SignalingOutput>, SignalingError> {
        info!("Connecting to signalling server {}", url);

        let (socket, _response) = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(SignalingError::ConnectFailed("cancelled".into()));
            }
            res = connect_async(url) => {
                res.map_err(|e| SignalingError::ConnectFailed(e.to_string()))?
            }
        };

        let (mut sender, mut receiver) = socket.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        let writer_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = writer_cancel.cancelled() => {
                        let _ = sender.send(Message::Close(None)).await;
                        break;
                    }
                    text = rx.recv() => {
                        let Some(text) = text else { break };
                        if let Err(e) = sender.send(Message::text(text)).await {
                            warn!("Signalling write failed: {}", e);
                            writer_cancel.cancel();
                            break;
                        }
                    }
                }
            }
        });

        let reader_cancel = cancel.clone();
        tokio::spawn(async move {
            let reason = loop {
                let frame = tokio::select! {
                    _ = reader_cancel.cancelled() => break "closed locally".to_string(),
                    frame = receiver.next() => frame,
                };

                match frame {
                    Some(Ok(Message::Text(text))) => {
                        let event = match serde_json::from_str::<SignalMessage>(&text) {
                            Ok(message) => SignalingEvent::Message {
                                generation,
                                message,
                            },
                            Err(e) => SignalingEvent::Malformed {
                                generation,
                                error: SignalingError::MalformedFrame(format!("{e}: {text}")),
                            },
                        };
                        if events.send(event).await.is_err() {
                            break "session loop gone".to_string();
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break frame
                            .map(|f| f.reason.to_string())
                            .filter(|r| !r.is_empty())
                            .unwrap_or_else(|| "closed by server".to_string());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break e.to_string(),
                    None => break "stream ended".to_string(),
                }
            };

            reader_cancel.cancel();
            info!("Signalling connection closed: {}", reason);
            let _ = events
                .send(SignalingEvent::Closed { generation, reason })
                .await;
        });

        Ok(Box::new(WsSignalingOutput { tx, cancel }))
    }
}
