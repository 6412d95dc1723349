use crate::channel::{Diagnostics, MessageHandler};
use crate::error::SessionError;
use crate::input::{EncoderSettings, InputEvent};
use crate::ownership::Capability;
use crate::session::session_command::SessionCommand;
use crate::session::SessionSnapshot;
use pxstream_core::SessionId;
use tokio::sync::{mpsc, oneshot};

/// Cheap, cloneable address of a running [`SessionOrchestrator`](crate::SessionOrchestrator).
///
/// Methods that return a value wait for the session loop to answer. The
/// rest only enqueue and are safe to call from a listener.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<SessionCommand>,
}

impl SessionHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<SessionCommand>) -> Self {
        Self { tx }
    }

    fn post(&self, command: SessionCommand) -> Result<(), SessionError> {
        self.tx.send(command).map_err(|_| SessionError::Closed)
    }

    async fn ask<T>(&self, command: SessionCommand, rx: oneshot::Receiver<T>) -> Result<T, SessionError> {
        self.post(command)?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// Start a session, or return the id of the one already live.
    pub async fn connect(&self) -> Result<SessionId, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.ask(SessionCommand::Connect { reply: Some(reply) }, rx).await?
    }

    pub fn request_connect(&self) -> Result<(), SessionError> {
        self.post(SessionCommand::Connect { reply: None })
    }

    /// Tear the session down and wait until it is gone.
    pub async fn disconnect(&self, reason: impl Into<String>) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        let command = SessionCommand::Disconnect {
            reason: reason.into(),
            reply: Some(reply),
        };
        self.ask(command, rx).await
    }

    pub fn request_disconnect(&self, reason: impl Into<String>) -> Result<(), SessionError> {
        self.post(SessionCommand::Disconnect {
            reason: reason.into(),
            reply: None,
        })
    }

    /// Encode and send one event, reporting gating or channel errors.
    pub async fn send(&self, event: impl Into<InputEvent>) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        let command = SessionCommand::Send {
            event: event.into(),
            reply: Some(reply),
        };
        self.ask(command, rx).await?
    }

    /// Like [`send`](Self::send) without waiting; failures are only logged.
    pub fn queue(&self, event: impl Into<InputEvent>) -> Result<(), SessionError> {
        self.post(SessionCommand::Send {
            event: event.into(),
            reply: None,
        })
    }

    pub fn subscribe(&self, streamer_id: impl Into<String>) -> Result<(), SessionError> {
        self.post(SessionCommand::Subscribe {
            streamer_id: streamer_id.into(),
        })
    }

    pub fn request_quality_control(&self) -> Result<(), SessionError> {
        self.post(SessionCommand::RequestQualityControl)
    }

    pub fn release(&self, capability: Capability) -> Result<(), SessionError> {
        self.post(SessionCommand::Release { capability })
    }

    /// Send a latency probe; the result arrives as `SessionEvent::LatencyProbe`.
    pub fn latency_test(&self) -> Result<(), SessionError> {
        self.post(SessionCommand::LatencyTest)
    }

    /// Sample transport statistics now; the result arrives as
    /// `SessionEvent::Stats`.
    pub fn request_stats(&self) -> Result<(), SessionError> {
        self.post(SessionCommand::CollectStats)
    }

    /// Ask the streamer's encoder to keep its quantizer within
    /// `min_qp..=max_qp`. Needs quality control.
    pub async fn send_encoder_settings(&self, settings: EncoderSettings) -> Result<(), SessionError> {
        self.send(InputEvent::EncoderSettings(settings)).await
    }

    pub async fn show_fps(&self) -> Result<(), SessionError> {
        self.send(InputEvent::ShowFps).await
    }

    pub fn set_idle_detection(&self, enabled: bool) -> Result<(), SessionError> {
        self.post(SessionCommand::SetIdleDetection { enabled })
    }

    /// Report user activity that did not go through [`send`](Self::send).
    pub fn notify_activity(&self) -> Result<(), SessionError> {
        self.post(SessionCommand::Activity)
    }

    /// Route inbound messages named `name` to `handler` instead of the
    /// listeners. A later registration for the same name replaces it.
    pub fn register_handler(&self, name: impl Into<String>, handler: MessageHandler) -> Result<(), SessionError> {
        self.post(SessionCommand::RegisterHandler {
            name: name.into(),
            handler,
        })
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.ask(SessionCommand::Snapshot { reply }, rx).await
    }

    pub async fn diagnostics(&self) -> Result<Diagnostics, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.ask(SessionCommand::Diagnostics { reply }, rx).await
    }

    /// Disconnect and stop the session loop.
    pub fn shutdown(&self) -> Result<(), SessionError> {
        self.post(SessionCommand::Shutdown)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
