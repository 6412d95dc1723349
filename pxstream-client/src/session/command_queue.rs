use crate::session::session_command::SessionCommand;
use std::collections::VecDeque;
use std::future::Future;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};

pub(crate) async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Why a transport step was abandoned before it finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Interrupted {
    /// A disconnect or shutdown is queued.
    Command,
    /// The negotiation deadline passed.
    Deadline,
    /// Every session handle is gone.
    HandlesDropped,
}

fn ends_session(command: &SessionCommand) -> bool {
    matches!(
        command,
        SessionCommand::Disconnect { .. } | SessionCommand::Shutdown
    )
}

/// Commands from the session handles, plus the ones that arrived while a
/// transport step was in flight. Deferred commands are served first.
pub(crate) struct CommandQueue {
    rx: mpsc::UnboundedReceiver<SessionCommand>,
    deferred: VecDeque<SessionCommand>,
}

impl CommandQueue {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<SessionCommand>) -> Self {
        Self {
            rx,
            deferred: VecDeque::new(),
        }
    }

    pub(crate) fn pop_deferred(&mut self) -> Option<SessionCommand> {
        self.deferred.pop_front()
    }

    pub(crate) async fn recv(&mut self) -> Option<SessionCommand> {
        self.rx.recv().await
    }

    /// Await `step` while still taking commands and watching `deadline`.
    ///
    /// Commands received meanwhile are deferred. A disconnect or shutdown,
    /// queued now or earlier, abandons the step by dropping it.
    pub(crate) async fn race<T>(
        &mut self,
        step: impl Future<Output = T>,
        deadline: Option<Instant>,
    ) -> Result<T, Interrupted> {
        if self.deferred.iter().any(ends_session) {
            return Err(Interrupted::Command);
        }

        tokio::pin!(step);
        loop {
            tokio::select! {
                biased;

                out = &mut step => return Ok(out),

                cmd = self.rx.recv() => match cmd {
                    Some(cmd) => {
                        let ends = ends_session(&cmd);
                        self.deferred.push_back(cmd);
                        if ends {
                            return Err(Interrupted::Command);
                        }
                    }
                    None => return Err(Interrupted::HandlesDropped),
                },

                _ = sleep_until_opt(deadline) => return Err(Interrupted::Deadline),
            }
        }
    }
}
