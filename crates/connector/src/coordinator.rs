//! Drives one logical request over one transport
//!
//! Sends the request's opening commands, then reads text messages until the
//! request reports a result, the deadline passes, or the caller cancels.
//! The transport is closed exactly once whichever way the request ends.

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::{FrameError, SessionError, TransportError};
use crate::frame::{decode, encode, split_frames};
use crate::messages::{classify, Message};
use crate::request::{Request, Step};
use crate::session::SessionId;
use crate::traits::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    Sent,
    Receiving,
    Complete,
    Failed,
}

pub struct Coordinator<T: Transport> {
    transport: T,
    config: SessionConfig,
    state: SessionState,
}

impl<T: Transport> Coordinator<T> {
    pub fn new(transport: T, config: SessionConfig) -> Self {
        Self {
            transport,
            config,
            state: SessionState::Init,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run `request` to completion within the configured request timeout.
    ///
    /// Never returns a partial result: any failure, including a stream that
    /// ends before the terminal message, is an error.
    pub async fn run<R: Request>(
        self,
        request: R,
        cancel: &CancellationToken,
    ) -> Result<R::Output, SessionError> {
        let deadline = Instant::now() + self.config.request_timeout;
        self.run_until(request, cancel, deadline).await
    }

    /// Like [`run`](Self::run), but against a deadline the caller already
    /// started, so time spent connecting counts toward the same budget
    pub async fn run_until<R: Request>(
        mut self,
        mut request: R,
        cancel: &CancellationToken,
        deadline: Instant,
    ) -> Result<R::Output, SessionError> {
        let session = request.new_session();
        let secs = self.config.request_timeout.as_secs();

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(session = %session, "Request cancelled");
                Err(SessionError::Cancelled)
            }
            outcome = tokio::time::timeout_at(deadline, self.drive(&session, &mut request)) => {
                match outcome {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(session = %session, timeout_secs = secs, "Request timed out");
                        Err(SessionError::Timeout { secs })
                    }
                }
            }
        };

        self.transition(
            &session,
            if result.is_ok() {
                SessionState::Complete
            } else {
                SessionState::Failed
            },
        );

        if let Err(e) = self.transport.close().await {
            warn!(session = %session, error = %e, "Failed to close transport");
        }

        result
    }

    async fn drive<R: Request>(
        &mut self,
        session: &SessionId,
        request: &mut R,
    ) -> Result<R::Output, SessionError> {
        for command in request.commands(session, &self.config)? {
            debug!(session = %session, command = command.m, "Sending command");
            self.transport.send(command.to_frame()?).await?;
        }
        self.transition(session, SessionState::Sent);

        loop {
            let wire = match self.transport.receive().await {
                Ok(wire) => wire,
                Err(TransportError::ConnectionClosed) => {
                    warn!(session = %session, "Stream ended before request completed");
                    return Err(SessionError::UnexpectedClose);
                }
                Err(e) => return Err(e.into()),
            };
            if self.state == SessionState::Sent {
                self.transition(session, SessionState::Receiving);
            }

            for message in inbound_messages(&wire) {
                if let Message::Heartbeat(payload) = message {
                    debug!(session = %session, heartbeat = %payload, "Echoing heartbeat");
                    self.transport.send(encode(&payload)).await?;
                    continue;
                }

                match request.accept(session, message) {
                    Step::Continue => {}
                    Step::Complete(output) => {
                        info!(session = %session, "Request complete");
                        return Ok(output);
                    }
                    Step::Fail(e) => return Err(e),
                }
            }
        }
    }

    fn transition(&mut self, session: &SessionId, next: SessionState) {
        debug!(session = %session, from = ?self.state, to = ?next, "Session state");
        self.state = next;
    }
}

/// Split one inbound text message into classified messages, in order.
///
/// Frames are parsed strictly first. Once a frame is malformed, the rest of
/// the text is recovered with the lenient decoder.
pub fn inbound_messages(wire: &str) -> Vec<Message> {
    let mut messages = Vec::new();

    for frame in split_frames(wire) {
        match frame {
            Ok(frame) if frame.is_heartbeat() => {
                messages.push(Message::Heartbeat(frame.payload.to_string()));
            }
            Ok(frame) => messages.extend(decode(frame.payload).into_iter().map(classify)),
            Err(FrameError::MalformedFrame { offset, reason }) => {
                warn!(offset, reason = %reason, "Malformed frame, decoding remainder leniently");
                messages.extend(decode(&wire[offset..]).into_iter().map(classify));
            }
        }
    }

    messages
}
