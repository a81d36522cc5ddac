//! Socket Session
//!
//! One TCP connection to one backend endpoint. A session only moves
//! forward through its states; once it fails or is closed it is never
//! used again, and its owner opens a fresh one after a teardown.

use super::{Endpoint, SessionSettings, SessionState};
use crate::error::ControlError;
use crate::protocol::{self, Frame, FrameError, MessageType};
use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};
use uuid::Uuid;

/// A connection to a single backend endpoint
#[derive(Debug)]
pub struct SocketSession {
    session_id: String,
    endpoint: Endpoint,
    state: SessionState,
    stream: Option<TcpStream>,
    settings: SessionSettings,
    next_sequence: u64,
}

impl SocketSession {
    /// A session that has not connected yet
    pub fn new(endpoint: &Endpoint, settings: SessionSettings) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            endpoint: endpoint.clone(),
            state: SessionState::Connecting,
            stream: None,
            settings,
            next_sequence: 1,
        }
    }

    /// Connect to `endpoint` within the configured connect timeout
    pub async fn open(endpoint: &Endpoint, settings: SessionSettings) -> Result<Self, ControlError> {
        let mut session = Self::new(endpoint, settings);
        session.connect().await?;
        Ok(session)
    }

    /// Connecting -> Connected; a failed attempt leaves the session Failed
    pub async fn connect(&mut self) -> Result<(), ControlError> {
        if self.state != SessionState::Connecting {
            return Err(ControlError::protocol(
                &self.endpoint,
                format!("connect requires a new session, state is {:?}", self.state),
            ));
        }
        debug!(session_id = %self.session_id, endpoint = %self.endpoint, "Connecting");

        let limit = self.settings.connect_timeout;
        let connect = TcpStream::connect((self.endpoint.host.as_str(), self.endpoint.port));
        let stream = match timeout(limit, connect).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                self.state = SessionState::Failed;
                return Err(ControlError::connect(&self.endpoint, e.to_string()));
            }
            Err(_) => {
                self.state = SessionState::Failed;
                return Err(ControlError::connect(
                    &self.endpoint,
                    format!("timed out after {:?}", limit),
                ));
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            debug!(session_id = %self.session_id, "Failed to set TCP_NODELAY: {}", e);
        }

        self.stream = Some(stream);
        self.state = SessionState::Connected;
        debug!(session_id = %self.session_id, endpoint = %self.endpoint, "Connected");
        Ok(())
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// HELLO -> HELLO_ACK
    pub async fn handshake_phase_one(&mut self) -> Result<(), ControlError> {
        if self.state != SessionState::Connected {
            return Err(ControlError::protocol(
                &self.endpoint,
                format!("phase one requires a connected session, state is {:?}", self.state),
            ));
        }

        self.exchange(MessageType::Hello, Bytes::new())
            .await
            .map_err(|reason| self.fail(reason))?;
        self.state = SessionState::PhaseOneDone;
        debug!(session_id = %self.session_id, endpoint = %self.endpoint, "Handshake phase one complete");
        Ok(())
    }

    /// READY -> READY_ACK; only after every sibling finished phase one
    pub async fn handshake_phase_two(&mut self) -> Result<(), ControlError> {
        if self.state != SessionState::PhaseOneDone {
            return Err(ControlError::protocol(
                &self.endpoint,
                format!("phase two requires phase one, state is {:?}", self.state),
            ));
        }

        self.exchange(MessageType::Ready, Bytes::new())
            .await
            .map_err(|reason| self.fail(reason))?;
        self.state = SessionState::HandshakeDone;
        debug!(session_id = %self.session_id, endpoint = %self.endpoint, "Handshake phase two complete");
        Ok(())
    }

    /// Deliver a frame and wait for its acknowledgement
    pub async fn send(&mut self, frame: &Frame) -> Result<(), ControlError> {
        if self.state != SessionState::HandshakeDone {
            return Err(ControlError::io(
                &self.endpoint,
                std::io::Error::new(
                    std::io::ErrorKind::NotConnected,
                    format!("session is not established (state {:?})", self.state),
                ),
            ));
        }

        match self.acknowledged(frame).await {
            Ok(()) => Ok(()),
            Err(e) => {
                // A failed exchange leaves the stream out of step with the backend
                warn!(session_id = %self.session_id, endpoint = %self.endpoint, "Send failed, discarding session: {}", e);
                self.discard().await;
                Err(ControlError::io(&self.endpoint, e))
            }
        }
    }

    /// Close the transport. Safe to call any number of times.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                debug!(session_id = %self.session_id, "Error shutting down socket: {}", e);
            }
            debug!(session_id = %self.session_id, endpoint = %self.endpoint, "Session closed");
        }
        if self.state != SessionState::Failed {
            self.state = SessionState::Disconnected;
        }
    }

    /// Send a request of `message_type` and check the reply
    async fn exchange(&mut self, message_type: MessageType, body: Bytes) -> Result<(), String> {
        let sequence = self.take_sequence();
        let frame = Frame::new(message_type, sequence, body);
        let reply = self.round_trip(&frame).await.map_err(|e| e.to_string())?;
        check_reply(&frame, &reply)
    }

    async fn acknowledged(&mut self, frame: &Frame) -> Result<(), std::io::Error> {
        let reply = self.round_trip(frame).await.map_err(into_io_error)?;
        check_reply(frame, &reply)
            .map_err(|reason| std::io::Error::new(std::io::ErrorKind::InvalidData, reason))
    }

    async fn round_trip(&mut self, frame: &Frame) -> Result<Frame, FrameError> {
        let limit = self.settings.receive_timeout;
        let stream = self.stream.as_mut().ok_or_else(|| {
            FrameError::Io(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "socket already closed",
            ))
        })?;

        protocol::write_frame(stream, frame, limit).await?;
        protocol::read_frame(stream, limit).await
    }

    /// Next outgoing sequence number
    pub fn take_sequence(&mut self) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        sequence
    }

    fn fail(&mut self, reason: String) -> ControlError {
        warn!(session_id = %self.session_id, endpoint = %self.endpoint, "Handshake failed: {}", reason);
        self.state = SessionState::Failed;
        self.stream = None;
        ControlError::protocol(&self.endpoint, reason)
    }

    async fn discard(&mut self) {
        self.state = SessionState::Failed;
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
    }
}

/// A reply acknowledges `request` only with the expected type and the same sequence
fn check_reply(request: &Frame, reply: &Frame) -> Result<(), String> {
    if let Some(expected) = request.message_type().expected_reply() {
        if reply.message_type() != expected {
            return Err(format!("expected {}, got {}", expected, reply.message_type()));
        }
    }
    if reply.header.sequence != request.header.sequence {
        return Err(format!(
            "reply sequence {} does not match request {}",
            reply.header.sequence, request.header.sequence
        ));
    }
    Ok(())
}

fn into_io_error(e: FrameError) -> std::io::Error {
    match e {
        FrameError::Io(e) => e,
        FrameError::Timeout(limit) => std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("no acknowledgement within {:?}", limit),
        ),
        other => std::io::Error::new(std::io::ErrorKind::InvalidData, other.to_string()),
    }
}
