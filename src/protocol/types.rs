//! Wire Protocol Types

use crate::protocol::constants::*;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Framing failures
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown message type: {0}")]
    UnknownMessageType(u32),

    #[error("Frame body of {0} bytes exceeds the {MAX_BODY_LEN} byte limit")]
    BodyTooLarge(usize),

    #[error("Timed out after {0:?} waiting for a frame")]
    Timeout(std::time::Duration),
}

/// Message types carried in the frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Hello,
    HelloAck,
    Ready,
    ReadyAck,
    Command,
    CommandAck,
    Event,
    EventAck,
}

impl MessageType {
    /// Get the wire code for this message type
    pub fn code(self) -> u32 {
        match self {
            MessageType::Hello => MSG_HELLO,
            MessageType::HelloAck => MSG_HELLO_ACK,
            MessageType::Ready => MSG_READY,
            MessageType::ReadyAck => MSG_READY_ACK,
            MessageType::Command => MSG_COMMAND,
            MessageType::CommandAck => MSG_COMMAND_ACK,
            MessageType::Event => MSG_EVENT,
            MessageType::EventAck => MSG_EVENT_ACK,
        }
    }

    /// Create from wire code
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            MSG_HELLO => Some(MessageType::Hello),
            MSG_HELLO_ACK => Some(MessageType::HelloAck),
            MSG_READY => Some(MessageType::Ready),
            MSG_READY_ACK => Some(MessageType::ReadyAck),
            MSG_COMMAND => Some(MessageType::Command),
            MSG_COMMAND_ACK => Some(MessageType::CommandAck),
            MSG_EVENT => Some(MessageType::Event),
            MSG_EVENT_ACK => Some(MessageType::EventAck),
            _ => None,
        }
    }

    /// The reply a backend must send for this request type
    pub fn expected_reply(self) -> Option<MessageType> {
        match self {
            MessageType::Hello => Some(MessageType::HelloAck),
            MessageType::Ready => Some(MessageType::ReadyAck),
            MessageType::Command => Some(MessageType::CommandAck),
            MessageType::Event => Some(MessageType::EventAck),
            _ => None,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageType::Hello => "HELLO",
            MessageType::HelloAck => "HELLO_ACK",
            MessageType::Ready => "READY",
            MessageType::ReadyAck => "READY_ACK",
            MessageType::Command => "COMMAND",
            MessageType::CommandAck => "COMMAND_ACK",
            MessageType::Event => "EVENT",
            MessageType::EventAck => "EVENT_ACK",
        };
        write!(f, "{}({})", name, self.code())
    }
}

/// Fixed-size little-endian frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub timestamp_ns: u64,
    pub message_type: MessageType,
    pub sequence: u64,
    pub body_length: u32,
}

impl FrameHeader {
    /// Append the encoded header to `buf`
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64_le(self.timestamp_ns);
        buf.put_u32_le(self.message_type.code());
        buf.put_u64_le(self.sequence);
        buf.put_u32_le(self.body_length);
    }

    /// Decode a header, rejecting unknown types and oversized bodies
    pub fn decode(raw: &[u8; HEADER_LEN]) -> Result<Self, FrameError> {
        let mut buf = &raw[..];
        let timestamp_ns = buf.get_u64_le();
        let code = buf.get_u32_le();
        let sequence = buf.get_u64_le();
        let body_length = buf.get_u32_le();

        let message_type =
            MessageType::from_code(code).ok_or(FrameError::UnknownMessageType(code))?;
        if body_length > MAX_BODY_LEN {
            return Err(FrameError::BodyTooLarge(body_length as usize));
        }

        Ok(Self {
            timestamp_ns,
            message_type,
            sequence,
            body_length,
        })
    }
}

/// A complete protocol message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    pub body: Bytes,
}

impl Frame {
    /// Build a frame stamped with the current time
    pub fn new(message_type: MessageType, sequence: u64, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        Self {
            header: FrameHeader {
                timestamp_ns: now_ns(),
                message_type,
                sequence,
                body_length: body.len() as u32,
            },
            body,
        }
    }

    pub fn message_type(&self) -> MessageType {
        self.header.message_type
    }

    /// Encode header and body into one buffer
    pub fn encode(&self) -> Result<Bytes, FrameError> {
        if self.body.len() > MAX_BODY_LEN as usize {
            return Err(FrameError::BodyTooLarge(self.body.len()));
        }
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.body.len());
        self.header.encode(&mut buf);
        buf.extend_from_slice(&self.body);
        Ok(buf.freeze())
    }

    /// Body as text, replacing invalid UTF-8
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Messages the dispatcher sends once backends are ready
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    End,
    ConnectionFail(Vec<String>),
    Event(String),
}

impl Command {
    pub fn message_type(&self) -> MessageType {
        match self {
            Command::Event(_) => MessageType::Event,
            _ => MessageType::Command,
        }
    }

    /// Wire body for this command
    pub fn body(&self) -> String {
        match self {
            Command::Event(payload) => payload.clone(),
            other => other.to_string(),
        }
    }

    /// Frame for this command with the given sequence number
    pub fn to_frame(&self, sequence: u64) -> Frame {
        Frame::new(self.message_type(), sequence, self.body())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Start => f.write_str(CMD_START),
            Command::End => f.write_str(CMD_END),
            Command::ConnectionFail(names) => {
                write!(f, "{}{}", CMD_CONNECTION_FAIL_PREFIX, names.join(","))
            }
            Command::Event(payload) => write!(f, "EVENT:{}", payload),
        }
    }
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}
