//! Wire Protocol Constants

use std::time::Duration;

// Frame header: timestamp_ns(u64) | message_type(u32) | sequence(u64) | body_length(u32)
pub const HEADER_LEN: usize = 24;

// Largest body accepted in either direction
pub const MAX_BODY_LEN: u32 = 64 * 1024;

// Handshake phase 1
pub const MSG_HELLO: u32 = 1;
pub const MSG_HELLO_ACK: u32 = 2;

// Handshake phase 2
pub const MSG_READY: u32 = 3;
pub const MSG_READY_ACK: u32 = 4;

// Control commands (START, END, CONNECTION_FAIL:<names>)
pub const MSG_COMMAND: u32 = 5;
pub const MSG_COMMAND_ACK: u32 = 6;

// Operator events
pub const MSG_EVENT: u32 = 7;
pub const MSG_EVENT_ACK: u32 = 8;

// Command bodies
pub const CMD_START: &str = "START";
pub const CMD_END: &str = "END";
pub const CMD_CONNECTION_FAIL_PREFIX: &str = "CONNECTION_FAIL:";

/// Receive timeout applied to every socket read
pub const RECEIVE_TIMEOUT: Duration = Duration::from_millis(500);
