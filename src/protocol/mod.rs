//! Backend Wire Protocol
//!
//! Framing, message types and async frame I/O shared by every socket
//! session.

pub mod codec;
pub mod constants;
pub mod types;

pub use codec::{read_frame, write_frame};
pub use constants::*;
pub use types::*;
