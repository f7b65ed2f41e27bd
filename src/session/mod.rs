//! Session tunnels
//!
//! A session call is hijacked into a raw duplex connection and handed to the
//! session manager, which owns it from then on.

pub mod hijack;
pub mod options;
pub mod tunnel;

pub use hijack::{hijack, CloseHandle, Conn, MessageStream, ServerStream, DEFAULT_MAX_FRAME_SIZE};
pub use options::SessionOptions;
