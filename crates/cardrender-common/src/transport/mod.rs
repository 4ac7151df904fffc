//! Render transport layer
//!
//! # Architecture
//!
//! - **Transport**: Unix domain socket, one connection per request
//! - **Codec**: JSON serialization for envelopes and worker messages
//! - **Wire Format**: `[4-byte length prefix as u32 big-endian] + [JSON data]`
//!
//! The same framing is used on the pipes between the server and its worker
//! processes.
//!
//! # Components
//!
//! - **[`JsonCodec`]**: Encode/decode envelopes to JSON
//! - **[`frame`]**: Blocking and async length-prefixed framing
//! - **[`UnixTransport`]**: Client side of the socket
//! - **[`UnixServer`]**: Accept loop for the render server
//!
//! # Message Size Limits
//!
//! Frames larger than 100 MB are rejected on both read and write.

pub mod codec;
pub mod frame;
pub mod unix;
pub mod unix_server;

pub use codec::JsonCodec;
pub use frame::{read_frame, read_frame_async, write_frame, write_frame_async, MAX_MESSAGE_SIZE};
pub use unix::UnixTransport;
pub use unix_server::UnixServer;
