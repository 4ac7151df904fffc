//! Cardrender Common Types and Transport
//!
//! This crate provides the wire envelope, request context, framing and
//! configuration shared by the render client and the render server.
//!
//! # Overview
//!
//! Image rendering runs in a separate server process. Clients send a
//! [`RenderRequest`] naming a route over a Unix socket and get back a
//! [`RenderResponse`] carrying the encoded image bytes or an error state.
//!
//! # Architecture
//!
//! - **Transport**: Unix domain socket, one connection per request
//! - **Serialization**: JSON, image bytes as base64
//! - **Message Format**: `[4-byte length prefix as u32 big-endian] + [JSON data]`
//! - **Max Message Size**: 100 MB
//!
//! # Components
//!
//! - [`protocol`] - Request/response envelope, request ids, context, errors
//! - [`transport`] - Framing, codec, socket client and server
//! - [`config`] - TOML configuration
//!
//! # Example
//!
//! ```
//! use cardrender_common::{RenderRequest, RenderResponse, RequestState};
//! use serde_json::json;
//!
//! let request = RenderRequest::new("weekly", vec![json!({"guild": 42})], Default::default());
//! let id = request.id.clone().unwrap();
//!
//! let response = RenderResponse::completed(id, b"\x89PNG".to_vec(), None, 0.12);
//! assert_eq!(response.state, RequestState::Success);
//! ```

pub mod config;
pub mod protocol;
pub mod transport;

pub use config::{ConfigError, RenderConfig};
pub use protocol::*;
