use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::protocol::error::Result;
use crate::protocol::{RenderRequest, RenderResponse};

/// JSON codec for render envelopes.
///
/// Every message on the socket and on the worker pipes is a single JSON
/// document inside one length-prefixed frame.
///
/// # Example
///
/// ```
/// use cardrender_common::transport::JsonCodec;
/// use cardrender_common::protocol::RenderRequest;
/// use serde_json::json;
///
/// let request = RenderRequest::new("ping", vec![json!(1)], Default::default());
/// let encoded = JsonCodec::encode_request(&request).unwrap();
/// let decoded = JsonCodec::decode_request(&encoded).unwrap();
/// assert_eq!(request, decoded);
/// ```
pub struct JsonCodec;

impl JsonCodec {
    pub fn encode_request(request: &RenderRequest) -> Result<Vec<u8>> {
        Self::encode(request)
    }

    pub fn decode_request(data: &[u8]) -> Result<RenderRequest> {
        Self::decode(data)
    }

    pub fn encode_response(response: &RenderResponse) -> Result<Vec<u8>> {
        Self::encode(response)
    }

    pub fn decode_response(data: &[u8]) -> Result<RenderResponse> {
        Self::decode(data)
    }

    /// Encodes any serializable message.
    pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(message)?)
    }

    /// Decodes any deserializable message.
    pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(data)?)
    }
}
