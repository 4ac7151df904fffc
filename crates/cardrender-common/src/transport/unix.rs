use std::path::Path;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;

use crate::protocol::error::{RenderError, Result};
use crate::protocol::{RenderRequest, RenderResponse};
use crate::transport::codec::JsonCodec;
use crate::transport::frame::{read_frame_async, write_frame_async};

/// Unix socket transport for the render client.
///
/// One connection carries exactly one request and one response. After the
/// request frame is written the write half is shut down, so the server sees
/// end-of-stream instead of waiting for a second frame.
///
/// Timeouts are not applied here; callers wrap these calls in their own
/// deadline.
///
/// # Example
///
/// ```no_run
/// use cardrender_common::transport::UnixTransport;
/// use cardrender_common::protocol::RenderRequest;
///
/// # async fn run() -> cardrender_common::protocol::Result<()> {
/// let mut stream = UnixTransport::connect("gui.sock").await?;
/// let request = RenderRequest::new("ping", vec![], Default::default());
/// let response = UnixTransport::send_request(&mut stream, &request).await?;
/// # Ok(())
/// # }
/// ```
pub struct UnixTransport;

impl UnixTransport {
    /// Opens a connection to the server socket at `path`.
    pub async fn connect(path: impl AsRef<Path>) -> Result<UnixStream> {
        let path = path.as_ref();
        UnixStream::connect(path).await.map_err(|e| {
            RenderError::ConnectionFailure(format!("Failed to connect to {}: {}", path.display(), e))
        })
    }

    /// Sends a request and waits for its response.
    ///
    /// A server that closes the connection without replying yields
    /// [`RenderError::EmptyResponse`].
    pub async fn send_request(
        stream: &mut UnixStream,
        request: &RenderRequest,
    ) -> Result<RenderResponse> {
        let encoded = JsonCodec::encode_request(request)?;

        write_frame_async(stream, &encoded)
            .await
            .map_err(|e| Self::map_io_error(e, "sending request"))?;
        stream
            .shutdown()
            .await
            .map_err(|e| Self::map_io_error(e, "closing write half"))?;

        let reply = read_frame_async(stream)
            .await
            .map_err(|e| Self::map_io_error(e, "reading response"))?;

        match reply {
            Some(data) if !data.is_empty() => JsonCodec::decode_response(&data),
            _ => Err(RenderError::EmptyResponse),
        }
    }

    /// Maps an I/O error to a connection failure with context.
    fn map_io_error(e: std::io::Error, context: &str) -> RenderError {
        RenderError::ConnectionFailure(format!("{} failed: {}", context, e))
    }
}
