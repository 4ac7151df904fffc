use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info, warn};

use crate::protocol::error::{RenderError, Result};
use crate::protocol::{RenderRequest, RenderResponse, RequestId};
use crate::transport::codec::JsonCodec;
use crate::transport::frame::{read_frame_async, write_frame_async};

/// Async Unix socket server for the render server.
///
/// Every accepted connection is handled on its own task and carries one
/// request frame and one response frame. The socket file is removed when
/// the server is dropped.
pub struct UnixServer {
    listener: UnixListener,
    path: PathBuf,
}

impl UnixServer {
    /// Binds to the socket at `path`, removing a stale socket file first.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        match std::fs::remove_file(&path) {
            Ok(()) => debug!(path = %path.display(), "Removed stale socket"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(RenderError::ConnectionFailure(format!(
                    "Failed to remove stale socket {}: {}",
                    path.display(),
                    e
                )))
            }
        }

        let listener = UnixListener::bind(&path).map_err(|e| {
            RenderError::ConnectionFailure(format!("Failed to bind to {}: {}", path.display(), e))
        })?;

        Ok(Self { listener, path })
    }

    /// Path of the bound socket.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs the server with the given request handler until the process ends.
    pub async fn run_with_handler<F, Fut>(&self, handler: F) -> Result<()>
    where
        F: Fn(RenderRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RenderResponse> + Send + 'static,
    {
        self.serve_until(handler, std::future::pending()).await
    }

    /// Runs the server until `shutdown` resolves.
    ///
    /// Connections already accepted keep running on their own tasks; only
    /// the accept loop stops.
    pub async fn serve_until<F, Fut, S>(&self, handler: F, shutdown: S) -> Result<()>
    where
        F: Fn(RenderRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RenderResponse> + Send + 'static,
        S: Future<Output = ()>,
    {
        let handler = Arc::new(handler);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(path = %self.path.display(), "Server stopped accepting connections");
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    let stream = match accepted {
                        Ok((stream, _)) => stream,
                        Err(e) => {
                            warn!(error = %e, "Failed to accept connection");
                            continue;
                        }
                    };

                    let handler = handler.clone();
                    tokio::spawn(async move {
                        match handle_connection(stream, handler).await {
                            Ok(()) => {}
                            Err(e) if is_client_reset(&e) => info!("Request was cancelled"),
                            Err(e) => warn!(error = %e, "Connection error"),
                        }
                    });
                }
            }
        }
    }
}

impl Drop for UnixServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Handles one connection: one request frame in, one response frame out.
async fn handle_connection<F, Fut>(mut stream: UnixStream, handler: Arc<F>) -> io::Result<()>
where
    F: Fn(RenderRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = RenderResponse> + Send + 'static,
{
    let Some(buf) = read_frame_async(&mut stream).await? else {
        debug!("Connection closed before a request was sent");
        return Ok(());
    };

    let response = match JsonCodec::decode_request(&buf) {
        Ok(request) => handler(request).await,
        Err(e) => {
            let request_id = RequestId::generate();
            warn!(rqid = %request_id, error = %e, "Failed to decode request");
            RenderResponse::system_error(request_id, format!("malformed request: {}", e), 0.0)
        }
    };

    let encoded = JsonCodec::encode_response(&response)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
    write_frame_async(&mut stream, &encoded).await?;
    stream.shutdown().await
}

fn is_client_reset(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset | io::ErrorKind::NotConnected
    )
}
