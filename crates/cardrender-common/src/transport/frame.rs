//! Length-prefixed message framing.
//!
//! Wire format: `[4-byte length as u32 big-endian] + [data]`
//!
//! Used both on the server socket and on the pipes between the server and
//! its worker processes. Blocking variants serve the workers, async variants
//! serve the socket and the pool side of the pipes.

use std::io::{self, Read, Write};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum message size (100 MB)
pub const MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

fn frame_len(data: &[u8]) -> io::Result<[u8; 4]> {
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "Message too large: {} bytes (max {} bytes)",
                data.len(),
                MAX_MESSAGE_SIZE
            ),
        ));
    }
    Ok((data.len() as u32).to_be_bytes())
}

fn checked_len(len_buf: [u8; 4]) -> io::Result<usize> {
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Message too large: {} bytes (max {} bytes)", len, MAX_MESSAGE_SIZE),
        ));
    }
    Ok(len)
}

/// Writes one frame and flushes.
pub fn write_frame<W: Write>(writer: &mut W, data: &[u8]) -> io::Result<()> {
    let len = frame_len(data)?;
    writer.write_all(&len)?;
    writer.write_all(data)?;
    writer.flush()
}

/// Reads one frame.
///
/// Returns `Ok(None)` when the peer closed the stream before sending any
/// byte of a new frame. A stream that ends inside a frame is an
/// `UnexpectedEof` error.
pub fn read_frame<R: Read>(reader: &mut R) -> io::Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    let mut filled = 0;
    while filled < len_buf.len() {
        match reader.read(&mut len_buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "stream closed inside a length prefix",
                ))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    let mut buf = vec![0u8; checked_len(len_buf)?];
    reader.read_exact(&mut buf)?;
    Ok(Some(buf))
}

/// Writes one frame and flushes (async).
pub async fn write_frame_async<W: AsyncWrite + Unpin>(writer: &mut W, data: &[u8]) -> io::Result<()> {
    let len = frame_len(data)?;
    writer.write_all(&len).await?;
    writer.write_all(data).await?;
    writer.flush().await
}

/// Reads one frame (async). Same end-of-stream rules as [`read_frame`].
pub async fn read_frame_async<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    let mut filled = 0;
    while filled < len_buf.len() {
        match reader.read(&mut len_buf[filled..]).await? {
            0 if filled == 0 => return Ok(None),
            0 => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "stream closed inside a length prefix",
                ))
            }
            n => filled += n,
        }
    }

    let mut buf = vec![0u8; checked_len(len_buf)?];
    reader.read_exact(&mut buf).await?;
    Ok(Some(buf))
}
