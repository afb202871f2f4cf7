//! Request/response frame exchange over a byte stream
//!
//! The consumer writes a single [`REQUEST_BYTE`]; the producer answers with exactly one
//! encoded frame in the codec layout. The count header tells the consumer how many bytes
//! follow, so no further framing is needed.
//!
//! ```text
//! consumer                      producer
//!    | ---- 0x00 --------------->  |
//!    | <--- i32 N | 6N | 3N ----   |
//! ```

use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::codec::{COUNT_SIZE, FrameCodec, encoded_len, parse_count};
use crate::types::{EncodedFrame, PointCloudFrame};
use crate::{Result, StreamError};

/// Byte the consumer sends to ask for the next frame
pub const REQUEST_BYTE: u8 = 0;

/// Largest single read while receiving a frame body
const READ_CHUNK_SIZE: usize = 64_000;

/// Request one frame and read the reply.
///
/// Returns `Ok(None)` if the peer closed the stream before sending a header. A count that
/// is negative or describes a frame larger than `max_frame_size` is a decode error; the
/// stream is then out of sync and should be dropped.
pub async fn request_frame<S>(io: &mut S, max_frame_size: usize) -> Result<Option<EncodedFrame>>
where
    S: AsyncRead + AsyncWrite + Unpin + ?Sized,
{
    io.write_all(&[REQUEST_BYTE]).await?;
    io.flush().await?;

    let mut header = [0u8; COUNT_SIZE];
    match io.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let count = parse_count(&header)?;
    let total = encoded_len(count)
        .filter(|&total| total <= max_frame_size)
        .ok_or_else(|| {
            StreamError::decode_error(
                "Frame header",
                format!("{} points exceed the {} byte frame limit", count, max_frame_size),
            )
        })?;

    let mut bytes = Vec::with_capacity(total.min(READ_CHUNK_SIZE + COUNT_SIZE));
    bytes.extend_from_slice(&header);
    while bytes.len() < total {
        let want = (total - bytes.len()).min(READ_CHUNK_SIZE);
        let start = bytes.len();
        bytes.resize(start + want, 0);
        io.read_exact(&mut bytes[start..]).await?;
        trace!("Read {} of {} frame bytes", bytes.len(), total);
    }

    Ok(Some(EncodedFrame::from_bytes(bytes)))
}

/// [`request_frame`] with a deadline on the whole exchange.
///
/// On [`StreamError::Timeout`] part of a frame may already have been read, so the stream
/// is out of sync and should be dropped.
pub async fn request_frame_within<S>(
    io: &mut S,
    max_frame_size: usize,
    deadline: Duration,
) -> Result<Option<EncodedFrame>>
where
    S: AsyncRead + AsyncWrite + Unpin + ?Sized,
{
    tokio::time::timeout(deadline, request_frame(io, max_frame_size))
        .await
        .map_err(|_| StreamError::Timeout { duration: deadline })?
}

/// Wait for one request and answer it with `frame`.
///
/// Returns `Ok(false)` if the peer closed the stream instead of sending a request.
pub async fn serve_frame<S>(io: &mut S, frame: &EncodedFrame) -> Result<bool>
where
    S: AsyncRead + AsyncWrite + Unpin + ?Sized,
{
    if !read_request(io).await? {
        return Ok(false);
    }
    io.write_all(frame.as_bytes()).await?;
    io.flush().await?;
    Ok(true)
}

async fn read_request<S>(io: &mut S) -> Result<bool>
where
    S: AsyncRead + Unpin + ?Sized,
{
    let mut request = [0u8; 1];
    if io.read(&mut request).await? == 0 {
        return Ok(false);
    }
    if request[0] != REQUEST_BYTE {
        return Err(StreamError::decode_error(
            "Frame request",
            format!("Unexpected request byte {:#04x}", request[0]),
        ));
    }
    Ok(true)
}

/// Producer side of the pull protocol
///
/// Each request is answered with whatever frame the source produces at that moment, so a
/// slow consumer simply sees fewer frames.
#[derive(Debug)]
pub struct FrameServer<S> {
    io: S,
    codec: FrameCodec,
    served: u64,
}

impl<S> FrameServer<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(io: S, codec: FrameCodec) -> Self {
        Self { io, codec, served: 0 }
    }

    /// Frames answered so far
    pub fn served(&self) -> u64 {
        self.served
    }

    /// Answer requests until the peer disconnects or `cancel` fires.
    ///
    /// `source` is called once per request.
    pub async fn run<F>(mut self, mut source: F, cancel: CancellationToken) -> Result<u64>
    where
        F: FnMut() -> PointCloudFrame + Send,
    {
        info!("Frame server started");
        loop {
            let requested = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Frame server cancelled");
                    break;
                }
                requested = read_request(&mut self.io) => requested?,
            };
            if !requested {
                debug!("Consumer disconnected");
                break;
            }

            let encoded = self.codec.encode(&source())?;
            self.io.write_all(encoded.as_bytes()).await?;
            self.io.flush().await?;
            self.served += 1;
            trace!(bytes = encoded.len(), "Served frame {}", self.served);
        }
        info!("Frame server stopped after {} frames", self.served);
        Ok(self.served)
    }
}
