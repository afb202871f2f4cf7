//! Pull-mode consumer: one outstanding frame request at a time

use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::codec::FrameCodec;
use crate::config::PipelineConfig;
use crate::queue::{FlightState, SingleFlight};
use crate::transport::{request_frame, request_frame_within};
use crate::types::PointCloudFrame;
use crate::{Result, StreamError};

type Responder = oneshot::Sender<PointCloudFrame>;

/// What a call to [`PullClient::tick`] did
#[derive(Debug, PartialEq)]
pub enum PullTick {
    /// A new request was sent to the producer
    Requested,
    /// The outstanding request has not been answered yet
    Waiting,
    /// The outstanding request was answered
    Frame(PointCloudFrame),
    /// The connection is gone; no further frames will arrive
    Closed,
}

/// Consume-context handle for pull mode
///
/// A worker task owns the byte stream and performs the blocking exchange. The client only
/// holds the single-flight gate, so [`tick`](Self::tick) never waits and is safe to call
/// once per frame of a render loop.
pub struct PullClient {
    requests: mpsc::Sender<Responder>,
    gate: SingleFlight<PointCloudFrame>,
    cancel: CancellationToken,
}

impl PullClient {
    /// Spawn the worker on `io` and return the client.
    ///
    /// Must be called within a tokio runtime.
    pub fn spawn<S>(io: S, config: &PipelineConfig) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        config.validate()?;
        let codec = config.codec()?;
        let (requests, inbox) = mpsc::channel(1);
        let cancel = CancellationToken::new();

        let limits = RequestLimits {
            max_frame_size: config.max_frame_size,
            timeout: config.request_timeout(),
        };
        tokio::spawn(pull_worker(io, codec, limits, inbox, cancel.clone()));

        Ok(Self { requests, gate: SingleFlight::new(), cancel })
    }

    /// Advance the pull cycle by one step without waiting.
    ///
    /// Issues a request when none is outstanding, reports an answered request, or reports
    /// that the outstanding request is still pending. A new request is only issued on the
    /// tick after the previous frame was handed out.
    pub fn tick(&mut self) -> PullTick {
        match self.gate.poll_state() {
            FlightState::Ready(frame) => return PullTick::Frame(frame),
            FlightState::Waiting => return PullTick::Waiting,
            FlightState::Abandoned => debug!("Pull request abandoned by worker"),
            FlightState::Idle => {}
        }

        if self.requests.is_closed() {
            return PullTick::Closed;
        }
        let Some(responder) = self.gate.begin() else {
            return PullTick::Waiting;
        };
        match self.requests.try_send(responder) {
            Ok(()) => PullTick::Requested,
            Err(mpsc::error::TrySendError::Full(_)) => PullTick::Waiting,
            Err(mpsc::error::TrySendError::Closed(_)) => PullTick::Closed,
        }
    }

    /// Whether a request is outstanding
    pub fn in_flight(&self) -> bool {
        self.gate.in_flight()
    }

    /// Requests issued so far
    pub fn requests_issued(&self) -> u64 {
        self.gate.issued()
    }
}

impl Drop for PullClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[derive(Debug, Clone, Copy)]
struct RequestLimits {
    max_frame_size: usize,
    timeout: Option<Duration>,
}

async fn pull_worker<S>(
    mut io: S,
    codec: FrameCodec,
    limits: RequestLimits,
    mut inbox: mpsc::Receiver<Responder>,
    cancel: CancellationToken,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    info!("Pull worker started");
    let mut frames = 0u64;

    loop {
        let responder = tokio::select! {
            _ = cancel.cancelled() => break,
            responder = inbox.recv() => match responder {
                Some(responder) => responder,
                None => break,
            },
        };

        let max_frame_size = limits.max_frame_size;
        let exchange = async {
            match limits.timeout {
                Some(deadline) => request_frame_within(&mut io, max_frame_size, deadline).await,
                None => request_frame(&mut io, max_frame_size).await,
            }
        };
        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = exchange => result,
        };

        match result {
            Ok(Some(encoded)) => match codec.decode(encoded.as_bytes()) {
                Ok(frame) => {
                    frames += 1;
                    if responder.send(frame).is_err() {
                        debug!("Pull client dropped before the frame arrived");
                        break;
                    }
                }
                Err(e) => warn!("Discarding malformed frame: {}", e),
            },
            Ok(None) => {
                info!("Producer closed the connection");
                break;
            }
            Err(StreamError::Timeout { duration }) => {
                warn!("Producer did not answer within {:?}, closing", duration);
                break;
            }
            Err(e @ StreamError::Decode { .. }) => {
                // the rest of the stream cannot be framed any more
                warn!("Stream out of sync, closing: {}", e);
                break;
            }
            Err(e) => {
                error!("Pull request failed: {}", e);
                break;
            }
        }
    }

    info!("Pull worker ended ({} frames)", frames);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::random_cube_frame;
    use crate::transport::FrameServer;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tokio::io::duplex;

    async fn tick_until_frame(client: &mut PullClient) -> PointCloudFrame {
        loop {
            match client.tick() {
                PullTick::Frame(frame) => return frame,
                PullTick::Closed => panic!("connection closed"),
                PullTick::Requested | PullTick::Waiting => {
                    assert!(client.in_flight());
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
            }
        }
    }

    #[tokio::test]
    async fn single_request_in_flight() {
        let (consumer, producer) = duplex(4096);
        let served = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&served);
        let cancel = CancellationToken::new();
        let server = FrameServer::new(producer, FrameCodec::default());
        let server = tokio::spawn(server.run(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                random_cube_frame(30, 1.0, 11)
            },
            cancel.clone(),
        ));

        let mut client = PullClient::spawn(consumer, &PipelineConfig::default()).unwrap();
        for n in 1..=3u64 {
            let frame = tick_until_frame(&mut client).await;
            assert_eq!(frame.len(), 30);
            assert!(!client.in_flight());
            assert_eq!(client.requests_issued(), n);
            assert_eq!(served.load(Ordering::SeqCst), n);
        }

        cancel.cancel();
        assert_eq!(server.await.unwrap().unwrap(), 3);
    }

    #[tokio::test]
    async fn repeated_ticks_do_not_issue_duplicate_requests() {
        let (consumer, _producer) = duplex(64);
        let mut client = PullClient::spawn(consumer, &PipelineConfig::default()).unwrap();

        assert_eq!(client.tick(), PullTick::Requested);
        for _ in 0..10 {
            assert_eq!(client.tick(), PullTick::Waiting);
        }
        assert_eq!(client.requests_issued(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_request_times_out_and_closes() {
        let (consumer, _producer) = duplex(64);
        let config = PipelineConfig::default().with_request_timeout(Duration::from_millis(50));
        let mut client = PullClient::spawn(consumer, &config).unwrap();
        let started = tokio::time::Instant::now();

        assert_eq!(client.tick(), PullTick::Requested);
        loop {
            match client.tick() {
                PullTick::Closed => break,
                PullTick::Waiting => tokio::time::sleep(Duration::from_millis(10)).await,
                other => panic!("unexpected tick {other:?}"),
            }
        }
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert_eq!(client.requests_issued(), 1);
    }

    #[tokio::test]
    async fn closed_producer_is_reported() {
        let (consumer, producer) = duplex(64);
        drop(producer);
        let mut client = PullClient::spawn(consumer, &PipelineConfig::default()).unwrap();

        let outcome = tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                if client.tick() == PullTick::Closed {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await;
        assert!(outcome.is_ok());
    }
}
