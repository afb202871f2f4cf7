//! At-most-one outstanding request gate for pull-mode consumers

use tokio::sync::oneshot;

/// Observed state of a [`SingleFlight`] gate.
#[derive(Debug, PartialEq)]
pub enum FlightState<T> {
    /// No request outstanding; a new one may be issued
    Idle,
    /// A request is outstanding and its answer has not arrived
    Waiting,
    /// The outstanding request was answered; the gate is idle again
    Ready(T),
    /// The responder went away without answering; the gate is idle again
    Abandoned,
}

/// Holds the receiving end of the single outstanding request, if any.
///
/// Issuing a request hands out the responder half of a oneshot channel and keeps the
/// receiver. While that receiver is held, [`SingleFlight::begin`] refuses to start another
/// request, so two requests can never be outstanding at once.
#[derive(Debug)]
pub struct SingleFlight<T> {
    pending: Option<oneshot::Receiver<T>>,
    issued: u64,
}

impl<T> Default for SingleFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SingleFlight<T> {
    pub fn new() -> Self {
        Self { pending: None, issued: 0 }
    }

    /// Start a request. Returns `None` while another one is outstanding.
    pub fn begin(&mut self) -> Option<oneshot::Sender<T>> {
        if self.pending.is_some() {
            return None;
        }
        let (responder, pending) = oneshot::channel();
        self.pending = Some(pending);
        self.issued += 1;
        Some(responder)
    }

    pub fn in_flight(&self) -> bool {
        self.pending.is_some()
    }

    /// Requests issued over the gate's lifetime
    pub fn issued(&self) -> u64 {
        self.issued
    }

    /// Check the outstanding request without waiting.
    pub fn poll_state(&mut self) -> FlightState<T> {
        let Some(pending) = self.pending.as_mut() else {
            return FlightState::Idle;
        };
        match pending.try_recv() {
            Ok(value) => {
                self.pending = None;
                FlightState::Ready(value)
            }
            Err(oneshot::error::TryRecvError::Empty) => FlightState::Waiting,
            Err(oneshot::error::TryRecvError::Closed) => {
                self.pending = None;
                FlightState::Abandoned
            }
        }
    }
}
