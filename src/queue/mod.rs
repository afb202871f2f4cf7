//! Bounded frame handoff between the transport context and the consume context
//!
//! [`frame_queue`] creates a single-producer single-consumer queue. Frames move through it
//! by value, so the consumer owns every frame it receives and the producer can never touch
//! it again. Neither half is `Clone`.
//!
//! When the queue is full the [`QueuePolicy`] decides which frame is lost:
//!
//! | Policy        | Full queue behaviour                         |
//! |---------------|----------------------------------------------|
//! | `KeepLatest`  | evict the oldest queued frame, accept the new |
//! | `DropNewest`  | reject the incoming frame                     |
//!
//! Pull-mode consumers use [`SingleFlight`] instead, which holds at most one outstanding
//! request.

mod single_flight;

pub use single_flight::{FlightState, SingleFlight};

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tracing::trace;

/// What to do with a frame pushed into a full queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueuePolicy {
    #[default]
    KeepLatest,
    DropNewest,
}

/// Result of [`QueueSender::push`]. Lost frames are handed back to the caller.
#[derive(Debug, PartialEq)]
pub enum PushOutcome<T> {
    /// Accepted with room to spare
    Queued,
    /// Accepted; the oldest queued frame was evicted to make room
    Evicted(T),
    /// Refused because the queue is full
    Rejected(T),
    /// Refused because the receiver is gone
    Closed(T),
}

impl<T> PushOutcome<T> {
    /// Whether the pushed frame is now in the queue
    pub fn is_accepted(&self) -> bool {
        matches!(self, PushOutcome::Queued | PushOutcome::Evicted(_))
    }
}

#[derive(Debug)]
struct State<T> {
    frames: VecDeque<T>,
    capacity: usize,
    policy: QueuePolicy,
    closed: bool,
    dropped: u64,
}

#[derive(Debug)]
struct Shared<T> {
    state: Mutex<State<T>>,
    notify: Notify,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Create a bounded queue. A zero `capacity` is treated as one.
pub fn frame_queue<T>(capacity: usize, policy: QueuePolicy) -> (QueueSender<T>, QueueReceiver<T>) {
    let capacity = capacity.max(1);
    let shared = Arc::new(Shared {
        state: Mutex::new(State {
            frames: VecDeque::with_capacity(capacity),
            capacity,
            policy,
            closed: false,
            dropped: 0,
        }),
        notify: Notify::new(),
    });
    (QueueSender { shared: Arc::clone(&shared) }, QueueReceiver { shared })
}

/// Producing half, owned by the transport context.
#[derive(Debug)]
pub struct QueueSender<T> {
    shared: Arc<Shared<T>>,
}

impl<T> QueueSender<T> {
    pub fn push(&self, frame: T) -> PushOutcome<T> {
        let outcome = {
            let mut state = self.shared.lock();
            if state.closed {
                return PushOutcome::Closed(frame);
            }

            if state.frames.len() < state.capacity {
                state.frames.push_back(frame);
                PushOutcome::Queued
            } else {
                state.dropped += 1;
                match state.policy {
                    QueuePolicy::KeepLatest => {
                        let evicted = state.frames.pop_front();
                        state.frames.push_back(frame);
                        match evicted {
                            Some(old) => PushOutcome::Evicted(old),
                            None => PushOutcome::Queued,
                        }
                    }
                    QueuePolicy::DropNewest => PushOutcome::Rejected(frame),
                }
            }
        };

        match &outcome {
            PushOutcome::Queued => {}
            PushOutcome::Evicted(_) => trace!("Queue full, oldest frame evicted"),
            PushOutcome::Rejected(_) => trace!("Queue full, incoming frame rejected"),
            PushOutcome::Closed(_) => {}
        }
        if outcome.is_accepted() {
            self.shared.notify.notify_one();
        }
        outcome
    }

    /// Stop accepting frames. Queued frames can still be drained.
    pub fn close(&self) {
        self.shared.lock().closed = true;
        self.shared.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    /// Frames lost to the bounded policy so far
    pub fn dropped(&self) -> u64 {
        self.shared.lock().dropped
    }
}

impl<T> Drop for QueueSender<T> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Consuming half, owned by the consume context.
#[derive(Debug)]
pub struct QueueReceiver<T> {
    shared: Arc<Shared<T>>,
}

impl<T> QueueReceiver<T> {
    /// Whether a frame can be taken without waiting
    pub fn has_frame(&self) -> bool {
        !self.shared.lock().frames.is_empty()
    }

    /// Take the oldest queued frame without waiting.
    pub fn try_recv(&self) -> Option<T> {
        self.shared.lock().frames.pop_front()
    }

    /// Wait for the next frame. Returns `None` once the queue is closed and drained.
    pub async fn recv(&self) -> Option<T> {
        loop {
            {
                let mut state = self.shared.lock();
                if let Some(frame) = state.frames.pop_front() {
                    return Some(frame);
                }
                if state.closed {
                    return None;
                }
            }
            // notify_one stores a permit, so a push between unlock and await is not lost
            self.shared.notify.notified().await;
        }
    }

    pub fn len(&self) -> usize {
        self.shared.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    pub fn dropped(&self) -> u64 {
        self.shared.lock().dropped
    }
}

impl<T> Drop for QueueReceiver<T> {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        state.closed = true;
        state.frames.clear();
    }
}
