//! Latest-wins rate limiting for frame streams

use futures::Stream;
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior, interval};

/// Extension trait adding [`Throttle`] to any stream
pub trait ThrottleExt: Stream {
    /// Emit at most one item per `period`.
    ///
    /// Items that arrive while waiting replace each other; only the newest is emitted.
    /// A consumer that cannot keep up therefore always sees the most recent frame rather
    /// than a growing backlog.
    fn throttle(self, period: Duration) -> Throttle<Self>
    where
        Self: Sized,
    {
        Throttle::new(self, period)
    }
}

impl<T: Stream> ThrottleExt for T {}

pin_project! {
    /// Stream returned by [`ThrottleExt::throttle`]
    pub struct Throttle<S: Stream> {
        #[pin]
        inner: S,
        interval: Interval,
        latest: Option<S::Item>,
        inner_done: bool,
        superseded: u64,
    }
}

impl<S: Stream> Throttle<S> {
    pub fn new(inner: S, period: Duration) -> Self {
        let mut interval = interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { inner, interval, latest: None, inner_done: false, superseded: 0 }
    }

    /// Items replaced by a newer one before they could be emitted
    pub fn superseded(&self) -> u64 {
        self.superseded
    }
}

impl<S: Stream> Stream for Throttle<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        while !*this.inner_done {
            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(item)) => {
                    if this.latest.replace(item).is_some() {
                        *this.superseded += 1;
                    }
                }
                Poll::Ready(None) => *this.inner_done = true,
                Poll::Pending => break,
            }
        }

        if this.latest.is_none() {
            return if *this.inner_done { Poll::Ready(None) } else { Poll::Pending };
        }

        match this.interval.poll_tick(cx) {
            Poll::Ready(_) => Poll::Ready(this.latest.take()),
            Poll::Pending => Poll::Pending,
        }
    }
}
