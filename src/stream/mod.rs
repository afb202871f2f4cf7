//! Stream combinators used by frame subscriptions

mod throttle;

pub use throttle::{Throttle, ThrottleExt};
