//! Update rate control for frame subscriptions

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Rate at which a consumer wants to see frames
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum UpdateRate {
    /// Every completed frame, as fast as the producer sends them
    Native,

    /// At most this many frames per second, newest frame wins
    Max(u32),
}

impl UpdateRate {
    /// Interval between emitted frames, if throttling applies.
    ///
    /// `Max(0)` is treated as `Native`.
    pub fn throttle_interval(self) -> Option<Duration> {
        match self {
            UpdateRate::Native | UpdateRate::Max(0) => None,
            UpdateRate::Max(hz) => Some(Duration::from_secs_f64(1.0 / hz as f64)),
        }
    }

    /// Check if throttling is needed
    pub fn needs_throttle(self) -> bool {
        self.throttle_interval().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_and_zero_do_not_throttle() {
        assert_eq!(UpdateRate::Native.throttle_interval(), None);
        assert_eq!(UpdateRate::Max(0).throttle_interval(), None);
        assert!(!UpdateRate::Native.needs_throttle());
    }

    #[test]
    fn max_rate_maps_to_interval() {
        assert_eq!(UpdateRate::Max(10).throttle_interval(), Some(Duration::from_millis(100)));
        assert!(UpdateRate::Max(10).needs_throttle());
    }
}
