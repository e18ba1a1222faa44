use std::time::Duration;

#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// Minimum time between two emissions of the same order book.
    pub book_throttle: Duration,
    pub poll_interval: Duration,
    /// Serve every channel through the REST poller instead of the socket.
    pub rest_only: bool,
}

impl ConnectionConfig {
    /// The poll interval, never zero.
    pub(crate) fn poll_period(&self) -> Duration {
        self.poll_interval.max(Duration::from_millis(1))
    }

    pub(crate) fn book_flush_interval(&self) -> Duration {
        (self.book_throttle / 4).max(Duration::from_millis(10))
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            book_throttle: Duration::from_millis(1000),
            poll_interval: Duration::from_millis(5000),
            rest_only: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0, 1 ; "zero is raised")]
    #[test_case(5000, 5000 ; "default kept")]
    fn poll_period(millis: u64, expected: u64) {
        let config = ConnectionConfig {
            poll_interval: Duration::from_millis(millis),
            ..ConnectionConfig::default()
        };
        assert_eq!(config.poll_period(), Duration::from_millis(expected));
    }

    #[test]
    fn flush_interval_has_a_floor() {
        let config = ConnectionConfig {
            book_throttle: Duration::ZERO,
            ..ConnectionConfig::default()
        };
        assert_eq!(config.book_flush_interval(), Duration::from_millis(10));
    }
}
