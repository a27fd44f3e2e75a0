use std::fmt;
use std::time::Duration;

pub const DEFAULT_RETRIES: u32 = 10;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closed => "closed",
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed-delay, bounded retry budget. The budget spans the whole session and
/// is not refilled by a successful connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    retries_remaining: u32,
    delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RETRIES, Duration::from_millis(DEFAULT_RETRY_DELAY_MS))
    }
}

impl ReconnectPolicy {
    pub fn new(retries: u32, delay: Duration) -> Self {
        Self {
            retries_remaining: retries,
            delay,
        }
    }

    pub fn retries_remaining(&self) -> u32 {
        self.retries_remaining
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn is_exhausted(&self) -> bool {
        self.retries_remaining == 0
    }

    /// Called when a connection closes or fails to open. Returns the delay
    /// before the next attempt, or `None` once the budget is spent.
    pub fn on_closed(&mut self) -> Option<Duration> {
        if self.retries_remaining == 0 {
            return None;
        }
        self.retries_remaining -= 1;
        Some(self.delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retries_are_bounded() {
        let mut policy = ReconnectPolicy::new(3, Duration::from_millis(1000));
        let mut attempts = 0;
        while let Some(delay) = policy.on_closed() {
            assert_eq!(delay, Duration::from_millis(1000));
            attempts += 1;
        }
        assert_eq!(attempts, 3);
        assert!(policy.is_exhausted());
        assert_eq!(policy.on_closed(), None);
    }

    #[test]
    fn zero_retries_never_reconnects() {
        let mut policy = ReconnectPolicy::new(0, Duration::from_millis(5));
        assert_eq!(policy.on_closed(), None);
    }

    #[test]
    fn defaults_match_session_contract() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.retries_remaining(), 10);
        assert_eq!(policy.delay(), Duration::from_secs(1));
    }
}
