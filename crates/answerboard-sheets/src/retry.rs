use std::time::Duration;

use reqwest::StatusCode;

/// Fixed exponential backoff for transient Sheets API failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay after the failed attempt number `attempt` (0-based): 1s, 2s, 4s...
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }

    /// Whether another attempt is allowed after `attempt` failed.
    pub fn can_retry(&self, attempt: u32) -> bool {
        attempt + 1 < self.max_attempts
    }
}

/// What to do with a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Done,
    Retry,
    RepairAccess,
    Fail,
}

pub fn classify(status: StatusCode) -> Disposition {
    if status.is_success() {
        Disposition::Done
    } else if status == StatusCode::FORBIDDEN {
        Disposition::RepairAccess
    } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Disposition::Retry
    } else {
        Disposition::Fail
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_backoff_is_one_then_two_seconds() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert!(policy.can_retry(0));
        assert!(policy.can_retry(1));
        assert!(!policy.can_retry(2));
    }

    #[test]
    fn statuses_are_classified() {
        assert_eq!(classify(StatusCode::OK), Disposition::Done);
        assert_eq!(classify(StatusCode::FORBIDDEN), Disposition::RepairAccess);
        assert_eq!(classify(StatusCode::SERVICE_UNAVAILABLE), Disposition::Retry);
        assert_eq!(classify(StatusCode::TOO_MANY_REQUESTS), Disposition::Retry);
        assert_eq!(classify(StatusCode::NOT_FOUND), Disposition::Fail);
        assert_eq!(classify(StatusCode::BAD_REQUEST), Disposition::Fail);
    }
}
