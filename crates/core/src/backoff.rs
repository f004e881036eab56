//! Retry budgets and linear backoff between attempts.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Base unit of the linear retry backoff.
pub const RETRY_BASE_DELAY: Duration = Duration::from_millis(1_000);

/// Pure backoff policy used by the request client.
///
/// Linear in the attempt index, no jitter:
/// attempt 0 -> 1s, attempt 1 -> 2s, attempt 2 -> 3s, ...
pub fn retry_delay(attempt_index: u32) -> Duration {
    RETRY_BASE_DELAY.saturating_mul(attempt_index.saturating_add(1))
}

/// What a request does to server state; selects the retry budget.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    /// Reads and listings.
    Read,
    /// State-changing writes such as profile updates.
    Write,
    /// Multipart file uploads.
    Upload,
}

/// Additional attempts allowed after the first one, per request kind.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryBudgets {
    /// Budget for reads.
    #[serde(default = "default_read_retries")]
    pub default: u32,
    /// Budget for state-changing writes.
    #[serde(default = "default_write_retries")]
    pub write: u32,
    /// Budget for uploads.
    #[serde(default = "default_upload_retries")]
    pub upload: u32,
}

fn default_read_retries() -> u32 {
    2
}

fn default_write_retries() -> u32 {
    3
}

fn default_upload_retries() -> u32 {
    2
}

impl Default for RetryBudgets {
    fn default() -> Self {
        Self {
            default: default_read_retries(),
            write: default_write_retries(),
            upload: default_upload_retries(),
        }
    }
}

impl RetryBudgets {
    /// Retry budget for `kind`.
    pub fn for_kind(&self, kind: RequestKind) -> u32 {
        match kind {
            RequestKind::Read => self.default,
            RequestKind::Write => self.write,
            RequestKind::Upload => self.upload,
        }
    }
}

/// One attempt of a logical call. Ephemeral, never persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryAttempt {
    /// 1-based attempt number.
    pub attempt_number: u32,
    /// `1 + max_retries`.
    pub max_attempts: u32,
}

impl RetryAttempt {
    /// First attempt of a call with the given retry budget.
    pub fn first(max_retries: u32) -> Self {
        Self {
            attempt_number: 1,
            max_attempts: max_retries.saturating_add(1),
        }
    }

    /// True if no further attempt is allowed after this one.
    pub fn is_last(&self) -> bool {
        self.attempt_number >= self.max_attempts
    }

    /// Delay to wait before the next attempt.
    pub fn backoff(&self) -> Duration {
        retry_delay(self.attempt_number - 1)
    }

    /// The following attempt.
    pub fn next(self) -> Self {
        Self {
            attempt_number: self.attempt_number + 1,
            ..self
        }
    }
}
