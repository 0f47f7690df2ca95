use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::ServiceError;

/// Per-call options supplied by the caller.
///
/// A call is cancelled by dropping its future; a deadline makes the service
/// do that itself once the instant passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallContext {
    deadline: Option<Instant>,
}

impl CallContext {
    /// No deadline.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Drive a store operation, abandoning it when the deadline passes.
    ///
    /// Abandoning drops the future together with any connection it holds.
    pub(crate) async fn run<T, F>(&self, operation: F) -> Result<T, ServiceError>
    where
        F: Future<Output = Result<T, ServiceError>>,
    {
        match self.deadline {
            None => operation.await,
            Some(deadline) => tokio::time::timeout_at(deadline, operation)
                .await
                .map_err(|_| ServiceError::deadline_exceeded())?,
        }
    }
}
