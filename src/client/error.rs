//! Errors returned from the client's call path.

use std::time::Duration;

use thiserror::Error;

use crate::broker::BrokerError;

/// Errors that may occur while sending a request or awaiting its reply.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SendError {
    /// No reply arrived before the request's deadline. A late reply for the
    /// same correlation id is discarded as an orphan.
    #[error("no reply within {timeout:?} for correlation id '{correlation_id}'")]
    Timeout {
        /// Deadline that expired.
        timeout: Duration,
        /// Correlation id of the abandoned request.
        correlation_id: String,
    },

    /// The caller's cancellation token fired while awaiting the reply.
    #[error("request was cancelled")]
    Cancelled,

    /// The broker connection was lost with the request outstanding. The
    /// request may or may not have been handled; retrying is the caller's
    /// decision.
    #[error("connection to the broker was lost")]
    ConnectionLost,

    /// The client was stopped.
    #[error("client is shut down")]
    Shutdown,

    /// A request with the same correlation id is already outstanding.
    #[error("a request with correlation id '{0}' is already outstanding")]
    DuplicateCorrelationId(String),

    /// A broker operation on the publish path failed.
    #[error(transparent)]
    Broker(#[from] BrokerError),
}

impl SendError {
    /// Whether retrying the same request may succeed.
    ///
    /// Connection losses and broker faults are transient: the client
    /// redials on the next send. Timeouts, cancellations and programmer
    /// errors are not retried away.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionLost
                | Self::Broker(
                    BrokerError::Dial(_) | BrokerError::Channel(_) | BrokerError::Publish(_)
                )
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_loss_is_retryable() {
        assert!(SendError::ConnectionLost.is_retryable());
        assert!(!SendError::Cancelled.is_retryable());
        assert!(!SendError::Timeout {
            timeout: Duration::from_secs(1),
            correlation_id: "x".to_owned(),
        }
        .is_retryable());
    }
}
