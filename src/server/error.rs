//! Errors raised by [`Server`](super::Server) operations.

use thiserror::Error;

use crate::broker::BrokerError;

/// Errors that may occur while configuring or running the server.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ServerError {
    /// `listen_and_serve` was entered while the server was already running.
    #[error("server is already running")]
    AlreadyRunning,

    /// A broker operation failed while booting an attempt.
    ///
    /// Boot failures are retried with back-off inside `listen_and_serve`;
    /// this variant surfaces through logs rather than the return value.
    #[error(transparent)]
    Broker(#[from] BrokerError),
}
