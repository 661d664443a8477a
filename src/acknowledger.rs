//! Acknowledgement tracking for in-flight deliveries.
//!
//! The broker hands out one acknowledgement handle per delivery. [`AckAware`]
//! wraps it and records whether the handler already settled the delivery, so
//! the server can acknowledge on the handler's behalf exactly when the
//! handler did not.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use async_trait::async_trait;
use lapin::options::{BasicAckOptions, BasicNackOptions, BasicRejectOptions};

use crate::broker::BrokerError;

/// Abstraction for sources of delivery acknowledgements.
///
/// Implemented by lapin's per-delivery [`Acker`](lapin::acker::Acker); tests
/// substitute a mock to observe settlement without a broker.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Acknowledger: Send + Sync {
    /// Acknowledge the delivery, or all deliveries up to it when `multiple`.
    async fn ack(&self, multiple: bool) -> Result<(), BrokerError>;

    /// Negatively acknowledge, optionally requeueing.
    async fn nack(&self, multiple: bool, requeue: bool) -> Result<(), BrokerError>;

    /// Reject the delivery, optionally requeueing.
    async fn reject(&self, requeue: bool) -> Result<(), BrokerError>;
}

#[async_trait]
impl Acknowledger for lapin::acker::Acker {
    async fn ack(&self, multiple: bool) -> Result<(), BrokerError> {
        self.ack(BasicAckOptions { multiple })
            .await
            .map_err(BrokerError::Ack)
    }

    async fn nack(&self, multiple: bool, requeue: bool) -> Result<(), BrokerError> {
        self.nack(BasicNackOptions { multiple, requeue })
            .await
            .map_err(BrokerError::Ack)
    }

    async fn reject(&self, requeue: bool) -> Result<(), BrokerError> {
        self.reject(BasicRejectOptions { requeue })
            .await
            .map_err(BrokerError::Ack)
    }
}

/// Acknowledger wrapper that remembers whether the delivery was settled.
///
/// Every forwarded operation marks the delivery as handled, whether or not
/// the broker accepted it; a failed acknowledgement cannot be retried on the
/// same channel anyway. Cloning shares both the underlying handle and the
/// flag, so the writer's view and the server's view agree.
#[derive(Clone)]
pub struct AckAware {
    acknowledger: Arc<dyn Acknowledger>,
    handled: Arc<AtomicBool>,
}

impl AckAware {
    /// Wrap an acknowledgement handle.
    pub(crate) fn new(acknowledger: Arc<dyn Acknowledger>) -> Self {
        Self {
            acknowledger,
            handled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether the delivery has already been acked, nacked or rejected.
    #[must_use]
    pub fn is_handled(&self) -> bool {
        self.handled.load(Ordering::Acquire)
    }

    /// Acknowledge the delivery.
    ///
    /// # Errors
    ///
    /// Returns the broker failure when the acknowledgement could not be sent.
    pub async fn ack(&self, multiple: bool) -> Result<(), BrokerError> {
        self.handled.store(true, Ordering::Release);
        self.acknowledger.ack(multiple).await
    }

    /// Negatively acknowledge the delivery.
    ///
    /// # Errors
    ///
    /// Returns the broker failure when the negative acknowledgement could not
    /// be sent.
    pub async fn nack(&self, multiple: bool, requeue: bool) -> Result<(), BrokerError> {
        self.handled.store(true, Ordering::Release);
        self.acknowledger.nack(multiple, requeue).await
    }

    /// Reject the delivery.
    ///
    /// # Errors
    ///
    /// Returns the broker failure when the rejection could not be sent.
    pub async fn reject(&self, requeue: bool) -> Result<(), BrokerError> {
        self.handled.store(true, Ordering::Release);
        self.acknowledger.reject(requeue).await
    }
}

impl std::fmt::Debug for AckAware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AckAware")
            .field("handled", &self.is_handled())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ack_aware(mock: MockAcknowledger) -> AckAware {
        AckAware::new(Arc::new(mock))
    }

    #[tokio::test]
    async fn starts_unhandled() {
        let wrapper = ack_aware(MockAcknowledger::new());
        assert!(!wrapper.is_handled());
    }

    #[tokio::test]
    async fn ack_forwards_and_marks_handled() {
        let mut mock = MockAcknowledger::new();
        mock.expect_ack().times(1).returning(|_| Ok(()));
        let wrapper = ack_aware(mock);

        wrapper.ack(false).await.expect("ack should forward");
        assert!(wrapper.is_handled());
    }

    #[tokio::test]
    async fn nack_and_reject_mark_handled() {
        let mut mock = MockAcknowledger::new();
        mock.expect_nack().times(1).returning(|_, _| Ok(()));
        mock.expect_reject().times(1).returning(|_| Ok(()));
        let wrapper = ack_aware(mock);

        wrapper.nack(false, true).await.expect("nack should forward");
        assert!(wrapper.is_handled());
        wrapper.reject(false).await.expect("reject should forward");
    }

    #[tokio::test]
    async fn clones_share_the_handled_flag() {
        let mut mock = MockAcknowledger::new();
        mock.expect_ack().times(1).returning(|_| Ok(()));
        let wrapper = ack_aware(mock);
        let clone = wrapper.clone();

        clone.ack(false).await.expect("ack should forward");
        assert!(wrapper.is_handled());
    }

    #[tokio::test]
    async fn failed_ack_still_marks_handled() {
        let mut mock = MockAcknowledger::new();
        mock.expect_ack()
            .times(1)
            .returning(|_| Err(BrokerError::Ack(lapin::Error::InvalidChannelState(
                lapin::ChannelState::Closed,
            ))));
        let wrapper = ack_aware(mock);

        assert!(wrapper.ack(false).await.is_err());
        assert!(wrapper.is_handled());
    }
}
