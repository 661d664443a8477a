//! The responder pump: the single owner of response publishes.
//!
//! Handlers never touch the output channel. Each finished invocation is
//! queued as a [`ProcessedRequest`]; the responder pops and publishes them
//! one at a time. On a publish failure it closes the channel (waking the
//! monitor into a reconnect), parks the failed response and exits; the next
//! attempt's responder retries the parked response before anything else, so
//! a transient channel fault delays a reply rather than dropping it.

use async_trait::async_trait;
use lapin::{options::BasicPublishOptions, BasicProperties, Channel};
use log::{debug, error};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    broker::{BrokerError, CloseNotice},
    response::ResponsePublishing,
};

/// One handled delivery on its way back to the caller.
#[derive(Clone, Debug)]
pub(crate) struct ProcessedRequest {
    /// Reply queue named by the request; `None` publishes into the void,
    /// which the broker drops for non-mandatory messages.
    pub reply_to: Option<String>,
    pub mandatory: bool,
    pub immediate: bool,
    pub publishing: ResponsePublishing,
}

/// State the responder carries across connection attempts: the receiving
/// half of the responses queue, plus at most one response whose publish
/// failed on the previous channel.
pub(crate) struct ResponderHandoff {
    pub rx: mpsc::UnboundedReceiver<ProcessedRequest>,
    pub parked: Option<ProcessedRequest>,
}

/// Publish seam for the responder.
///
/// Implemented by lapin's [`Channel`]; tests substitute a mock to inject
/// publish failures.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub(crate) trait ReplyPublisher: Send + Sync {
    async fn publish(&self, response: &ProcessedRequest) -> Result<(), BrokerError>;

    /// Close the underlying channel after a failed publish.
    async fn close(&self);
}

#[async_trait]
impl ReplyPublisher for Channel {
    async fn publish(&self, response: &ProcessedRequest) -> Result<(), BrokerError> {
        let publishing = &response.publishing;
        let mut properties = BasicProperties::default();
        if let Some(correlation_id) = &publishing.correlation_id {
            properties = properties.with_correlation_id(correlation_id.as_str().into());
        }
        if let Some(content_type) = &publishing.content_type {
            properties = properties.with_content_type(content_type.as_str().into());
        }
        if !publishing.headers.inner().is_empty() {
            properties = properties.with_headers(publishing.headers.clone());
        }

        self.basic_publish(
            "",
            response.reply_to.as_deref().unwrap_or(""),
            BasicPublishOptions {
                mandatory: response.mandatory,
                immediate: response.immediate,
            },
            &publishing.body,
            properties,
        )
        .await
        .map(|_confirm| ())
        .map_err(BrokerError::Publish)
    }

    async fn close(&self) {
        let _ = Channel::close(self, 200, "response publish failed").await;
    }
}

/// Run the responder until the queue closes, a drain completes, or a publish
/// fails.
///
/// Returns the handoff so the queue (and any parked response) survives into
/// the next attempt. Cancelling `drain` flushes what is already queued and
/// exits; the server only cancels it once the in-flight count has reached
/// zero, so nothing can race into the queue behind the flush.
pub(crate) async fn pump<P: ReplyPublisher>(
    publisher: P,
    mut handoff: ResponderHandoff,
    drain: CancellationToken,
    notices: mpsc::UnboundedSender<CloseNotice>,
) -> ResponderHandoff {
    if let Some(parked) = handoff.parked.take() {
        if !publish_one(&publisher, parked, &mut handoff.parked, &notices).await {
            return handoff;
        }
    }

    loop {
        tokio::select! {
            biased;

            () = drain.cancelled() => {
                while let Ok(response) = handoff.rx.try_recv() {
                    if !publish_one(&publisher, response, &mut handoff.parked, &notices).await {
                        break;
                    }
                }
                return handoff;
            }
            received = handoff.rx.recv() => match received {
                Some(response) => {
                    if !publish_one(&publisher, response, &mut handoff.parked, &notices).await {
                        return handoff;
                    }
                }
                None => return handoff,
            },
        }
    }
}

/// Publish one response. On failure, close the channel, park the response
/// for the next attempt, and report the fault to the monitor. Returns
/// whether the pump should continue.
async fn publish_one<P: ReplyPublisher>(
    publisher: &P,
    response: ProcessedRequest,
    parked: &mut Option<ProcessedRequest>,
    notices: &mpsc::UnboundedSender<CloseNotice>,
) -> bool {
    debug!(
        "server: publishing response to '{}', correlation id {:?}",
        response.reply_to.as_deref().unwrap_or(""),
        response.publishing.correlation_id
    );

    match publisher.publish(&response).await {
        Ok(()) => true,
        Err(e) => {
            error!(
                "server: publishing response to '{}' failed, retrying on the next channel: {e}",
                response.reply_to.as_deref().unwrap_or("")
            );
            publisher.close().await;
            let reason = e.to_string();
            *parked = Some(response);
            let _ = notices.send(CloseNotice {
                source: "output channel",
                reason,
            });
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use lapin::types::FieldTable;
    use mockall::Sequence;

    use super::*;

    fn response(reply_to: &str, correlation_id: &str) -> ProcessedRequest {
        ProcessedRequest {
            reply_to: Some(reply_to.to_owned()),
            mandatory: false,
            immediate: false,
            publishing: ResponsePublishing {
                body: Bytes::from_static(b"pong"),
                headers: FieldTable::default(),
                content_type: None,
                correlation_id: Some(correlation_id.to_owned()),
            },
        }
    }

    fn publish_failure() -> BrokerError {
        BrokerError::Publish(lapin::Error::InvalidChannelState(
            lapin::ChannelState::Closed,
        ))
    }

    fn harness() -> (
        mpsc::UnboundedSender<ProcessedRequest>,
        ResponderHandoff,
        CancellationToken,
        mpsc::UnboundedSender<CloseNotice>,
        mpsc::UnboundedReceiver<CloseNotice>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (notices_tx, notices_rx) = mpsc::unbounded_channel();
        let handoff = ResponderHandoff { rx, parked: None };
        (tx, handoff, CancellationToken::new(), notices_tx, notices_rx)
    }

    #[tokio::test]
    async fn publishes_in_order_and_exits_when_queue_closes() {
        let (tx, handoff, drain, notices_tx, _notices_rx) = harness();
        let mut publisher = MockReplyPublisher::new();
        let mut order = Sequence::new();
        for expected in ["first", "second"] {
            publisher
                .expect_publish()
                .times(1)
                .in_sequence(&mut order)
                .withf(move |r| r.publishing.correlation_id.as_deref() == Some(expected))
                .returning(|_| Ok(()));
        }

        tx.send(response("q", "first")).expect("queue open");
        tx.send(response("q", "second")).expect("queue open");
        drop(tx);

        let handoff = pump(publisher, handoff, drain, notices_tx).await;
        assert!(handoff.parked.is_none());
    }

    #[tokio::test]
    async fn publish_failure_parks_the_response_and_notifies() {
        let (tx, handoff, drain, notices_tx, mut notices_rx) = harness();
        let mut publisher = MockReplyPublisher::new();
        publisher
            .expect_publish()
            .times(1)
            .returning(|_| Err(publish_failure()));
        publisher.expect_close().times(1).returning(|| ());

        tx.send(response("q", "lost")).expect("queue open");

        let handoff = pump(publisher, handoff, drain, notices_tx).await;

        let parked = handoff.parked.expect("response should be parked");
        assert_eq!(parked.publishing.correlation_id.as_deref(), Some("lost"));
        let notice = notices_rx.try_recv().expect("close notice sent");
        assert_eq!(notice.source, "output channel");
    }

    #[tokio::test]
    async fn parked_response_is_retried_first() {
        let (tx, mut handoff, drain, notices_tx, _notices_rx) = harness();
        handoff.parked = Some(response("q", "parked"));

        let mut publisher = MockReplyPublisher::new();
        let mut order = Sequence::new();
        for expected in ["parked", "fresh"] {
            publisher
                .expect_publish()
                .times(1)
                .in_sequence(&mut order)
                .withf(move |r| r.publishing.correlation_id.as_deref() == Some(expected))
                .returning(|_| Ok(()));
        }

        tx.send(response("q", "fresh")).expect("queue open");
        drop(tx);

        let handoff = pump(publisher, handoff, drain, notices_tx).await;
        assert!(handoff.parked.is_none());
    }

    #[tokio::test]
    async fn drain_flushes_queued_responses_then_exits() {
        let (tx, handoff, drain, notices_tx, _notices_rx) = harness();
        let mut publisher = MockReplyPublisher::new();
        publisher.expect_publish().times(2).returning(|_| Ok(()));

        tx.send(response("q", "one")).expect("queue open");
        tx.send(response("q", "two")).expect("queue open");
        drain.cancel();

        // The sender stays alive: drain must not depend on the queue closing.
        let handoff = pump(publisher, handoff, drain, notices_tx).await;
        assert!(handoff.parked.is_none());
        drop(tx);
    }
}
