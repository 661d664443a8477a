//! Per-binding consumption and per-delivery handler dispatch.
//!
//! One consume loop runs per binding. Deliveries are received in broker
//! order and each is handed to its own task, so handler invocations begin
//! in order but may complete in any order. The loop and every delivery task
//! run on the attempt's tracker, which is what the shutdown sequence waits
//! on before closing the reply path.

use std::{panic::AssertUnwindSafe, sync::Arc};

use futures::{FutureExt, StreamExt};
use log::{debug, error};
use tokio::sync::mpsc;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::{
    acknowledger::AckAware,
    broker::CloseNotice,
    delivery::Delivery,
    handler::{HandlerContext, HandlerFunc},
    panic::panic_message,
    response::ResponseWriter,
    server::responder::ProcessedRequest,
};

/// Wiring shared by every delivery of one binding's consumer.
pub(crate) struct ConsumerWiring {
    /// Middleware-wrapped handler for the binding.
    pub handler: HandlerFunc,
    /// Whether the broker auto-acks, making settlement a no-op here.
    pub auto_ack: bool,
    /// Queue the consumer is attached to.
    pub queue_name: Arc<str>,
    /// Responses queue feeding the responder pump.
    pub responses: mpsc::UnboundedSender<ProcessedRequest>,
    /// Tracker the per-delivery tasks run on.
    pub tracker: TaskTracker,
    /// Server-level shutdown signal exposed to handlers.
    pub shutdown: CancellationToken,
    /// Cancelled once this attempt starts tearing down; suppresses fault
    /// reports for expected stream ends.
    pub attempt: CancellationToken,
    /// Fault reports multiplexed by the server monitor.
    pub notices: mpsc::UnboundedSender<CloseNotice>,
}

/// Consume deliveries until the stream ends.
///
/// The stream ends normally once the server cancels the consumer during
/// shutdown; any other termination is reported as an input-channel fault so
/// the monitor reconnects.
pub(crate) async fn consume_loop(mut consumer: lapin::Consumer, wiring: ConsumerWiring) {
    let queue_name = Arc::clone(&wiring.queue_name);
    debug!("server: waiting for messages on queue '{queue_name}'");

    let mut fault: Option<String> = None;
    while let Some(delivery) = consumer.next().await {
        match delivery {
            Ok(delivery) => spawn_delivery_task(delivery, &wiring),
            Err(e) => {
                fault = Some(e.to_string());
                break;
            }
        }
    }
    if !wiring.attempt.is_cancelled() {
        let reason = fault.unwrap_or_else(|| "consumer stream ended".to_owned());
        let _ = wiring.notices.send(CloseNotice {
            source: "input channel",
            reason,
        });
    }

    debug!("server: stopped waiting for messages on queue '{queue_name}'");
}

fn spawn_delivery_task(delivery: lapin::message::Delivery, wiring: &ConsumerWiring) {
    let ack = AckAware::new(Arc::new(delivery.acker.clone()));
    let delivery = Delivery::new(delivery, ack.clone());
    debug!(
        "server: got delivery on queue '{}' correlation id {:?}",
        wiring.queue_name, delivery.correlation_id
    );

    let ctx = HandlerContext::new(Arc::clone(&wiring.queue_name), wiring.shutdown.clone());
    wiring.tracker.spawn(handle_delivery(
        Arc::clone(&wiring.handler),
        ctx,
        ack,
        delivery,
        wiring.auto_ack,
        wiring.responses.clone(),
        Arc::clone(&wiring.queue_name),
    ));
}

/// Run one handler invocation to completion and settle its delivery.
///
/// The invocation is isolated with `catch_unwind`: a panicking handler is
/// logged, its delivery nacked without requeue, and no response published.
/// A well-behaved handler that did not settle the delivery itself gets it
/// acknowledged here, exactly once.
pub(crate) async fn handle_delivery(
    handler: HandlerFunc,
    ctx: HandlerContext,
    ack: AckAware,
    delivery: Delivery,
    auto_ack: bool,
    responses: mpsc::UnboundedSender<ProcessedRequest>,
    queue_name: Arc<str>,
) {
    let reply_to = delivery.reply_to.clone();
    let correlation_id = delivery.correlation_id.clone();
    let writer = ResponseWriter::new(ack.clone(), correlation_id);

    match AssertUnwindSafe(handler(ctx, writer, delivery))
        .catch_unwind()
        .await
    {
        Ok(writer) => {
            if !auto_ack && !ack.is_handled() {
                if let Err(e) = ack.ack(false).await {
                    error!("server: could not ack delivery on queue '{queue_name}': {e}");
                }
            }
            let (mandatory, immediate, publishing) = writer.into_parts();
            let _ = responses.send(ProcessedRequest {
                reply_to,
                mandatory,
                immediate,
                publishing,
            });
        }
        Err(payload) => {
            error!(
                "server: handler on queue '{queue_name}' panicked: {}",
                panic_message(payload)
            );
            if !auto_ack && !ack.is_handled() {
                if let Err(e) = ack.nack(false, false).await {
                    error!("server: could not nack delivery on queue '{queue_name}': {e}");
                }
            }
        }
    }
}
