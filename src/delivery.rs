//! The server-side view of one incoming message.

use bytes::Bytes;
use lapin::types::FieldTable;

use crate::acknowledger::AckAware;

/// One message delivered to a handler.
///
/// This flattens the broker's delivery into the fields RPC handlers care
/// about and carries the delivery's acknowledgement handle. The handle is
/// shared with the [`ResponseWriter`](crate::ResponseWriter) for the same
/// invocation, so settling through either is visible to the server.
#[derive(Clone, Debug)]
pub struct Delivery {
    /// Exchange the message was published to. Empty for the default
    /// exchange.
    pub exchange: String,
    /// Routing key the message was published with.
    pub routing_key: String,
    /// Whether the broker has delivered this message before.
    pub redelivered: bool,
    /// Correlation id from the request properties, when present.
    pub correlation_id: Option<String>,
    /// Queue the caller expects the reply on, when present.
    pub reply_to: Option<String>,
    /// Content type of the body, when present.
    pub content_type: Option<String>,
    /// Application headers.
    pub headers: FieldTable,
    /// Message payload.
    pub body: Bytes,
    acknowledger: AckAware,
}

impl Delivery {
    pub(crate) fn new(delivery: lapin::message::Delivery, acknowledger: AckAware) -> Self {
        let lapin::message::Delivery {
            exchange,
            routing_key,
            redelivered,
            properties,
            data,
            ..
        } = delivery;
        Self {
            exchange: exchange.as_str().to_owned(),
            routing_key: routing_key.as_str().to_owned(),
            redelivered,
            correlation_id: properties
                .correlation_id()
                .as_ref()
                .map(|id| id.as_str().to_owned()),
            reply_to: properties
                .reply_to()
                .as_ref()
                .map(|queue| queue.as_str().to_owned()),
            content_type: properties
                .content_type()
                .as_ref()
                .map(|kind| kind.as_str().to_owned()),
            headers: properties.headers().clone().unwrap_or_default(),
            body: Bytes::from(data),
            acknowledger,
        }
    }

    /// The acknowledgement handle for this delivery.
    #[must_use]
    pub fn acknowledger(&self) -> &AckAware {
        &self.acknowledger
    }
}
