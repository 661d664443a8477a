//! Outgoing request construction.

use std::time::Duration;

use lapin::types::{AMQPValue, FieldTable, ShortString};
use tokio_util::sync::CancellationToken;

/// An RPC request assembled with fluent accumulators.
///
/// A default request targets the default exchange with an empty routing key
/// and expects a reply. Every `with_*` method consumes and returns the
/// request, so construction chains:
///
/// ```
/// use wirebus::Request;
///
/// let request = Request::new()
///     .with_routing_key("orders")
///     .with_string_body("hello")
///     .with_content_type("text/plain");
/// # let _ = request;
/// ```
#[derive(Clone, Debug, Default)]
pub struct Request {
    pub(crate) routing_key: String,
    pub(crate) exchange: String,
    pub(crate) body: Vec<u8>,
    pub(crate) content_type: Option<String>,
    pub(crate) headers: FieldTable,
    pub(crate) correlation_id: Option<String>,
    pub(crate) reply: bool,
    pub(crate) timeout: Option<Duration>,
    pub(crate) cancellation: Option<CancellationToken>,
}

impl Request {
    /// Create an empty request expecting a reply.
    #[must_use]
    pub fn new() -> Self {
        Self {
            reply: true,
            ..Self::default()
        }
    }

    /// Set the routing key. For direct bindings this is the queue name.
    #[must_use]
    pub fn with_routing_key(mut self, routing_key: impl Into<String>) -> Self {
        self.routing_key = routing_key.into();
        self
    }

    /// Publish to `exchange` instead of the default exchange.
    #[must_use]
    pub fn with_exchange(mut self, exchange: impl Into<String>) -> Self {
        self.exchange = exchange.into();
        self
    }

    /// Set the request body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Set the request body from a string.
    #[must_use]
    pub fn with_string_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into().into_bytes();
        self
    }

    /// Set the body's content type.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Replace the application headers wholesale.
    #[must_use]
    pub fn with_headers(mut self, headers: FieldTable) -> Self {
        self.headers = headers;
        self
    }

    /// Set one application header, replacing any previous value under `key`.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<ShortString>, value: AMQPValue) -> Self {
        self.headers.insert(key.into(), value);
        self
    }

    /// Choose whether a reply is expected. Defaults to `true`; disable for
    /// fire-and-forget publishes.
    #[must_use]
    pub fn with_reply(mut self, reply: bool) -> Self {
        self.reply = reply;
        self
    }

    /// Use `correlation_id` instead of a generated one.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Bound the wait for a reply, overriding the client's default.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Attach a cancellation token; cancelling it abandons the wait for a
    /// reply.
    #[must_use]
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = Some(cancellation);
        self
    }
}
