//! Subscription descriptions coupling queues and exchanges to handlers.

use lapin::{types::FieldTable, ExchangeKind};

use crate::handler::HandlerFunc;

/// Name of the broker's predeclared topic exchange, used when a topic
/// binding names no exchange of its own.
pub const AMQ_TOPIC_EXCHANGE: &str = "amq.topic";

/// Name of the broker's predeclared headers exchange, used when a headers
/// binding names no exchange of its own.
pub const AMQ_HEADERS_EXCHANGE: &str = "amq.match";

/// One subscription the server will serve: which queue to consume, how the
/// queue is reached, and the handler invoked per delivery.
///
/// An empty queue name asks the broker to generate one; an empty exchange
/// name means the default exchange, in which case nothing is declared or
/// bound and the routing key addresses the queue directly.
#[derive(Clone)]
pub struct HandlerBinding {
    /// Queue to consume from. Empty for a broker-named queue.
    pub queue_name: String,
    /// Exchange the queue is bound to. Empty for the default exchange.
    pub exchange_name: String,
    /// Kind used if the exchange has to be declared.
    pub exchange_kind: ExchangeKind,
    /// Routing key, or pattern for topic exchanges.
    pub routing_key: String,
    /// Arguments passed when binding the queue, used by headers exchanges.
    pub bind_headers: FieldTable,
    /// Handler invoked for each delivery on the queue.
    pub handler: HandlerFunc,
}

impl HandlerBinding {
    /// Bind `handler` to `queue` on the default exchange.
    ///
    /// The queue name doubles as the routing key, so requests sent with that
    /// routing key and no exchange land here.
    pub fn direct(queue: impl Into<String>, handler: HandlerFunc) -> Self {
        let queue = queue.into();
        Self {
            routing_key: queue.clone(),
            queue_name: queue,
            exchange_name: String::new(),
            exchange_kind: ExchangeKind::Direct,
            bind_headers: FieldTable::default(),
            handler,
        }
    }

    /// Bind `handler` to a broker-named queue on fanout `exchange`.
    ///
    /// Every server binding a handler to the same fanout exchange receives
    /// its own copy of each published message.
    pub fn fanout(exchange: impl Into<String>, handler: HandlerFunc) -> Self {
        Self {
            queue_name: String::new(),
            exchange_name: exchange.into(),
            exchange_kind: ExchangeKind::Fanout,
            routing_key: String::new(),
            bind_headers: FieldTable::default(),
            handler,
        }
    }

    /// Bind `handler` to a broker-named queue on topic `exchange` under
    /// `pattern`.
    ///
    /// An empty exchange name selects [`AMQ_TOPIC_EXCHANGE`]. Patterns use
    /// `.` as the word separator; `*` matches exactly one word and `#`
    /// matches zero or more.
    pub fn topic(
        exchange: impl Into<String>,
        pattern: impl Into<String>,
        handler: HandlerFunc,
    ) -> Self {
        let exchange = non_empty_or(exchange.into(), AMQ_TOPIC_EXCHANGE);
        Self {
            queue_name: String::new(),
            exchange_name: exchange,
            exchange_kind: ExchangeKind::Topic,
            routing_key: pattern.into(),
            bind_headers: FieldTable::default(),
            handler,
        }
    }

    /// Bind `handler` to a broker-named queue on headers `exchange`,
    /// matching on `headers`.
    ///
    /// An empty exchange name selects [`AMQ_HEADERS_EXCHANGE`]. The
    /// `x-match` entry of the table chooses between requiring all entries
    /// (`"all"`) or any entry (`"any"`) to match.
    pub fn headers(
        exchange: impl Into<String>,
        headers: FieldTable,
        handler: HandlerFunc,
    ) -> Self {
        let exchange = non_empty_or(exchange.into(), AMQ_HEADERS_EXCHANGE);
        Self {
            queue_name: String::new(),
            exchange_name: exchange,
            exchange_kind: ExchangeKind::Headers,
            routing_key: String::new(),
            bind_headers: headers,
            handler,
        }
    }
}

impl std::fmt::Debug for HandlerBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerBinding")
            .field("queue_name", &self.queue_name)
            .field("exchange_name", &self.exchange_name)
            .field("exchange_kind", &self.exchange_kind)
            .field("routing_key", &self.routing_key)
            .finish_non_exhaustive()
    }
}

fn non_empty_or(value: String, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_owned()
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use lapin::types::{AMQPValue, ShortString};
    use rstest::rstest;

    use super::*;
    use crate::handler_fn;

    fn noop() -> HandlerFunc {
        handler_fn(|_ctx, rw, _delivery| async move { rw })
    }

    #[test]
    fn direct_uses_queue_as_routing_key() {
        let binding = HandlerBinding::direct("orders", noop());
        assert_eq!(binding.queue_name, "orders");
        assert_eq!(binding.routing_key, "orders");
        assert!(binding.exchange_name.is_empty());
    }

    #[test]
    fn fanout_leaves_queue_to_the_broker() {
        let binding = HandlerBinding::fanout("broadcast", noop());
        assert!(binding.queue_name.is_empty());
        assert_eq!(binding.exchange_name, "broadcast");
        assert_eq!(binding.exchange_kind, ExchangeKind::Fanout);
    }

    #[rstest]
    #[case("", AMQ_TOPIC_EXCHANGE)]
    #[case("events", "events")]
    fn topic_defaults_to_the_predeclared_exchange(
        #[case] exchange: &str,
        #[case] expected: &str,
    ) {
        let binding = HandlerBinding::topic(exchange, "foo.#", noop());
        assert_eq!(binding.exchange_name, expected);
        assert_eq!(binding.routing_key, "foo.#");
        assert_eq!(binding.exchange_kind, ExchangeKind::Topic);
    }

    #[test]
    fn headers_carries_the_match_table() {
        let mut table = FieldTable::default();
        table.insert(
            ShortString::from("x-match"),
            AMQPValue::LongString("all".into()),
        );
        table.insert(ShortString::from("foo"), AMQPValue::LongString("bar".into()));

        let binding = HandlerBinding::headers("", table.clone(), noop());
        assert_eq!(binding.exchange_name, AMQ_HEADERS_EXCHANGE);
        assert_eq!(binding.exchange_kind, ExchangeKind::Headers);
        assert_eq!(binding.bind_headers, table);
    }
}
