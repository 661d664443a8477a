//! Declaration, consume and QoS settings applied when the server sets up
//! broker objects.
//!
//! Each settings struct mirrors the corresponding AMQP method arguments and
//! converts into the matching lapin options. The `args` tables are passed
//! through verbatim so callers can use broker extensions (per-queue TTLs,
//! dead-letter exchanges and the like) without this crate modelling them.

use lapin::{
    options::{
        BasicConsumeOptions,
        BasicQosOptions,
        ExchangeDeclareOptions,
        QueueBindOptions,
        QueueDeclareOptions,
    },
    types::FieldTable,
};

/// Settings used when declaring an exchange named by a binding.
///
/// Exchanges are declared durable by default; everything else is off.
#[derive(Clone, Debug)]
pub struct ExchangeDeclareSettings {
    /// Survive broker restarts.
    pub durable: bool,
    /// Delete the exchange once no queue is bound to it.
    pub auto_delete: bool,
    /// Refuse direct publishes; the exchange only receives from other
    /// exchanges.
    pub internal: bool,
    /// Do not wait for the broker's declare-ok.
    pub no_wait: bool,
    /// Extra declaration arguments forwarded to the broker.
    pub args: FieldTable,
}

impl Default for ExchangeDeclareSettings {
    fn default() -> Self {
        Self {
            durable: true,
            auto_delete: false,
            internal: false,
            no_wait: false,
            args: FieldTable::default(),
        }
    }
}

impl ExchangeDeclareSettings {
    pub(crate) fn options(&self) -> ExchangeDeclareOptions {
        ExchangeDeclareOptions {
            passive: false,
            durable: self.durable,
            auto_delete: self.auto_delete,
            internal: self.internal,
            nowait: self.no_wait,
        }
    }
}

/// Settings used when declaring the queue of a binding.
#[derive(Clone, Debug, Default)]
pub struct QueueDeclareSettings {
    /// Survive broker restarts.
    pub durable: bool,
    /// Delete the queue once the last consumer disconnects.
    pub delete_when_unused: bool,
    /// Restrict the queue to this connection.
    pub exclusive: bool,
    /// Do not wait for the broker's declare-ok.
    pub no_wait: bool,
    /// Extra declaration arguments forwarded to the broker.
    pub args: FieldTable,
}

impl QueueDeclareSettings {
    pub(crate) fn options(&self) -> QueueDeclareOptions {
        QueueDeclareOptions {
            passive: false,
            durable: self.durable,
            exclusive: self.exclusive,
            auto_delete: self.delete_when_unused,
            nowait: self.no_wait,
        }
    }

    pub(crate) fn bind_options(&self) -> QueueBindOptions {
        // Binding reuses the declare no-wait preference.
        QueueBindOptions {
            nowait: self.no_wait,
        }
    }
}

/// Settings used when starting a consumer on a bound queue.
#[derive(Clone, Debug, Default)]
pub struct ConsumeSettings {
    /// Let the broker consider every delivery acknowledged on send.
    ///
    /// When set, the server skips its own acknowledgement pass entirely.
    pub auto_ack: bool,
    /// Request exclusive consumer access to the queue.
    pub exclusive: bool,
    /// Do not deliver messages published on this connection.
    pub no_local: bool,
    /// Do not wait for the broker's consume-ok.
    pub no_wait: bool,
    /// Extra consume arguments forwarded to the broker.
    pub args: FieldTable,
}

impl ConsumeSettings {
    pub(crate) fn options(&self) -> BasicConsumeOptions {
        BasicConsumeOptions {
            no_local: self.no_local,
            no_ack: self.auto_ack,
            exclusive: self.exclusive,
            nowait: self.no_wait,
        }
    }
}

/// Channel QoS applied to the server's input channel before consuming.
///
/// The AMQP prefetch-size field is not exposed: RabbitMQ does not implement
/// it and lapin does not surface it.
#[derive(Clone, Copy, Debug, Default)]
pub struct QosSettings {
    /// Number of unacknowledged deliveries the broker will push before
    /// pausing the consumer.
    pub prefetch_count: u16,
    /// Apply the prefetch limit per channel rather than per consumer.
    pub global: bool,
}

impl QosSettings {
    pub(crate) fn options(&self) -> BasicQosOptions {
        BasicQosOptions {
            global: self.global,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exchanges_are_durable_by_default() {
        let settings = ExchangeDeclareSettings::default();
        assert!(settings.durable);
        assert!(!settings.auto_delete);
        assert!(!settings.internal);
        let options = settings.options();
        assert!(options.durable);
        assert!(!options.passive);
    }

    #[test]
    fn queue_delete_when_unused_maps_to_auto_delete() {
        let settings = QueueDeclareSettings {
            delete_when_unused: true,
            ..QueueDeclareSettings::default()
        };
        assert!(settings.options().auto_delete);
    }

    #[test]
    fn consume_auto_ack_maps_to_no_ack() {
        let settings = ConsumeSettings {
            auto_ack: true,
            ..ConsumeSettings::default()
        };
        assert!(settings.options().no_ack);
    }
}
