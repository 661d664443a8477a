//! Accumulation of a handler's reply.
//!
//! A [`ResponseWriter`] collects everything one handler invocation wants to
//! say back to the caller: body bytes, headers, content type and the publish
//! flags. The server turns the finished writer into a responder queue entry;
//! the responder pump owns the actual publish.

use bytes::{BufMut, Bytes, BytesMut};
use lapin::types::{AMQPValue, FieldTable, ShortString};

use crate::acknowledger::AckAware;

/// Builds the reply for a single delivery.
///
/// Writes append in order; the writer is not meant to be shared between
/// tasks. The body starts empty and the correlation id is pre-seeded from
/// the request, so an empty-bodied reply still correlates.
///
/// The writer implements [`std::io::Write`], so `write!` and friends work:
///
/// ```ignore
/// use std::io::Write as _;
/// write!(rw, "Hello: {}", name)?;
/// ```
pub struct ResponseWriter {
    body: BytesMut,
    headers: FieldTable,
    content_type: Option<String>,
    correlation_id: Option<String>,
    mandatory: bool,
    immediate: bool,
    acknowledger: AckAware,
}

impl ResponseWriter {
    pub(crate) fn new(acknowledger: AckAware, correlation_id: Option<String>) -> Self {
        Self {
            body: BytesMut::new(),
            headers: FieldTable::default(),
            content_type: None,
            correlation_id,
            mandatory: false,
            immediate: false,
            acknowledger,
        }
    }

    /// Append bytes to the reply body.
    pub fn write(&mut self, chunk: &[u8]) {
        self.body.put_slice(chunk);
    }

    /// Set the reply's content type.
    pub fn set_content_type(&mut self, content_type: impl Into<String>) {
        self.content_type = Some(content_type.into());
    }

    /// Set one reply header, replacing any previous value under `key`.
    pub fn set_header(&mut self, key: impl Into<ShortString>, value: AMQPValue) {
        self.headers.insert(key.into(), value);
    }

    /// Ask the broker to return the reply if it cannot be routed.
    pub fn set_mandatory(&mut self, mandatory: bool) {
        self.mandatory = mandatory;
    }

    /// Ask the broker to return the reply if no consumer is ready.
    pub fn set_immediate(&mut self, immediate: bool) {
        self.immediate = immediate;
    }

    /// The acknowledgement handle of the delivery being answered.
    ///
    /// Handlers that want to nack or reject, or to ack before doing slow
    /// work, settle through this; the server then leaves the delivery alone.
    #[must_use]
    pub fn acknowledger(&self) -> &AckAware {
        &self.acknowledger
    }

    pub(crate) fn into_parts(self) -> (bool, bool, ResponsePublishing) {
        (
            self.mandatory,
            self.immediate,
            ResponsePublishing {
                body: self.body.freeze(),
                headers: self.headers,
                content_type: self.content_type,
                correlation_id: self.correlation_id,
            },
        )
    }
}

impl std::io::Write for ResponseWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.body.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl std::fmt::Debug for ResponseWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseWriter")
            .field("body_len", &self.body.len())
            .field("content_type", &self.content_type)
            .field("correlation_id", &self.correlation_id)
            .field("mandatory", &self.mandatory)
            .field("immediate", &self.immediate)
            .finish_non_exhaustive()
    }
}

/// The publishable half of a processed request.
#[derive(Clone, Debug)]
pub(crate) struct ResponsePublishing {
    pub body: Bytes,
    pub headers: FieldTable,
    pub content_type: Option<String>,
    pub correlation_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use std::{io::Write as _, sync::Arc};

    use super::*;
    use crate::acknowledger::MockAcknowledger;

    fn writer(correlation_id: Option<&str>) -> ResponseWriter {
        let ack = AckAware::new(Arc::new(MockAcknowledger::new()));
        ResponseWriter::new(ack, correlation_id.map(str::to_owned))
    }

    #[test]
    fn writes_concatenate_in_order() {
        let mut rw = writer(None);
        rw.write(b"Hello");
        rw.write(b", ");
        write!(rw, "world").expect("io::Write never fails");

        let (_, _, publishing) = rw.into_parts();
        assert_eq!(&publishing.body[..], b"Hello, world");
    }

    #[test]
    fn correlation_id_survives_into_publishing() {
        let rw = writer(Some("abc-123"));
        let (_, _, publishing) = rw.into_parts();
        assert_eq!(publishing.correlation_id.as_deref(), Some("abc-123"));
        assert!(publishing.body.is_empty());
    }

    #[test]
    fn flags_and_headers_are_captured() {
        let mut rw = writer(None);
        rw.set_mandatory(true);
        rw.set_immediate(true);
        rw.set_content_type("text/plain");
        rw.set_header("retries", AMQPValue::LongInt(2));

        let (mandatory, immediate, publishing) = rw.into_parts();
        assert!(mandatory);
        assert!(immediate);
        assert_eq!(publishing.content_type.as_deref(), Some("text/plain"));
        assert_eq!(
            publishing.headers.inner().get(&ShortString::from("retries")),
            Some(&AMQPValue::LongInt(2))
        );
    }
}
