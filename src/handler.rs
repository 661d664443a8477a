//! Handler function type and per-invocation context.

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::{delivery::Delivery, response::ResponseWriter};

/// Asynchronous request handler.
///
/// A handler receives the invocation [`HandlerContext`], a fresh
/// [`ResponseWriter`] and the [`Delivery`] that triggered it, and returns
/// the writer once it has said everything it wants to say. Build one from a
/// closure with [`handler_fn`].
pub type HandlerFunc = Arc<
    dyn Fn(HandlerContext, ResponseWriter, Delivery) -> BoxFuture<'static, ResponseWriter>
        + Send
        + Sync,
>;

/// Wrap an async closure as a [`HandlerFunc`].
///
/// # Examples
///
/// ```
/// use wirebus::handler_fn;
///
/// let echo = handler_fn(|_ctx, mut rw, delivery| async move {
///     rw.write(&delivery.body);
///     rw
/// });
/// # let _ = echo;
/// ```
pub fn handler_fn<F, Fut>(handler: F) -> HandlerFunc
where
    F: Fn(HandlerContext, ResponseWriter, Delivery) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ResponseWriter> + Send + 'static,
{
    Arc::new(move |ctx, rw, delivery| Box::pin(handler(ctx, rw, delivery)))
}

/// Context handed to every handler invocation.
///
/// Carries the name of the queue the delivery arrived on and the server's
/// shutdown signal, which middleware may use to bound work with deadlines.
#[derive(Clone, Debug)]
pub struct HandlerContext {
    queue_name: Arc<str>,
    shutdown: CancellationToken,
}

impl HandlerContext {
    pub(crate) fn new(queue_name: Arc<str>, shutdown: CancellationToken) -> Self {
        Self {
            queue_name,
            shutdown,
        }
    }

    /// Queue this delivery was consumed from.
    #[must_use]
    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Cancelled when the server begins shutting down.
    ///
    /// Long-running handlers can watch this to cut work short; the server
    /// still waits for every in-flight handler before closing the reply
    /// path.
    #[must_use]
    pub fn shutdown(&self) -> &CancellationToken {
        &self.shutdown
    }
}
