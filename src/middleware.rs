//! Middleware composition around request handlers.
//!
//! A middleware is a function from handler to handler. The server chains the
//! registered middlewares around each binding's handler once, at consumer
//! start, so per-delivery dispatch pays no composition cost.

use std::sync::Arc;

use crate::handler::HandlerFunc;

/// Middleware wrapping a [`HandlerFunc`] in another.
///
/// A middleware may run code before and after the inner handler, or skip it
/// entirely; when it skips, it is responsible for leaving the delivery
/// acknowledged or rejected.
pub type ServerMiddleware = Arc<dyn Fn(HandlerFunc) -> HandlerFunc + Send + Sync>;

/// Wrap a closure as a [`ServerMiddleware`].
pub fn middleware_fn<F>(middleware: F) -> ServerMiddleware
where
    F: Fn(HandlerFunc) -> HandlerFunc + Send + Sync + 'static,
{
    Arc::new(middleware)
}

/// Chain `middlewares` around `handler`.
///
/// The first middleware in the slice becomes the outermost wrapper: with
/// `[m1, m2, m3]` the result is `m1(m2(m3(handler)))`, so `m1` sees every
/// invocation first and last.
#[must_use]
pub fn middleware_chain(handler: HandlerFunc, middlewares: &[ServerMiddleware]) -> HandlerFunc {
    middlewares
        .iter()
        .rev()
        .fold(handler, |inner, middleware| middleware(inner))
}
