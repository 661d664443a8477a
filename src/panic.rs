//! Rendering of panic payloads caught around handler invocations.

use std::any::Any;

/// Turn a caught panic payload into a loggable message.
///
/// Panics raised with a string literal or a formatted message are unwrapped
/// to that text; any other payload type falls back to a placeholder, since
/// `dyn Any` carries no useful `Debug` output.
#[must_use]
pub fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<&'static str>() {
        Ok(message) => (*message).to_owned(),
        Err(payload) => match payload.downcast::<String>() {
            Ok(message) => *message,
            Err(_) => "non-string panic payload".to_owned(),
        },
    }
}
