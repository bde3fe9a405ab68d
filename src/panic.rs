//! Rendering of panic payloads for log messages.

use std::{any::Any, fmt};

/// A caught panic payload that displays as its message.
///
/// `panic!` payloads are usually a `&'static str` or a `String`; anything
/// else is shown through its `Debug` form.
///
/// ```
/// use stompwire::panic::format_panic;
///
/// assert_eq!(format_panic(Box::new("boom")).to_string(), "boom");
/// assert_eq!(format_panic(Box::new(String::from("bang"))).to_string(), "bang");
/// ```
#[derive(Debug)]
#[must_use]
pub struct PanicMessage(Box<dyn Any + Send>);

impl PanicMessage {
    /// Message text when the payload is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        self.0
            .downcast_ref::<&'static str>()
            .copied()
            .or_else(|| self.0.downcast_ref::<String>().map(String::as_str))
    }
}

impl fmt::Display for PanicMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_str() {
            Some(text) => f.write_str(text),
            None => write!(f, "{:?}", self.0),
        }
    }
}

/// Wrap a payload returned by `catch_unwind`.
pub fn format_panic(payload: Box<dyn Any + Send>) -> PanicMessage { PanicMessage(payload) }
