//! # Error types used by the dispatch machinery.
//!
//! The bus never returns errors from its public surface: handler failures
//! are caught and logged per subscriber in safe dispatch, or logged once
//! at the outer boundary in unsafe dispatch. [`DispatchError`] is the
//! shape those log entries take.

use std::any::Any;

use thiserror::Error;

/// Failure raised while delivering one event.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum DispatchError {
    /// A handler panicked during dispatch.
    #[error("handler {handler} panicked while dispatching {event}: {message}")]
    HandlerPanicked {
        /// Type name of the dispatched event.
        event: &'static str,
        /// Identity of the failing handler.
        handler: &'static str,
        /// Panic payload, stringified.
        message: String,
    },
    /// The event's post-dispatch hook panicked.
    #[error("post-dispatch hook of {event} panicked: {message}")]
    PostDispatchPanicked {
        /// Type name of the dispatched event.
        event: &'static str,
        /// Panic payload, stringified.
        message: String,
    },
}

impl DispatchError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            DispatchError::HandlerPanicked { .. } => "dispatch_handler_panicked",
            DispatchError::PostDispatchPanicked { .. } => "dispatch_post_hook_panicked",
        }
    }
}

/// Dispatcher synthesis failure.
///
/// When raised during a rebuild, the previously installed dispatcher for
/// the event type stays in effect.
#[derive(Error, Debug)]
#[error("cannot build dispatcher for {event}: {target} is not in its lineage")]
pub(crate) struct BuildError {
    pub event: &'static str,
    pub target: &'static str,
}

/// Extracts a printable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_message_handles_common_payloads() {
        let caught = std::panic::catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(panic_message(caught.as_ref()), "boom");

        let caught = std::panic::catch_unwind(|| panic!("task {} failed", 7)).unwrap_err();
        assert_eq!(panic_message(caught.as_ref()), "task 7 failed");

        let caught = std::panic::catch_unwind(|| std::panic::panic_any(42_u8)).unwrap_err();
        assert_eq!(panic_message(caught.as_ref()), "non-string panic payload");
    }

    #[test]
    fn dispatch_error_labels_are_stable() {
        let err = DispatchError::HandlerPanicked {
            event: "E",
            handler: "h",
            message: "boom".into(),
        };
        assert_eq!(err.as_label(), "dispatch_handler_panicked");
    }
}
