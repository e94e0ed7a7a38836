//! # Event capability protocol.
//!
//! Every value published through the bus implements [`Event`]. The bus
//! observes three things about it:
//! - its concrete runtime type (dispatch is keyed by it),
//! - whether it can be cancelled ([`Cancellable`]),
//! - the [`post_dispatch`](Event::post_dispatch) hook, invoked once after
//!   all subscribers of one dispatch have run.
//!
//! ## Event hierarchies
//!
//! Rust has no class inheritance; a derived event embeds its base event
//! and exposes it through [`parent`](Event::parent). The chain of
//! `parent` links is the event's type lineage, and a subscriber bound to
//! an ancestor type receives the event through the embedded view:
//!
//! ```rust
//! use postbus::{CancelFlag, Cancellable, Event};
//!
//! #[derive(Default)]
//! struct ConnectionEvent {
//!     cancelled: CancelFlag,
//! }
//!
//! impl Event for ConnectionEvent {
//!     fn as_cancellable(&self) -> Option<&dyn Cancellable> {
//!         Some(self)
//!     }
//! }
//!
//! impl Cancellable for ConnectionEvent {
//!     fn is_cancelled(&self) -> bool {
//!         self.cancelled.is_cancelled()
//!     }
//! }
//!
//! struct LoginEvent {
//!     base: ConnectionEvent,
//!     user: String,
//! }
//!
//! impl Event for LoginEvent {
//!     fn parent(&self) -> Option<&dyn Event> {
//!         Some(&self.base)
//!     }
//! }
//! ```

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};

use super::completion::Completion;

/// A value that can be published through the bus.
///
/// All hooks have no-op defaults; a plain `impl Event for T {}` is a
/// valid leaf event.
pub trait Event: Any + Send + Sync {
    /// The embedded base event, if this event type extends another.
    ///
    /// Returning `Some` makes every subscriber of the base type (and of
    /// its bases, transitively) eligible for this event.
    fn parent(&self) -> Option<&dyn Event> {
        None
    }

    /// Cancellation capability probe.
    ///
    /// Cancellable event types return `Some(self)`.
    fn as_cancellable(&self) -> Option<&dyn Cancellable> {
        None
    }

    /// Hook invoked exactly once after all subscribers of one dispatch.
    fn post_dispatch(&self) {}
}

/// Cooperative cancellation capability.
///
/// Subscribers registered with `ignore_cancelled` are skipped when the
/// event reports itself cancelled at the start of their gated run.
/// Cancellation never interrupts a subscriber that is already running.
pub trait Cancellable: Event {
    /// Whether the event has been cancelled.
    fn is_cancelled(&self) -> bool;
}

/// An event carrying a completion handle.
///
/// `dispatch_async` hands the handle back to the publisher. The bus does
/// not resolve or inspect it; completing it is the subscribers' contract.
pub trait AsyncEvent: Event {
    /// The completion handle resolved by the subscribers.
    fn done_handle(&self) -> &Completion;
}

/// Set-once cancellation flag for embedding into [`Cancellable`] events.
///
/// The flag is a cooperative signal read between gated runs, not a
/// synchronization edge; it uses relaxed atomics.
#[derive(Debug, Default)]
pub struct CancelFlag {
    cancelled: AtomicBool,
}

impl CancelFlag {
    /// Creates a flag in the not-cancelled state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the event cancelled.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Plain;

    impl Event for Plain {}

    #[test]
    fn leaf_event_defaults() {
        let event = Plain;
        assert!(event.parent().is_none());
        assert!(event.as_cancellable().is_none());
        event.post_dispatch();
    }

    #[test]
    fn cancel_flag_is_sticky() {
        let flag = CancelFlag::new();
        assert!(!flag.is_cancelled());

        flag.cancel();
        flag.cancel();
        assert!(flag.is_cancelled());
    }
}
