//! Event model: capability traits, completion handle, type lineage.
//!
//! ## Contents
//! - [`Event`], [`Cancellable`], [`AsyncEvent`] capability protocol
//! - [`CancelFlag`] embeddable cancellation flag
//! - [`Completion`] handle returned by `dispatch_async`
//! - lineage resolver (crate-internal) backing hierarchical matching

mod completion;
mod event;
pub(crate) mod lineage;

pub use completion::Completion;
pub use event::{AsyncEvent, CancelFlag, Cancellable, Event};
