//! Subscription model: descriptors, ordering, handler discovery.
//!
//! ## Contents
//! - [`Subscription`] immutable descriptor of one registered handler
//! - [`PostOrder`] five-position dispatch ordering
//! - [`Namespace`] grouping tag for bulk removal
//! - [`Subscriber`] + [`Bindings`] explicit handler discovery

pub(crate) mod subscriber;
pub(crate) mod subscription;

pub use subscriber::{Binding, Bindings, Subscriber};
pub use subscription::{Namespace, PostOrder, Subscription};
