//! # postbus
//!
//! **Postbus** is a typed, in-process publish/subscribe engine.
//!
//! It registers subscribers (multi-handler types enumerated through a
//! bindings builder, or single-event callbacks), compiles one dispatcher
//! per concrete event type that invokes all matching subscribers in a
//! defined total order, and keeps those dispatchers consistent while
//! registration and publishing run concurrently.
//!
//! ## Features
//!
//! | Area          | Description                                                              | Key types / traits                                  |
//! |---------------|--------------------------------------------------------------------------|-----------------------------------------------------|
//! | **Events**    | Capability protocol: hierarchy, cancellation, post-dispatch, completion. | [`Event`], [`Cancellable`], [`AsyncEvent`]          |
//! | **Discovery** | Handlers enumerated per subscriber type through explicit bindings.       | [`Subscriber`], [`Bindings`]                        |
//! | **Ordering**  | Five-position total order, stable within a position.                     | [`PostOrder`], [`Subscription`]                     |
//! | **Dispatch**  | Per-event-type compiled call tables; safe and unsafe variants.           | [`EventBus`]                                        |
//! | **Grouping**  | Bulk unregistration by owner, owner type, or namespace.                  | [`Namespace`]                                       |
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use postbus::{Bindings, Event, EventBus, PostOrder, Subscriber};
//!
//! struct Deploy {
//!     service: String,
//! }
//!
//! impl Event for Deploy {}
//!
//! struct Audit;
//!
//! impl Audit {
//!     fn on_deploy(&self, event: &Deploy) {
//!         println!("[audit] deploying {}", event.service);
//!     }
//! }
//!
//! impl Subscriber for Audit {
//!     fn subscriptions(bindings: &mut Bindings<Self>) {
//!         bindings.bind(Audit::on_deploy).order(PostOrder::Late);
//!     }
//! }
//!
//! let bus = EventBus::new();
//! bus.register("audit", Arc::new(Audit));
//! bus.subscribe("cli", |event: &Deploy| println!("deploy: {}", event.service));
//!
//! bus.dispatch(&Deploy {
//!     service: "geo".into(),
//! });
//! ```
//!
//! ## Delivery contract
//!
//! - Subscribers of one dispatch fire in `(PostOrder, registration)`
//!   order; ties keep registration order.
//! - [`EventBus::dispatch`] isolates every handler and the post-dispatch
//!   hook; [`EventBus::unsafe_dispatch`] stops at the first failure and
//!   logs it once.
//! - Cancelled events skip whole runs of `ignore_cancelled` handlers; the
//!   cancellation flag is read once per run.
//! - Publishing never takes the registration mutex for event types that
//!   have been dispatched before.
//!
//! ---

mod bus;
mod error;
mod events;
mod subscribers;

// ---- Public re-exports ----

pub use bus::EventBus;
pub use error::DispatchError;
pub use events::{AsyncEvent, CancelFlag, Cancellable, Completion, Event};
pub use subscribers::{Binding, Bindings, Namespace, PostOrder, Subscriber, Subscription};
