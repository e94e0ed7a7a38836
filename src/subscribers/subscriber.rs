//! # Handler discovery through explicit bindings.
//!
//! [`Subscriber`] is the extension point for plugging multi-handler types
//! into the bus. Instead of reflective method scanning, a subscriber
//! enumerates its handlers once in [`Subscriber::subscriptions`], calling
//! [`Bindings::bind`] (instance handler) or [`Bindings::bind_fn`]
//! (free-standing handler) per method.
//!
//! ## Rules
//! - Handler arity and event-parameter typing are compile-time facts of
//!   the binding signatures.
//! - `ignore_cancelled` is only offered for event types that implement
//!   [`Cancellable`]; on other types it is unrepresentable.
//! - An instance binding staged during type-level registration (no
//!   instance available) is logged and skipped; the registration as a
//!   whole continues.
//!
//! ## Example
//! ```rust
//! use postbus::{Bindings, Event, PostOrder, Subscriber};
//!
//! struct Saved {
//!     path: String,
//! }
//!
//! impl Event for Saved {}
//!
//! struct Audit {
//!     sink: String,
//! }
//!
//! impl Audit {
//!     fn on_saved(&self, event: &Saved) {
//!         println!("{} -> {}", event.path, self.sink);
//!     }
//! }
//!
//! impl Subscriber for Audit {
//!     fn subscriptions(bindings: &mut Bindings<Self>) {
//!         bindings.bind(Audit::on_saved).order(PostOrder::Late);
//!     }
//! }
//! ```

use std::any::{Any, TypeId};
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::error;

use crate::events::{Cancellable, Event};

use super::subscription::{Handler, PostOrder};

/// A type that enumerates event handlers for registration.
pub trait Subscriber: Send + Sync + 'static {
    /// Declares every handler of this subscriber.
    ///
    /// Called once per registration; the staged bindings are registered
    /// atomically afterwards.
    fn subscriptions(bindings: &mut Bindings<Self>)
    where
        Self: Sized;
}

/// One staged handler, not yet registered.
pub(crate) struct Staged {
    pub owner: Option<Arc<dyn Any + Send + Sync>>,
    pub owner_type: TypeId,
    pub owner_type_name: &'static str,
    pub order: PostOrder,
    pub ignore_cancelled: bool,
    pub exact: bool,
    pub target: TypeId,
    pub target_name: &'static str,
    pub handler: Handler,
    pub handler_name: &'static str,
}

/// Collects the handler bindings of one [`Subscriber`].
pub struct Bindings<S> {
    owner: Option<Arc<S>>,
    staged: Vec<Staged>,
}

impl<S: Subscriber> Bindings<S> {
    pub(crate) fn for_instance(owner: Arc<S>) -> Self {
        Self {
            owner: Some(owner),
            staged: Vec::new(),
        }
    }

    pub(crate) fn for_type() -> Self {
        Self {
            owner: None,
            staged: Vec::new(),
        }
    }

    pub(crate) fn into_staged(self) -> Vec<Staged> {
        self.staged
    }

    /// Binds an instance handler.
    ///
    /// During type-level registration there is no instance to call it on;
    /// the binding is logged and skipped.
    pub fn bind<E, F>(&mut self, handler: F) -> Binding<'_, E>
    where
        E: Event,
        F: Fn(&S, &E) + Send + Sync + 'static,
    {
        let handler_name = std::any::type_name::<F>();

        let Some(owner) = self.owner.clone() else {
            error!(
                handler = handler_name,
                subscriber = std::any::type_name::<S>(),
                "skipping instance handler: subscriber registered without an instance"
            );
            return Binding::skipped();
        };

        let adapter: Handler = Arc::new(move |event: &dyn Event| {
            if let Some(event) = (event as &dyn Any).downcast_ref::<E>() {
                handler(&*owner, event);
            }
        });

        self.push::<E>(adapter, handler_name)
    }

    /// Binds a free-standing handler that needs no instance.
    pub fn bind_fn<E, F>(&mut self, handler: F) -> Binding<'_, E>
    where
        E: Event,
        F: Fn(&E) + Send + Sync + 'static,
    {
        let adapter: Handler = Arc::new(move |event: &dyn Event| {
            if let Some(event) = (event as &dyn Any).downcast_ref::<E>() {
                handler(event);
            }
        });

        self.push::<E>(adapter, std::any::type_name::<F>())
    }

    fn push<E: Event>(&mut self, handler: Handler, handler_name: &'static str) -> Binding<'_, E> {
        self.staged.push(Staged {
            owner: self
                .owner
                .clone()
                .map(|owner| owner as Arc<dyn Any + Send + Sync>),
            owner_type: TypeId::of::<S>(),
            owner_type_name: std::any::type_name::<S>(),
            order: PostOrder::Normal,
            ignore_cancelled: false,
            exact: false,
            target: TypeId::of::<E>(),
            target_name: std::any::type_name::<E>(),
            handler,
            handler_name,
        });

        Binding {
            slot: self.staged.last_mut(),
            _event: PhantomData,
        }
    }
}

/// Options of one staged binding.
pub struct Binding<'a, E: Event> {
    slot: Option<&'a mut Staged>,
    _event: PhantomData<fn(&E)>,
}

impl<'a, E: Event> Binding<'a, E> {
    fn skipped() -> Self {
        Self {
            slot: None,
            _event: PhantomData,
        }
    }

    /// Dispatch-order position. Defaults to [`PostOrder::Normal`].
    pub fn order(mut self, order: PostOrder) -> Self {
        if let Some(slot) = self.slot.as_deref_mut() {
            slot.order = order;
        }
        self
    }

    /// Matches the declared event type only, excluding derived types.
    pub fn exact(mut self) -> Self {
        if let Some(slot) = self.slot.as_deref_mut() {
            slot.exact = true;
        }
        self
    }
}

impl<'a, E: Event + Cancellable> Binding<'a, E> {
    /// Skips the handler while the event reports itself cancelled.
    pub fn ignore_cancelled(mut self) -> Self {
        if let Some(slot) = self.slot.as_deref_mut() {
            slot.ignore_cancelled = true;
        }
        self
    }
}
