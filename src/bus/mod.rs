//! # The event bus: registration, snapshot management, dispatch.
//!
//! ## Architecture
//! ```text
//! register / unregister / bake ──► mutex ──► index ──► rebuild affected
//!                                                          │
//!                                                          ▼
//!                        dispatchers snapshot (replaced atomically)
//!                                                          ▲
//! dispatch(event) ───────────── O(1) lookup ───────────────┘
//! ```
//!
//! ## Rules
//! - Every structural mutation (register, unregister, bake) is serialized
//!   on one mutex, held for the full rebuild of the affected types.
//! - Publishers never take the mutex for event types seen before; they
//!   read the current snapshot and may keep the previous one mid-dispatch.
//! - Only event types whose subscription list changed are rebuilt.
//! - The first dispatch of a new concrete type materializes its lineage,
//!   index entry, and dispatcher under the mutex, once.

mod dispatcher;
mod index;

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use arc_swap::ArcSwap;
use tracing::{debug, error};

use crate::error::panic_message;
use crate::events::lineage::TypeCache;
use crate::events::{AsyncEvent, Completion, Event};
use crate::subscribers::subscriber::{Bindings, Subscriber};
use crate::subscribers::subscription::{Handler, Namespace, PostOrder, Subscription};

use dispatcher::Dispatcher;
use index::SubscriptionIndex;

type DispatcherMap = HashMap<TypeId, Arc<Dispatcher>>;

/// Typed in-process publish/subscribe engine.
///
/// Subscribers are registered through [`Subscriber`] discovery or as
/// single-event callbacks; per concrete event type the bus compiles a
/// dispatcher that invokes all matching subscribers in
/// `(PostOrder, registration)` order with per-subscriber isolation
/// ([`dispatch`](Self::dispatch)) or fail-fast semantics
/// ([`unsafe_dispatch`](Self::unsafe_dispatch)).
///
/// The bus is an instance, not a singleton; it is `Send + Sync` and meant
/// to be shared behind an `Arc`.
pub struct EventBus {
    index: Mutex<SubscriptionIndex>,
    dispatchers: ArcSwap<DispatcherMap>,
    types: TypeCache,
    seq: AtomicU64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self {
            index: Mutex::new(SubscriptionIndex::default()),
            dispatchers: ArcSwap::from_pointee(DispatcherMap::new()),
            types: TypeCache::default(),
            seq: AtomicU64::new(0),
        }
    }

    // ---- Registration ----

    /// Registers every handler of `subscriber` under `namespace`.
    ///
    /// Handlers are discovered through
    /// [`Subscriber::subscriptions`] and registered atomically; affected
    /// dispatchers are rebuilt before this returns.
    pub fn register<S: Subscriber>(&self, namespace: impl Into<Namespace>, subscriber: Arc<S>) {
        let mut bindings = Bindings::for_instance(subscriber);
        S::subscriptions(&mut bindings);
        self.register_staged(namespace.into(), bindings);
    }

    /// Registers the owner-less handlers of `S` under `namespace`.
    ///
    /// Instance bindings staged by `S` are logged and skipped; only
    /// [`Bindings::bind_fn`] handlers survive.
    pub fn register_static<S: Subscriber>(&self, namespace: impl Into<Namespace>) {
        let mut bindings = Bindings::<S>::for_type();
        S::subscriptions(&mut bindings);
        self.register_staged(namespace.into(), bindings);
    }

    /// Registers a single callback for `E` at [`PostOrder::Normal`].
    ///
    /// The callback is bound to the exact event type `E`; derived events
    /// do not reach it.
    pub fn subscribe<E, F>(&self, namespace: impl Into<Namespace>, handler: F) -> Arc<Subscription>
    where
        E: Event,
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.subscribe_ordered(namespace, PostOrder::Normal, handler)
    }

    /// Registers a single callback for `E` at an explicit position.
    pub fn subscribe_ordered<E, F>(
        &self,
        namespace: impl Into<Namespace>,
        order: PostOrder,
        handler: F,
    ) -> Arc<Subscription>
    where
        E: Event,
        F: Fn(&E) + Send + Sync + 'static,
    {
        let adapter: Handler = Arc::new(move |event: &dyn Event| {
            if let Some(event) = (event as &dyn Any).downcast_ref::<E>() {
                handler(event);
            }
        });

        let subscription = Arc::new(Subscription {
            seq: self.next_seq(),
            owner: None,
            owner_type: TypeId::of::<F>(),
            owner_type_name: std::any::type_name::<F>(),
            order,
            ignore_cancelled: false,
            exact: true,
            target: TypeId::of::<E>(),
            target_name: std::any::type_name::<E>(),
            namespace: namespace.into(),
            handler: adapter,
            handler_name: std::any::type_name::<F>(),
        });

        let mut index = self.locked();
        let affected = index.insert(Arc::clone(&subscription), &self.types);
        self.rebuild(&index, &affected);

        subscription
    }

    // ---- Unregistration ----

    /// Removes one subscription by identity.
    pub fn unregister(&self, subscription: &Arc<Subscription>) {
        let mut index = self.locked();
        let affected = index.remove(subscription);
        self.rebuild(&index, &affected);
    }

    /// Removes every subscription owned by `owner` (pointer identity).
    pub fn unregister_all<S: Subscriber>(&self, owner: &Arc<S>) {
        let owner = Arc::as_ptr(owner) as *const ();
        self.unregister_if(move |sub| sub.is_owned_by(owner));
    }

    /// Removes every subscription whose owner type is `S`.
    pub fn unregister_type<S: 'static>(&self) {
        self.unregister_if(|sub| sub.owner_type == TypeId::of::<S>());
    }

    /// Removes every subscription registered under `namespace`.
    pub fn unregister_namespace(&self, namespace: &Namespace) {
        self.unregister_if(move |sub| sub.namespace() == namespace);
    }

    // ---- Dispatch ----

    /// Publishes `event` to every matching subscriber, in order, with
    /// per-subscriber isolation. Never panics; a type without
    /// subscribers is a no-op.
    pub fn dispatch<E: Event>(&self, event: &E) {
        if let Some(dispatcher) = self.dispatcher_for(event) {
            dispatcher.dispatch(event);
        }
    }

    /// Publishes `event` without per-subscriber isolation: the first
    /// failing handler aborts the remaining subscribers and the
    /// post-dispatch hook. The failure is logged once and does not
    /// escape.
    pub fn unsafe_dispatch<E: Event>(&self, event: &E) {
        let Some(dispatcher) = self.dispatcher_for(event) else {
            return;
        };

        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| dispatcher.unsafe_dispatch(event)))
        {
            error!(
                event = std::any::type_name::<E>(),
                "dispatch failed: {}",
                panic_message(payload.as_ref())
            );
        }
    }

    /// Dispatches `event` as [`dispatch`](Self::dispatch) and returns its
    /// completion handle.
    ///
    /// The handle is resolved by the handlers, not by the bus; handler
    /// failures in safe dispatch leave it untouched.
    pub fn dispatch_async<E: AsyncEvent>(&self, event: &E) -> Completion {
        self.dispatch(event);
        event.done_handle().clone()
    }

    /// Dispatches `event` as [`unsafe_dispatch`](Self::unsafe_dispatch)
    /// and returns its completion handle.
    pub fn unsafe_dispatch_async<E: AsyncEvent>(&self, event: &E) -> Completion {
        self.unsafe_dispatch(event);
        event.done_handle().clone()
    }

    /// Rebuilds every dispatcher from the index, from scratch.
    ///
    /// Idempotent when no registrations happened in between.
    pub fn bake(&self) {
        let index = self.locked();
        let mut next = DispatcherMap::new();
        for key in index.keys() {
            self.bake_one(&index, key, &mut next);
        }
        self.dispatchers.store(Arc::new(next));
    }

    // ---- Internals ----

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    fn locked(&self) -> MutexGuard<'_, SubscriptionIndex> {
        self.index.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register_staged<S: Subscriber>(&self, namespace: Namespace, bindings: Bindings<S>) {
        let staged = bindings.into_staged();
        if staged.is_empty() {
            return;
        }

        let mut index = self.locked();
        let mut affected = Vec::new();
        for entry in staged {
            let subscription = Arc::new(Subscription::from_staged(
                entry,
                namespace.clone(),
                self.next_seq(),
            ));
            affected.extend(index.insert(subscription, &self.types));
        }
        affected.sort_unstable();
        affected.dedup();

        self.rebuild(&index, &affected);
    }

    fn unregister_if(&self, predicate: impl Fn(&Subscription) -> bool) {
        let mut index = self.locked();
        let affected = index.remove_if(predicate);
        self.rebuild(&index, &affected);
    }

    /// Rebuilds the dispatchers of `affected` types into a fresh snapshot
    /// and publishes it. Caller holds the mutex.
    fn rebuild(&self, index: &SubscriptionIndex, affected: &[TypeId]) {
        if affected.is_empty() {
            return;
        }

        let mut next = (**self.dispatchers.load()).clone();
        for &key in affected {
            self.bake_one(index, key, &mut next);
        }
        self.dispatchers.store(Arc::new(next));
    }

    /// Bakes one event type into `out`: installs a fresh dispatcher,
    /// drops the entry when the type has no subscriptions left, or keeps
    /// the previous dispatcher when the build fails.
    fn bake_one(&self, index: &SubscriptionIndex, key: TypeId, out: &mut DispatcherMap) {
        let (Some(list), Some(lineage)) = (index.get(key), self.types.get(key)) else {
            out.remove(&key);
            return;
        };

        let started = Instant::now();
        match Dispatcher::build(&lineage, list) {
            Ok(dispatcher) => {
                debug!(
                    event = lineage.name,
                    subscriptions = dispatcher.len(),
                    elapsed = ?started.elapsed(),
                    "dispatcher baked"
                );
                out.insert(key, Arc::new(dispatcher));
            }
            Err(err) => error!("{err}"),
        }
    }

    fn dispatcher_for<E: Event>(&self, event: &E) -> Option<Arc<Dispatcher>> {
        let key = TypeId::of::<E>();

        if let Some(dispatcher) = self.dispatchers.load().get(&key) {
            return Some(Arc::clone(dispatcher));
        }
        if self.types.contains(key) {
            // Seen before, currently no subscribers.
            return None;
        }
        self.materialize(event)
    }

    /// First sighting of a concrete event type: resolves its lineage,
    /// builds its index entry and dispatcher.
    fn materialize<E: Event>(&self, event: &E) -> Option<Arc<Dispatcher>> {
        let mut index = self.locked();
        let key = TypeId::of::<E>();

        // A rebuild may have published the dispatcher while this thread
        // waited on the mutex.
        if let Some(dispatcher) = self.dispatchers.load().get(&key) {
            return Some(Arc::clone(dispatcher));
        }

        let lineage = self.types.resolve(event);
        if index.materialize(&lineage) == 0 {
            return None;
        }

        let mut next = (**self.dispatchers.load()).clone();
        self.bake_one(&index, key, &mut next);
        let dispatcher = next.get(&key).cloned();
        self.dispatchers.store(Arc::new(next));
        dispatcher
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    struct Ping;

    impl Event for Ping {}

    struct Pong;

    impl Event for Pong {}

    fn trace_handler(
        trace: &Arc<Mutex<Vec<&'static str>>>,
        label: &'static str,
    ) -> impl Fn(&Ping) + Send + Sync + 'static {
        let trace = Arc::clone(trace);
        move |_| trace.lock().unwrap().push(label)
    }

    #[test]
    fn snapshot_is_replaced_not_mutated() {
        let bus = EventBus::new();
        let before = bus.dispatchers.load_full();

        bus.subscribe("test", |_: &Ping| {});
        bus.dispatch(&Ping);

        let after = bus.dispatchers.load_full();
        assert!(!Arc::ptr_eq(&before, &after));
        assert!(before.is_empty());
        assert_eq!(after.len(), 1);
    }

    #[test]
    fn unsubscribed_types_are_a_cheap_no_op() {
        let bus = EventBus::new();
        bus.dispatch(&Ping);

        assert!(bus.types.contains(TypeId::of::<Ping>()));
        assert!(bus.dispatchers.load().is_empty());

        // Second publish takes the fast negative path.
        bus.dispatch(&Ping);
        assert!(bus.dispatchers.load().is_empty());
    }

    #[test]
    fn registration_after_first_sighting_rebuilds_the_type() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let bus = EventBus::new();

        bus.dispatch(&Ping);
        bus.subscribe("test", trace_handler(&trace, "a"));
        bus.dispatch(&Ping);

        assert_eq!(*trace.lock().unwrap(), vec!["a"]);
    }

    #[test]
    fn unregister_drops_the_dispatcher_entry() {
        let bus = EventBus::new();
        let sub = bus.subscribe("test", |_: &Ping| {});
        bus.dispatch(&Ping);
        assert_eq!(bus.dispatchers.load().len(), 1);

        bus.unregister(&sub);
        assert!(bus.dispatchers.load().is_empty());

        bus.dispatch(&Ping);
        assert!(bus.dispatchers.load().is_empty());
    }

    #[test]
    fn rebuild_touches_affected_types_only() {
        let bus = EventBus::new();
        bus.subscribe("test", |_: &Ping| {});
        bus.subscribe("test", |_: &Pong| {});
        bus.dispatch(&Ping);
        bus.dispatch(&Pong);

        let pong_key = TypeId::of::<Pong>();
        let pong_before = Arc::clone(bus.dispatchers.load().get(&pong_key).unwrap());

        bus.subscribe("test", |_: &Ping| {});

        let pong_after = Arc::clone(bus.dispatchers.load().get(&pong_key).unwrap());
        assert!(Arc::ptr_eq(&pong_before, &pong_after));
    }

    #[test]
    fn bake_rebuilds_every_indexed_type() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let bus = EventBus::new();
        bus.subscribe("test", trace_handler(&trace, "a"));
        bus.subscribe("test", trace_handler(&trace, "b"));
        bus.dispatch(&Ping);

        bus.bake();
        bus.dispatch(&Ping);

        assert_eq!(*trace.lock().unwrap(), vec!["a", "b", "a", "b"]);
    }
}
