//! # Subscription descriptors.
//!
//! A [`Subscription`] is the immutable record of one registered handler:
//! who owns it, where it sorts, which event type it targets, and the
//! adapter that performs the call. Descriptors are totally ordered by
//! `(PostOrder, registration sequence)`; the sequence is unique, so
//! sorting is stable and equality is identity.

use std::any::{Any, TypeId};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::events::lineage::Lineage;
use crate::events::Event;

use super::subscriber::Staged;

/// Position of a subscription in the dispatch order of one event type.
///
/// Subscriptions fire in ascending order. Ties are broken by registration
/// sequence, so two `Normal` handlers fire in the order they were added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum PostOrder {
    /// Before everything else.
    First,
    /// Before the default position.
    Early,
    /// Default position.
    #[default]
    Normal,
    /// After the default position.
    Late,
    /// After everything else.
    Last,
}

/// Opaque tag grouping subscriptions for bulk removal.
///
/// Registrants that manage many handlers (a plugin, a module) register
/// them all under one namespace and tear them down with a single
/// `unregister_namespace` call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace(Arc<str>);

impl Namespace {
    /// Creates a namespace from any string-ish tag.
    pub fn new(tag: impl Into<Arc<str>>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Namespace {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

impl From<String> for Namespace {
    fn from(tag: String) -> Self {
        Self::new(tag)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Invocation adapter. Receives the event already projected to the
/// subscription's declared target type.
pub(crate) type Handler = Arc<dyn Fn(&dyn Event) + Send + Sync>;

/// Immutable record of one registered handler.
///
/// Returned by the callback registration surface; discovery-registered
/// handlers are removed in bulk by owner, owner type, or namespace.
pub struct Subscription {
    pub(crate) seq: u64,
    pub(crate) owner: Option<Arc<dyn Any + Send + Sync>>,
    pub(crate) owner_type: TypeId,
    pub(crate) owner_type_name: &'static str,
    pub(crate) order: PostOrder,
    pub(crate) ignore_cancelled: bool,
    pub(crate) exact: bool,
    pub(crate) target: TypeId,
    pub(crate) target_name: &'static str,
    pub(crate) namespace: Namespace,
    pub(crate) handler: Handler,
    pub(crate) handler_name: &'static str,
}

impl Subscription {
    pub(crate) fn from_staged(staged: Staged, namespace: Namespace, seq: u64) -> Self {
        Self {
            seq,
            owner: staged.owner,
            owner_type: staged.owner_type,
            owner_type_name: staged.owner_type_name,
            order: staged.order,
            ignore_cancelled: staged.ignore_cancelled,
            exact: staged.exact,
            target: staged.target,
            target_name: staged.target_name,
            namespace,
            handler: staged.handler,
            handler_name: staged.handler_name,
        }
    }

    /// Dispatch-order position.
    pub fn order(&self) -> PostOrder {
        self.order
    }

    /// Namespace the handler was registered under.
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Whether the handler is skipped while its event is cancelled.
    pub fn ignore_cancelled(&self) -> bool {
        self.ignore_cancelled
    }

    /// Whether the handler matches its declared event type only,
    /// excluding derived types.
    pub fn exact_event(&self) -> bool {
        self.exact
    }

    /// Declared event type the handler was bound to.
    pub fn event_type(&self) -> TypeId {
        self.target
    }

    /// Type name of the declared event type.
    pub fn event_type_name(&self) -> &'static str {
        self.target_name
    }

    /// Identity of the handler, as it appears in dispatch error logs.
    pub fn handler_name(&self) -> &'static str {
        self.handler_name
    }

    pub(crate) fn sort_key(&self) -> (PostOrder, u64) {
        (self.order, self.seq)
    }

    /// Whether this subscription matches the concrete event type
    /// described by `lineage`.
    pub(crate) fn matches(&self, lineage: &Lineage) -> bool {
        if self.exact {
            lineage.concrete() == self.target
        } else {
            lineage.contains(self.target)
        }
    }

    /// Owner identity check against a type-erased `Arc` data pointer.
    pub(crate) fn is_owned_by(&self, owner: *const ()) -> bool {
        self.owner
            .as_ref()
            .is_some_and(|held| Arc::as_ptr(held) as *const () == owner)
    }
}

impl PartialEq for Subscription {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for Subscription {}

impl PartialOrd for Subscription {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Subscription {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("seq", &self.seq)
            .field("order", &self.order)
            .field("event", &self.target_name)
            .field("handler", &self.handler_name)
            .field("namespace", &self.namespace)
            .field("exact", &self.exact)
            .field("ignore_cancelled", &self.ignore_cancelled)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ping;

    impl Event for Ping {}

    fn subscription(order: PostOrder, seq: u64) -> Subscription {
        Subscription {
            seq,
            owner: None,
            owner_type: TypeId::of::<()>(),
            owner_type_name: "()",
            order,
            ignore_cancelled: false,
            exact: false,
            target: TypeId::of::<Ping>(),
            target_name: "Ping",
            namespace: Namespace::from("test"),
            handler: Arc::new(|_| {}),
            handler_name: "noop",
        }
    }

    #[test]
    fn post_order_is_totally_ordered() {
        assert!(PostOrder::First < PostOrder::Early);
        assert!(PostOrder::Early < PostOrder::Normal);
        assert!(PostOrder::Normal < PostOrder::Late);
        assert!(PostOrder::Late < PostOrder::Last);
        assert_eq!(PostOrder::default(), PostOrder::Normal);
    }

    #[test]
    fn sorts_by_order_then_registration() {
        let mut subs = vec![
            subscription(PostOrder::Last, 0),
            subscription(PostOrder::Normal, 2),
            subscription(PostOrder::Normal, 1),
            subscription(PostOrder::First, 3),
        ];
        subs.sort();

        let keys: Vec<_> = subs.iter().map(Subscription::sort_key).collect();
        assert_eq!(
            keys,
            vec![
                (PostOrder::First, 3),
                (PostOrder::Normal, 1),
                (PostOrder::Normal, 2),
                (PostOrder::Last, 0),
            ]
        );
    }

    #[test]
    fn equality_is_identity() {
        let a = subscription(PostOrder::Normal, 1);
        let b = subscription(PostOrder::Normal, 2);
        assert_ne!(a, b);
        assert_eq!(a, subscription(PostOrder::Last, 1));
    }
}
