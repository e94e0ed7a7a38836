//! # Subscription index.
//!
//! Two views over the same set of descriptors: the insertion-ordered list
//! of everything registered, and per-event-type sorted lists dispatchers
//! are built from. Index keys are concrete event types that have been
//! dispatched at least once; a list is created on first match and dropped
//! when it empties. All mutation happens under the bus mutex.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use crate::events::lineage::{Lineage, TypeCache};
use crate::subscribers::subscription::Subscription;

#[derive(Default)]
pub(crate) struct SubscriptionIndex {
    /// Every live descriptor, in registration order.
    subscriptions: Vec<Arc<Subscription>>,
    /// Concrete event type -> matching descriptors, sorted by
    /// `(order, seq)`.
    by_event_type: HashMap<TypeId, Vec<Arc<Subscription>>>,
}

impl SubscriptionIndex {
    /// Registers one descriptor. Returns the concrete event types whose
    /// lists changed.
    pub fn insert(&mut self, sub: Arc<Subscription>, types: &TypeCache) -> Vec<TypeId> {
        self.subscriptions.push(Arc::clone(&sub));

        let mut affected = Vec::new();
        for lineage in types.resolved() {
            if sub.matches(&lineage) {
                let list = self.by_event_type.entry(lineage.concrete()).or_default();
                Self::insert_sorted(list, Arc::clone(&sub));
                affected.push(lineage.concrete());
            }
        }
        affected
    }

    /// Removes one descriptor by identity. Returns the affected types.
    pub fn remove(&mut self, sub: &Subscription) -> Vec<TypeId> {
        self.remove_if(|candidate| candidate == sub)
    }

    /// Removes every descriptor matching `predicate`. Returns the union
    /// of affected types.
    pub fn remove_if(&mut self, predicate: impl Fn(&Subscription) -> bool) -> Vec<TypeId> {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|sub| !predicate(sub));
        if self.subscriptions.len() == before {
            return Vec::new();
        }

        let mut affected = Vec::new();
        self.by_event_type.retain(|key, list| {
            let had = list.len();
            list.retain(|sub| !predicate(sub));
            if list.len() != had {
                affected.push(*key);
            }
            !list.is_empty()
        });
        affected
    }

    /// Builds the list for a newly seen concrete type. Returns how many
    /// descriptors matched; an empty list is not retained.
    pub fn materialize(&mut self, lineage: &Lineage) -> usize {
        if let Some(list) = self.by_event_type.get(&lineage.concrete()) {
            return list.len();
        }

        let mut list: Vec<_> = self
            .subscriptions
            .iter()
            .filter(|sub| sub.matches(lineage))
            .cloned()
            .collect();
        list.sort_by_key(|sub| sub.sort_key());

        let matched = list.len();
        if matched > 0 {
            self.by_event_type.insert(lineage.concrete(), list);
        }
        matched
    }

    pub fn get(&self, key: TypeId) -> Option<&[Arc<Subscription>]> {
        self.by_event_type.get(&key).map(Vec::as_slice)
    }

    pub fn keys(&self) -> Vec<TypeId> {
        self.by_event_type.keys().copied().collect()
    }

    #[cfg(test)]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    fn insert_sorted(list: &mut Vec<Arc<Subscription>>, sub: Arc<Subscription>) {
        let at = list.partition_point(|held| held.sort_key() <= sub.sort_key());
        list.insert(at, sub);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Event;
    use crate::subscribers::subscription::{Namespace, PostOrder};

    struct Ping;

    impl Event for Ping {}

    struct Pong;

    impl Event for Pong {}

    fn subscription(order: PostOrder, seq: u64, target: TypeId, exact: bool) -> Arc<Subscription> {
        Arc::new(Subscription {
            seq,
            owner: None,
            owner_type: TypeId::of::<()>(),
            owner_type_name: "()",
            order,
            ignore_cancelled: false,
            exact,
            target,
            target_name: "target",
            namespace: Namespace::from("test"),
            handler: Arc::new(|_| {}),
            handler_name: "noop",
        })
    }

    fn seen(types: &TypeCache) {
        types.resolve(&Ping);
        types.resolve(&Pong);
    }

    #[test]
    fn insert_lands_in_matching_lists_only() {
        let types = TypeCache::default();
        seen(&types);

        let mut index = SubscriptionIndex::default();
        let affected = index.insert(
            subscription(PostOrder::Normal, 0, TypeId::of::<Ping>(), true),
            &types,
        );

        assert_eq!(affected, vec![TypeId::of::<Ping>()]);
        assert_eq!(index.get(TypeId::of::<Ping>()).unwrap().len(), 1);
        assert!(index.get(TypeId::of::<Pong>()).is_none());
    }

    #[test]
    fn lists_stay_sorted_by_order_then_seq() {
        let types = TypeCache::default();
        seen(&types);

        let mut index = SubscriptionIndex::default();
        let target = TypeId::of::<Ping>();
        index.insert(subscription(PostOrder::Last, 0, target, true), &types);
        index.insert(subscription(PostOrder::Normal, 1, target, true), &types);
        index.insert(subscription(PostOrder::Normal, 2, target, true), &types);
        index.insert(subscription(PostOrder::First, 3, target, true), &types);

        let keys: Vec<_> = index
            .get(target)
            .unwrap()
            .iter()
            .map(|sub| sub.sort_key())
            .collect();
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
    fn emptied_entries_are_dropped() {
        let types = TypeCache::default();
        seen(&types);

        let mut index = SubscriptionIndex::default();
        let sub = subscription(PostOrder::Normal, 0, TypeId::of::<Ping>(), true);
        index.insert(Arc::clone(&sub), &types);

        let affected = index.remove(&sub);
        assert_eq!(affected, vec![TypeId::of::<Ping>()]);
        assert!(index.get(TypeId::of::<Ping>()).is_none());
        assert_eq!(index.subscription_count(), 0);
    }

    #[test]
    fn remove_if_reports_union_of_affected_types() {
        let types = TypeCache::default();
        seen(&types);

        let mut index = SubscriptionIndex::default();
        index.insert(
            subscription(PostOrder::Normal, 0, TypeId::of::<Ping>(), true),
            &types,
        );
        index.insert(
            subscription(PostOrder::Normal, 1, TypeId::of::<Pong>(), true),
            &types,
        );
        index.insert(
            subscription(PostOrder::Normal, 2, TypeId::of::<Ping>(), true),
            &types,
        );

        let mut affected = index.remove_if(|sub| sub.seq != 2);
        affected.sort();
        let mut expected = vec![TypeId::of::<Ping>(), TypeId::of::<Pong>()];
        expected.sort();

        assert_eq!(affected, expected);
        assert_eq!(index.subscription_count(), 1);
        assert_eq!(index.get(TypeId::of::<Ping>()).unwrap().len(), 1);
        assert!(index.get(TypeId::of::<Pong>()).is_none());
    }

    #[test]
    fn materialize_builds_sorted_list_once() {
        // Registrations happen before the type is ever dispatched, so the
        // bus cache is still empty and inserts index nothing.
        let types = TypeCache::default();
        let lineage = TypeCache::default().resolve(&Ping);

        let mut index = SubscriptionIndex::default();
        let target = TypeId::of::<Ping>();

        index.insert(subscription(PostOrder::Last, 0, target, true), &types);
        index.insert(subscription(PostOrder::First, 1, target, true), &types);
        assert!(index.get(target).is_none());
        assert_eq!(index.materialize(&lineage), 2);

        let keys: Vec<_> = index
            .get(target)
            .unwrap()
            .iter()
            .map(|sub| sub.sort_key())
            .collect();
        assert_eq!(keys, vec![(PostOrder::First, 1), (PostOrder::Last, 0)]);

        // Second call is a lookup, not a rebuild.
        assert_eq!(index.materialize(&lineage), 2);
    }

    #[test]
    fn materialize_does_not_retain_empty_lists() {
        let types = TypeCache::default();
        let lineage = types.resolve(&Pong);

        let mut index = SubscriptionIndex::default();
        assert_eq!(index.materialize(&lineage), 0);
        assert!(index.get(TypeId::of::<Pong>()).is_none());
    }
}
