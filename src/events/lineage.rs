//! # Type-lineage resolver.
//!
//! For a concrete event type `E`, the lineage is the ordered chain of
//! types reached by following [`Event::parent`] links from an `E` value:
//! `E` itself first, then its base, then the base's base. One [`Lineage`]
//! is memoized per concrete type; the cache only ever grows.
//!
//! The lineage is consulted twice:
//! - at the first dispatch of a concrete type, to materialize its
//!   dispatcher,
//! - at registration, to decide which already-seen concrete types a
//!   subscription matches.

use std::any::{Any, TypeId};
use std::sync::Arc;

use dashmap::DashMap;

use super::Event;

/// Memoized ancestry of one concrete event type.
#[derive(Debug)]
pub(crate) struct Lineage {
    /// Concrete type first, then one entry per `parent()` hop.
    chain: Box<[TypeId]>,
    /// Type name of the concrete type, for diagnostics.
    pub name: &'static str,
}

impl Lineage {
    /// The concrete event type this lineage belongs to.
    pub fn concrete(&self) -> TypeId {
        self.chain[0]
    }

    /// Number of `parent()` hops from the concrete event to `target`.
    pub fn hops_to(&self, target: TypeId) -> Option<usize> {
        self.chain.iter().position(|entry| *entry == target)
    }

    pub fn contains(&self, target: TypeId) -> bool {
        self.chain.contains(&target)
    }
}

/// Concurrent, monotonically growing lineage cache.
#[derive(Debug, Default)]
pub(crate) struct TypeCache {
    types: DashMap<TypeId, Arc<Lineage>>,
}

impl TypeCache {
    /// Whether the concrete type has been resolved before.
    pub fn contains(&self, type_id: TypeId) -> bool {
        self.types.contains_key(&type_id)
    }

    pub fn get(&self, type_id: TypeId) -> Option<Arc<Lineage>> {
        self.types.get(&type_id).map(|entry| Arc::clone(&entry))
    }

    /// Every lineage resolved so far.
    pub fn resolved(&self) -> Vec<Arc<Lineage>> {
        self.types.iter().map(|entry| Arc::clone(&entry)).collect()
    }

    /// Resolves and memoizes the lineage of the concrete type of `event`.
    pub fn resolve<E: Event>(&self, event: &E) -> Arc<Lineage> {
        if let Some(lineage) = self.get(TypeId::of::<E>()) {
            return lineage;
        }

        let mut chain = vec![TypeId::of::<E>()];
        let mut node: Option<&dyn Event> = event.parent();

        while let Some(base) = node {
            chain.push((base as &dyn Any).type_id());
            node = base.parent();
        }

        let lineage = Arc::new(Lineage {
            chain: chain.into_boxed_slice(),
            name: std::any::type_name::<E>(),
        });

        // Concurrent resolvers of the same type agree; first insert wins.
        Arc::clone(&self.types.entry(TypeId::of::<E>()).or_insert(lineage))
    }
}
