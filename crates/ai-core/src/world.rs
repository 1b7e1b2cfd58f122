use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{Value, ValueType};

/// Identity of a fact: predicate name plus its ordered owners.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FactKey {
    pub name: String,
    pub owners: Vec<Value>,
}

impl FactKey {
    pub fn new(name: impl Into<String>, owners: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            owners,
        }
    }
}

/// A snapshot of world facts.
///
/// Iteration is ordered by `(name, owners)`, so anything derived from a snapshot
/// (pattern matches, value domains) is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WorldState {
    facts: BTreeMap<FactKey, Value>,
}

impl WorldState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, owners: Vec<Value>, value: impl Into<Value>) -> Self {
        self.set(name, owners, value);
        self
    }

    pub fn set(&mut self, name: &str, owners: Vec<Value>, value: impl Into<Value>) {
        self.facts.insert(FactKey::new(name, owners), value.into());
    }

    pub fn get(&self, name: &str, owners: &[Value]) -> Option<&Value> {
        self.facts.get(&FactKey::new(name, owners.to_vec()))
    }

    pub fn remove(&mut self, name: &str, owners: &[Value]) -> Option<Value> {
        self.facts.remove(&FactKey::new(name, owners.to_vec()))
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// All facts recorded under `name`, ordered by owners.
    pub fn facts_named<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = (&'a [Value], &'a Value)> + 'a {
        self.facts
            .range(FactKey::new(name, Vec::new())..)
            .take_while(move |(key, _)| key.name == name)
            .map(|(key, value)| (key.owners.as_slice(), value))
    }

    /// Every distinct value of `value_type` mentioned by any fact, as owner or value.
    pub fn values_of(&self, value_type: ValueType) -> BTreeSet<Value> {
        let mut out = BTreeSet::new();
        for (key, value) in &self.facts {
            for owner in &key.owners {
                if owner.value_type() == value_type {
                    out.insert(owner.clone());
                }
            }
            if value.value_type() == value_type {
                out.insert(value.clone());
            }
        }
        out
    }
}

/// Read access to persisted facts (the knowledge store's latest recorded values).
pub trait FactStore {
    fn last_known_value(&self, name: &str, owners: &[Value]) -> Option<Value>;

    /// Every recorded fact for `name`, as `(owners, value)` pairs.
    fn facts(&self, name: &str) -> Vec<(Vec<Value>, Value)>;

    /// Known values of a type, used to enumerate candidates for unbound variables.
    fn domain(&self, value_type: ValueType) -> Vec<Value>;
}

impl FactStore for WorldState {
    fn last_known_value(&self, name: &str, owners: &[Value]) -> Option<Value> {
        self.get(name, owners).cloned()
    }

    fn facts(&self, name: &str) -> Vec<(Vec<Value>, Value)> {
        self.facts_named(name)
            .map(|(owners, value)| (owners.to_vec(), value.clone()))
            .collect()
    }

    fn domain(&self, value_type: ValueType) -> Vec<Value> {
        self.values_of(value_type).into_iter().collect()
    }
}

/// Source of private world snapshots for hypothetical reasoning.
///
/// Every snapshot obtained from `clone_latest` must be handed back to `release`.
pub trait SnapshotService {
    fn clone_latest(&self) -> WorldState;

    fn release(&self, snapshot: WorldState);
}

/// In-memory live world that hands out snapshot clones and tracks how many are out.
#[derive(Debug, Default)]
pub struct SharedWorld {
    live: RwLock<WorldState>,
    outstanding: AtomicUsize,
}

impl SharedWorld {
    pub fn new(state: WorldState) -> Self {
        Self {
            live: RwLock::new(state),
            outstanding: AtomicUsize::new(0),
        }
    }

    /// A copy of the live state.
    pub fn live(&self) -> WorldState {
        self.live
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn update(&self, f: impl FnOnce(&mut WorldState)) {
        let mut live = self.live.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut live);
    }

    /// Snapshots cloned but not yet released.
    pub fn outstanding_snapshots(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }
}

impl SnapshotService for SharedWorld {
    fn clone_latest(&self) -> WorldState {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        self.live()
    }

    fn release(&self, _snapshot: WorldState) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
    }
}
