//! State evaluation against the planning snapshot and the fact store.

use std::collections::{BTreeSet, HashMap};

use ai_core::{FactKey, FactStore, Value, ValueType, WorldState};

use crate::error::{PlanError, Result};
use crate::state::{StateTemplate, Term};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub satisfied: bool,
    /// In `[0, 1]`; 1 when satisfied.
    pub degree: f64,
}

impl Evaluation {
    const SATISFIED: Evaluation = Evaluation {
        satisfied: true,
        degree: 1.0,
    };
    const UNKNOWN: Evaluation = Evaluation {
        satisfied: false,
        degree: 0.0,
    };
}

/// Per-session memo of state values, keyed by fact identity.
///
/// Absent facts are memoized too, so each fact is resolved at most once per
/// session no matter how often it is evaluated.
#[derive(Debug, Default)]
pub struct EvaluationCache {
    values: HashMap<FactKey, Option<Value>>,
    pub(crate) inquiries: usize,
    pub(crate) store_lookups: usize,
}

impl EvaluationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Inquiry callbacks invoked so far.
    pub fn inquiries(&self) -> usize {
        self.inquiries
    }

    pub fn store_lookups(&self) -> usize {
        self.store_lookups
    }

    /// Known values of facts named `name`, ordered by owners.
    fn known(&self, name: &str) -> Vec<(Vec<Value>, Value)> {
        let mut out: Vec<_> = self
            .values
            .iter()
            .filter(|(key, _)| key.name == name)
            .filter_map(|(key, value)| Some((key.owners.clone(), value.clone()?)))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}

/// Reads states from the session snapshot (inquiries) and the fact store
/// (everything else). Never writes to either.
pub struct StateEvaluator<'a> {
    snapshot: &'a WorldState,
    store: &'a dyn FactStore,
}

impl<'a> StateEvaluator<'a> {
    pub fn new(snapshot: &'a WorldState, store: &'a dyn FactStore) -> Self {
        Self { snapshot, store }
    }

    pub fn snapshot(&self) -> &'a WorldState {
        self.snapshot
    }

    /// Whether `state` currently holds, and to what degree.
    ///
    /// A state whose target is still a variable is trivially satisfied. A fact
    /// with no recorded value is not satisfied.
    pub fn evaluate(&self, state: &StateTemplate, cache: &mut EvaluationCache) -> Result<Evaluation> {
        let Term::Value(target) = state.target() else {
            return Ok(Evaluation::SATISFIED);
        };
        let Some(value) = self.current_value(state, cache)? else {
            return Ok(Evaluation::UNKNOWN);
        };
        let degree = state.comparison().degree(&value, target);
        Ok(Evaluation {
            satisfied: state.comparison().holds(&value, target),
            degree,
        })
    }

    /// The state's current value, consulting the cache first.
    pub fn current_value(
        &self,
        state: &StateTemplate,
        cache: &mut EvaluationCache,
    ) -> Result<Option<Value>> {
        let key = state.key().ok_or_else(|| PlanError::Ungrounded {
            state: state.to_string(),
        })?;
        if let Some(value) = cache.values.get(&key) {
            return Ok(value.clone());
        }

        let value = if state.requires_inquiry() {
            let inquiry = state.inquiry().ok_or_else(|| PlanError::MissingInquiry {
                state: state.to_string(),
            })?;
            cache.inquiries += 1;
            match inquiry(self.snapshot, &key.owners) {
                Some(value) => Some(value),
                None => {
                    tracing::error!(state = %state, "inquiry returned no value");
                    return Err(PlanError::InquiryUndefined {
                        state: state.to_string(),
                    });
                }
            }
        } else {
            cache.store_lookups += 1;
            self.store.last_known_value(&key.name, &key.owners)
        };

        tracing::trace!(state = %state, value = ?value, "resolved state value");
        cache.values.insert(key, value.clone());
        Ok(value)
    }

    /// Recorded facts named `name`: the store's, overridden by anything this
    /// session has already resolved. Ordered by owners.
    pub fn known_facts(&self, name: &str, cache: &EvaluationCache) -> Vec<(Vec<Value>, Value)> {
        let mut facts = self.store.facts(name);
        for (owners, value) in cache.known(name) {
            match facts.iter_mut().find(|(o, _)| *o == owners) {
                Some(existing) => existing.1 = value,
                None => facts.push((owners, value)),
            }
        }
        facts.sort_by(|a, b| a.0.cmp(&b.0));
        facts
    }

    /// Every known value of a type, from the store and the snapshot.
    pub fn domain(&self, value_type: ValueType) -> Vec<Value> {
        let mut values: BTreeSet<Value> = self.store.domain(value_type).into_iter().collect();
        values.extend(self.snapshot.values_of(value_type));
        values.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Comparison, Variable};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn energy() -> StateTemplate {
        StateTemplate::new(
            "Energy",
            ValueType::Number,
            Comparison::GreaterThan,
            0.8,
            vec![Value::entity("avatar").into()],
        )
    }

    #[test]
    fn store_values_are_memoized_including_absence() {
        let snapshot = WorldState::new();
        let store = WorldState::new().with("Energy", vec![Value::entity("avatar")], 0.9);
        let evaluator = StateEvaluator::new(&snapshot, &store);
        let mut cache = EvaluationCache::new();

        let first = evaluator.evaluate(&energy(), &mut cache).expect("evaluate");
        let second = evaluator.evaluate(&energy(), &mut cache).expect("evaluate");
        assert!(first.satisfied);
        assert_eq!(first, second);
        assert_eq!(cache.store_lookups(), 1);

        let absent = StateTemplate::flag("exist", vec![Value::entity("ghost").into()], true);
        assert!(!evaluator.evaluate(&absent, &mut cache).expect("evaluate").satisfied);
        assert!(!evaluator.evaluate(&absent, &mut cache).expect("evaluate").satisfied);
        assert_eq!(cache.store_lookups(), 2);
    }

    #[test]
    fn inquiry_runs_once_per_fact() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let state = energy().with_inquiry(move |world, owners| {
            counter.fetch_add(1, Ordering::SeqCst);
            world.get("Energy", owners).cloned()
        });
        let snapshot = WorldState::new().with("Energy", vec![Value::entity("avatar")], 0.3);
        let store = WorldState::new();
        let evaluator = StateEvaluator::new(&snapshot, &store);
        let mut cache = EvaluationCache::new();

        let eval = evaluator.evaluate(&state, &mut cache).expect("evaluate");
        assert!(!eval.satisfied);
        assert!(eval.degree > 0.0 && eval.degree < 1.0);
        evaluator.evaluate(&state, &mut cache).expect("evaluate");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.inquiries(), 1);
    }

    #[test]
    fn undefined_inquiry_is_fatal() {
        let state = energy().with_inquiry(|_, _| None);
        let snapshot = WorldState::new();
        let store = WorldState::new();
        let evaluator = StateEvaluator::new(&snapshot, &store);
        let err = evaluator
            .evaluate(&state, &mut EvaluationCache::new())
            .unwrap_err();
        assert!(matches!(err, PlanError::InquiryUndefined { .. }));
    }

    #[test]
    fn unbound_target_is_satisfied_and_unbound_owner_is_an_error() {
        let snapshot = WorldState::new();
        let store = WorldState::new();
        let evaluator = StateEvaluator::new(&snapshot, &store);
        let mut cache = EvaluationCache::new();

        let open_target = StateTemplate::new(
            "holder",
            ValueType::Entity,
            Comparison::Equal,
            Variable::entity("who"),
            vec![Value::entity("apple").into()],
        );
        assert!(evaluator.evaluate(&open_target, &mut cache).expect("ok").satisfied);

        let open_owner =
            StateTemplate::flag("exist", vec![Term::Var(Variable::entity("food"))], true);
        assert!(matches!(
            evaluator.evaluate(&open_owner, &mut cache),
            Err(PlanError::Ungrounded { .. })
        ));
    }

    #[test]
    fn domain_merges_store_and_snapshot() {
        let snapshot = WorldState::new().with("exist", vec![Value::entity("apple")], true);
        let store = WorldState::new().with("exist", vec![Value::entity("rock")], true);
        let evaluator = StateEvaluator::new(&snapshot, &store);
        let domain = evaluator.domain(ValueType::Entity);
        assert_eq!(domain, vec![Value::entity("apple"), Value::entity("rock")]);
    }
}
