//! Rule catalogue indexed by the states rules can produce.

use std::collections::BTreeMap;

use crate::rule::{Rule, RuleId};

/// A rule able to produce some state, with the probability of that effect.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub rule: RuleId,
    pub probability: f64,
}

/// Immutable after construction; share it between planners through an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct RuleRepository {
    rules: Vec<Rule>,
    producers: BTreeMap<String, Vec<Candidate>>,
}

impl RuleRepository {
    pub fn new(rules: impl IntoIterator<Item = Rule>) -> Self {
        let mut repository = Self::default();
        for rule in rules {
            repository.insert(rule);
        }
        repository
    }

    fn insert(&mut self, rule: Rule) -> RuleId {
        let id = RuleId(self.rules.len() as u32);
        let mut seen = Vec::new();
        for (probability, effect) in rule.effects() {
            let name = effect.state.name();
            if seen.contains(&name) {
                continue;
            }
            seen.push(name);

            let list = self.producers.entry(name.to_string()).or_default();
            // Descending probability; equal probabilities keep insertion order.
            let at = list.partition_point(|c| c.probability >= *probability);
            list.insert(
                at,
                Candidate {
                    rule: id,
                    probability: *probability,
                },
            );
        }
        tracing::debug!(rule = rule.name(), id = id.0, "registered rule");
        self.rules.push(rule);
        id
    }

    /// Rules with an effect on `state_name`, highest probability first.
    pub fn candidates_for(&self, state_name: &str) -> &[Candidate] {
        self.producers
            .get(state_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// # Panics
    ///
    /// If `id` was not issued by this repository.
    pub fn rule(&self, id: RuleId) -> &Rule {
        &self.rules[id.index()]
    }

    pub fn get(&self, id: RuleId) -> Option<&Rule> {
        self.rules.get(id.index())
    }

    pub fn find(&self, name: &str) -> Option<(RuleId, &Rule)> {
        self.rules
            .iter()
            .enumerate()
            .find(|(_, rule)| rule.name() == name)
            .map(|(i, rule)| (RuleId(i as u32), rule))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (RuleId, &Rule)> {
        self.rules
            .iter()
            .enumerate()
            .map(|(i, rule)| (RuleId(i as u32), rule))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::Effect;
    use crate::state::{StateTemplate, Term, Variable};

    fn producer(name: &str, probability: f64) -> Rule {
        let state = StateTemplate::flag("lit", vec![Term::Var(Variable::entity("x"))], true);
        Rule::builder(name, Variable::entity("avatar"))
            .effect(probability, Effect::assign(state.clone(), true))
            .effect(0.1, Effect::assign(state, true))
            .build()
            .expect("valid")
    }

    #[test]
    fn candidates_sorted_by_probability_then_insertion() {
        let repo = RuleRepository::new([
            producer("a", 0.5),
            producer("b", 0.9),
            producer("c", 0.5),
        ]);
        let names: Vec<_> = repo
            .candidates_for("lit")
            .iter()
            .map(|c| repo.rule(c.rule).name())
            .collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn duplicate_effects_register_once() {
        let repo = RuleRepository::new([producer("a", 0.5)]);
        assert_eq!(repo.candidates_for("lit").len(), 1);
        assert_eq!(repo.candidates_for("lit")[0].probability, 0.5);
        assert!(repo.candidates_for("unknown").is_empty());
    }

    #[test]
    fn find_returns_matching_id() {
        let repo = RuleRepository::new([producer("a", 0.5), producer("b", 0.5)]);
        let (id, rule) = repo.find("b").expect("present");
        assert_eq!(id, RuleId(1));
        assert_eq!(rule.name(), "b");
        assert!(repo.get(RuleId(7)).is_none());
    }
}
