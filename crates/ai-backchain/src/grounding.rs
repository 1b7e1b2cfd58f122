//! Binding a rule's variables so that it produces a given forward state.
//!
//! Grounding happens in two passes. Direct copy unifies the matching effect
//! with the forward state and binds what that determines. Selection then binds
//! the rest: cheap conditions are joined against recorded facts, anything still
//! open is enumerated from the value domain of its type, and the surviving
//! binding sets are filtered and ranked. The best set grounds the rule node,
//! the others are kept for rebinding on backtrack.

use std::collections::{BTreeMap, BTreeSet};

use ai_core::{Value, ValueType};

use crate::evaluator::{EvaluationCache, StateEvaluator};
use crate::error::Result;
use crate::rule::{CostHeuristic, Rule, RuleId};
use crate::state::{Bindings, Comparison, StateTemplate, Term, Variable};

/// Where a grounded rule node's cost heuristics come from.
#[derive(Debug, Clone)]
pub enum CostSource {
    None,
    Own,
    /// Synthesized from the nearest concrete ancestor.
    Borrowed(Vec<CostHeuristic>),
}

/// A concrete rule node's binding state.
#[derive(Debug, Clone)]
pub struct Grounding {
    pub rule: RuleId,
    /// Effect that produces the forward state.
    pub effect: usize,
    pub bindings: Bindings,
    /// Ranked alternatives not yet tried.
    pub remaining: Vec<Bindings>,
    /// Preconditions direct copy left open, easiest first.
    pub ungrounded: Vec<UngroundedState>,
    pub cost_source: CostSource,
}

impl CostSource {
    pub fn heuristics<'a>(&'a self, rule: &'a Rule) -> &'a [CostHeuristic] {
        match self {
            CostSource::None => &[],
            CostSource::Own => rule.cost_heuristics(),
            CostSource::Borrowed(heuristics) => heuristics,
        }
    }
}

impl Grounding {
    pub fn heuristics<'a>(&'a self, rule: &'a Rule) -> &'a [CostHeuristic] {
        self.cost_source.heuristics(rule)
    }

    /// Same rule node, next binding set.
    pub fn rebind(&self, bindings: Bindings, remaining: Vec<Bindings>) -> Grounding {
        Grounding {
            rule: self.rule,
            effect: self.effect,
            bindings,
            remaining,
            ungrounded: self.ungrounded.clone(),
            cost_source: self.cost_source.clone(),
        }
    }
}

/// A precondition that still has unbound owner variables after direct copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UngroundedState {
    pub precondition: usize,
    pub variables: BTreeSet<String>,
    pub needs_inquiry: bool,
    pub numeric: bool,
}

impl UngroundedState {
    /// Needs live inquiry or involves a numeric variable; never pattern-matched.
    pub fn is_hard(&self) -> bool {
        self.needs_inquiry || self.numeric
    }
}

/// Unify the first effect named like `forward` with it.
///
/// Returns the effect index and the bindings it determines, or `None` when a
/// constant owner disagrees with the forward state.
pub fn direct_copy(rule: &Rule, forward: &StateTemplate) -> Option<(usize, Bindings)> {
    let (index, _, effect) = rule.effect_for(forward.name())?;
    if effect.state.owners().len() != forward.owners().len() {
        return None;
    }
    let mut bindings = Bindings::new();
    for (term, concrete) in effect.state.owners().iter().zip(forward.owners()) {
        let Term::Value(value) = concrete else {
            return None;
        };
        unify(term, value, &mut bindings)?;
    }
    if forward.comparison() == Comparison::Equal {
        if let (Term::Var(_), Term::Value(target)) = (&effect.value, forward.target()) {
            unify(&effect.value, target, &mut bindings)?;
        }
    }
    Some((index, bindings))
}

fn unify(term: &Term, value: &Value, bindings: &mut Bindings) -> Option<()> {
    match term {
        Term::Value(constant) => (constant == value).then_some(()),
        Term::Var(var) => match bindings.get(&var.name) {
            Some(bound) => (bound == value).then_some(()),
            None if value.value_type() == var.value_type => {
                bindings.insert(var.name.clone(), value.clone());
                Some(())
            }
            None => None,
        },
    }
}

/// Preconditions with unbound owners, easiest first.
pub fn ungrounded_states(rule: &Rule, bindings: &Bindings) -> Vec<UngroundedState> {
    let mut states: Vec<UngroundedState> = rule
        .preconditions()
        .iter()
        .enumerate()
        .filter_map(|(precondition, state)| {
            let variables: BTreeSet<String> = state
                .owner_variables()
                .into_iter()
                .filter(|var| !bindings.contains_key(&var.name))
                .map(|var| var.name.clone())
                .collect();
            if variables.is_empty() {
                return None;
            }
            let numeric = state.value_type() == ValueType::Number
                || state.owner_variables().iter().any(|var| var.is_numeric())
                || state.target().as_var().is_some_and(Variable::is_numeric);
            Some(UngroundedState {
                precondition,
                variables,
                needs_inquiry: state.requires_inquiry(),
                numeric,
            })
        })
        .collect();
    states.sort_by_key(|s| (s.is_hard(), s.variables.len(), s.precondition));
    states
}

/// Extend `partial` so that the recorded fact `name(owners) = value` satisfies
/// `state`. `None` if the fact is inconsistent with `partial` or the condition.
fn match_fact(
    state: &StateTemplate,
    partial: &Bindings,
    owners: &[Value],
    value: &Value,
) -> Option<Bindings> {
    if owners.len() != state.owners().len() {
        return None;
    }
    let mut bindings = partial.clone();
    for (term, owner) in state.owners().iter().zip(owners) {
        unify(term, owner, &mut bindings)?;
    }
    match state.target() {
        Term::Value(target) => state.comparison().holds(value, target).then_some(())?,
        Term::Var(var) => match bindings.get(&var.name) {
            Some(bound) => state.comparison().holds(value, bound).then_some(())?,
            None if state.comparison() == Comparison::Equal => {
                unify(state.target(), value, &mut bindings)?
            }
            None => {}
        },
    }
    Some(bindings)
}

/// The nearest concrete rule node above the node being grounded.
pub struct AncestorContext<'a> {
    pub rule: &'a Rule,
    /// The ancestor's (ungrounded) precondition the chain descends from.
    pub link: &'a StateTemplate,
    pub grounding: &'a Grounding,
}

/// Cost heuristics for `rule`: its own, or for a recursive rule without any,
/// the ancestor's spread over this rule's preconditions.
pub fn cost_source(rule: &Rule, ancestor: Option<&AncestorContext<'_>>) -> CostSource {
    if !rule.cost_heuristics().is_empty() {
        return CostSource::Own;
    }
    if !rule.is_recursive() {
        return CostSource::None;
    }
    let Some(ancestor) = ancestor else {
        return CostSource::None;
    };
    if ancestor.rule.cost_heuristics().is_empty() {
        return match &ancestor.grounding.cost_source {
            CostSource::Borrowed(heuristics) => CostSource::Borrowed(heuristics.clone()),
            _ => CostSource::None,
        };
    }

    let coefficient = 1.0 / rule.preconditions().len().max(1) as f64;
    let mut borrowed = Vec::new();
    for precondition in rule.preconditions() {
        for heuristic in ancestor.rule.cost_heuristics() {
            let owners = heuristic
                .state
                .owners()
                .iter()
                .map(|owner| rewrite_owner(owner, ancestor, precondition))
                .collect();
            borrowed.push(CostHeuristic {
                state: heuristic.state.with_owners(owners),
                weight: heuristic.weight * coefficient,
            });
        }
    }
    CostSource::Borrowed(borrowed)
}

fn rewrite_owner(owner: &Term, ancestor: &AncestorContext<'_>, precondition: &StateTemplate) -> Term {
    let Term::Var(var) = owner else {
        return owner.clone();
    };
    let position = ancestor
        .link
        .owners()
        .iter()
        .position(|term| term.as_var().is_some_and(|v| v.name == var.name));
    if let Some(term) = position.and_then(|i| precondition.owners().get(i)) {
        return term.clone();
    }
    match ancestor.grounding.bindings.get(&var.name) {
        Some(value) => Term::Value(value.clone()),
        None => owner.clone(),
    }
}

/// Everything the engine needs to ground one rule for one state node.
pub struct GroundingRequest<'a> {
    pub rule_id: RuleId,
    pub rule: &'a Rule,
    pub forward: &'a StateTemplate,
    /// The forward state and every state it feeds up to its goal.
    pub forward_chain: &'a [StateTemplate],
    /// The other frontier states. They must still hold after the rule runs.
    pub protected: &'a [StateTemplate],
    pub ancestor: Option<AncestorContext<'a>>,
    pub attempted: &'a BTreeSet<(RuleId, Bindings)>,
}

#[derive(Debug)]
struct Ranked {
    bindings: Bindings,
    satisfied: usize,
    cost: f64,
}

pub struct Grounder<'e, 'a> {
    evaluator: &'e StateEvaluator<'a>,
    max_candidates: usize,
}

impl<'e, 'a> Grounder<'e, 'a> {
    pub fn new(evaluator: &'e StateEvaluator<'a>, max_candidates: usize) -> Self {
        Self {
            evaluator,
            max_candidates: max_candidates.max(1),
        }
    }

    /// Ground `request.rule` for `request.forward`. `Ok(None)` when no binding
    /// set survives filtering.
    pub fn ground(
        &self,
        request: &GroundingRequest<'_>,
        cache: &mut EvaluationCache,
    ) -> Result<Option<Grounding>> {
        let rule = request.rule;
        let Some((effect_index, base)) = direct_copy(rule, request.forward) else {
            tracing::trace!(rule = rule.name(), state = %request.forward, "direct copy failed");
            return Ok(None);
        };

        let cost_source = cost_source(rule, request.ancestor.as_ref());
        let ungrounded = ungrounded_states(rule, &base);
        let partials = self.join_known_facts(rule, base, &ungrounded, cache);
        let complete = self.enumerate(rule, partials);

        let effect = &rule.effects()[effect_index].1;
        let current = self.evaluator.current_value(request.forward, cache)?;
        let heuristics = cost_source.heuristics(rule);

        let mut seen = BTreeSet::new();
        let mut ranked = Vec::new();
        for bindings in complete {
            if !seen.insert(bindings.clone()) {
                continue;
            }
            if request.attempted.contains(&(request.rule_id, bindings.clone())) {
                continue;
            }
            let produces = match effect.outcome(&bindings, current.as_ref()) {
                Some(outcome) => outcome.satisfies(request.forward),
                None => request.forward.target().is_var(),
            };
            if !produces {
                continue;
            }
            if self.clobbers(rule, &bindings, request.protected, cache)? {
                tracing::trace!(rule = rule.name(), bindings = ?bindings, "effect breaks a frontier state");
                continue;
            }

            let preconditions: Vec<StateTemplate> = rule
                .preconditions()
                .iter()
                .map(|pre| pre.ground(&bindings))
                .collect();
            if preconditions.iter().any(|pre| !pre.is_ground()) {
                continue;
            }
            let cyclic = preconditions.iter().any(|pre| {
                request
                    .forward_chain
                    .iter()
                    .any(|state| state.same_condition(pre))
            });
            if cyclic {
                continue;
            }

            let mut satisfied = 0;
            for pre in &preconditions {
                if self.evaluator.evaluate(pre, cache)?.satisfied {
                    satisfied += 1;
                }
            }
            let cost = self.estimate_cost(rule, heuristics, &bindings, cache)?;
            ranked.push(Ranked {
                bindings,
                satisfied,
                cost,
            });
        }

        ranked.sort_by(|a, b| {
            b.satisfied
                .cmp(&a.satisfied)
                .then_with(|| a.cost.total_cmp(&b.cost))
        });

        let mut ranked = ranked.into_iter().map(|r| r.bindings);
        let Some(bindings) = ranked.next() else {
            tracing::trace!(rule = rule.name(), state = %request.forward, "no binding survives");
            return Ok(None);
        };
        let remaining: Vec<Bindings> = ranked.collect();
        tracing::debug!(
            rule = rule.name(),
            state = %request.forward,
            alternatives = remaining.len(),
            "grounded rule"
        );
        Ok(Some(Grounding {
            rule: request.rule_id,
            effect: effect_index,
            bindings,
            remaining,
            ungrounded,
            cost_source,
        }))
    }

    /// Whether some effect of `rule` leaves one of `protected` unsatisfied.
    /// Effects whose outcome is unknown under `bindings` are ignored.
    fn clobbers(
        &self,
        rule: &Rule,
        bindings: &Bindings,
        protected: &[StateTemplate],
        cache: &mut EvaluationCache,
    ) -> Result<bool> {
        for (_, effect) in rule.effects() {
            let written = effect.state.ground(bindings);
            for state in protected.iter().filter(|state| state.same_fact(&written)) {
                let current = self.evaluator.current_value(state, cache)?;
                if let Some(outcome) = effect.outcome(bindings, current.as_ref()) {
                    if !outcome.satisfies(state) {
                        return Ok(true);
                    }
                }
            }
        }
        Ok(false)
    }

    /// Join the easy ungrounded states against recorded facts. A state no
    /// recorded fact satisfies is skipped and its variables left to enumeration.
    fn join_known_facts(
        &self,
        rule: &Rule,
        base: Bindings,
        ungrounded: &[UngroundedState],
        cache: &EvaluationCache,
    ) -> Vec<Bindings> {
        let mut partials = vec![base];
        for entry in ungrounded.iter().filter(|entry| !entry.is_hard()) {
            let state = &rule.preconditions()[entry.precondition];
            let facts = self.evaluator.known_facts(state.name(), cache);
            let mut joined: Vec<Bindings> = Vec::new();
            'partials: for partial in &partials {
                for (owners, value) in &facts {
                    if joined.len() >= self.max_candidates {
                        break 'partials;
                    }
                    if let Some(bindings) = match_fact(state, partial, owners, value) {
                        if !joined.contains(&bindings) {
                            joined.push(bindings);
                        }
                    }
                }
            }
            if joined.is_empty() {
                tracing::trace!(state = %state, "no recorded fact matches; dropping condition");
                continue;
            }
            partials = joined;
        }
        partials
    }

    /// Complete every partial binding set over the rule's required variables.
    fn enumerate(&self, rule: &Rule, partials: Vec<Bindings>) -> Vec<Bindings> {
        let required = rule.required_variables();
        let mut domains: BTreeMap<ValueType, Vec<Value>> = BTreeMap::new();
        let mut out = Vec::new();
        for partial in partials {
            let missing: Vec<&Variable> = required
                .iter()
                .copied()
                .filter(|var| !partial.contains_key(&var.name))
                .collect();
            for var in &missing {
                domains
                    .entry(var.value_type)
                    .or_insert_with(|| self.evaluator.domain(var.value_type));
            }
            self.product(partial, &missing, &domains, &mut out);
            if out.len() >= self.max_candidates {
                break;
            }
        }
        out
    }

    fn product(
        &self,
        partial: Bindings,
        missing: &[&Variable],
        domains: &BTreeMap<ValueType, Vec<Value>>,
        out: &mut Vec<Bindings>,
    ) {
        if out.len() >= self.max_candidates {
            return;
        }
        let Some((var, rest)) = missing.split_first() else {
            out.push(partial);
            return;
        };
        let Some(domain) = domains.get(&var.value_type) else {
            return;
        };
        for value in domain {
            let mut bindings = partial.clone();
            bindings.insert(var.name.clone(), value.clone());
            self.product(bindings, rest, domains, out);
            if out.len() >= self.max_candidates {
                return;
            }
        }
    }

    fn estimate_cost(
        &self,
        rule: &Rule,
        heuristics: &[CostHeuristic],
        bindings: &Bindings,
        cache: &mut EvaluationCache,
    ) -> Result<f64> {
        let mut cost = rule.base_cost();
        for heuristic in heuristics {
            let state = heuristic.state.ground(bindings);
            if !state.is_ground() {
                continue;
            }
            let value = self.evaluator.current_value(&state, cache)?;
            if let Some(n) = value.as_ref().and_then(Value::as_number) {
                cost += heuristic.weight * n;
            }
        }
        Ok(cost)
    }
}
