//! Rule templates: preconditions, probabilistic effects and an optional action.

use std::collections::BTreeMap;
use std::fmt;

use ai_core::{ActionSpec, Value};

use crate::error::{PlanError, Result};
use crate::state::{Bindings, Comparison, StateTemplate, Term, Variable};

/// Index of a rule inside its [`RuleRepository`](crate::RuleRepository).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RuleId(pub u32);

impl RuleId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rule#{}", self.0)
    }
}

/// How an effect changes its state's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mutation {
    Assign,
    /// Assign only when the new value is smaller than the current one.
    AssignIfLess,
    /// Assign only when the current value differs; the result is guaranteed
    /// to differ from the operand.
    AssignIfNotEqual,
    /// Numeric increment; a missing current value counts as 0.
    Add,
}

/// What an effect leaves behind.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Exactly(Value),
    Except(Value),
}

impl Outcome {
    /// Whether a state with this outcome satisfies `state`'s condition.
    pub fn satisfies(&self, state: &StateTemplate) -> bool {
        let Term::Value(target) = state.target() else {
            return true;
        };
        match self {
            Outcome::Exactly(value) => state.accepts(value),
            Outcome::Except(value) => {
                state.comparison() == Comparison::NotEqual && value == target
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Effect {
    pub state: StateTemplate,
    pub mutation: Mutation,
    pub value: Term,
}

impl Effect {
    pub fn new(state: StateTemplate, mutation: Mutation, value: impl Into<Term>) -> Self {
        Self {
            state,
            mutation,
            value: value.into(),
        }
    }

    pub fn assign(state: StateTemplate, value: impl Into<Term>) -> Self {
        Self::new(state, Mutation::Assign, value)
    }

    /// Outcome of applying the effect under `bindings` to a state whose value is
    /// `current`. `None` while the operand is unbound or not numeric for `Add`.
    pub fn outcome(&self, bindings: &Bindings, current: Option<&Value>) -> Option<Outcome> {
        let operand = self.value.resolve(bindings)?;
        let outcome = match self.mutation {
            Mutation::Assign => Outcome::Exactly(operand),
            Mutation::AssignIfLess => {
                match (current.and_then(Value::as_number), operand.as_number()) {
                    (Some(current), Some(new)) if current < new => {
                        Outcome::Exactly(Value::Number(current))
                    }
                    _ => Outcome::Exactly(operand),
                }
            }
            Mutation::AssignIfNotEqual => Outcome::Except(operand),
            Mutation::Add => {
                let delta = operand.as_number()?;
                let base = current.and_then(Value::as_number).unwrap_or(0.0);
                Outcome::Exactly(Value::Number(base + delta))
            }
        };
        Some(outcome)
    }
}

/// The executable part of a rule.
#[derive(Debug, Clone)]
pub struct ActionTemplate {
    pub name: String,
    pub params: Vec<(String, Term)>,
}

impl ActionTemplate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
        }
    }

    pub fn param(mut self, name: impl Into<String>, term: impl Into<Term>) -> Self {
        self.params.push((name.into(), term.into()));
        self
    }

    /// `None` while any parameter is unbound.
    pub fn ground(&self, actor: Option<Value>, bindings: &Bindings) -> Option<ActionSpec> {
        let mut spec = ActionSpec::new(self.name.clone());
        if let Some(actor) = actor {
            spec = spec.with_actor(actor);
        }
        for (name, term) in &self.params {
            spec = spec.with_param(name.clone(), term.resolve(bindings)?);
        }
        Some(spec)
    }
}

/// Extra cost term: `weight * value(state)`, evaluated under a candidate's bindings.
#[derive(Debug, Clone)]
pub struct CostHeuristic {
    pub state: StateTemplate,
    pub weight: f64,
}

/// Where a variable occurs inside a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Slot {
    PreconditionOwner { precondition: usize, position: usize },
    PreconditionTarget { precondition: usize },
    EffectOwner { effect: usize, position: usize },
    EffectTarget { effect: usize },
    EffectValue { effect: usize },
    HeuristicOwner { heuristic: usize, position: usize },
    ActionParam { param: usize },
    Actor,
}

#[derive(Debug, Clone)]
pub struct ParamEntry {
    pub variable: Variable,
    pub slots: Vec<Slot>,
}

/// A rule template. Built through [`Rule::builder`], which validates it.
#[derive(Debug, Clone)]
pub struct Rule {
    name: String,
    action: Option<ActionTemplate>,
    actor: Term,
    base_cost: f64,
    preconditions: Vec<StateTemplate>,
    effects: Vec<(f64, Effect)>,
    cost_heuristics: Vec<CostHeuristic>,
    recursive: bool,
    params: BTreeMap<String, ParamEntry>,
}

impl Rule {
    /// `actor` is the agent performing the rule's action: a variable, or a
    /// concrete entity for rules specific to one agent.
    pub fn builder(name: impl Into<String>, actor: impl Into<Term>) -> RuleBuilder {
        RuleBuilder {
            name: name.into(),
            actor: actor.into(),
            action: None,
            base_cost: 0.0,
            preconditions: Vec::new(),
            effects: Vec::new(),
            cost_heuristics: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn action(&self) -> Option<&ActionTemplate> {
        self.action.as_ref()
    }

    pub fn actor(&self) -> &Term {
        &self.actor
    }

    pub fn base_cost(&self) -> f64 {
        self.base_cost
    }

    pub fn preconditions(&self) -> &[StateTemplate] {
        &self.preconditions
    }

    pub fn effects(&self) -> &[(f64, Effect)] {
        &self.effects
    }

    pub fn cost_heuristics(&self) -> &[CostHeuristic] {
        &self.cost_heuristics
    }

    /// Some precondition names a state one of its own effects produces.
    pub fn is_recursive(&self) -> bool {
        self.recursive
    }

    /// Every variable of the rule and where it occurs.
    pub fn params(&self) -> &BTreeMap<String, ParamEntry> {
        &self.params
    }

    /// First effect producing a state named `name`.
    pub fn effect_for(&self, name: &str) -> Option<(usize, f64, &Effect)> {
        self.effects
            .iter()
            .enumerate()
            .find(|(_, (_, effect))| effect.state.name() == name)
            .map(|(i, (probability, effect))| (i, *probability, effect))
    }

    /// Variables that must be bound before the rule node is complete: precondition
    /// owners, action parameters and (for rules with an action) the actor.
    pub fn required_variables(&self) -> Vec<&Variable> {
        self.params
            .values()
            .filter(|entry| {
                entry.slots.iter().any(|slot| match slot {
                    Slot::PreconditionOwner { .. } | Slot::ActionParam { .. } => true,
                    Slot::Actor => self.action.is_some(),
                    _ => false,
                })
            })
            .map(|entry| &entry.variable)
            .collect()
    }

    pub fn ground_action(&self, bindings: &Bindings) -> Option<ActionSpec> {
        let action = self.action.as_ref()?;
        action.ground(self.actor.resolve(bindings), bindings)
    }
}

pub struct RuleBuilder {
    name: String,
    actor: Term,
    action: Option<ActionTemplate>,
    base_cost: f64,
    preconditions: Vec<StateTemplate>,
    effects: Vec<(f64, Effect)>,
    cost_heuristics: Vec<CostHeuristic>,
}

impl RuleBuilder {
    pub fn action(mut self, action: ActionTemplate) -> Self {
        self.action = Some(action);
        self
    }

    pub fn cost(mut self, cost: f64) -> Self {
        self.base_cost = cost;
        self
    }

    pub fn precondition(mut self, state: StateTemplate) -> Self {
        self.preconditions.push(state);
        self
    }

    pub fn effect(mut self, probability: f64, effect: Effect) -> Self {
        self.effects.push((probability, effect));
        self
    }

    pub fn cost_heuristic(mut self, state: StateTemplate, weight: f64) -> Self {
        self.cost_heuristics.push(CostHeuristic { state, weight });
        self
    }

    pub fn build(self) -> Result<Rule> {
        if self.effects.is_empty() {
            return Err(PlanError::invalid_rule(&self.name, "rule has no effects"));
        }
        if !self.base_cost.is_finite() || self.base_cost < 0.0 {
            return Err(PlanError::invalid_rule(
                &self.name,
                format!("base cost {} is not a finite non-negative number", self.base_cost),
            ));
        }
        for (probability, effect) in &self.effects {
            if !(0.0..=1.0).contains(probability) {
                return Err(PlanError::invalid_rule(
                    &self.name,
                    format!("effect on `{}` has probability {probability}", effect.state.name()),
                ));
            }
            effect.state.validate()?;
        }
        for state in &self.preconditions {
            state.validate()?;
        }
        for heuristic in &self.cost_heuristics {
            heuristic.state.validate()?;
        }

        let recursive = self.preconditions.iter().any(|pre| {
            self.effects
                .iter()
                .any(|(_, effect)| effect.state.name() == pre.name())
        });

        let params = self.index_params()?;

        Ok(Rule {
            name: self.name,
            action: self.action,
            actor: self.actor,
            base_cost: self.base_cost,
            preconditions: self.preconditions,
            effects: self.effects,
            cost_heuristics: self.cost_heuristics,
            recursive,
            params,
        })
    }

    fn index_params(&self) -> Result<BTreeMap<String, ParamEntry>> {
        let mut params: BTreeMap<String, ParamEntry> = BTreeMap::new();
        let mut record = |term: &Term, slot: Slot| -> Result<()> {
            let Term::Var(var) = term else {
                return Ok(());
            };
            let entry = params.entry(var.name.clone()).or_insert_with(|| ParamEntry {
                variable: var.clone(),
                slots: Vec::new(),
            });
            if entry.variable.value_type != var.value_type {
                return Err(PlanError::invalid_rule(
                    &self.name,
                    format!(
                        "variable `{}` used as both {:?} and {:?}",
                        var.name, entry.variable.value_type, var.value_type
                    ),
                ));
            }
            entry.slots.push(slot);
            Ok(())
        };

        record(&self.actor, Slot::Actor)?;
        for (precondition, state) in self.preconditions.iter().enumerate() {
            for (position, owner) in state.owners().iter().enumerate() {
                record(owner, Slot::PreconditionOwner { precondition, position })?;
            }
            record(state.target(), Slot::PreconditionTarget { precondition })?;
        }
        for (effect, (_, e)) in self.effects.iter().enumerate() {
            for (position, owner) in e.state.owners().iter().enumerate() {
                record(owner, Slot::EffectOwner { effect, position })?;
            }
            record(e.state.target(), Slot::EffectTarget { effect })?;
            record(&e.value, Slot::EffectValue { effect })?;
        }
        for (heuristic, h) in self.cost_heuristics.iter().enumerate() {
            for (position, owner) in h.state.owners().iter().enumerate() {
                record(owner, Slot::HeuristicOwner { heuristic, position })?;
            }
        }
        if let Some(action) = &self.action {
            for (param, (_, term)) in action.params.iter().enumerate() {
                record(term, Slot::ActionParam { param })?;
            }
        }
        Ok(params)
    }
}
