//! Planning results.

use ai_core::{ActionSpec, PlanSpec, Value, WorldState};

use crate::graph::PlanningGraph;
use crate::repository::RuleRepository;
use crate::rule::Mutation;
use crate::state::Bindings;

/// Counters collected over one planning session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchStats {
    /// State evaluations performed by the driver.
    pub evaluations: usize,
    /// Inquiry callbacks invoked (cache misses only).
    pub inquiries: usize,
    pub store_lookups: usize,
    /// Concrete rule nodes created, rebinds included.
    pub expansions: usize,
    pub backtracks: usize,
    pub rebinds: usize,
    /// Deepest rule layer count reached.
    pub max_depth: usize,
    /// Selections refused because the graph was already `max_depth` deep.
    pub depth_refusals: usize,
    /// Rule layers in the final graph.
    pub depth: usize,
}

/// An effect with its owners and operand resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct GroundedEffect {
    pub name: String,
    pub owners: Vec<Value>,
    pub mutation: Mutation,
    /// `None` if the operand stayed unbound.
    pub value: Option<Value>,
}

impl GroundedEffect {
    fn apply(&self, world: &mut WorldState) {
        let Some(value) = &self.value else {
            return;
        };
        let current = world.get(&self.name, &self.owners).cloned();
        match self.mutation {
            Mutation::Assign => world.set(&self.name, self.owners.clone(), value.clone()),
            Mutation::Add => {
                let base = current.as_ref().and_then(Value::as_number).unwrap_or(0.0);
                if let Some(delta) = value.as_number() {
                    world.set(&self.name, self.owners.clone(), base + delta);
                }
            }
            Mutation::AssignIfLess => {
                let keep = matches!(
                    (current.as_ref().and_then(Value::as_number), value.as_number()),
                    (Some(c), Some(v)) if c <= v
                );
                if !keep {
                    world.set(&self.name, self.owners.clone(), value.clone());
                }
            }
            Mutation::AssignIfNotEqual => {
                if current.as_ref() == Some(value) {
                    world.remove(&self.name, &self.owners);
                }
            }
        }
    }
}

/// One applied rule, innermost first.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanStep {
    pub rule: String,
    pub bindings: Bindings,
    /// `None` for derived-fact rules.
    pub action: Option<ActionSpec>,
    pub effects: Vec<GroundedEffect>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    /// Grounded actions in execution order.
    pub actions: PlanSpec<ActionSpec>,
    pub steps: Vec<PlanStep>,
    pub stats: SearchStats,
}

impl Plan {
    /// Replay every step's effects onto `world`, in order.
    ///
    /// Effects write the facts they name. Derived states read those facts only
    /// if their inquiry does; `embodiment::inquiry::distance` prefers a
    /// recorded `Distance` for this reason.
    pub fn apply_to(&self, world: &mut WorldState) {
        for step in &self.steps {
            for effect in &step.effects {
                effect.apply(world);
            }
        }
    }

    pub fn rules(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|step| step.rule.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FailureReason {
    /// Every candidate for this goal was exhausted.
    Unreachable { goal: String },
    /// As `Unreachable`, but some branch was cut at the depth budget, so a
    /// deeper search might still succeed.
    DepthExhausted { goal: String, max_depth: usize },
    BudgetExhausted { expansions: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    pub reason: FailureReason,
    pub stats: SearchStats,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlanOutcome {
    Found(Plan),
    NotFound(Failure),
}

impl PlanOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, PlanOutcome::Found(_))
    }

    pub fn plan(&self) -> Option<&Plan> {
        match self {
            PlanOutcome::Found(plan) => Some(plan),
            PlanOutcome::NotFound(_) => None,
        }
    }

    pub fn into_plan(self) -> Option<Plan> {
        match self {
            PlanOutcome::Found(plan) => Some(plan),
            PlanOutcome::NotFound(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            PlanOutcome::Found(_) => None,
            PlanOutcome::NotFound(failure) => Some(failure),
        }
    }

    pub fn stats(&self) -> &SearchStats {
        match self {
            PlanOutcome::Found(plan) => &plan.stats,
            PlanOutcome::NotFound(failure) => &failure.stats,
        }
    }
}

/// Collect the concrete rule nodes of a finished graph, innermost layer first.
pub(crate) fn extract(graph: &PlanningGraph, repository: &RuleRepository, stats: SearchStats) -> Plan {
    let mut actions = Vec::new();
    let mut steps = Vec::new();
    for id in graph.concrete_rules_backward() {
        let Some(grounding) = graph.rule(id).grounding() else {
            continue;
        };
        let rule = repository.rule(grounding.rule);
        let action = rule.ground_action(&grounding.bindings);
        if let Some(action) = &action {
            actions.push(action.clone());
        }
        let effects = rule
            .effects()
            .iter()
            .filter_map(|(_, effect)| {
                let state = effect.state.ground(&grounding.bindings);
                let key = state.key()?;
                Some(GroundedEffect {
                    name: key.name,
                    owners: key.owners,
                    mutation: effect.mutation,
                    value: effect.value.resolve(&grounding.bindings),
                })
            })
            .collect();
        steps.push(PlanStep {
            rule: rule.name().to_string(),
            bindings: grounding.bindings.clone(),
            action,
            effects,
        });
    }
    Plan {
        actions: PlanSpec::new(actions),
        steps,
        stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn effect(mutation: Mutation, value: f64) -> GroundedEffect {
        GroundedEffect {
            name: "Energy".into(),
            owners: vec![Value::entity("avatar")],
            mutation,
            value: Some(Value::Number(value)),
        }
    }

    fn energy(world: &WorldState) -> Option<f64> {
        world
            .get("Energy", &[Value::entity("avatar")])
            .and_then(Value::as_number)
    }

    #[test]
    fn effects_replay_with_their_mutation() {
        let mut world = WorldState::new().with("Energy", vec![Value::entity("avatar")], 0.3);

        effect(Mutation::Add, 0.55).apply(&mut world);
        assert!((energy(&world).expect("set") - 0.85).abs() < 1e-9);

        effect(Mutation::AssignIfLess, 2.0).apply(&mut world);
        assert!((energy(&world).expect("set") - 0.85).abs() < 1e-9);

        effect(Mutation::AssignIfLess, 0.1).apply(&mut world);
        assert_eq!(energy(&world), Some(0.1));

        effect(Mutation::AssignIfNotEqual, 0.1).apply(&mut world);
        assert_eq!(energy(&world), None);

        effect(Mutation::Assign, 1.0).apply(&mut world);
        assert_eq!(energy(&world), Some(1.0));
    }
}
