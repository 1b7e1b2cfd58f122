//! Rules for an embodied agent: eating for energy, picking things up, moving,
//! building blocks and reasoning about paths.
//!
//! All rules are specific to one agent, given by entity id. Live states are
//! answered by the [`inquiry`] functions from the planning snapshot; `is_edible`,
//! `is_pickupable`, `holder` and `EnergyGoal` are plain recorded facts.

use ai_core::{Value, ValueType};

use crate::error::Result;
use crate::repository::RuleRepository;
use crate::rule::{ActionTemplate, Effect, Mutation, Rule};
use crate::state::{Comparison, StateTemplate, Term, Variable};

/// Max distance at which the agent can reach something.
pub const ACCESS_DISTANCE: f64 = 2.0;
/// Distance the agent ends up at after moving to something.
pub const CLOSED_DISTANCE: f64 = 1.0;
/// Holder of something nobody holds.
pub const NO_ENTITY: &str = "none";

/// Snapshot queries backing the live states.
pub mod inquiry {
    use ai_core::{Value, Vec3, WorldState};

    pub fn energy(world: &WorldState, owners: &[Value]) -> Option<Value> {
        world.get("Energy", owners).cloned()
    }

    /// Things are absent unless recorded otherwise.
    pub fn exist(world: &WorldState, owners: &[Value]) -> Option<Value> {
        flag(world, "exist", owners)
    }

    /// Vectors are their own position; entities are where `AtLocation` puts them.
    pub fn position(world: &WorldState, of: &Value) -> Option<Vec3> {
        match of {
            Value::Vector(point) => Some(*point),
            Value::Entity(_) => world
                .get("AtLocation", std::slice::from_ref(of))
                .and_then(Value::as_vector)
                .copied(),
            _ => None,
        }
    }

    /// A recorded `Distance` fact wins (replayed moves write one); otherwise
    /// computed from positions, infinite when either is unknown.
    pub fn distance(world: &WorldState, owners: &[Value]) -> Option<Value> {
        if let Some(recorded) = world.get("Distance", owners) {
            return Some(recorded.clone());
        }
        let [a, b] = owners else {
            return None;
        };
        let distance = match (position(world, a), position(world, b)) {
            (Some(a), Some(b)) => a.distance(&b),
            _ => f64::INFINITY,
        };
        Some(Value::Number(distance))
    }

    pub fn at_location(world: &WorldState, owners: &[Value]) -> Option<Value> {
        let [who] = owners else {
            return None;
        };
        position(world, who).map(Value::Vector)
    }

    pub fn exist_path(world: &WorldState, owners: &[Value]) -> Option<Value> {
        flag(world, "existPath", owners)
    }

    pub fn is_solid(world: &WorldState, owners: &[Value]) -> Option<Value> {
        flag(world, "is_solid", owners)
    }

    pub fn is_standable(world: &WorldState, owners: &[Value]) -> Option<Value> {
        flag(world, "is_standable", owners)
    }

    /// Adjacency is symmetric.
    pub fn is_adjacent(world: &WorldState, owners: &[Value]) -> Option<Value> {
        let [a, b] = owners else {
            return None;
        };
        let forward = world.get("is_adjacent", owners).and_then(Value::as_bool);
        let backward = world
            .get("is_adjacent", &[b.clone(), a.clone()])
            .and_then(Value::as_bool);
        Some(Value::Boolean(forward.or(backward).unwrap_or(false)))
    }

    pub fn is_below(world: &WorldState, owners: &[Value]) -> Option<Value> {
        flag(world, "is_below", owners)
    }

    pub fn is_touching(world: &WorldState, owners: &[Value]) -> Option<Value> {
        flag(world, "is_touching", owners)
    }

    fn flag(world: &WorldState, name: &str, owners: &[Value]) -> Option<Value> {
        let value = world.get(name, owners).and_then(Value::as_bool);
        Some(Value::Boolean(value.unwrap_or(false)))
    }
}

pub fn energy(owner: Term, comparison: Comparison, target: impl Into<Term>) -> StateTemplate {
    StateTemplate::new("Energy", ValueType::Number, comparison, target, vec![owner])
        .with_inquiry(inquiry::energy)
}

pub fn energy_goal(owner: Term) -> StateTemplate {
    StateTemplate::flag("EnergyGoal", vec![owner], true)
}

pub fn exist(thing: Term, value: bool) -> StateTemplate {
    StateTemplate::flag("exist", vec![thing], value).with_inquiry(inquiry::exist)
}

pub fn holder(thing: Term, holder: impl Into<Term>) -> StateTemplate {
    StateTemplate::new("holder", ValueType::Entity, Comparison::Equal, holder, vec![thing])
}

pub fn is_edible(thing: Term) -> StateTemplate {
    StateTemplate::flag("is_edible", vec![thing], true)
}

pub fn is_pickupable(thing: Term) -> StateTemplate {
    StateTemplate::flag("is_pickupable", vec![thing], true)
}

pub fn distance(
    from: Term,
    to: Term,
    comparison: Comparison,
    target: impl Into<Term>,
) -> StateTemplate {
    StateTemplate::new("Distance", ValueType::Number, comparison, target, vec![from, to])
        .with_inquiry(inquiry::distance)
}

pub fn at_location(who: Term, comparison: Comparison, target: impl Into<Term>) -> StateTemplate {
    StateTemplate::new("AtLocation", ValueType::Vector, comparison, target, vec![who])
        .with_inquiry(inquiry::at_location)
}

pub fn exist_path(from: Term, to: Term) -> StateTemplate {
    StateTemplate::flag("existPath", vec![from, to], true).with_inquiry(inquiry::exist_path)
}

pub fn is_solid(pos: Term, value: bool) -> StateTemplate {
    StateTemplate::flag("is_solid", vec![pos], value).with_inquiry(inquiry::is_solid)
}

pub fn is_standable(pos: Term) -> StateTemplate {
    StateTemplate::flag("is_standable", vec![pos], true).with_inquiry(inquiry::is_standable)
}

pub fn is_adjacent(a: Term, b: Term) -> StateTemplate {
    StateTemplate::flag("is_adjacent", vec![a, b], true).with_inquiry(inquiry::is_adjacent)
}

pub fn is_below(a: Term, b: Term) -> StateTemplate {
    StateTemplate::flag("is_below", vec![a, b], true).with_inquiry(inquiry::is_below)
}

pub fn is_touching(a: Term, b: Term) -> StateTemplate {
    StateTemplate::flag("is_touching", vec![a, b], true).with_inquiry(inquiry::is_touching)
}

fn entity(name: &str) -> Term {
    Term::Var(Variable::entity(name))
}

fn vector(name: &str) -> Term {
    Term::Var(Variable::vector(name))
}

/// The full rule set for `agent`.
pub fn rules(agent: &str) -> Result<Vec<Rule>> {
    let me = Term::Value(Value::entity(agent));
    Ok(vec![
        energy_goal_rule(&me)?,
        eat_rule(&me)?,
        pick_up_rule(&me)?,
        move_to_object_rule(&me)?,
        walk_rule(&me)?,
        build_block_rule(&me)?,
        access_adjacent_rule(&me)?,
        path_transitive_rule(&me)?,
    ])
}

pub fn repository(agent: &str) -> Result<RuleRepository> {
    Ok(RuleRepository::new(rules(agent)?))
}

fn energy_goal_rule(me: &Term) -> Result<Rule> {
    Rule::builder("energy_goal", me.clone())
        .precondition(energy(me.clone(), Comparison::GreaterThan, 0.8))
        .effect(1.0, Effect::assign(energy_goal(me.clone()), true))
        .build()
}

fn eat_rule(me: &Term) -> Result<Rule> {
    let food = entity("food");
    let energy_now = energy(me.clone(), Comparison::Equal, Variable::number("energy"));
    Rule::builder("eat", me.clone())
        .action(ActionTemplate::new("eat").param("target", food.clone()))
        .cost(0.2)
        .precondition(exist(food.clone(), true))
        .precondition(is_edible(food.clone()))
        .precondition(holder(food.clone(), me.clone()))
        .effect(1.0, Effect::new(energy_now, Mutation::Add, 0.55))
        .effect(
            1.0,
            Effect::assign(holder(food.clone(), me.clone()), Value::entity(NO_ENTITY)),
        )
        .effect(1.0, Effect::assign(exist(food, true), false))
        .build()
}

fn pick_up_rule(me: &Term) -> Result<Rule> {
    let food = entity("food");
    Rule::builder("pick_up", me.clone())
        .action(ActionTemplate::new("pick_up").param("target", food.clone()))
        .cost(0.1)
        .precondition(is_pickupable(food.clone()))
        .precondition(distance(me.clone(), food.clone(), Comparison::LessThan, ACCESS_DISTANCE))
        .effect(1.0, Effect::assign(holder(food, entity("holder")), me.clone()))
        .build()
}

fn move_to_object_rule(me: &Term) -> Result<Rule> {
    let obj = entity("obj");
    let near = distance(me.clone(), obj.clone(), Comparison::Equal, Variable::number("dist"));
    let old_position = Variable::vector("old_position");
    Rule::builder("move_to_object", me.clone())
        .action(ActionTemplate::new("move_to").param("target", obj.clone()))
        .cost(0.01)
        .precondition(exist_path(me.clone(), obj))
        .effect(0.9, Effect::new(near.clone(), Mutation::AssignIfLess, CLOSED_DISTANCE))
        .effect(
            0.9,
            Effect::new(
                at_location(me.clone(), Comparison::Equal, old_position.clone()),
                Mutation::AssignIfNotEqual,
                old_position,
            ),
        )
        .cost_heuristic(near, 0.01)
        .build()
}

fn walk_rule(me: &Term) -> Result<Rule> {
    let pos = vector("pos");
    let near = distance(me.clone(), pos.clone(), Comparison::Equal, Variable::number("dist"));
    Rule::builder("walk", me.clone())
        .action(ActionTemplate::new("walk").param("target", pos.clone()))
        .cost(0.01)
        .precondition(exist_path(me.clone(), pos.clone()))
        .effect(0.9, Effect::new(near.clone(), Mutation::AssignIfLess, CLOSED_DISTANCE))
        .effect(
            0.9,
            Effect::assign(
                at_location(me.clone(), Comparison::Equal, Variable::vector("old_position")),
                pos,
            ),
        )
        .cost_heuristic(near, 0.01)
        .build()
}

fn build_block_rule(me: &Term) -> Result<Rule> {
    let pos = vector("pos");
    let pos_on = vector("pos_on");
    Rule::builder("build_block", me.clone())
        .action(
            ActionTemplate::new("build_block")
                .param("position", pos.clone())
                .param("blockType", Value::string("stone")),
        )
        .cost(0.5)
        .precondition(is_solid(pos.clone(), false))
        .precondition(distance(me.clone(), pos.clone(), Comparison::LessThan, ACCESS_DISTANCE))
        .precondition(at_location(me.clone(), Comparison::NotEqual, pos.clone()))
        .precondition(is_below(pos.clone(), pos_on.clone()))
        .precondition(is_touching(pos.clone(), pos_on.clone()))
        .effect(0.8, Effect::assign(is_standable(pos_on), true))
        .effect(1.0, Effect::assign(is_solid(pos, false), true))
        .build()
}

fn access_adjacent_rule(me: &Term) -> Result<Rule> {
    let from = vector("from");
    let to = vector("to");
    Rule::builder("access_adjacent", me.clone())
        .precondition(is_standable(to.clone()))
        .precondition(is_adjacent(to.clone(), from.clone()))
        .effect(0.7, Effect::assign(exist_path(from, to), true))
        .build()
}

fn path_transitive_rule(me: &Term) -> Result<Rule> {
    let (p1, p2, p3) = (vector("pos1"), vector("pos2"), vector("pos3"));
    Rule::builder("path_transitive", me.clone())
        .precondition(exist_path(p1.clone(), p2.clone()))
        .precondition(exist_path(p2, p3.clone()))
        .effect(1.0, Effect::assign(exist_path(p1, p3), true))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ai_core::WorldState;

    #[test]
    fn rule_set_builds_and_indexes_producers() {
        let repo = repository("avatar").expect("rules are valid");
        assert_eq!(repo.len(), 8);

        let producers: Vec<_> = repo
            .candidates_for("existPath")
            .iter()
            .map(|c| repo.rule(c.rule).name())
            .collect();
        assert_eq!(producers, vec!["path_transitive", "access_adjacent"]);

        let (_, transitive) = repo.find("path_transitive").expect("present");
        assert!(transitive.is_recursive());
        let (_, walk) = repo.find("walk").expect("present");
        assert!(!walk.is_recursive());
        assert_eq!(walk.cost_heuristics().len(), 1);
    }

    #[test]
    fn distance_uses_recorded_locations() {
        let world = WorldState::new()
            .with("AtLocation", vec![Value::entity("avatar")], Value::vector(0.0, 0.0, 0.0))
            .with("AtLocation", vec![Value::entity("apple")], Value::vector(3.0, 4.0, 0.0));

        let d = inquiry::distance(&world, &[Value::entity("avatar"), Value::entity("apple")]);
        assert_eq!(d, Some(Value::Number(5.0)));

        let d = inquiry::distance(&world, &[Value::entity("avatar"), Value::vector(0.0, 2.0, 0.0)]);
        assert_eq!(d, Some(Value::Number(2.0)));

        let d = inquiry::distance(&world, &[Value::entity("avatar"), Value::entity("ghost")]);
        assert_eq!(d, Some(Value::Number(f64::INFINITY)));

        let moved = world.with(
            "Distance",
            vec![Value::entity("avatar"), Value::entity("apple")],
            CLOSED_DISTANCE,
        );
        let d = inquiry::distance(&moved, &[Value::entity("avatar"), Value::entity("apple")]);
        assert_eq!(d, Some(Value::Number(CLOSED_DISTANCE)));
    }

    #[test]
    fn adjacency_is_symmetric_and_defaults_to_false() {
        let a = Value::vector(0.0, 0.0, 0.0);
        let b = Value::vector(1.0, 0.0, 0.0);
        let world = WorldState::new().with("is_adjacent", vec![a.clone(), b.clone()], true);
        assert_eq!(
            inquiry::is_adjacent(&world, &[b.clone(), a.clone()]),
            Some(Value::Boolean(true))
        );
        assert_eq!(
            inquiry::is_adjacent(&world, &[b, Value::vector(5.0, 0.0, 0.0)]),
            Some(Value::Boolean(false))
        );
        assert_eq!(inquiry::exist(&world, &[a]), Some(Value::Boolean(false)));
    }
}
