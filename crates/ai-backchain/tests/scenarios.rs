use ai_backchain::embodiment::{self, inquiry};
use ai_backchain::{
    Comparison, Evaluation, EvaluationCache, FailureReason, PlanOutcome, Planner, StateEvaluator,
    StateTemplate, Term,
};
use ai_core::{SharedWorld, Value, WorldState};

fn avatar() -> Term {
    Value::entity("avatar").into()
}

fn pos(x: f64) -> Value {
    Value::vector(x, 0.0, 0.0)
}

fn planner() -> Planner {
    Planner::new(embodiment::repository("avatar").expect("embodiment rules"))
}

fn hungry_world() -> SharedWorld {
    SharedWorld::new(
        WorldState::new()
            .with("Energy", vec![Value::entity("avatar")], 0.3)
            .with("exist", vec![Value::entity("apple")], true)
            .with("exist", vec![Value::entity("rock")], true)
            .with("AtLocation", vec![Value::entity("avatar")], pos(0.0))
            .with("AtLocation", vec![Value::entity("apple")], pos(1.0)),
    )
}

fn energy_goal() -> StateTemplate {
    embodiment::energy(avatar(), Comparison::GreaterThan, 0.8)
}

fn evaluate(state: &StateTemplate, world: &WorldState) -> Evaluation {
    let store = WorldState::new();
    StateEvaluator::new(world, &store)
        .evaluate(state, &mut EvaluationCache::new())
        .expect("evaluate")
}

#[test]
fn eating_held_food_restores_energy() {
    let world = hungry_world();
    let store = WorldState::new()
        .with("is_edible", vec![Value::entity("apple")], true)
        .with("holder", vec![Value::entity("apple")], Value::entity("avatar"));

    let outcome = planner()
        .plan(&[energy_goal()], &world, &store)
        .expect("no planner error");
    let plan = outcome.plan().expect("plan found");

    assert_eq!(plan.actions.len(), 1);
    let eat = &plan.actions.steps[0];
    assert_eq!(eat.name, "eat");
    assert_eq!(eat.actor, Some(Value::entity("avatar")));
    assert_eq!(eat.param("target"), Some(&Value::entity("apple")));
    assert_eq!(plan.rules().collect::<Vec<_>>(), vec!["eat"]);
    assert_eq!(plan.stats.depth, 1);

    let mut replay = world.live();
    assert!(!evaluate(&energy_goal(), &replay).satisfied);
    plan.apply_to(&mut replay);
    assert!(evaluate(&energy_goal(), &replay).satisfied);
    assert_eq!(
        replay.get("holder", &[Value::entity("apple")]),
        Some(&Value::entity(embodiment::NO_ENTITY))
    );
}

#[test]
fn path_is_derived_from_adjacent_standable_positions() {
    let world = SharedWorld::new(
        WorldState::new()
            .with("AtLocation", vec![Value::entity("avatar")], pos(0.0))
            .with("is_standable", vec![pos(1.0)], true)
            .with("is_standable", vec![pos(2.0)], true)
            .with("is_adjacent", vec![pos(0.0), pos(1.0)], true)
            .with("is_adjacent", vec![pos(1.0), pos(2.0)], true),
    );
    let store = WorldState::new();
    let goal = embodiment::exist_path(pos(0.0).into(), pos(2.0).into());

    let outcome = planner().plan(&[goal], &world, &store).expect("no planner error");
    let plan = outcome.plan().expect("plan found");

    assert!(plan.actions.is_empty(), "path rules carry no action");
    assert_eq!(
        plan.rules().collect::<Vec<_>>(),
        vec!["access_adjacent", "access_adjacent", "path_transitive"]
    );

    let mut replay = world.live();
    plan.apply_to(&mut replay);
    assert_eq!(
        inquiry::exist_path(&replay, &[pos(0.0), pos(2.0)]),
        Some(Value::Boolean(true))
    );
}

#[test]
fn far_object_is_approached_before_pick_up() {
    let world = SharedWorld::new(
        WorldState::new()
            .with("AtLocation", vec![Value::entity("avatar")], pos(0.0))
            .with("AtLocation", vec![Value::entity("apple")], pos(10.0))
            .with("existPath", vec![Value::entity("avatar"), Value::entity("apple")], true),
    );
    let store = WorldState::new().with("is_pickupable", vec![Value::entity("apple")], true);
    let goal = embodiment::holder(Value::entity("apple").into(), Value::entity("avatar"));

    let outcome = planner().plan(&[goal], &world, &store).expect("no planner error");
    let plan = outcome.plan().expect("plan found");

    let names: Vec<_> = plan.actions.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["move_to", "pick_up"]);
    for action in plan.actions.iter() {
        assert_eq!(action.param("target"), Some(&Value::entity("apple")));
    }

    let mut replay = world.live();
    plan.apply_to(&mut replay);
    let reach = embodiment::distance(
        avatar(),
        Value::entity("apple").into(),
        Comparison::LessThan,
        embodiment::ACCESS_DISTANCE,
    );
    assert!(evaluate(&reach, &replay).satisfied);
    assert_eq!(
        replay.get("holder", &[Value::entity("apple")]),
        Some(&Value::entity("avatar"))
    );
}

#[test]
fn unknown_goal_fails_without_growing_the_graph() {
    let world = hungry_world();
    let goal = StateTemplate::flag("is_famous", vec![avatar()], true);

    let outcome = planner()
        .plan(&[goal], &world, &WorldState::new())
        .expect("no planner error");

    let PlanOutcome::NotFound(failure) = outcome else {
        panic!("expected failure");
    };
    assert_eq!(
        failure.reason,
        FailureReason::Unreachable {
            goal: "is_famous(avatar) == true".to_string()
        }
    );
    assert_eq!(failure.stats.depth, 0);
    assert_eq!(failure.stats.expansions, 0);
}

#[test]
fn inedible_food_exhausts_the_only_rule() {
    let world = hungry_world();
    let store = WorldState::new().with("holder", vec![Value::entity("rock")], Value::entity("avatar"));

    let outcome = planner()
        .plan(&[energy_goal()], &world, &store)
        .expect("no planner error");

    let failure = outcome.failure().expect("no plan");
    assert!(matches!(failure.reason, FailureReason::Unreachable { .. }));
    assert_eq!(failure.stats.expansions, 1);
    assert!(failure.stats.backtracks >= 2);
    assert_eq!(world.outstanding_snapshots(), 0);
}

#[test]
fn satisfied_goals_need_no_actions() {
    let world = SharedWorld::new(WorldState::new().with("Energy", vec![Value::entity("avatar")], 0.95));
    let outcome = planner()
        .plan(&[energy_goal()], &world, &WorldState::new())
        .expect("no planner error");
    let plan = outcome.into_plan().expect("trivially found");
    assert!(plan.actions.is_empty());
    assert!(plan.steps.is_empty());
}

#[test]
fn eating_spares_food_that_another_goal_keeps() {
    let world = hungry_world();
    world.update(|live| live.set("exist", vec![Value::entity("pear")], true));
    let store = WorldState::new()
        .with("is_edible", vec![Value::entity("apple")], true)
        .with("is_edible", vec![Value::entity("pear")], true)
        .with("holder", vec![Value::entity("apple")], Value::entity("avatar"))
        .with("holder", vec![Value::entity("pear")], Value::entity("avatar"));
    let goals = [energy_goal(), embodiment::exist(Value::entity("apple").into(), true)];

    let outcome = planner()
        .plan(&goals, &world, &store)
        .expect("no planner error");
    let plan = outcome.plan().expect("plan found");

    assert_eq!(plan.actions.len(), 1);
    assert_eq!(plan.actions.steps[0].param("target"), Some(&Value::entity("pear")));

    let mut replay = world.live();
    plan.apply_to(&mut replay);
    for goal in &goals {
        assert!(evaluate(goal, &replay).satisfied, "{goal} after replay");
    }
}

#[test]
fn food_another_goal_keeps_cannot_be_eaten() {
    let world = hungry_world();
    let store = WorldState::new()
        .with("is_edible", vec![Value::entity("apple")], true)
        .with("holder", vec![Value::entity("apple")], Value::entity("avatar"));
    let goals = [energy_goal(), embodiment::exist(Value::entity("apple").into(), true)];

    let outcome = planner()
        .plan(&goals, &world, &store)
        .expect("no planner error");

    let failure = outcome.failure().expect("eating the apple breaks a goal");
    assert!(matches!(failure.reason, FailureReason::Unreachable { .. }));
    assert_eq!(failure.stats.expansions, 0);
}
