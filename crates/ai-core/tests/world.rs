use ai_core::{FactStore, SharedWorld, SnapshotService, Value, ValueType, WorldState};

fn world() -> WorldState {
    WorldState::new()
        .with("is_edible", vec![Value::entity("rock")], false)
        .with("is_edible", vec![Value::entity("apple")], true)
        .with("holder", vec![Value::entity("apple")], Value::entity("avatar"))
        .with("AtLocation", vec![Value::entity("avatar")], Value::vector(1.0, 2.0, 0.0))
}

#[test]
fn facts_named_only_yields_that_predicate_in_owner_order() {
    let w = world();
    let owners: Vec<_> = w
        .facts_named("is_edible")
        .map(|(owners, _)| owners[0].clone())
        .collect();
    assert_eq!(owners, vec![Value::entity("apple"), Value::entity("rock")]);
    assert_eq!(w.facts_named("missing").count(), 0);
}

#[test]
fn fact_store_lookup_and_domain() {
    let w = world();
    assert_eq!(
        w.last_known_value("holder", &[Value::entity("apple")]),
        Some(Value::entity("avatar"))
    );
    assert_eq!(w.last_known_value("holder", &[Value::entity("rock")]), None);

    let entities = w.domain(ValueType::Entity);
    assert_eq!(
        entities,
        vec![
            Value::entity("apple"),
            Value::entity("avatar"),
            Value::entity("rock")
        ]
    );
    assert_eq!(w.domain(ValueType::Vector), vec![Value::vector(1.0, 2.0, 0.0)]);
}

#[test]
fn shared_world_tracks_outstanding_snapshots() {
    let shared = SharedWorld::new(world());

    let mut snapshot = shared.clone_latest();
    assert_eq!(shared.outstanding_snapshots(), 1);

    snapshot.set("is_edible", vec![Value::entity("rock")], true);
    shared.release(snapshot);

    assert_eq!(shared.outstanding_snapshots(), 0);
    assert_eq!(shared.live(), world());
}
