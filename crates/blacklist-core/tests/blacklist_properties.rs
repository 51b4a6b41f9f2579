use std::collections::{BTreeMap, BTreeSet};

use blacklist_core::{BlacklistStore, WorldView};
use contracts::{
    BlacklistConfig, EntityId, EntityRef, EventKind, ResourceDef, ResourceHash, Tick,
    TimestampRecord,
};
use proptest::prelude::*;

const ENTITIES: u64 = 4;
const RESOURCES: u64 = 4;
const SHORT_DURATION: u64 = 20;

#[derive(Debug, Clone, Default)]
struct Roster {
    dead: BTreeSet<EntityId>,
}

impl Roster {
    fn entity_ref(id: u64) -> EntityRef {
        EntityRef::new(id, format!("Pawn{id}"))
    }

    fn resource_def(index: u64) -> ResourceDef {
        ResourceDef::from_label(format!("Weapon{index}"))
    }
}

impl WorldView for Roster {
    fn entity(&self, id: EntityId) -> Option<EntityRef> {
        (id.get() < ENTITIES).then(|| Self::entity_ref(id.get()))
    }

    fn resource(&self, hash: ResourceHash) -> Option<ResourceDef> {
        (0..RESOURCES)
            .map(Self::resource_def)
            .find(|resource| resource.hash == hash)
    }

    fn is_destroyed_or_dead(&self, entity: &EntityRef) -> bool {
        self.dead.contains(&entity.id)
    }
}

fn config(duration_ticks: u64) -> BlacklistConfig {
    let mut config = BlacklistConfig::default();
    config.duration_ticks = duration_ticks;
    config
}

/// Fires every tick from the store's clock up to and including `target`.
fn advance(store: &mut BlacklistStore, target: Tick) -> usize {
    let mut expired = 0;
    for tick in store.current_tick() + 1..=target {
        expired += store.advance_to(tick).len();
    }
    expired
}

#[derive(Debug, Clone)]
enum Op {
    Add(u64, u64),
    Remove(u64, u64),
    Advance(u64),
    Kill(u64),
    Cleanup,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..ENTITIES, 0..RESOURCES).prop_map(|(e, r)| Op::Add(e, r)),
        2 => (0..ENTITIES, 0..RESOURCES).prop_map(|(e, r)| Op::Remove(e, r)),
        3 => (1_u64..30).prop_map(Op::Advance),
        1 => (0..ENTITIES).prop_map(Op::Kill),
        1 => Just(Op::Cleanup),
    ]
}

/// Reference model: pair -> expiry tick.
type Model = BTreeMap<(u64, u64), Tick>;

fn apply(store: &mut BlacklistStore, roster: &mut Roster, model: &mut Model, op: &Op) {
    match *op {
        Op::Add(e, r) => {
            store.add(&Roster::resource_def(r), &Roster::entity_ref(e), "prop");
            model.insert((e, r), store.current_tick() + SHORT_DURATION);
        }
        Op::Remove(e, r) => {
            store.remove(&Roster::resource_def(r), &Roster::entity_ref(e));
            model.remove(&(e, r));
        }
        Op::Advance(n) => {
            let target = store.current_tick() + n;
            advance(store, target);
            model.retain(|_, expiry| *expiry > target);
        }
        Op::Kill(e) => {
            roster.dead.insert(EntityId(e));
        }
        Op::Cleanup => {
            store.cleanup(&*roster);
            model.retain(|(e, _), _| !roster.dead.contains(&EntityId(*e)));
        }
    }
}

fn assert_matches_model(store: &BlacklistStore, model: &Model) -> Result<(), TestCaseError> {
    for e in 0..ENTITIES {
        for r in 0..RESOURCES {
            let resource = Roster::resource_def(r);
            let entity = Roster::entity_ref(e);
            prop_assert_eq!(
                store.is_blacklisted(&resource, &entity),
                model.contains_key(&(e, r)),
                "membership diverged for ({}, {})",
                e,
                r
            );
            prop_assert_eq!(
                store.expires_at(entity.id, resource.hash),
                model.get(&(e, r)).copied()
            );
        }
    }
    Ok(())
}

#[test]
fn property_7_single_entry_lifecycle_at_default_duration() {
    let pawn = EntityRef::new(1, "Pawn1");
    let ak47 = ResourceDef::from_label("AK47");
    let mut store = BlacklistStore::new(BlacklistConfig::default());
    store.set_current_tick(100);

    store.add(&ak47, &pawn, "unreachable");
    for tick in 101..=2_599 {
        assert!(store.advance_to(tick).is_empty());
        assert!(store.is_blacklisted(&ak47, &pawn), "still active at {tick}");
    }

    assert_eq!(store.advance_to(2_600).len(), 1);
    assert!(!store.is_blacklisted(&ak47, &pawn));
    assert_eq!(store.tracked_entity_count(), 0);
    assert!(store.blacklisted_for(pawn.id).is_empty());

    assert!(store.advance_to(2_601).is_empty());
    assert!(!store.is_blacklisted(&ak47, &pawn));
}

#[test]
fn property_8_refresh_moves_expiry_to_later_tick() {
    let pawn = EntityRef::new(1, "Pawn1");
    let ak47 = ResourceDef::from_label("AK47");
    let mut store = BlacklistStore::new(BlacklistConfig::default());
    store.set_current_tick(100);
    store.add(&ak47, &pawn, "unreachable");
    store.set_current_tick(200);
    store.add(&ak47, &pawn, "unreachable");

    assert_eq!(
        store
            .scheduler()
            .pending_for(EventKind::BlacklistExpiry, pawn.id.get(), ak47.hash.get()),
        1
    );
    assert_eq!(advance(&mut store, 2_600), 0);
    assert!(store.is_blacklisted(&ak47, &pawn));
    assert_eq!(advance(&mut store, 2_700), 1);
    assert!(!store.is_blacklisted(&ak47, &pawn));
}

#[test]
fn property_4_remove_then_original_expiry_is_silent() {
    let pawn = Roster::entity_ref(0);
    let item = Roster::resource_def(0);
    let mut store = BlacklistStore::new(config(SHORT_DURATION));

    store.add(&item, &pawn, "prop");
    store.remove(&item, &pawn);
    assert_eq!(advance(&mut store, SHORT_DURATION * 2), 0);
    store.check_invariants().expect("invariants hold");
}

#[test]
fn property_5_cleanup_cancels_timers_of_dead_entities() {
    let mut roster = Roster::default();
    let mut store = BlacklistStore::new(config(SHORT_DURATION));
    for e in 0..ENTITIES {
        store.add(&Roster::resource_def(0), &Roster::entity_ref(e), "prop");
    }
    roster.dead.insert(EntityId(2));

    assert_eq!(store.cleanup(&roster), vec![EntityId(2)]);
    assert_eq!(store.scheduler().pending_len(), (ENTITIES - 1) as usize);
    assert_eq!(advance(&mut store, SHORT_DURATION), (ENTITIES - 1) as usize);
    store.check_invariants().expect("invariants hold");
}

proptest! {
    #[test]
    fn property_1_membership_matches_reference_model(
        ops in proptest::collection::vec(op_strategy(), 1..80)
    ) {
        let mut roster = Roster::default();
        let mut model = Model::new();
        let mut store = BlacklistStore::new(config(SHORT_DURATION));

        for op in &ops {
            apply(&mut store, &mut roster, &mut model, op);
            if let Err(violation) = store.check_invariants() {
                return Err(TestCaseError::fail(format!("after {op:?}: {violation}")));
            }
            assert_matches_model(&store, &model)?;
            if matches!(op, Op::Cleanup) {
                for entity_id in store.registry().entity_ids() {
                    prop_assert!(
                        !store.blacklisted_for(entity_id).is_empty(),
                        "entity {} still registered after cleanup",
                        entity_id
                    );
                }
            }
        }
    }

    #[test]
    fn property_3_expiry_transitions_exactly_once(
        start in 0_u64..1_000,
        duration in 1_u64..60,
    ) {
        let pawn = Roster::entity_ref(1);
        let item = Roster::resource_def(1);
        let mut store = BlacklistStore::new(config(duration));
        store.set_current_tick(start);
        store.add(&item, &pawn, "prop");

        let mut transitions = 0;
        let mut was_active = true;
        for tick in start + 1..start + duration * 2 {
            transitions += store.advance_to(tick).len();
            let active = store.is_blacklisted(&item, &pawn);
            prop_assert_eq!(active, tick < start + duration);
            if was_active && !active {
                prop_assert_eq!(tick, start + duration);
            }
            was_active = active;
        }
        prop_assert_eq!(transitions, 1);
    }

    #[test]
    fn property_6_rebuild_reproduces_active_set_and_expiry(
        ops in proptest::collection::vec(op_strategy(), 1..60),
        tail in 1_u64..40,
    ) {
        let mut roster = Roster::default();
        let mut model = Model::new();
        let mut store = BlacklistStore::new(config(SHORT_DURATION));
        for op in &ops {
            apply(&mut store, &mut roster, &mut model, op);
        }

        let saved: Vec<TimestampRecord> = store.export_timestamps();
        let mut reloaded = BlacklistStore::new(config(SHORT_DURATION));
        reloaded.set_current_tick(store.current_tick());
        reloaded.rebuild_from_timestamps(saved, &roster);
        prop_assert!(reloaded.check_invariants().is_ok());

        // Dead-but-not-yet-cleaned entities are dropped on reload.
        store.cleanup(&roster);
        model.retain(|(e, _), _| !roster.dead.contains(&EntityId(*e)));
        assert_matches_model(&reloaded, &model)?;

        let target = store.current_tick() + tail;
        let before = advance(&mut store, target);
        let after = advance(&mut reloaded, target);
        prop_assert_eq!(before, after);
        prop_assert_eq!(store.export_timestamps(), reloaded.export_timestamps());
    }
}
