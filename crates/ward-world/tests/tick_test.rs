//! Tick execution, rollback, and crash-recovery semantics.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::{test_store, test_world};
use ward_world::{Component, Decode, Encode, WorldError};

#[derive(Encode, Decode, Default, Debug, Clone, PartialEq)]
struct Energy {
    value: i64,
}

impl Component for Energy {
    const NAME: &'static str = "energy";
}

#[derive(Encode, Decode, Default, Debug, Clone, PartialEq)]
struct Power {
    power: i64,
}

impl Component for Power {
    const NAME: &'static str = "power";
}

#[derive(Encode, Decode, Default, Debug, Clone, PartialEq)]
struct Scalar {
    val: i64,
}

impl Component for Scalar {
    const NAME: &'static str = "scalar";
}

#[derive(Encode, Decode, Default, Debug, Clone, PartialEq)]
struct Toggle {
    val: i64,
}

impl Component for Toggle {
    const NAME: &'static str = "toggle";
}

#[derive(Encode, Decode, Default, Debug, Clone, PartialEq)]
struct FloatValue {
    val: f64,
}

impl Component for FloatValue {
    const NAME: &'static str = "float-value";
}

#[test]
fn test_tick_happy_path() {
    let store = test_store();

    let mut one = test_world(&store, "tick");
    one.register_component::<Energy>().unwrap();
    one.load_state().unwrap();

    for _ in 0..10 {
        one.tick().unwrap();
    }
    assert_eq!(one.current_tick(), 10);

    // A second world over the same backend resumes at the same tick.
    let mut two = test_world(&store, "tick");
    two.register_component::<Energy>().unwrap();
    two.load_state().unwrap();
    assert_eq!(two.current_tick(), 10);
}

#[test]
fn test_init_hook_seeds_entities_in_first_tick() {
    let store = test_store();
    let mut world = test_world(&store, "init");
    world.register_component::<Energy>().unwrap();

    world.init(|ctx| {
        ctx.create_many::<(Energy,)>(10).unwrap();
    });

    let counted = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&counted);
    world
        .add_system("count-energy", move |ctx| {
            let filter = ctx.filter_exact::<(Energy,)>()?;
            seen.store(ctx.search(&filter).count(), Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

    world.load_state().unwrap();
    world.tick().unwrap();

    assert_eq!(world.current_tick(), 1);
    assert_eq!(counted.load(Ordering::SeqCst), 10);
}

#[test]
fn test_tick_requires_load_state() {
    let store = test_store();
    let mut world = test_world(&store, "unloaded");
    let err = world.tick().unwrap_err();
    assert!(matches!(err, WorldError::RecoveryRequired));
}

#[test]
fn test_can_identify_and_fix_system_error() {
    let store = test_store();

    // The buggy world: its system cannot handle a power of 3.
    let mut one = test_world(&store, "power");
    one.register_component::<Power>().unwrap();
    one.add_system("gain-power", |ctx| {
        let filter = ctx.filter_exact::<(Power,)>()?;
        let ids: Vec<_> = ctx.search(&filter).collect();
        for id in ids {
            let mut p: Power = ctx.get(id)?;
            p.power += 1;
            if p.power >= 3 {
                anyhow::bail!("3 power? That's too much, man!");
            }
            ctx.set(id, p)?;
        }
        Ok(())
    })
    .unwrap();
    one.load_state().unwrap();
    let id = one.create_entity::<(Power,)>().unwrap();

    // Power reaches 1, then 2, then the third tick blows up.
    one.tick().unwrap();
    one.tick().unwrap();
    let err = one.tick().unwrap_err();
    assert!(matches!(err, WorldError::System { .. }));

    // The failed tick had no effect.
    assert_eq!(one.current_tick(), 2);
    assert_eq!(one.get_component::<Power>(id).unwrap().power, 2);

    // A fixed binary over the same backend finishes the failed tick
    // during load_state.
    let mut two = test_world(&store, "power");
    two.register_component::<Power>().unwrap();
    two.add_system("gain-power", |ctx| {
        let filter = ctx.filter_exact::<(Power,)>()?;
        let ids: Vec<_> = ctx.search(&filter).collect();
        for id in ids {
            let mut p: Power = ctx.get(id)?;
            p.power += 1;
            ctx.set(id, p)?;
        }
        Ok(())
    })
    .unwrap();
    two.load_state().unwrap();

    assert_eq!(two.current_tick(), 3);
    assert_eq!(two.get_component::<Power>(id).unwrap().power, 3);

    // One more for good measure.
    two.tick().unwrap();
    assert_eq!(two.get_component::<Power>(id).unwrap().power, 4);
}

#[test]
fn test_recover_transactions_from_failed_system_run() {
    let store = test_store();

    let build = |buggy: bool| {
        let mut world = test_world(&store, "tx-recovery");
        world.register_component::<FloatValue>().unwrap();
        let power_tx = world
            .register_transaction::<FloatValue, FloatValue>("change-power")
            .unwrap();
        world
            .add_system("apply-power-changes", move |ctx| {
                let filter = ctx.filter_exact::<(FloatValue,)>()?;
                let ids: Vec<_> = ctx.search(&filter).collect();
                let changes = ctx.transactions(&power_tx)?;
                assert_eq!(changes.len(), 1);
                for id in ids {
                    let mut power: FloatValue = ctx.get(id)?;
                    power.val += changes[0].1.val;
                    ctx.set(id, power)?;
                    if buggy && changes[0].1.val == 666.0 {
                        anyhow::bail!("bad power change transaction");
                    }
                }
                Ok(())
            })
            .unwrap();
        (world, power_tx)
    };

    {
        let (mut world, power_tx) = build(true);
        world.load_state().unwrap();
        let id = world.create_entity::<(FloatValue,)>().unwrap();

        for _ in 0..3 {
            world.enqueue(&power_tx, FloatValue { val: 1000.0 }).unwrap();
            world.tick().unwrap();
        }
        assert_eq!(world.get_component::<FloatValue>(id).unwrap().val, 3000.0);

        // The buggy system cannot handle a change of 666.
        world.enqueue(&power_tx, FloatValue { val: 666.0 }).unwrap();
        let err = world.tick().unwrap_err();
        assert!(matches!(err, WorldError::System { .. }));
        assert_eq!(world.get_component::<FloatValue>(id).unwrap().val, 3000.0);
    }

    {
        // The fixed world replays the 666 change during load_state.
        let (mut world, power_tx) = build(false);
        world.load_state().unwrap();

        let filter = world.filter_exact::<(FloatValue,)>().unwrap();
        let id = world.search(&filter)[0];
        assert_eq!(world.get_component::<FloatValue>(id).unwrap().val, 3666.0);

        world.enqueue(&power_tx, FloatValue { val: 1000.0 }).unwrap();
        world.tick().unwrap();
        assert_eq!(world.get_component::<FloatValue>(id).unwrap().val, 4666.0);
    }
}

#[test]
fn test_panic_in_system_rolls_back_and_propagates() {
    let store = test_store();
    let mut world = test_world(&store, "panic");
    world.register_component::<Scalar>().unwrap();
    world
        .add_system("explode", |_ctx| {
            panic!("BIG ERROR OH NO");
        })
        .unwrap();
    world.load_state().unwrap();
    let id = world.create_entity::<(Scalar,)>().unwrap();

    let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| world.tick()));
    let panic_value = caught.unwrap_err();
    assert_eq!(
        panic_value.downcast_ref::<&str>().copied(),
        Some("BIG ERROR OH NO")
    );

    // State rolled back; the interrupted tick waits in the journal.
    assert_eq!(world.current_tick(), 0);
    assert_eq!(world.get_component::<Scalar>(id).unwrap(), Scalar::default());
    assert!(matches!(
        world.tick().unwrap_err(),
        WorldError::RecoveryRequired
    ));
}

#[test]
fn test_archetype_change_and_rollback_across_worlds() {
    let store = test_store();
    for first_iteration in [true, false] {
        let mut world = test_world(&store, "arch-recovery");
        world.register_component::<Scalar>().unwrap();
        world.register_component::<Toggle>().unwrap();
        world
            .add_system("toggle", move |ctx| {
                let filter = ctx.filter_contains::<(Scalar,)>()?;
                let ids: Vec<_> = ctx.search(&filter).collect();
                let id = ids[0];

                let mut s: Scalar = ctx.get(id)?;
                s.val += 1;
                ctx.set(id, s.clone())?;
                if s.val % 2 == 1 {
                    ctx.add_component::<Toggle>(id)?;
                } else {
                    ctx.remove_component::<Toggle>(id)?;
                }

                if first_iteration && s.val == 5 {
                    anyhow::bail!("problem with toggle component");
                }
                Ok(())
            })
            .unwrap();
        world.load_state().unwrap();

        if first_iteration {
            let id = world.create_entity::<(Scalar,)>().unwrap();

            for _ in 0..4 {
                world.tick().unwrap();
            }
            // After four ticks the toggle was just removed.
            assert!(matches!(
                world.get_component::<Toggle>(id),
                Err(WorldError::State(
                    ward_world::StateError::ComponentNotOnEntity { .. }
                ))
            ));
            assert_eq!(world.get_component::<Scalar>(id).unwrap().val, 4);

            // The fifth tick fails and must not leave partial moves.
            assert!(world.tick().is_err());
            assert_eq!(world.get_component::<Scalar>(id).unwrap().val, 4);
        } else {
            // The bug is gone; load_state finished the fifth tick.
            let filter = world.filter_contains::<(Scalar,)>().unwrap();
            let id = world.search(&filter)[0];
            assert_eq!(world.get_component::<Scalar>(id).unwrap().val, 5);
            world.get_component::<Toggle>(id).unwrap();
        }
    }
}

#[test]
fn test_add_then_remove_within_one_tick_preserves_archetype() {
    let store = test_store();
    let mut world = test_world(&store, "bounce");
    world.register_component::<Scalar>().unwrap();
    world.register_component::<Toggle>().unwrap();
    world
        .add_system("bounce", |ctx| {
            let filter = ctx.filter_contains::<(Scalar,)>()?;
            let ids: Vec<_> = ctx.search(&filter).collect();
            for id in ids {
                ctx.add_component::<Toggle>(id)?;
                ctx.remove_component::<Toggle>(id)?;
            }
            Ok(())
        })
        .unwrap();
    world.load_state().unwrap();

    let id = world.create_entity::<(Scalar,)>().unwrap();
    let filter = world.filter_exact::<(Scalar,)>().unwrap();
    let before = world.search(&filter);

    world.tick().unwrap();

    // Same archetype, same value as before the tick.
    assert_eq!(world.search(&filter), before);
    assert_eq!(world.get_component::<Scalar>(id).unwrap(), Scalar::default());
}

#[test]
fn test_commit_failure_leaves_journal_for_recovery() {
    let store = test_store();
    let mut world = test_world(&store, "commit-fail");
    world.register_component::<Power>().unwrap();
    world
        .add_system("gain", |ctx| {
            let filter = ctx.filter_exact::<(Power,)>()?;
            let ids: Vec<_> = ctx.search(&filter).collect();
            for id in ids {
                let mut p: Power = ctx.get(id)?;
                p.power += 1;
                ctx.set(id, p)?;
            }
            Ok(())
        })
        .unwrap();
    world.load_state().unwrap();
    let id = world.create_entity::<(Power,)>().unwrap();

    world.tick().unwrap();
    assert_eq!(world.get_component::<Power>(id).unwrap().power, 1);

    // The commit pipeline fails after the systems already succeeded.
    store.fail_next_pipeline();
    let err = world.tick().unwrap_err();
    assert!(matches!(err, WorldError::State(_)));
    assert_eq!(world.current_tick(), 1);
    assert_eq!(world.get_component::<Power>(id).unwrap().power, 1);

    // The tick cannot be re-attempted without recovery.
    assert!(matches!(
        world.tick().unwrap_err(),
        WorldError::RecoveryRequired
    ));

    // Recovery re-executes the identical input and completes the tick.
    world.load_state().unwrap();
    assert_eq!(world.current_tick(), 2);
    assert_eq!(world.get_component::<Power>(id).unwrap().power, 2);
}

#[test]
fn test_cancellation_rolls_back_like_an_error() {
    let store = test_store();
    let mut world = test_world(&store, "cancel");
    world.register_component::<Power>().unwrap();

    let token = ward_world::CancelToken::new();
    let observed = token.clone();
    world
        .add_system("cancel-and-mutate", move |ctx| {
            observed.cancel();
            let filter = ctx.filter_exact::<(Power,)>()?;
            let ids: Vec<_> = ctx.search(&filter).collect();
            for id in ids {
                let mut p: Power = ctx.get(id)?;
                p.power += 100;
                ctx.set(id, p)?;
            }
            Ok(())
        })
        .unwrap();
    world.load_state().unwrap();
    let id = world.create_entity::<(Power,)>().unwrap();

    let err = world.tick_with(&token).unwrap_err();
    assert!(matches!(err, WorldError::TickCancelled));
    assert_eq!(world.current_tick(), 0);

    // The cancelled tick is resumable, exactly like a crash.
    world.load_state().unwrap();
    assert_eq!(world.current_tick(), 1);
    assert_eq!(world.get_component::<Power>(id).unwrap().power, 100);
}
