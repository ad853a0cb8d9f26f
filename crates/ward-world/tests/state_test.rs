//! Persistence of world state across save/load cycles.

mod common;

use common::{test_store, test_world};
use ward_world::{Component, Decode, Encode, StateError, WorldError};

#[derive(Encode, Decode, Default, Debug, Clone, PartialEq)]
struct NumberComponent {
    num: i64,
}

impl Component for NumberComponent {
    const NAME: &'static str = "number";
}

#[derive(Encode, Decode, Default, Debug, Clone, PartialEq)]
struct OtherComponent {
    num: i64,
}

impl Component for OtherComponent {
    const NAME: &'static str = "other-number";
}

#[test]
fn test_components_can_only_be_registered_once() {
    let store = test_store();
    let mut world = test_world(&store, "dup");
    world.register_component::<NumberComponent>().unwrap();
    let err = world.register_component::<NumberComponent>().unwrap_err();
    assert!(matches!(
        err,
        WorldError::ComponentRegistrationMustHappenOnce(_)
    ));
}

#[test]
fn test_registration_is_frozen_after_load() {
    let store = test_store();
    let mut world = test_world(&store, "frozen");
    world.register_component::<NumberComponent>().unwrap();
    world.load_state().unwrap();

    assert!(matches!(
        world.register_component::<OtherComponent>().unwrap_err(),
        WorldError::SchemaFrozen
    ));
    assert!(matches!(
        world
            .register_transaction::<NumberComponent, NumberComponent>("late")
            .unwrap_err(),
        WorldError::SchemaFrozen
    ));
    assert!(matches!(
        world.add_system("late", |_| Ok(())).unwrap_err(),
        WorldError::SchemaFrozen
    ));
}

#[test]
fn test_error_when_saved_components_do_not_match() {
    let store = test_store();

    let mut one = test_world(&store, "mismatch");
    one.register_component::<NumberComponent>().unwrap();
    one.load_state().unwrap();
    one.create_entity::<(NumberComponent,)>().unwrap();
    one.tick().unwrap();

    // Too few components registered.
    let mut two = test_world(&store, "mismatch");
    let err = two.load_state().unwrap_err();
    assert!(matches!(
        err,
        WorldError::State(StateError::ComponentMismatchWithSavedState(_))
    ));

    // Extra components are fine.
    let mut three = test_world(&store, "mismatch");
    three.register_component::<NumberComponent>().unwrap();
    three.register_component::<OtherComponent>().unwrap();
    three.load_state().unwrap();

    // Exactly the right set is fine too.
    let mut four = test_world(&store, "mismatch");
    four.register_component::<NumberComponent>().unwrap();
    four.load_state().unwrap();

    // A different component name at a persisted id is a mismatch.
    let mut five = test_world(&store, "mismatch");
    five.register_component::<OtherComponent>().unwrap();
    let err = five.load_state().unwrap_err();
    assert!(matches!(
        err,
        WorldError::State(StateError::ComponentMismatchWithSavedState(_))
    ));
}

#[test]
fn test_archetype_ids_are_consistent_across_worlds() {
    let store = test_store();

    let mut one = test_world(&store, "arch");
    one.register_component::<NumberComponent>().unwrap();
    one.register_component::<OtherComponent>().unwrap();
    one.load_state().unwrap();

    one.create_entity::<(NumberComponent,)>().unwrap();
    one.create_entity::<(OtherComponent,)>().unwrap();
    one.create_entity::<(NumberComponent, OtherComponent)>()
        .unwrap();
    one.tick().unwrap();

    let number_only = one.search(&one.filter_exact::<(NumberComponent,)>().unwrap());
    let other_only = one.search(&one.filter_exact::<(OtherComponent,)>().unwrap());
    let both = one.search(
        &one.filter_exact::<(NumberComponent, OtherComponent)>()
            .unwrap(),
    );
    assert_eq!(number_only.len(), 1);
    assert_eq!(other_only.len(), 1);
    assert_eq!(both.len(), 1);

    // Registration order must match; lookup order is intentionally
    // shuffled relative to the creation order above.
    let mut two = test_world(&store, "arch");
    two.register_component::<NumberComponent>().unwrap();
    two.register_component::<OtherComponent>().unwrap();
    two.load_state().unwrap();

    assert_eq!(
        two.search(
            &two.filter_exact::<(OtherComponent, NumberComponent)>()
                .unwrap()
        ),
        both
    );
    assert_eq!(
        two.search(&two.filter_exact::<(NumberComponent,)>().unwrap()),
        number_only
    );
    assert_eq!(
        two.search(&two.filter_exact::<(OtherComponent,)>().unwrap()),
        other_only
    );
}

#[test]
fn test_can_reload_state() {
    let store = test_store();

    let mut alpha = test_world(&store, "reload");
    alpha.register_component::<NumberComponent>().unwrap();
    alpha
        .add_system("number-entities", |ctx| {
            let filter = ctx.filter_exact::<(NumberComponent,)>()?;
            let ids: Vec<_> = ctx.search(&filter).collect();
            for id in ids {
                ctx.set(
                    id,
                    NumberComponent {
                        num: id.as_raw() as i64,
                    },
                )?;
            }
            Ok(())
        })
        .unwrap();
    alpha.load_state().unwrap();
    alpha.create_entities::<(NumberComponent,)>(10).unwrap();

    alpha.tick().unwrap();

    let mut beta = test_world(&store, "reload");
    beta.register_component::<NumberComponent>().unwrap();
    beta.load_state().unwrap();

    let filter = beta.filter_exact::<(NumberComponent,)>().unwrap();
    let ids = beta.search(&filter);
    assert_eq!(ids.len(), 10);
    for id in ids {
        assert_eq!(
            beta.get_component::<NumberComponent>(id).unwrap().num,
            id.as_raw() as i64
        );
    }
}

#[test]
fn test_load_state_is_idempotent() {
    let store = test_store();

    let mut world = test_world(&store, "idempotent");
    world.register_component::<NumberComponent>().unwrap();
    world.load_state().unwrap();
    world.create_entity::<(NumberComponent,)>().unwrap();
    world.tick().unwrap();
    world.tick().unwrap();

    let tick_before = world.current_tick();
    let filter = world.filter_exact::<(NumberComponent,)>().unwrap();
    let entities_before = world.search(&filter);

    world.load_state().unwrap();
    assert_eq!(world.current_tick(), tick_before);
    assert_eq!(world.search(&filter), entities_before);

    world.load_state().unwrap();
    assert_eq!(world.current_tick(), tick_before);
    assert_eq!(world.search(&filter), entities_before);
}

#[test]
fn test_destroy_persists_across_reload() {
    let store = test_store();

    let mut one = test_world(&store, "destroy");
    one.register_component::<NumberComponent>().unwrap();
    let destroyed = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
    let flag = std::sync::Arc::clone(&destroyed);
    one.add_system("cull-first", move |ctx| {
        if flag.swap(false, std::sync::atomic::Ordering::SeqCst) {
            let filter = ctx.filter_exact::<(NumberComponent,)>()?;
            let ids: Vec<_> = ctx.search(&filter).collect();
            ctx.destroy(ids[0])?;
        }
        Ok(())
    })
    .unwrap();
    one.load_state().unwrap();
    let ids = one.create_entities::<(NumberComponent,)>(3).unwrap();

    destroyed.store(true, std::sync::atomic::Ordering::SeqCst);
    one.tick().unwrap();

    let mut two = test_world(&store, "destroy");
    two.register_component::<NumberComponent>().unwrap();
    two.load_state().unwrap();

    let filter = two.filter_exact::<(NumberComponent,)>().unwrap();
    let alive = two.search(&filter);
    assert_eq!(alive.len(), 2);
    assert!(!alive.contains(&ids[0]));
    assert!(matches!(
        two.get_component::<NumberComponent>(ids[0]).unwrap_err(),
        WorldError::State(StateError::NoSuchEntity(_))
    ));
}
