//! Nonce table behavior.

mod common;

use common::{test_store, test_world};

#[test]
fn test_set_and_get_nonce() {
    let store = test_store();
    let mut world = test_world(&store, "nonce");
    world.load_state().unwrap();

    world.set_nonce("some-address", 100).unwrap();
    assert_eq!(world.get_nonce("some-address").unwrap(), 100);
}

#[test]
fn test_missing_nonce_is_zero() {
    let store = test_store();
    let mut world = test_world(&store, "nonce");
    world.load_state().unwrap();

    assert_eq!(
        world.get_nonce("some-address-that-does-not-exist").unwrap(),
        0
    );
}

#[test]
fn test_can_store_many_nonces() {
    let store = test_store();
    let mut world = test_world(&store, "nonce");
    world.load_state().unwrap();

    for i in 10u64..100 {
        world.set_nonce(&i.to_string(), i).unwrap();
    }
    for i in 10u64..100 {
        assert_eq!(world.get_nonce(&i.to_string()).unwrap(), i);
    }
}

#[test]
fn test_nonces_never_go_backwards() {
    let store = test_store();
    let mut world = test_world(&store, "nonce");
    world.load_state().unwrap();

    world.set_nonce("addr", 100).unwrap();
    world.set_nonce("addr", 50).unwrap();
    assert_eq!(world.get_nonce("addr").unwrap(), 100);
}

#[test]
fn test_nonces_survive_reload() {
    let store = test_store();

    let mut one = test_world(&store, "nonce");
    one.load_state().unwrap();
    one.set_nonce("addr", 7).unwrap();

    let mut two = test_world(&store, "nonce");
    two.load_state().unwrap();
    assert_eq!(two.get_nonce("addr").unwrap(), 7);
}
