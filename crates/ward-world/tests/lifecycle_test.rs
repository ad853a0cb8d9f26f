//! The game loop: external tick triggers, tick-done notifications, and
//! shutdown.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use ward_kv::{KvHandle, MemoryStore};
use ward_world::{World, WorldOptions};

#[test]
fn test_external_tick_channel_drives_the_loop() {
    let store = Arc::new(MemoryStore::new());
    let (tick_tx, tick_rx) = crossbeam_channel::unbounded();
    let (done_tx, done_rx) = crossbeam_channel::unbounded();

    let mut world = World::new(
        Arc::clone(&store) as KvHandle,
        WorldOptions::new("loop")
            .tick_channel(tick_rx)
            .tick_done_channel(done_tx),
    )
    .unwrap();
    world.load_state().unwrap();

    let runner = std::thread::spawn(move || {
        world.start_game().unwrap();
        world
    });

    for expected in 1..=3u64 {
        tick_tx.send(Instant::now()).unwrap();
        let done = done_rx
            .recv_timeout(Duration::from_secs(10))
            .expect("tick should complete");
        assert_eq!(done, expected);
    }

    // Closing the trigger channel ends the loop.
    drop(tick_tx);
    let world = runner.join().unwrap();
    assert!(!world.is_game_running());
    assert_eq!(world.current_tick(), 3);
}

#[test]
fn test_shutdown_stops_the_loop_and_closes_events() {
    let store = Arc::new(MemoryStore::new());
    let (_tick_tx, tick_rx) = crossbeam_channel::unbounded();

    let mut world = World::new(
        Arc::clone(&store) as KvHandle,
        WorldOptions::new("shutdown").tick_channel(tick_rx),
    )
    .unwrap();
    world.load_state().unwrap();

    let rx = world.subscribe_events();

    // Shutdown queued ahead of start drains immediately; calling it
    // twice is fine.
    world.shutdown();
    world.shutdown();
    world.start_game().unwrap();

    assert!(!world.is_game_running());
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_start_game_requires_load() {
    let store = Arc::new(MemoryStore::new());
    let mut world = World::new(
        Arc::clone(&store) as KvHandle,
        WorldOptions::new("not-loaded"),
    )
    .unwrap();
    assert!(world.start_game().is_err());
}
