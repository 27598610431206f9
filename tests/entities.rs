use phecs::{Config, Error, World};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[test]
fn create_and_destroy() {
    let mut world = World::new();

    let a = world.create_entity();
    let b = world.create_entity();
    assert!(world.is_alive(a));
    assert!(world.is_alive(b));
    assert_eq!(world.alive_count(), 2);

    world.destroy_entity(a).unwrap();
    assert!(!world.is_alive(a));
    assert!(world.is_alive(b));
    assert_eq!(world.alive_count(), 1);
}

#[test]
fn stale_handles_stay_dead_after_reuse() {
    let mut world = World::new();

    let old = world.create_entity();
    world.destroy_entity(old).unwrap();

    let new = world.create_entity();
    assert_eq!(new.index(), old.index());
    assert_ne!(new, old);
    assert!(world.is_alive(new));
    assert!(!world.is_alive(old));
}

#[test]
fn destroying_twice_is_rejected() {
    let mut world = World::new();
    let entity = world.create_entity();

    world.destroy_entity(entity).unwrap();
    assert!(matches!(
        world.destroy_entity(entity),
        Err(Error::DeadEntity(e)) if e == entity
    ));
}

#[test]
fn alive_matches_history_under_churn() {
    let mut world = World::with_config(Config::new().with_initial_entity_capacity(16)).unwrap();
    let mut rng = StdRng::seed_from_u64(0x5eed);

    let mut live = Vec::new();
    let mut dead = Vec::new();

    for _ in 0..5_000 {
        if live.is_empty() || rng.random_bool(0.6) {
            live.push(world.create_entity());
        } else {
            let victim = live.swap_remove(rng.random_range(0..live.len()));
            world.destroy_entity(victim).unwrap();
            dead.push(victim);
        }
    }

    assert_eq!(world.alive_count(), live.len());
    assert!(live.iter().all(|&e| world.is_alive(e)));
    assert!(dead.iter().all(|&e| !world.is_alive(e)));

    let mut listed: Vec<_> = world.entities().collect();
    listed.sort();
    live.sort();
    assert_eq!(listed, live);
}
