use phecs::{Component, ComponentId, Entity, Filter, World};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;

#[derive(Component, Debug, Clone, PartialEq)]
struct Value(u32);

#[derive(Component, Debug, Clone, PartialEq)]
struct Velocity(f32);

#[derive(Component, Debug, Clone, PartialEq)]
struct Frozen;

fn members(entities: Vec<Entity>) -> HashSet<Entity> {
    entities.into_iter().collect()
}

#[test]
fn membership_follows_adds_and_removes() {
    let mut world = World::new();
    let e0 = world.create_entity();
    let e1 = world.create_entity();
    let e2 = world.create_entity();

    world.add(e1, Value(0)).unwrap();
    world.add(e2, Value(0)).unwrap();

    let value = world.component_id::<Value>();
    let group = world.create_group(&[value], &[]);
    assert_eq!(members(group.entities()), members(vec![e1, e2]));
    assert!(!group.contains(e0));

    world.remove::<Value>(e1).unwrap();
    assert_eq!(members(group.entities()), members(vec![e2]));
}

#[test]
fn filters_share_groups_regardless_of_order() {
    let mut world = World::new();
    let value = world.component_id::<Value>();
    let velocity = world.component_id::<Velocity>();
    let frozen = world.component_id::<Frozen>();

    let a = world.create_group(&[value, velocity], &[frozen]);
    let b = world.create_group(&[velocity, value, velocity], &[frozen]);
    let c = world.filter().with::<Velocity>().without::<Frozen>().with::<Value>().group();
    let d = world.create_group(&[value], &[frozen]);

    assert_eq!(a, b);
    assert_eq!(a, c);
    assert_ne!(a, d);
    assert_eq!(world.group_count(), 2);
}

#[test]
fn excluded_components_evict() {
    let mut world = World::new();
    let group = world.filter().with::<Velocity>().without::<Frozen>().group();

    let entity = world.create_entity();
    world.add(entity, Velocity(1.0)).unwrap();
    assert!(group.contains(entity));

    world.add(entity, Frozen).unwrap();
    assert!(!group.contains(entity));

    world.remove::<Frozen>(entity).unwrap();
    assert!(group.contains(entity));

    world.destroy_entity(entity).unwrap();
    assert!(group.is_empty());
}

#[test]
fn groups_without_requirements_track_all_entities() {
    let mut world = World::new();
    let before = world.create_entity();
    let group = world.filter().without::<Frozen>().group();
    let after = world.create_entity();

    assert_eq!(members(group.entities()), members(vec![before, after]));

    world.add(after, Frozen).unwrap();
    assert_eq!(members(group.entities()), members(vec![before]));
}

#[test]
fn contradictory_filter_matches_nothing() {
    let mut world = World::new();
    let entity = world.create_entity();
    world.add(entity, Value(1)).unwrap();

    let group = world.filter().with::<Value>().without::<Value>().group();
    assert!(group.filter().is_contradictory());
    assert!(group.is_empty());

    let other = world.create_entity();
    world.add(other, Value(2)).unwrap();
    assert!(group.is_empty());
}

#[test]
fn views_expose_member_components() {
    let mut world = World::new();
    let group = world.filter().with::<Value>().without::<Frozen>().group();
    let column = world.column::<Value>().unwrap();

    let entities: Vec<_> = (0..6).map(|_| world.create_entity()).collect();
    for (i, &entity) in entities.iter().enumerate() {
        world.add(entity, Value(i as u32)).unwrap();
    }
    world.add(entities[0], Frozen).unwrap();

    {
        let mut view = group.view_mut(&column);
        for (_, value) in view.iter_mut() {
            value.0 += 100;
        }
        assert!(view.get_mut(entities[0]).is_none());
    }

    let view = group.view(&column);
    let mut seen: Vec<_> = view.iter().map(|(_, value)| value.0).collect();
    seen.sort();
    assert_eq!(seen, vec![101, 102, 103, 104, 105]);
    drop(view);

    assert_eq!(*world.get::<Value>(entities[0]).unwrap(), Value(0));
}

#[test]
fn incremental_membership_matches_brute_force() {
    let mut world = World::new();
    let mut rng = StdRng::seed_from_u64(42);

    let ids: Vec<ComponentId> = vec![
        world.component_id::<Value>(),
        world.component_id::<Velocity>(),
        world.component_id::<Frozen>(),
    ];
    let filters = vec![
        Filter::new().require(ids[0]),
        Filter::new().require(ids[0]).require(ids[1]),
        Filter::new().require(ids[1]).exclude(ids[2]),
        Filter::new().exclude(ids[0]),
        Filter::new().require(ids[2]).exclude(ids[0]).exclude(ids[1]),
    ];

    let mut entities: Vec<Entity> = Vec::new();
    let mut groups = Vec::new();

    for step in 0..3_000 {
        // Compile groups part way through so their initial
        // membership is computed against a populated world.
        if step % 600 == 0 && groups.len() < filters.len() {
            groups.push(world.group(filters[groups.len()].clone()));
        }

        match rng.random_range(0..8) {
            0 => entities.push(world.create_entity()),
            1 if !entities.is_empty() => {
                let victim = entities.swap_remove(rng.random_range(0..entities.len()));
                world.destroy_entity(victim).unwrap();
            }
            _ if !entities.is_empty() => {
                let entity = entities[rng.random_range(0..entities.len())];
                let add = rng.random_bool(0.5);
                match (rng.random_range(0..3), add) {
                    (0, true) => world.add(entity, Value(step)).unwrap(),
                    (0, false) => drop(world.remove::<Value>(entity).unwrap()),
                    (1, true) => world.add(entity, Velocity(1.0)).unwrap(),
                    (1, false) => drop(world.remove::<Velocity>(entity).unwrap()),
                    (_, true) => world.add(entity, Frozen).unwrap(),
                    (_, false) => drop(world.remove::<Frozen>(entity).unwrap()),
                }
            }
            _ => entities.push(world.create_entity()),
        }
    }

    assert_eq!(groups.len(), filters.len());
    for group in &groups {
        let has = |entity: Entity, id: ComponentId| {
            if id == ids[0] {
                world.has::<Value>(entity)
            } else if id == ids[1] {
                world.has::<Velocity>(entity)
            } else {
                world.has::<Frozen>(entity)
            }
        };
        let expected: HashSet<Entity> = entities
            .iter()
            .copied()
            .filter(|&entity| {
                group.filter().required().iter().all(|&id| has(entity, id))
                    && !group.filter().excluded().iter().any(|&id| has(entity, id))
            })
            .collect();

        assert_eq!(members(group.entities()), expected, "filter {:?}", group.filter());
    }
}
