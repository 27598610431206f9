use phecs::{Component, ComponentAdded, ComponentRemoved, Error, World};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Component, Debug, Default, PartialEq)]
#[component(storage = "static")]
struct Camera {
    zoom: f32,
}

#[derive(Component, Debug, Default, PartialEq)]
#[component(storage = "static")]
struct Input {
    pressed: Vec<char>,
}

#[derive(Component, Debug, PartialEq)]
#[component(storage = "shared")]
struct Atlas(&'static str);

#[derive(Component, Debug)]
struct Sprite;

#[test]
fn statics() {
    let mut world = World::new();
    assert!(world.read_static::<Camera>().is_none());

    assert_eq!(world.replace_static(Camera { zoom: 1.0 }).unwrap(), None);
    assert_eq!(world.read_static::<Camera>().unwrap().zoom, 1.0);

    world.static_mut::<Camera>().unwrap().zoom = 2.0;
    assert_eq!(
        world.replace_static(Camera { zoom: 3.0 }).unwrap(),
        Some(Camera { zoom: 2.0 })
    );
    assert_eq!(world.read_static::<Camera>().unwrap().zoom, 3.0);
}

#[test]
fn static_or_default_initializes_once() {
    let mut world = World::new();

    world.static_or_default::<Input>().unwrap().pressed.push('w');
    world.static_or_default::<Input>().unwrap().pressed.push('a');

    assert_eq!(world.read_static::<Input>().unwrap().pressed, vec!['w', 'a']);
}

#[test]
fn statics_are_not_entity_components() {
    let mut world = World::new();
    let entity = world.create_entity();
    world.replace_static(Camera::default()).unwrap();

    assert!(!world.has::<Camera>(entity));
    assert!(world.get::<Camera>(entity).is_none());
    assert!(matches!(
        world.replace_static(Sprite),
        Err(Error::StorageKind { .. })
    ));
}

#[test]
fn shared_owners() {
    let mut world = World::new();
    let a = world.create_entity();
    let b = world.create_entity();
    let c = world.create_entity();

    world.set_shared(Atlas("tiles")).unwrap();
    assert!(world.add_owner::<Atlas>(a).unwrap());
    assert!(world.add_owner::<Atlas>(b).unwrap());
    assert!(!world.add_owner::<Atlas>(b).unwrap());

    assert!(world.is_owner::<Atlas>(a));
    assert!(!world.is_owner::<Atlas>(c));
    assert!(world.has::<Atlas>(b));
    assert_eq!(*world.get::<Atlas>(a).unwrap(), Atlas("tiles"));
    assert!(world.get::<Atlas>(c).is_none());

    world.shared_mut::<Atlas>().unwrap().0 = "sprites";
    assert_eq!(world.get::<Atlas>(b).unwrap().0, "sprites");

    assert!(world.remove_owner::<Atlas>(a).unwrap());
    assert!(!world.remove_owner::<Atlas>(a).unwrap());

    let mut owners = world.owners::<Atlas>();
    owners.sort();
    assert_eq!(owners, vec![b]);
    assert_eq!(world.read_shared::<Atlas>().unwrap().0, "sprites");
}

#[test]
fn shared_ownership_drives_groups_and_events() {
    let mut world = World::new();
    let added = Arc::new(AtomicUsize::new(0));
    let removed = Arc::new(AtomicUsize::new(0));
    {
        let added = Arc::clone(&added);
        world.subscribe(move |_: &ComponentAdded<Atlas>| {
            added.fetch_add(1, Ordering::SeqCst);
        });
    }
    {
        let removed = Arc::clone(&removed);
        world.subscribe(move |_: &ComponentRemoved<Atlas>| {
            removed.fetch_add(1, Ordering::SeqCst);
        });
    }

    let group = world.filter().with::<Atlas>().group();
    let a = world.create_entity();
    let b = world.create_entity();

    world.add_owner::<Atlas>(a).unwrap();
    world.add_owner::<Atlas>(b).unwrap();
    assert_eq!(group.len(), 2);

    world.remove_owner::<Atlas>(a).unwrap();
    world.destroy_entity(b).unwrap();
    assert!(group.is_empty());
    assert!(world.owners::<Atlas>().is_empty());

    assert_eq!(added.load(Ordering::SeqCst), 2);
    assert_eq!(removed.load(Ordering::SeqCst), 2);
}
