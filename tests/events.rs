use parking_lot::Mutex;
use phecs::{Component, ComponentAdded, EventBus, World};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
struct Damage(u32);

#[derive(Debug, Clone, PartialEq)]
struct Died;

#[derive(Component, Debug)]
struct Health(u32);

#[test]
fn basic() {
    let bus = EventBus::new();
    let received = Arc::new(Mutex::new(Vec::new()));

    {
        let received = Arc::clone(&received);
        bus.subscribe(move |event: &Damage| received.lock().push(event.clone()));
    }

    bus.emit(Damage(256));
    bus.emit(Damage(3));
    bus.emit(Died);

    assert_eq!(*received.lock(), vec![Damage(256), Damage(3)]);
    assert_eq!(bus.subscriber_count::<Damage>(), 1);
    assert!(!bus.has_subscribers::<Died>());
}

#[test]
fn handlers_may_emit_and_subscribe() {
    let bus = EventBus::new();
    let deaths = Arc::new(Mutex::new(0));

    {
        let inner = bus.clone();
        let deaths = Arc::clone(&deaths);
        bus.subscribe(move |event: &Damage| {
            if event.0 >= 100 {
                inner.emit(Died);
            }
            // Subscribing mid-emission must not disturb the current dispatch.
            let deaths = Arc::clone(&deaths);
            inner.subscribe(move |_: &Died| *deaths.lock() += 1);
        });
    }

    bus.emit(Damage(100));
    assert_eq!(*deaths.lock(), 0);

    bus.emit(Damage(150));
    assert_eq!(*deaths.lock(), 1);
}

#[test]
fn self_unsubscribing_handler_runs_once() {
    let bus = EventBus::new();
    let calls = Arc::new(Mutex::new(0));
    let id = Arc::new(Mutex::new(None));

    {
        let inner = bus.clone();
        let calls = Arc::clone(&calls);
        let own_id = Arc::clone(&id);
        *id.lock() = Some(bus.subscribe(move |_: &Damage| {
            *calls.lock() += 1;
            if let Some(id) = own_id.lock().take() {
                inner.unsubscribe(id);
            }
        }));
    }

    bus.emit(Damage(1));
    bus.emit(Damage(1));
    assert_eq!(*calls.lock(), 1);
}

#[test]
fn world_notifications() {
    let mut world = World::new();
    let added = Arc::new(Mutex::new(Vec::new()));

    let id = {
        let added = Arc::clone(&added);
        world.subscribe(move |event: &ComponentAdded<Health>| {
            added.lock().push(event.entity)
        })
    };

    let a = world.create_entity();
    let b = world.create_entity();
    world.add(a, Health(10)).unwrap();

    assert!(world.unsubscribe(id));
    world.add(b, Health(10)).unwrap();

    assert_eq!(*added.lock(), vec![a]);
    assert!(!world.unsubscribe(id));
}
