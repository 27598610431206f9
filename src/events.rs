//! A basic event handling framework.
//!
//! Events are dispatched synchronously, on the emitting thread,
//! to every subscriber of the event's type in subscription order.
//! Handlers may subscribe, unsubscribe and emit further events
//! while being invoked.

use crate::component::Component;
use crate::entity::Entity;
use crate::util::HashMap;
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::fmt::{self, Debug, Formatter};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Marker trait for types which can be used as events.
pub trait Event: Send + Sync + 'static {}
impl<T> Event for T where T: Send + Sync + 'static {}

/// Identifies a subscription so it can later be cancelled.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Handler<E> = Box<dyn Fn(&E) + Send + Sync>;

struct Subscriber<E> {
    id: SubscriptionId,
    /// Cleared on unsubscription so that a snapshot taken by an
    /// in-flight emission stops invoking the handler.
    active: AtomicBool,
    handler: Handler<E>,
}

trait Channel: Send + Sync {
    fn unsubscribe(&mut self, id: SubscriptionId) -> bool;
    fn len(&self) -> usize;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Subscribers of one event type. The list is copy-on-write:
/// emission clones the `Arc` and iterates without holding the lock.
struct Subscribers<E> {
    list: Arc<Vec<Arc<Subscriber<E>>>>,
}

impl<E> Default for Subscribers<E> {
    fn default() -> Self {
        Self {
            list: Arc::new(Vec::new()),
        }
    }
}

impl<E: Event> Channel for Subscribers<E> {
    fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let list = Arc::make_mut(&mut self.list);
        match list.iter().position(|s| s.id == id) {
            Some(pos) => {
                let subscriber = list.remove(pos);
                subscriber.active.store(false, Ordering::Release);
                true
            }
            None => false,
        }
    }

    fn len(&self) -> usize {
        self.list.len()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[derive(Default)]
struct Registry {
    channels: HashMap<TypeId, Box<dyn Channel>>,
    /// Event type of each live subscription.
    routes: HashMap<SubscriptionId, TypeId>,
}

#[derive(Default)]
struct Inner {
    registry: RwLock<Registry>,
    next_id: AtomicU64,
}

/// Stores event subscribers and allows emitting events.
///
/// Cloning an `EventBus` yields another handle onto the same
/// subscribers, which lets a handler capture the bus and emit
/// nested events.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for events of type `E`.
    pub fn subscribe<E, F>(&self, handler: F) -> SubscriptionId
    where
        E: Event,
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let subscriber = Arc::new(Subscriber {
            id,
            active: AtomicBool::new(true),
            handler: Box::new(handler),
        });

        let mut registry = self.inner.registry.write();
        let channel = registry
            .channels
            .entry(TypeId::of::<E>())
            .or_insert_with(|| Box::new(Subscribers::<E>::default()));
        let subscribers = channel
            .as_any_mut()
            .downcast_mut::<Subscribers<E>>()
            .expect("channel registered under the wrong event type");
        Arc::make_mut(&mut subscribers.list).push(subscriber);
        registry.routes.insert(id, TypeId::of::<E>());

        id
    }

    /// Cancels a subscription.
    ///
    /// Returns `false` if the subscription was already cancelled.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registry = self.inner.registry.write();
        let event_type = match registry.routes.remove(&id) {
            Some(event_type) => event_type,
            None => return false,
        };
        registry
            .channels
            .get_mut(&event_type)
            .map_or(false, |channel| channel.unsubscribe(id))
    }

    /// Emits an event, invoking each current subscriber of `E`
    /// in subscription order before returning.
    pub fn emit<E>(&self, event: E)
    where
        E: Event,
    {
        let snapshot = match self.snapshot::<E>() {
            Some(snapshot) => snapshot,
            None => return,
        };

        for subscriber in snapshot.iter() {
            if subscriber.active.load(Ordering::Acquire) {
                (subscriber.handler)(&event);
            }
        }
    }

    /// Returns whether any handler is subscribed to `E`.
    pub fn has_subscribers<E>(&self) -> bool
    where
        E: Event,
    {
        self.subscriber_count::<E>() > 0
    }

    /// Returns the number of handlers subscribed to `E`.
    pub fn subscriber_count<E>(&self) -> usize
    where
        E: Event,
    {
        self.inner
            .registry
            .read()
            .channels
            .get(&TypeId::of::<E>())
            .map_or(0, |channel| channel.len())
    }

    fn snapshot<E: Event>(&self) -> Option<Arc<Vec<Arc<Subscriber<E>>>>> {
        let registry = self.inner.registry.read();
        let channel = registry.channels.get(&TypeId::of::<E>())?;
        let subscribers = channel.as_any().downcast_ref::<Subscribers<E>>()?;
        if subscribers.list.is_empty() {
            None
        } else {
            Some(Arc::clone(&subscribers.list))
        }
    }
}

impl Debug for EventBus {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let registry = self.inner.registry.read();
        f.debug_struct("EventBus")
            .field("channels", &registry.channels.len())
            .field("subscriptions", &registry.routes.len())
            .finish()
    }
}

macro_rules! component_events {
    ($($(#[$doc:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$doc])*
            pub struct $name<T> {
                /// The entity whose component changed.
                pub entity: Entity,
                _marker: PhantomData<fn() -> T>,
            }

            impl<T: Component> $name<T> {
                pub(crate) fn new(entity: Entity) -> Self {
                    Self {
                        entity,
                        _marker: PhantomData,
                    }
                }
            }

            impl<T> Clone for $name<T> {
                fn clone(&self) -> Self {
                    *self
                }
            }

            impl<T> Copy for $name<T> {}

            impl<T> Debug for $name<T> {
                fn fmt(&self, f: &mut Formatter) -> fmt::Result {
                    f.debug_struct(stringify!($name))
                        .field("component", &std::any::type_name::<T>())
                        .field("entity", &self.entity)
                        .finish()
                }
            }
        )*
    };
}

component_events! {
    /// Emitted after a component of type `T` was added to an entity,
    /// or after an entity became an owner of shared component `T`.
    ComponentAdded,
    /// Emitted after a component of type `T` was removed from an entity,
    /// including removals caused by destroying the entity.
    ComponentRemoved,
    /// Emitted after an existing component of type `T` was overwritten.
    ComponentUpdated,
}

/// Emitted before an existing component is overwritten through
/// `World::update`, carrying both values for change diffing.
#[derive(Debug, Clone)]
pub struct ComponentPreUpdated<T> {
    pub entity: Entity,
    pub old: T,
    pub new: T,
}

/// Emitted after an entity was destroyed and its index released.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct EntityDisposed {
    pub entity: Entity,
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn handlers_run_in_subscription_order() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for n in 0..3 {
            let log = Arc::clone(&log);
            bus.subscribe(move |event: &i64| log.lock().push((n, *event)));
        }

        bus.emit(7i64);
        assert_eq!(*log.lock(), vec![(0, 7), (1, 7), (2, 7)]);
    }

    #[test]
    fn unsubscribe_during_emission_skips_nobody_else() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let second = Arc::new(Mutex::new(None));

        {
            let bus2 = bus.clone();
            let log = Arc::clone(&log);
            let second = Arc::clone(&second);
            bus.subscribe(move |_: &u8| {
                log.lock().push("first");
                if let Some(id) = second.lock().take() {
                    bus2.unsubscribe(id);
                }
            });
        }
        {
            let log = Arc::clone(&log);
            *second.lock() = Some(bus.subscribe(move |_: &u8| log.lock().push("second")));
        }
        {
            let log = Arc::clone(&log);
            bus.subscribe(move |_: &u8| log.lock().push("third"));
        }

        bus.emit(0u8);
        bus.emit(0u8);

        assert_eq!(*log.lock(), vec!["first", "third", "first", "third"]);
    }

    #[test]
    fn nested_emission() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        {
            let bus2 = bus.clone();
            bus.subscribe(move |event: &u32| bus2.emit(u64::from(*event) * 2));
        }
        {
            let seen = Arc::clone(&seen);
            bus.subscribe(move |event: &u64| seen.lock().push(*event));
        }

        bus.emit(21u32);
        assert_eq!(*seen.lock(), vec![42]);
    }

    #[test]
    fn unsubscribe_twice() {
        let bus = EventBus::new();
        let id = bus.subscribe(|_: &()| {});

        assert!(bus.has_subscribers::<()>());
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        assert!(!bus.has_subscribers::<()>());
    }
}
