use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

pub type Handler<P> = Arc<dyn Fn(&P) + Send + Sync>;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ListenerId(u64);

struct Registry<K, P> {
    next_id: u64,
    listeners: BTreeMap<K, Vec<(ListenerId, Handler<P>)>>,
}

impl<K: Ord, P> Registry<K, P> {
    fn remove(&mut self, key: &K, id: ListenerId) -> bool {
        let Some(listeners) = self.listeners.get_mut(key) else {
            return false;
        };
        let before = listeners.len();
        listeners.retain(|(listener, _)| *listener != id);
        let removed = listeners.len() != before;
        if listeners.is_empty() {
            self.listeners.remove(key);
        }
        removed
    }
}

/// Keyed synchronous publish/subscribe.
///
/// `emit` snapshots the listeners registered for a key before invoking any of
/// them, so handlers may subscribe or unsubscribe (themselves included) while
/// being called. Such changes apply from the next `emit` on; every handler in
/// the snapshot runs exactly once, in registration order.
pub struct Emitter<K, P> {
    registry: Arc<RwLock<Registry<K, P>>>,
}

impl<K, P> Clone for Emitter<K, P> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
        }
    }
}

impl<K, P> Default for Emitter<K, P>
where
    K: Ord + Clone + Send + Sync + 'static,
    P: 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, P> Emitter<K, P>
where
    K: Ord + Clone + Send + Sync + 'static,
    P: 'static,
{
    pub fn new() -> Self {
        Self {
            registry: Arc::new(RwLock::new(Registry {
                next_id: 1,
                listeners: BTreeMap::new(),
            })),
        }
    }

    pub fn on(&self, key: K, handler: impl Fn(&P) + Send + Sync + 'static) -> Subscription {
        let id = {
            let mut registry = write_registry(&self.registry);
            let id = ListenerId(registry.next_id);
            registry.next_id += 1;
            registry
                .listeners
                .entry(key.clone())
                .or_default()
                .push((id, Arc::new(handler)));
            id
        };

        let registry: Weak<RwLock<Registry<K, P>>> = Arc::downgrade(&self.registry);
        Subscription {
            id,
            detach: Arc::new(move |id| {
                registry
                    .upgrade()
                    .is_some_and(|registry| write_registry(&registry).remove(&key, id))
            }),
        }
    }

    pub fn off(&self, key: &K, id: ListenerId) -> bool {
        write_registry(&self.registry).remove(key, id)
    }

    pub fn emit(&self, key: &K, payload: &P) -> usize {
        let snapshot = read_registry(&self.registry)
            .listeners
            .get(key)
            .map(|listeners| {
                listeners
                    .iter()
                    .map(|(_, handler)| handler.clone())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        for handler in &snapshot {
            handler(payload);
        }
        snapshot.len()
    }

    pub fn listener_count(&self, key: &K) -> usize {
        read_registry(&self.registry)
            .listeners
            .get(key)
            .map_or(0, Vec::len)
    }

    pub fn clear(&self) {
        write_registry(&self.registry).listeners.clear();
    }
}

#[derive(Clone)]
pub struct Subscription {
    id: ListenerId,
    detach: Arc<dyn Fn(ListenerId) -> bool + Send + Sync>,
}

impl Subscription {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Removes the listener. Returns `false` when it was already removed or the
    /// emitter is gone.
    pub fn unsubscribe(&self) -> bool {
        (self.detach)(self.id)
    }
}

impl Debug for Subscription {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

fn read_registry<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write_registry<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
