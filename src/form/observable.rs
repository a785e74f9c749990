use std::fmt::{Debug, Formatter};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::controller::{FormError, FormResult};
use super::emitter::{Emitter, Subscription};
use super::value::FieldValue;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ListChange {
    Inserted { index: usize },
    Replaced { index: usize },
    Removed { index: usize },
    Cleared,
}

struct ListInner {
    items: RwLock<Vec<FieldValue>>,
    events: Emitter<(), ListChange>,
}

/// Shared list whose in-place mutations are observable. A field holding one
/// re-emits its own `Change` event whenever the list is mutated.
#[derive(Clone)]
pub struct ObservableList {
    inner: Arc<ListInner>,
}

impl ObservableList {
    pub fn new() -> Self {
        Self::from_items(Vec::new())
    }

    pub fn from_items(items: Vec<FieldValue>) -> Self {
        Self {
            inner: Arc::new(ListInner {
                items: RwLock::new(items),
                events: Emitter::new(),
            }),
        }
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn len(&self) -> usize {
        read_items(&self.inner.items).len()
    }

    pub fn is_empty(&self) -> bool {
        read_items(&self.inner.items).is_empty()
    }

    pub fn get(&self, index: usize) -> Option<FieldValue> {
        read_items(&self.inner.items).get(index).cloned()
    }

    pub fn items(&self) -> Vec<FieldValue> {
        read_items(&self.inner.items).clone()
    }

    pub fn push(&self, value: impl Into<FieldValue>) {
        let index = {
            let mut items = write_items(&self.inner.items);
            items.push(value.into());
            items.len() - 1
        };
        self.notify(ListChange::Inserted { index });
    }

    pub fn insert(&self, index: usize, value: impl Into<FieldValue>) -> FormResult<()> {
        {
            let mut items = write_items(&self.inner.items);
            if index > items.len() {
                return Err(FormError::IndexOutOfRange {
                    index,
                    len: items.len(),
                });
            }
            items.insert(index, value.into());
        }
        self.notify(ListChange::Inserted { index });
        Ok(())
    }

    pub fn set(&self, index: usize, value: impl Into<FieldValue>) -> FormResult<FieldValue> {
        let previous = {
            let mut items = write_items(&self.inner.items);
            let len = items.len();
            let slot = items
                .get_mut(index)
                .ok_or(FormError::IndexOutOfRange { index, len })?;
            std::mem::replace(slot, value.into())
        };
        self.notify(ListChange::Replaced { index });
        Ok(previous)
    }

    pub fn remove(&self, index: usize) -> FormResult<FieldValue> {
        let removed = {
            let mut items = write_items(&self.inner.items);
            if index >= items.len() {
                return Err(FormError::IndexOutOfRange {
                    index,
                    len: items.len(),
                });
            }
            items.remove(index)
        };
        self.notify(ListChange::Removed { index });
        Ok(removed)
    }

    pub fn clear(&self) {
        write_items(&self.inner.items).clear();
        self.notify(ListChange::Cleared);
    }

    pub fn on_change(&self, handler: impl Fn(&ListChange) + Send + Sync + 'static) -> Subscription {
        self.inner.events.on((), handler)
    }

    pub fn listener_count(&self) -> usize {
        self.inner.events.listener_count(&())
    }

    fn notify(&self, change: ListChange) {
        log::trace!("observable list changed: {change:?}");
        self.inner.events.emit(&(), &change);
    }
}

impl Default for ObservableList {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for ObservableList {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ObservableList")
            .field(&*read_items(&self.inner.items))
            .finish()
    }
}

impl FromIterator<FieldValue> for ObservableList {
    fn from_iter<I: IntoIterator<Item = FieldValue>>(iter: I) -> Self {
        Self::from_items(iter.into_iter().collect())
    }
}

fn read_items(lock: &RwLock<Vec<FieldValue>>) -> RwLockReadGuard<'_, Vec<FieldValue>> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write_items(lock: &RwLock<Vec<FieldValue>>) -> RwLockWriteGuard<'_, Vec<FieldValue>> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
