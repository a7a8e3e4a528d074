//! Change notification for view-model fields.
//!
//! Properties are identified by a typed key (usually a fieldless enum owned by
//! the view model) instead of a string name, so a misspelled property is a
//! compile error rather than a binding that silently never updates.

use std::fmt;

/// Identifies a bindable property of a view model.
pub trait PropertyKey: Copy + Eq + fmt::Debug + Send + 'static {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Observer<K> = Box<dyn FnMut(K) + Send>;

/// Holds the observers of one view model and fans change notifications out
/// to them synchronously, on the calling thread.
pub struct PropertyNotifier<K> {
    observers: Vec<(SubscriptionId, Observer<K>)>,
    next_id: u64,
}

impl<K> Default for PropertyNotifier<K> {
    fn default() -> Self {
        Self {
            observers: Vec::new(),
            next_id: 0,
        }
    }
}

impl<K> fmt::Debug for PropertyNotifier<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyNotifier")
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl<K: PropertyKey> PropertyNotifier<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, observer: impl FnMut(K) + Send + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(sub, _)| *sub != id);
        self.observers.len() != before
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Assigns `value` to `field` and notifies `key` only if the value changed.
    ///
    /// Returns `true` when a notification was raised, so callers can chain
    /// dependent updates (derived properties, command re-evaluation) on real
    /// changes only.
    pub fn set_field<T: PartialEq>(&mut self, field: &mut T, value: T, key: K) -> bool {
        if *field == value {
            return false;
        }
        *field = value;
        self.raise_property_changed(key);
        true
    }

    /// [`set_field`](Self::set_field) for a value that carries its own key.
    pub fn set<T: PartialEq>(&mut self, property: &mut Property<K, T>, value: T) -> bool {
        let key = property.key;
        self.set_field(&mut property.value, value, key)
    }

    /// Unconditionally notifies `key`. Used for computed properties that have
    /// no backing field of their own.
    pub fn raise_property_changed(&mut self, key: K) {
        for (_, observer) in self.observers.iter_mut() {
            observer(key);
        }
    }
}

/// A value tagged with the key it is published under.
#[derive(Debug, Clone, PartialEq)]
pub struct Property<K, T> {
    key: K,
    value: T,
}

impl<K: PropertyKey, T> Property<K, T> {
    pub fn new(key: K, value: T) -> Self {
        Self { key, value }
    }

    pub fn key(&self) -> K {
        self.key
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}
