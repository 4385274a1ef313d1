//! Observed-value primitive shared across the platform
//!
//! An [`Observable`] is a cloneable handle to a current value plus a set of
//! subscriber callbacks. Subscribing replays the current value immediately
//! when one exists, so late subscribers catch up without waiting for the next
//! publish. Dropping the returned [`Subscription`] detaches the callback.

use std::sync::{Arc, Weak};

use ahash::AHashMap;
use parking_lot::RwLock;
use uuid::Uuid;

type Callback<T> = Box<dyn Fn(&T) + Send + Sync>;

struct Inner<T> {
    observers: RwLock<AHashMap<Uuid, Callback<T>>>,
    current: RwLock<Option<T>>,
}

/// Cloneable handle to a shared observed value.
pub struct Observable<T> {
    inner: Arc<Inner<T>>,
}

/// The shared "current time" signal consumers scrub against.
pub type TimeSignal = Observable<f64>;

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Observable<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                observers: RwLock::new(AHashMap::new()),
                current: RwLock::new(None),
            }),
        }
    }

    /// Create an observable that already holds a value.
    pub fn with_initial(value: T) -> Self {
        let observable = Self::new();
        *observable.inner.current.write() = Some(value);
        observable
    }

    /// Register a callback and replay the current value to it, if any.
    ///
    /// Callbacks run on the publisher's thread and must not subscribe to or
    /// publish on the same observable.
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        if let Some(value) = self.inner.current.read().as_ref() {
            observer(value);
        }

        let id = Uuid::new_v4();
        self.inner.observers.write().insert(id, Box::new(observer));

        let inner = Arc::downgrade(&self.inner);
        Subscription {
            detach: Some(Box::new(move || {
                if let Some(inner) = Weak::upgrade(&inner) {
                    inner.observers.write().remove(&id);
                }
            })),
        }
    }

    /// Store `value` as the current value and notify every subscriber.
    pub fn publish(&self, value: T) {
        *self.inner.current.write() = Some(value.clone());
        let observers = self.inner.observers.read();
        for observer in observers.values() {
            observer(&value);
        }
    }

    /// The most recently published value.
    pub fn get(&self) -> Option<T> {
        self.inner.current.read().clone()
    }

    pub fn observer_count(&self) -> usize {
        self.inner.observers.read().len()
    }
}

impl<T: Clone + Send + Sync + 'static> Default for Observable<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle returned by [`Observable::subscribe`]; detaches the callback when
/// dropped or explicitly unsubscribed.
pub struct Subscription {
    detach: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.detach.is_some())
            .finish()
    }
}
