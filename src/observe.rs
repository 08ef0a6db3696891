//! Change-filtered observable values for decoupled state publication.
//!
//! Architecture:
//! - Each published field gets its own `Observable` (no cross-field atomicity)
//! - `set()` stores and notifies subscribers only when the value actually
//!   changed under `PartialEq` - redundant writes are invisible
//! - Subscribing invokes the callback once with the current value, then on
//!   every change; dropping the returned `Subscription` unsubscribes
//!
//! The value and subscriber list share one lock, so every subscriber sees a
//! linearized sequence of distinct values even with concurrent writers.
//! Callbacks run synchronously on the writing thread and must not call back
//! into the same observable at all - `set()`, `get()`, and `subscribe()`
//! each take that lock and would self-deadlock.
//!
//! Writers whose mutations are ordered by an external lock publish through
//! `set_ordered` with a sequence number taken under that lock; a publish
//! that lost the race arrives with a stale sequence and is discarded, so
//! the observable never regresses behind the state it mirrors.

use indexmap::IndexMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Inner<T> {
    value: T,
    /// Sequence of the last accepted `set_ordered` write.
    version: u64,
    subscribers: Vec<(u64, Callback<T>)>,
}

/// A thread-safe container publishing a single value to subscribers,
/// filtered on actual change.
pub struct Observable<T> {
    inner: Arc<Mutex<Inner<T>>>,
    next_id: Arc<AtomicU64>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            next_id: Arc::clone(&self.next_id),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock().expect("lock");
        f.debug_struct("Observable")
            .field("value", &inner.value)
            .field("subscribers", &inner.subscribers.len())
            .finish()
    }
}

impl<T: Clone + PartialEq + Send + 'static> Observable<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                value,
                version: 0,
                subscribers: Vec::new(),
            })),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Latest value, without blocking on in-flight notifications from
    /// other observables.
    pub fn get(&self) -> T {
        self.inner.lock().expect("lock").value.clone()
    }

    /// Store `value` and notify subscribers if it differs from the held
    /// value. Returns whether a notification was delivered.
    pub fn set(&self, value: T) -> bool {
        let mut inner = self.inner.lock().expect("lock");
        if inner.value == value {
            return false;
        }
        inner.value = value;
        // Notify under the lock: subscribers see distinct values in set order
        let value = inner.value.clone();
        for (_, cb) in &inner.subscribers {
            cb(&value);
        }
        true
    }

    /// Store `value` only if `seq` is newer than the last accepted ordered
    /// write. The caller takes `seq` while holding the lock that orders its
    /// mutations, so a publish that raced and lost arrives stale here and
    /// is dropped rather than overwriting a newer value.
    pub fn set_ordered(&self, seq: u64, value: T) -> bool {
        let mut inner = self.inner.lock().expect("lock");
        if seq <= inner.version {
            return false;
        }
        inner.version = seq;
        if inner.value == value {
            return false;
        }
        inner.value = value;
        let value = inner.value.clone();
        for (_, cb) in &inner.subscribers {
            cb(&value);
        }
        true
    }

    /// Subscribe a callback, invoked immediately with the current value and
    /// then on every change. The subscription ends when the returned handle
    /// is dropped.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let callback: Callback<T> = Arc::new(callback);
        {
            let mut inner = self.inner.lock().expect("lock");
            callback(&inner.value);
            inner.subscribers.push((id, callback));
        }

        let weak: Weak<Mutex<Inner<T>>> = Arc::downgrade(&self.inner);
        Subscription {
            unsubscribe: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner
                        .lock()
                        .expect("lock")
                        .subscribers
                        .retain(|(sub_id, _)| *sub_id != id);
                }
            })),
        }
    }

    /// Current subscriber count.
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().expect("lock").subscribers.len()
    }
}

/// An ordered-list observable; full-collection equality decides whether a
/// write notifies, and insertion order is meaningful (e.g. cached ranges
/// sorted by time).
pub type ObservableList<T> = Observable<Vec<T>>;

/// A key-to-value observable backed by an insertion-ordered map; equality
/// is over the whole map, key order carries no meaning.
pub type ObservableMap<K, V> = Observable<IndexMap<K, V>>;

/// Subscription handle. Dropping it removes the callback from the
/// observable; the observable itself may outlive or predecease it.
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Explicitly end the subscription (same as dropping).
    pub fn unsubscribe(mut self) {
        if let Some(f) = self.unsubscribe.take() {
            f();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(f) = self.unsubscribe.take() {
            f();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

    /// Test: notifications delivered == number of actual value changes
    /// Validates: redundant writes produce zero notifications
    #[test]
    fn test_change_filtering() {
        let obs = Observable::new(0i32);
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let _sub = obs.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        // Subscribe triggers once with the current value
        assert_eq!(count.load(Ordering::SeqCst), 1);

        assert!(obs.set(1));
        assert!(!obs.set(1)); // redundant write, no notification
        assert!(!obs.set(1));
        assert!(obs.set(2));
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert_eq!(obs.get(), 2);
    }

    #[test]
    fn test_subscribe_receives_current_value() {
        let obs = Observable::new(42i32);
        let seen = Arc::new(AtomicI32::new(0));
        let s = Arc::clone(&seen);
        let _sub = obs.subscribe(move |v| {
            s.store(*v, Ordering::SeqCst);
        });
        assert_eq!(seen.load(Ordering::SeqCst), 42);
    }

    #[test]
    fn test_unsubscribe_on_drop() {
        let obs = Observable::new(0i32);
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let sub = obs.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(obs.subscriber_count(), 1);
        obs.set(1);
        drop(sub);
        assert_eq!(obs.subscriber_count(), 0);
        obs.set(2);
        // Only the trigger-on-subscribe and the first set were seen
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_list_full_collection_equality() {
        let obs: ObservableList<i32> = Observable::new(vec![1, 2, 3]);
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let _sub = obs.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!obs.set(vec![1, 2, 3])); // equal collection, filtered
        assert!(obs.set(vec![3, 2, 1])); // order matters for lists
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_map_variant() {
        let mut initial = IndexMap::new();
        initial.insert("a", 1);
        let obs: ObservableMap<&str, i32> = Observable::new(initial.clone());

        assert!(!obs.set(initial.clone()));
        let mut changed = initial.clone();
        changed.insert("b", 2);
        assert!(obs.set(changed));
    }

    /// Test: a publish carrying a stale sequence number is discarded
    /// Validates: racing writers cannot leave the observable behind the
    /// state their mutation lock ordered
    #[test]
    fn test_ordered_set_discards_stale_sequence() {
        let obs = Observable::new(0i32);
        assert!(obs.set_ordered(2, 20));
        assert!(!obs.set_ordered(1, 10)); // lost the race
        assert_eq!(obs.get(), 20);

        assert!(!obs.set_ordered(3, 20)); // newer seq, equal value: filtered
        assert!(obs.set_ordered(4, 40));
        assert_eq!(obs.get(), 40);
    }

    /// Test: subscribers never observe values out of set order
    /// Validates: linearized delivery with a writer on another thread
    #[test]
    fn test_ordered_delivery_across_threads() {
        let obs = Observable::new(0u64);
        let last = Arc::new(AtomicU64::new(0));
        let in_order = Arc::new(std::sync::atomic::AtomicBool::new(true));
        let l = Arc::clone(&last);
        let ok = Arc::clone(&in_order);
        let _sub = obs.subscribe(move |v| {
            let prev = l.swap(*v, Ordering::SeqCst);
            if *v <= prev && *v != 0 {
                ok.store(false, Ordering::SeqCst);
            }
        });

        let writer = {
            let obs = obs.clone();
            std::thread::spawn(move || {
                for i in 1..=500u64 {
                    obs.set(i);
                }
            })
        };
        writer.join().unwrap();

        assert!(in_order.load(Ordering::SeqCst));
        assert_eq!(obs.get(), 500);
        assert_eq!(last.load(Ordering::SeqCst), 500);
    }
}
