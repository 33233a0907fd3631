//! Size-keyed object pool for message and frame objects.
//!
//! Objects are keyed by the capacities they were created with, so a connection only
//! ever receives an object sized for its configuration. Access never blocks: if the
//! pool is busy, `get` allocates and `put` drops.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::Mutex;

/// An object that can be recycled through a [`Pool`].
pub trait Poolable: Sized {
    type Key: Eq + Hash + Clone;

    fn key(&self) -> Self::Key;

    /// Allocates a fresh object. `None` on allocation failure.
    fn create(key: &Self::Key) -> Option<Self>;

    /// Clears all state before the object goes back into the pool.
    fn reset(&mut self);
}

#[derive(Debug)]
pub struct Pool<T: Poolable> {
    slots: Mutex<HashMap<T::Key, VecDeque<T>>>,
    per_key: usize,
}

impl<T: Poolable> Pool<T> {
    /// Keeps at most `per_key` idle objects per key. Zero disables pooling.
    pub fn new(per_key: usize) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            per_key,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.per_key > 0
    }

    /// Takes the most recently returned object for `key`, or creates one.
    pub fn get(&self, key: &T::Key) -> Option<T> {
        if self.is_enabled() {
            if let Ok(mut slots) = self.slots.try_lock() {
                if let Some(object) = slots.get_mut(key).and_then(VecDeque::pop_front) {
                    return Some(object);
                }
            }
        }
        T::create(key)
    }

    /// Returns an object. The least recently returned one is evicted when the key is full.
    pub fn put(&self, mut object: T) {
        if !self.is_enabled() {
            return;
        }
        object.reset();
        let Ok(mut slots) = self.slots.try_lock() else {
            return;
        };
        let queue = slots.entry(object.key()).or_default();
        queue.push_front(object);
        queue.truncate(self.per_key);
    }

    /// Number of idle objects held for `key`.
    pub fn idle(&self, key: &T::Key) -> usize {
        self.slots
            .try_lock()
            .map_or(0, |slots| slots.get(key).map_or(0, VecDeque::len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Slab {
        size: usize,
        dirty: bool,
        serial: u32,
    }

    impl Poolable for Slab {
        type Key = usize;

        fn key(&self) -> usize {
            self.size
        }

        fn create(key: &usize) -> Option<Self> {
            Some(Slab { size: *key, dirty: false, serial: 0 })
        }

        fn reset(&mut self) {
            self.dirty = false;
        }
    }

    #[test]
    fn returns_cleared_object_for_same_key() {
        let pool = Pool::new(2);
        pool.put(Slab { size: 8, dirty: true, serial: 7 });
        let slab = pool.get(&8).unwrap();
        assert_eq!(slab, Slab { size: 8, dirty: false, serial: 7 });
        assert_eq!(pool.get(&16).unwrap().serial, 0);
    }

    #[test]
    fn evicts_least_recently_returned() {
        let pool = Pool::new(2);
        for serial in 1..=3 {
            pool.put(Slab { size: 4, dirty: false, serial });
        }
        assert_eq!(pool.idle(&4), 2);
        assert_eq!(pool.get(&4).unwrap().serial, 3);
        assert_eq!(pool.get(&4).unwrap().serial, 2);
        assert_eq!(pool.get(&4).unwrap().serial, 0);
    }

    #[test]
    fn disabled_pool_never_retains() {
        let pool: Pool<Slab> = Pool::new(0);
        pool.put(Slab { size: 4, dirty: true, serial: 1 });
        assert_eq!(pool.idle(&4), 0);
    }
}
