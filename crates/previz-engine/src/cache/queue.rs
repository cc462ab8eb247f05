//! Recency queues used by the eviction policies.
//!
//! [`RecentlyUsedQueue`] is a doubly linked list with a hash index:
//! O(1) insert at either end, delete, move-to-front, and pops. Links
//! are slab indices rather than pointers.
//!
//! [`MiddleRecentlyUsedQueue`] chains two of them to expose a
//! pop-middle operation. Evicting from the middle dodges the classic
//! LRU cliff on sequential sweeps while still shedding cold frames
//! under moderate churn.

use std::collections::HashMap;
use std::hash::Hash;

struct Link<K> {
    key: K,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Doubly linked recency queue; head is most recent, tail least recent.
pub struct RecentlyUsedQueue<K> {
    slab: Vec<Option<Link<K>>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    index: HashMap<K, usize>,
}

impl<K: Eq + Hash + Clone> RecentlyUsedQueue<K> {
    pub fn new() -> Self {
        Self {
            slab: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            index: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Key at the head (most recent), if any.
    pub fn head(&self) -> Option<&K> {
        self.head
            .map(|slot| &self.slab[slot].as_ref().expect("linked slot").key)
    }

    /// Key at the tail (least recent), if any.
    pub fn tail(&self) -> Option<&K> {
        self.tail
            .map(|slot| &self.slab[slot].as_ref().expect("linked slot").key)
    }

    fn alloc(&mut self, link: Link<K>) -> usize {
        match self.free.pop() {
            Some(slot) => {
                self.slab[slot] = Some(link);
                slot
            }
            None => {
                self.slab.push(Some(link));
                self.slab.len() - 1
            }
        }
    }

    /// Insert at the head. The key must not already be present.
    pub fn insert(&mut self, key: K) {
        debug_assert!(!self.contains(&key), "key already queued");
        let slot = self.alloc(Link {
            key: key.clone(),
            prev: None,
            next: self.head,
        });
        if let Some(old_head) = self.head {
            self.slab[old_head].as_mut().expect("linked slot").prev = Some(slot);
        } else {
            self.tail = Some(slot);
        }
        self.head = Some(slot);
        self.index.insert(key, slot);
    }

    /// Append at the tail. The key must not already be present.
    pub fn append(&mut self, key: K) {
        debug_assert!(!self.contains(&key), "key already queued");
        let slot = self.alloc(Link {
            key: key.clone(),
            prev: self.tail,
            next: None,
        });
        if let Some(old_tail) = self.tail {
            self.slab[old_tail].as_mut().expect("linked slot").next = Some(slot);
        } else {
            self.head = Some(slot);
        }
        self.tail = Some(slot);
        self.index.insert(key, slot);
    }

    /// Record an access: move the key to the head, inserting it if it
    /// was not present.
    pub fn access(&mut self, key: &K) {
        match self.index.get(key) {
            None => self.insert(key.clone()),
            Some(&slot) => {
                if self.head == Some(slot) {
                    return;
                }
                self.unlink(slot);
                let link = self.slab[slot].as_mut().expect("linked slot");
                link.prev = None;
                link.next = self.head;
                if let Some(old_head) = self.head {
                    self.slab[old_head].as_mut().expect("linked slot").prev = Some(slot);
                }
                self.head = Some(slot);
                if self.tail.is_none() {
                    self.tail = Some(slot);
                }
            }
        }
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = {
            let link = self.slab[slot].as_ref().expect("linked slot");
            (link.prev, link.next)
        };
        match prev {
            Some(prev_slot) => {
                self.slab[prev_slot].as_mut().expect("linked slot").next = next
            }
            None => self.head = next,
        }
        match next {
            Some(next_slot) => {
                self.slab[next_slot].as_mut().expect("linked slot").prev = prev
            }
            None => self.tail = prev,
        }
    }

    /// Remove a key. Returns false if it was not present.
    pub fn delete(&mut self, key: &K) -> bool {
        match self.index.remove(key) {
            None => false,
            Some(slot) => {
                self.unlink(slot);
                self.slab[slot] = None;
                self.free.push(slot);
                true
            }
        }
    }

    pub fn pop_head(&mut self) -> Option<K> {
        let slot = self.head?;
        let key = self.slab[slot].as_ref().expect("linked slot").key.clone();
        self.delete(&key);
        Some(key)
    }

    pub fn pop_tail(&mut self) -> Option<K> {
        let slot = self.tail?;
        let key = self.slab[slot].as_ref().expect("linked slot").key.clone();
        self.delete(&key);
        Some(key)
    }
}

impl<K: Eq + Hash + Clone> Default for RecentlyUsedQueue<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Two balanced recency queues chained head-to-tail. `q1` holds the
/// more recent half; `q2`'s head is the middle of the whole queue.
pub struct MiddleRecentlyUsedQueue<K> {
    q1: RecentlyUsedQueue<K>,
    q2: RecentlyUsedQueue<K>,
}

impl<K: Eq + Hash + Clone> MiddleRecentlyUsedQueue<K> {
    pub fn new() -> Self {
        Self {
            q1: RecentlyUsedQueue::new(),
            q2: RecentlyUsedQueue::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.q1.len() + self.q2.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &K) -> bool {
        self.q1.contains(key) || self.q2.contains(key)
    }

    /// Restore `|q1| ∈ {|q2| - 1, |q2|, |q2| + 1}` by shifting one key
    /// across the boundary.
    fn recover_invariant(&mut self) {
        if self.q1.len() >= self.q2.len() + 1 {
            if let Some(key) = self.q1.pop_tail() {
                self.q2.insert(key);
            }
        } else if self.q1.len() + 2 == self.q2.len() {
            if let Some(key) = self.q2.pop_head() {
                self.q1.append(key);
            }
        }
        debug_assert!(
            self.q1.len() <= self.q2.len() + 1 && self.q1.len() + 1 >= self.q2.len(),
            "queue halves out of balance"
        );
    }

    /// Insert at the head (most recent).
    pub fn insert(&mut self, key: K) {
        debug_assert!(!self.contains(&key), "key already queued");
        self.q1.insert(key);
        self.recover_invariant();
    }

    /// Record an access: move the key to the overall head.
    pub fn access(&mut self, key: &K) {
        if self.q1.contains(key) {
            self.q1.access(key);
        } else if self.q2.contains(key) {
            self.q2.delete(key);
            self.q1.insert(key.clone());
            self.recover_invariant();
        }
    }

    /// Remove a key. Returns false if it was not present.
    pub fn delete(&mut self, key: &K) -> bool {
        let deleted = self.q1.delete(key) || self.q2.delete(key);
        if deleted {
            self.recover_invariant();
        }
        deleted
    }

    pub fn pop_head(&mut self) -> Option<K> {
        let key = self.q1.pop_head().or_else(|| self.q2.pop_head())?;
        self.recover_invariant();
        Some(key)
    }

    /// Pop the middle of the queue: the head of the older half.
    pub fn pop_middle(&mut self) -> Option<K> {
        let key = self.q2.pop_head().or_else(|| self.q1.pop_tail())?;
        self.recover_invariant();
        Some(key)
    }

    pub fn pop_tail(&mut self) -> Option<K> {
        let key = self.q2.pop_tail().or_else(|| self.q1.pop_tail())?;
        self.recover_invariant();
        Some(key)
    }
}

impl<K: Eq + Hash + Clone> Default for MiddleRecentlyUsedQueue<K> {
    fn default() -> Self {
        Self::new()
    }
}
