//! Fixed-capacity FIFO queue guarded by a single per-instance lock.
//!
//! Every operation takes the lock for its whole duration and returns
//! immediately: a full queue rejects `push`, an empty queue rejects `pop`
//! and the peeks. Nothing ever waits for space or for an element.
//!
//! ```
//! use ringq_common::{BoundedQueue, QueueError};
//!
//! let queue = BoundedQueue::new(2).unwrap();
//! queue.push(1).unwrap();
//! queue.push(2).unwrap();
//! assert_eq!(queue.push(3), Err(QueueError::Full));
//! assert_eq!(queue.pop(), Ok(1));
//! ```

use std::fmt;
use std::mem;
use std::ptr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, trace};

use crate::error::QueueError;

/// Circular storage plus the index pair. Only ever touched under the lock.
///
/// Occupied slots are `Some`, vacated slots are `None`.
#[derive(Clone)]
struct Ring<T> {
    slots: Box<[Option<T>]>,
    head: usize,
    tail: usize,
    len: usize,
}

impl<T> Ring<T> {
    fn with_capacity(capacity: usize) -> Self {
        Ring {
            slots: (0..capacity).map(|_| None).collect(),
            head: 0,
            // the first push advances tail onto slot 0
            tail: capacity - 1,
            len: 0,
        }
    }

    /// State left behind in a moved-from queue: no storage at all.
    fn detached() -> Self {
        Ring {
            slots: Box::new([]),
            head: 0,
            tail: 0,
            len: 0,
        }
    }

    #[inline(always)]
    fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline(always)]
    fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    #[inline(always)]
    fn increase(&self, i: usize) -> usize {
        (i + 1) % self.capacity()
    }

    fn push(&mut self, item: T) -> Result<(), T> {
        // also covers the detached ring, so increase() never sees capacity 0
        if self.is_full() {
            return Err(item);
        }
        self.tail = self.increase(self.tail);
        self.slots[self.tail] = Some(item);
        self.len += 1;
        Ok(())
    }

    fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        let item = self.slots[self.head].take();
        debug_assert!(item.is_some(), "occupied slot {} was vacant", self.head);
        self.head = self.increase(self.head);
        self.len -= 1;
        item
    }

    fn front(&self) -> Option<&T> {
        if self.len == 0 {
            return None;
        }
        self.slots[self.head].as_ref()
    }

    fn back(&self) -> Option<&T> {
        if self.len == 0 {
            return None;
        }
        self.slots[self.tail].as_ref()
    }

    fn drain(&mut self) -> Vec<T> {
        let mut items = Vec::with_capacity(self.len);
        while let Some(item) = self.pop() {
            items.push(item);
        }
        items
    }
}

/// A bounded, thread-safe FIFO ring buffer.
///
/// Share it between threads with `Arc<BoundedQueue<T>>`; all operations take
/// `&self`. Values are handed back by value, so nothing returned by the queue
/// aliases its internal storage.
///
/// `empty`/`full` style checks followed by `push`/`pop` are two separate
/// operations. Callers that need check-and-act must branch on the
/// `Result` of `push`/`pop` instead.
pub struct BoundedQueue<T> {
    ring: Mutex<Ring<T>>,
}

impl<T> BoundedQueue<T> {
    /// Allocates storage for exactly `capacity` items.
    ///
    /// Fails with [`QueueError::InvalidCapacity`] when `capacity` is 0.
    pub fn new(capacity: usize) -> Result<Self, QueueError> {
        if capacity == 0 {
            return Err(QueueError::InvalidCapacity);
        }
        debug!("new bounded queue, capacity: {}", capacity);
        Ok(BoundedQueue {
            ring: Mutex::new(Ring::with_capacity(capacity)),
        })
    }

    // The ring is consistent whenever the lock is released, even by a
    // panicking closure or `Clone` impl, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, Ring<T>> {
        self.ring.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Locks `self` and `other` in address order, so two threads assigning
    /// between the same pair in opposite directions cannot deadlock.
    ///
    /// Returns the guards as `(self, other)`. The two queues must be distinct.
    fn lock_pair<'a>(
        &'a self,
        other: &'a Self,
    ) -> (MutexGuard<'a, Ring<T>>, MutexGuard<'a, Ring<T>>) {
        debug_assert!(!ptr::eq(self, other));
        if (self as *const Self) < (other as *const Self) {
            let mine = self.lock();
            let theirs = other.lock();
            (mine, theirs)
        } else {
            let theirs = other.lock();
            let mine = self.lock();
            (mine, theirs)
        }
    }

    /// Number of items currently queued.
    pub fn len(&self) -> usize {
        self.lock().len
    }

    /// Maximum number of items. 0 only for a queue whose storage was moved out.
    pub fn capacity(&self) -> usize {
        self.lock().capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().len == 0
    }

    pub fn is_full(&self) -> bool {
        self.lock().is_full()
    }

    /// Enqueues `item`, handing it back if the queue is full.
    pub fn try_push(&self, item: T) -> Result<(), T> {
        let mut ring = self.lock();
        match ring.push(item) {
            Ok(()) => Ok(()),
            Err(item) => {
                trace!("push rejected, queue full at {}", ring.capacity());
                Err(item)
            }
        }
    }

    /// Enqueues `item`. On [`QueueError::Full`] the item is dropped and the
    /// queue is unchanged.
    pub fn push(&self, item: T) -> Result<(), QueueError> {
        self.try_push(item).map_err(|_| QueueError::Full)
    }

    /// Enqueues a clone of `item`.
    pub fn push_cloned(&self, item: &T) -> Result<(), QueueError>
    where
        T: Clone,
    {
        let mut ring = self.lock();
        if ring.is_full() {
            trace!("push rejected, queue full at {}", ring.capacity());
            return Err(QueueError::Full);
        }
        ring.push(item.clone()).map_err(|_| QueueError::Full)
    }

    /// Removes and returns the oldest item.
    pub fn pop(&self) -> Result<T, QueueError> {
        let mut ring = self.lock();
        match ring.pop() {
            Some(item) => Ok(item),
            None => {
                trace!("pop rejected, queue empty");
                Err(QueueError::Empty)
            }
        }
    }

    /// Removes every queued item in FIFO order under one lock acquisition.
    pub fn drain(&self) -> Vec<T> {
        self.lock().drain()
    }

    /// Runs `f` on the oldest item while the lock is held.
    pub fn peek_front_with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R, QueueError> {
        let ring = self.lock();
        ring.front().map(f).ok_or(QueueError::Empty)
    }

    /// Runs `f` on the newest item while the lock is held.
    pub fn peek_back_with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R, QueueError> {
        let ring = self.lock();
        ring.back().map(f).ok_or(QueueError::Empty)
    }

    /// Returns a copy of the oldest item without removing it.
    pub fn peek_front(&self) -> Result<T, QueueError>
    where
        T: Clone,
    {
        self.peek_front_with(T::clone)
    }

    /// Returns a copy of the newest item without removing it.
    pub fn peek_back(&self) -> Result<T, QueueError>
    where
        T: Clone,
    {
        self.peek_back_with(T::clone)
    }

    /// Replaces this queue's contents and capacity with a deep copy of
    /// `source`, holding both locks for the duration. Assigning a queue to
    /// itself does nothing.
    pub fn assign_from(&self, source: &Self)
    where
        T: Clone,
    {
        if ptr::eq(self, source) {
            return;
        }
        let (mut mine, theirs) = self.lock_pair(source);
        let copy = (*theirs).clone();
        let stale = mem::replace(&mut *mine, copy);
        drop(theirs);
        drop(mine);
        // old items are dropped outside both locks
        drop(stale);
    }

    /// Moves the storage out of `source` into this queue in O(1), holding
    /// both locks. `source` is left detached: capacity 0, nothing queued, no
    /// storage. Moving a queue into itself does nothing.
    pub fn move_from(&self, source: &Self) {
        if ptr::eq(self, source) {
            return;
        }
        let (mut mine, mut theirs) = self.lock_pair(source);
        let moved = mem::replace(&mut *theirs, Ring::detached());
        let stale = mem::replace(&mut *mine, moved);
        debug!(
            "moved bounded queue storage, capacity: {}, len: {}",
            mine.capacity(),
            mine.len
        );
        drop(theirs);
        drop(mine);
        drop(stale);
    }

    /// Moves the storage out of a shared queue into a new one in O(1),
    /// leaving `self` detached the same way [`move_from`](Self::move_from) does.
    pub fn take(&self) -> Self {
        let ring = mem::replace(&mut *self.lock(), Ring::detached());
        debug!(
            "took bounded queue storage, capacity: {}, len: {}",
            ring.capacity(),
            ring.len
        );
        BoundedQueue {
            ring: Mutex::new(ring),
        }
    }
}

impl<T: Clone> Clone for BoundedQueue<T> {
    /// Deep copy taken under the source's lock, so a concurrent mutation of
    /// the source is never observed half-applied.
    fn clone(&self) -> Self {
        let ring = (*self.lock()).clone();
        BoundedQueue {
            ring: Mutex::new(ring),
        }
    }

    fn clone_from(&mut self, source: &Self) {
        // &mut self already excludes every other user of this queue
        let copy = (*source.lock()).clone();
        *self.ring.get_mut().unwrap_or_else(PoisonError::into_inner) = copy;
    }
}

impl<T> fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ring = self.lock();
        f.debug_struct("BoundedQueue")
            .field("len", &ring.len)
            .field("capacity", &ring.capacity())
            .finish()
    }
}
