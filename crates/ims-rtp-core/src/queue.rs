//! Generic ordered data queue shared by the jitter buffers and pipeline
//! nodes. Backed by a `parking_lot::Mutex<VecDeque<T>>`; all mutation is
//! serialized through the lock, and iteration is caller-driven via an
//! internal read cursor rather than handing out an iterator, so the queue
//! can be walked across multiple calls without holding the lock open.

use std::collections::VecDeque;

use parking_lot::Mutex;

struct Inner<T> {
    items: VecDeque<T>,
    read_pos: usize,
}

/// Thread-safe FIFO with positional access and a resettable read cursor.
pub struct DataQueue<T> {
    inner: Mutex<Inner<T>>,
}

impl<T> DataQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner { items: VecDeque::new(), read_pos: 0 }),
        }
    }

    /// Appends an item to the back of the queue.
    pub fn add(&self, item: T) {
        self.inner.lock().items.push_back(item);
    }

    /// Inserts an item at `index`, shifting later items back by one.
    /// Clamps to the end if `index` is past the current length.
    pub fn insert_at(&self, index: usize, item: T) {
        let mut guard = self.inner.lock();
        let idx = index.min(guard.items.len());
        guard.items.insert(idx, item);
    }

    /// Returns the element at `index`, if present.
    pub fn get_at(&self, index: usize) -> Option<T>
    where
        T: Clone,
    {
        self.inner.lock().items.get(index).cloned()
    }

    /// Removes and returns the item at the front of the queue.
    pub fn get(&self) -> Option<T> {
        self.inner.lock().items.pop_front()
    }

    /// Returns a clone of the last (most recently added) item without
    /// removing it.
    pub fn get_last(&self) -> Option<T>
    where
        T: Clone,
    {
        self.inner.lock().items.back().cloned()
    }

    /// Removes and returns the item at `index`.
    pub fn delete(&self, index: usize) -> Option<T> {
        self.inner.lock().items.remove(index)
    }

    /// Drops all queued items and resets the read cursor.
    pub fn clear(&self) {
        let mut guard = self.inner.lock();
        guard.items.clear();
        guard.read_pos = 0;
    }

    pub fn count(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Rewinds the internal read cursor to the front of the queue.
    pub fn set_read_pos_first(&self) {
        self.inner.lock().read_pos = 0;
    }

    /// Returns a clone of the item at the current read cursor and advances
    /// it, or `None` once the cursor reaches the end. Items are not removed
    /// from the queue; pair with `delete`/`clear` to reclaim space.
    pub fn get_next(&self) -> Option<T>
    where
        T: Clone,
    {
        let mut guard = self.inner.lock();
        let pos = guard.read_pos;
        let item = guard.items.get(pos).cloned();
        if item.is_some() {
            guard.read_pos += 1;
        }
        item
    }
}

impl<T> Default for DataQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order_preserved() {
        let q: DataQueue<u32> = DataQueue::new();
        q.add(1);
        q.add(2);
        q.add(3);
        assert_eq!(q.count(), 3);
        assert_eq!(q.get(), Some(1));
        assert_eq!(q.get(), Some(2));
        assert_eq!(q.get(), Some(3));
        assert_eq!(q.get(), None);
    }

    #[test]
    fn insert_at_shifts_remaining_items() {
        let q: DataQueue<&str> = DataQueue::new();
        q.add("a");
        q.add("c");
        q.insert_at(1, "b");
        assert_eq!(q.get_at(0), Some("a"));
        assert_eq!(q.get_at(1), Some("b"));
        assert_eq!(q.get_at(2), Some("c"));
    }

    #[test]
    fn read_cursor_is_independent_of_destructive_reads() {
        let q: DataQueue<u32> = DataQueue::new();
        q.add(10);
        q.add(20);
        q.add(30);

        q.set_read_pos_first();
        assert_eq!(q.get_next(), Some(10));
        assert_eq!(q.get_next(), Some(20));
        assert_eq!(q.get_next(), Some(30));
        assert_eq!(q.get_next(), None);

        // Queue contents are untouched by get_next.
        assert_eq!(q.count(), 3);

        q.set_read_pos_first();
        assert_eq!(q.get_next(), Some(10));
    }

    #[test]
    fn clear_resets_cursor_and_contents() {
        let q: DataQueue<u32> = DataQueue::new();
        q.add(1);
        q.add(2);
        q.get_next();
        q.clear();
        assert_eq!(q.count(), 0);
        assert_eq!(q.get_next(), None);
    }

    #[test]
    fn get_last_does_not_remove() {
        let q: DataQueue<u32> = DataQueue::new();
        q.add(1);
        q.add(2);
        assert_eq!(q.get_last(), Some(2));
        assert_eq!(q.count(), 2);
    }

    #[test]
    fn delete_removes_by_index() {
        let q: DataQueue<u32> = DataQueue::new();
        q.add(1);
        q.add(2);
        q.add(3);
        assert_eq!(q.delete(1), Some(2));
        assert_eq!(q.count(), 2);
        assert_eq!(q.get_at(1), Some(3));
    }
}
