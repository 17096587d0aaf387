//! Auto-growing circular FIFO.
//!
//! The scheduler peeks, dequeues and re-enqueues on every tick, so both ends must be O(1).
//! Capacity doubles when full; live elements are compacted to the start of the new buffer.

use crate::error::{LoomError, Result};

const DEFAULT_CAPACITY: usize = 4;

#[derive(Debug, Clone)]
pub struct RingQueue<T> {
    slots: Vec<Option<T>>,
    front: usize,
    len: usize,
}

impl<T> Default for RingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RingQueue<T> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// A capacity of zero is bumped to one so growth by doubling always makes progress.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: std::iter::repeat_with(|| None).take(capacity).collect(),
            front: 0,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    pub fn enqueue(&mut self, value: T) {
        if self.is_full() {
            self.grow();
        }
        let rear = (self.front + self.len) % self.capacity();
        self.slots[rear] = Some(value);
        self.len += 1;
    }

    pub fn dequeue(&mut self) -> Result<T> {
        if self.is_empty() {
            return Err(LoomError::EmptyQueue);
        }
        let value = self.slots[self.front].take().ok_or(LoomError::EmptyQueue)?;
        self.front = (self.front + 1) % self.capacity();
        self.len -= 1;
        Ok(value)
    }

    pub fn peek(&self) -> Option<&T> {
        if self.is_empty() {
            return None;
        }
        self.slots[self.front].as_ref()
    }

    pub fn peek_mut(&mut self) -> Option<&mut T> {
        if self.is_empty() {
            return None;
        }
        self.slots[self.front].as_mut()
    }

    /// Remove everything, front to back.
    pub fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
        std::iter::from_fn(move || self.dequeue().ok())
    }

    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            queue: self,
            index: 0,
        }
    }

    fn grow(&mut self) {
        let old_capacity = self.capacity();
        let mut slots: Vec<Option<T>> = std::iter::repeat_with(|| None).take(old_capacity * 2).collect();
        for (i, slot) in slots.iter_mut().take(self.len).enumerate() {
            *slot = self.slots[(self.front + i) % old_capacity].take();
        }
        self.slots = slots;
        self.front = 0;
    }
}

/// Front-to-back iterator over a [`RingQueue`].
pub struct Iter<'a, T> {
    queue: &'a RingQueue<T>,
    index: usize,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.queue.len {
            return None;
        }
        let slot = (self.queue.front + self.index) % self.queue.capacity();
        self.index += 1;
        self.queue.slots[slot].as_ref()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.queue.len - self.index;
        (remaining, Some(remaining))
    }
}

impl<'a, T> IntoIterator for &'a RingQueue<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T> FromIterator<T> for RingQueue<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut queue = RingQueue::new();
        for value in iter {
            queue.enqueue(value);
        }
        queue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order_across_resize() {
        for k in [0, 1, 3, 4, 5, 17, 100] {
            let mut queue = RingQueue::new();
            for i in 0..k {
                queue.enqueue(i);
            }
            assert_eq!(queue.len(), k);
            let out: Vec<usize> = (0..k).map(|_| queue.dequeue().unwrap()).collect();
            assert_eq!(out, (0..k).collect::<Vec<_>>());
            assert!(queue.is_empty());
        }
    }

    #[test]
    fn test_dequeue_empty_fails() {
        let mut queue: RingQueue<u8> = RingQueue::new();
        assert!(matches!(queue.dequeue(), Err(LoomError::EmptyQueue)));
    }

    #[test]
    fn test_resize_with_wrapped_front() {
        let mut queue = RingQueue::with_capacity(4);
        for i in 0..4 {
            queue.enqueue(i);
        }
        assert_eq!(queue.dequeue().unwrap(), 0);
        assert_eq!(queue.dequeue().unwrap(), 1);
        queue.enqueue(4);
        queue.enqueue(5);
        // Full and wrapped; the next enqueue grows.
        assert!(queue.is_full());
        queue.enqueue(6);
        assert_eq!(queue.capacity(), 8);
        assert_eq!(queue.iter().copied().collect::<Vec<_>>(), vec![2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_peek_does_not_mutate() {
        let mut queue = RingQueue::new();
        assert!(queue.peek().is_none());
        queue.enqueue("a");
        queue.enqueue("b");
        assert_eq!(queue.peek(), Some(&"a"));
        assert_eq!(queue.peek(), Some(&"a"));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_peek_mut_updates_front() {
        let mut queue: RingQueue<u32> = vec![1, 2].into_iter().collect();
        if let Some(front) = queue.peek_mut() {
            *front += 10;
        }
        assert_eq!(queue.dequeue().unwrap(), 11);
    }

    #[test]
    fn test_interleaved_requeue() {
        let mut queue: RingQueue<u32> = (0..3).collect();
        for _ in 0..10 {
            let v = queue.dequeue().unwrap();
            queue.enqueue(v);
        }
        assert_eq!(queue.iter().copied().collect::<Vec<_>>(), vec![1, 2, 0]);
        assert_eq!(queue.capacity(), 4);
    }

    #[test]
    fn test_drain_empties_in_order() {
        let mut queue: RingQueue<u32> = (0..6).collect();
        let drained: Vec<u32> = queue.drain().collect();
        assert_eq!(drained, vec![0, 1, 2, 3, 4, 5]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_zero_capacity_grows() {
        let mut queue = RingQueue::with_capacity(0);
        queue.enqueue(1);
        queue.enqueue(2);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dequeue().unwrap(), 1);
    }
}
