//! A mutex-guarded FIFO queue.
//!
//! The source this crate was distilled from carries a FIFO queue
//! annotated "to be replaced" in its own comments: a doubly linked list
//! behind a single lock. This module keeps that shape rather than
//! promoting it into a lock-free structure -- doing so is a distinct
//! design exercise from the skip list's, and not one this crate's
//! reclamation core was asked to support. Treat this as a stand-in, not
//! a reference lock-free queue.

use std::collections::VecDeque;
use std::sync::Mutex;

pub struct StubFifo<T> {
    items: Mutex<VecDeque<T>>,
}

impl<T> StubFifo<T> {
    pub fn new() -> StubFifo<T> {
        StubFifo {
            items: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push(&self, item: T) {
        self.items.lock().unwrap().push_back(item);
    }

    pub fn pop(&self) -> Option<T> {
        self.items.lock().unwrap().pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().unwrap().is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }
}

impl<T> Default for StubFifo<T> {
    fn default() -> StubFifo<T> {
        StubFifo::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fifo_order_preserved() {
        let q = StubFifo::new();
        q.push(1);
        q.push(2);
        q.push(3);
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.pop(), Some(3));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn empty_queue_reports_empty() {
        let q: StubFifo<u32> = StubFifo::new();
        assert!(q.is_empty());
        q.push(0);
        assert!(!q.is_empty());
        assert_eq!(q.len(), 1);
    }
}
