//! Chunked storage for retired and free pointers.
//!
//! A `Chunk` is a fixed-capacity array of `*mut u8` blocks, the unit the
//! reclamation core moves around instead of individual pointers -- this is
//! what keeps bulk retirement and refill down to a handful of pointer-chases
//! instead of one per block. `ChunkList` is an owner-thread-only LIFO chain
//! of chunks (a thread's local allocation cache, or its per-epoch retirement
//! queue). `ChunkStack` is the lock-free, multi-producer/multi-consumer
//! version used for the pools shared across threads: each size class's
//! filled-chunk chain, and the global empty-chunk pool.

use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

/// Blocks per chunk. Matches the reference allocator's fixed chunk width.
pub const BLKS_PER_CHUNK: usize = 100;

pub struct Chunk {
    slots: [*mut u8; BLKS_PER_CHUNK],
    count: usize,
    next: *mut Chunk,
}

unsafe impl Send for Chunk {}

impl Chunk {
    pub fn new_empty() -> Box<Chunk> {
        Box::new(Chunk {
            slots: [ptr::null_mut(); BLKS_PER_CHUNK],
            count: 0,
            next: ptr::null_mut(),
        })
    }

    pub fn is_full(&self) -> bool {
        self.count == BLKS_PER_CHUNK
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Pushes a block in. Caller must check `is_full` first.
    pub fn push(&mut self, block: *mut u8) {
        debug_assert!(!self.is_full());
        self.slots[self.count] = block;
        self.count += 1;
    }

    pub fn pop(&mut self) -> Option<*mut u8> {
        if self.count == 0 {
            None
        } else {
            self.count -= 1;
            Some(self.slots[self.count])
        }
    }
}

/// An owner-thread-only LIFO chain of chunks.
///
/// Used for a thread's private allocation cache and for its per-(epoch,
/// size class) retirement queues. Never touched concurrently by another
/// thread except during `reclaim`, which only ever reaches into a
/// generation that every live thread has already stopped writing to.
pub struct ChunkList {
    head: Option<Box<Chunk>>,
}

impl ChunkList {
    pub const fn new() -> ChunkList {
        ChunkList { head: None }
    }

    pub fn push_chunk(&mut self, mut chunk: Box<Chunk>) {
        chunk.next = self.head.take().map_or(ptr::null_mut(), |b| Box::into_raw(b));
        self.head = Some(chunk);
    }

    pub fn pop_chunk(&mut self) -> Option<Box<Chunk>> {
        let mut chunk = self.head.take()?;
        let next = chunk.next;
        chunk.next = ptr::null_mut();
        self.head = if next.is_null() {
            None
        } else {
            Some(unsafe { Box::from_raw(next) })
        };
        Some(chunk)
    }

    /// Pushes a block, allocating a new chunk from `spare` if the front
    /// chunk is full or absent.
    pub fn push(&mut self, block: *mut u8, spare: impl FnOnce() -> Box<Chunk>) {
        if self.head.as_ref().map_or(true, |c| c.is_full()) {
            self.push_chunk(spare());
        }
        self.head.as_mut().unwrap().push(block);
    }

    pub fn pop(&mut self) -> Option<*mut u8> {
        loop {
            let front = self.head.as_mut()?;
            if let Some(b) = front.pop() {
                return Some(b);
            }
            // front chunk exhausted; drop it and retry with the next one.
            self.pop_chunk();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Drains every chunk into `dest`, leaving this list empty. Used when
    /// migrating a generation's worth of retired blocks into a shared pool.
    pub fn drain_into(&mut self, dest: &ChunkStack) {
        while let Some(chunk) = self.pop_chunk() {
            dest.push(chunk);
        }
    }

    /// Replaces the contents of this list with an empty one, returning what
    /// was there. Used by the reclaimer to take ownership of a quiescent
    /// generation's worth of garbage from another thread's record.
    pub fn take(&mut self) -> ChunkList {
        ChunkList { head: self.head.take() }
    }
}

impl Default for ChunkList {
    fn default() -> ChunkList {
        ChunkList::new()
    }
}

/// A lock-free Treiber stack of chunks, shared across threads.
pub struct ChunkStack {
    head: AtomicPtr<Chunk>,
}

impl ChunkStack {
    pub const fn new() -> ChunkStack {
        ChunkStack { head: AtomicPtr::new(ptr::null_mut()) }
    }

    pub fn push(&self, mut chunk: Box<Chunk>) {
        let raw = loop {
            let head = self.head.load(Ordering::Relaxed);
            chunk.next = head;
            let raw = Box::into_raw(chunk);
            match self.head.compare_exchange_weak(head, raw, Ordering::Release, Ordering::Relaxed) {
                Ok(_) => break raw,
                Err(_) => chunk = unsafe { Box::from_raw(raw) },
            }
        };
        let _ = raw;
    }

    pub fn pop(&self) -> Option<Box<Chunk>> {
        loop {
            let head = self.head.load(Ordering::Acquire);
            if head.is_null() {
                return None;
            }
            let next = unsafe { (*head).next };
            if self
                .head
                .compare_exchange_weak(head, next, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                let mut chunk = unsafe { Box::from_raw(head) };
                chunk.next = ptr::null_mut();
                return Some(chunk);
            }
        }
    }
}

impl Drop for ChunkStack {
    fn drop(&mut self) {
        while self.pop().is_some() {}
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn chunk_list_push_pop_roundtrip() {
        let mut list = ChunkList::new();
        let mut marker = 0u8;
        for _ in 0..(BLKS_PER_CHUNK * 3 + 7) {
            list.push(&mut marker as *mut u8, Chunk::new_empty);
        }
        let mut count = 0;
        while list.pop().is_some() {
            count += 1;
        }
        assert_eq!(count, BLKS_PER_CHUNK * 3 + 7);
        assert!(list.is_empty());
    }

    #[test]
    fn chunk_stack_push_pop() {
        let stack = ChunkStack::new();
        stack.push(Chunk::new_empty());
        stack.push(Chunk::new_empty());
        assert!(stack.pop().is_some());
        assert!(stack.pop().is_some());
        assert!(stack.pop().is_none());
    }
}
