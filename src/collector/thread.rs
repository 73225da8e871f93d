//! Per-thread reclamation state and the critical-section `Handle`.
//!
//! The thread registry is append-only: a thread that exits never unlinks
//! its record, it only zeroes `count` so a later thread can claim the slot.
//! This mirrors the reference allocator's `ptst_destructor`, not the
//! participant-list iterator this crate's ancestor used (that variant
//! physically unlinks and frees inactive nodes while walking the list;
//! see DESIGN.md for why that design was not carried forward here).

use std::cell::UnsafeCell;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};
use std::sync::Arc;

use log::{error, trace, warn};

use crate::collector::chunk::{Chunk, ChunkList};
use crate::collector::global::GlobalState;
use crate::collector::{local, ENTRIES_PER_RECLAIM_ATTEMPT, MAX_HOOKS, MAX_SIZES, NR_EPOCHS};
use crate::pointer::full_fence;

pub(crate) struct ThreadRecord {
    /// Critical-section nesting depth. `0` only while the slot is free for
    /// another thread to claim; a claimed, idle thread sits at `1`; nested
    /// `enter()` calls push it higher. See DESIGN.md for why the idle
    /// baseline is `1` rather than `0`.
    pub count: AtomicUsize,
    pub observed_epoch: AtomicUsize,
    entries_since_reclaim: AtomicUsize,
    garbage: [[UnsafeCell<ChunkList>; MAX_SIZES]; NR_EPOCHS],
    alloc_cache: [UnsafeCell<ChunkList>; MAX_SIZES],
    hook_payloads: [[UnsafeCell<Vec<*mut u8>>; MAX_HOOKS]; NR_EPOCHS],
    /// Type-erased `(pointer, drop glue)` pairs awaiting destruction once
    /// their epoch is safely behind every reader. Unlike `garbage`, these
    /// blocks came from the ordinary Rust allocator (`Box::new`), not a
    /// chunk pool, so they're dropped and freed rather than recycled.
    typed_garbage: [UnsafeCell<Vec<(*mut u8, unsafe fn(*mut u8))>>; NR_EPOCHS],
    rng: std::cell::Cell<u64>,
    pub next: AtomicPtr<ThreadRecord>,
}

unsafe impl Sync for ThreadRecord {}

impl ThreadRecord {
    fn new_claimed(seed: u64) -> ThreadRecord {
        ThreadRecord {
            count: AtomicUsize::new(1),
            observed_epoch: AtomicUsize::new(0),
            entries_since_reclaim: AtomicUsize::new(0),
            garbage: std::array::from_fn(|_| std::array::from_fn(|_| UnsafeCell::new(ChunkList::new()))),
            alloc_cache: std::array::from_fn(|_| UnsafeCell::new(ChunkList::new())),
            hook_payloads: std::array::from_fn(|_| std::array::from_fn(|_| UnsafeCell::new(Vec::new()))),
            typed_garbage: std::array::from_fn(|_| UnsafeCell::new(Vec::new())),
            rng: std::cell::Cell::new(seed | 1),
            next: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Next pseudo-random word, xorshift64*. Owner-thread-only.
    pub fn next_rand(&self) -> u64 {
        let mut x = self.rng.get();
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.rng.set(x);
        x
    }
}

pub(crate) fn claim_or_create_record(global: &GlobalState) -> *mut ThreadRecord {
    let mut cur = global.thread_list.load(Ordering::Acquire);
    while !cur.is_null() {
        let rec = unsafe { &*cur };
        if rec
            .count
            .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            rec.entries_since_reclaim.store(0, Ordering::Relaxed);
            return cur;
        }
        cur = rec.next.load(Ordering::Acquire);
    }

    let seed = (cur as u64).wrapping_add(0x9E3779B97F4A7C15) | 1;
    let rec = Box::into_raw(Box::new(ThreadRecord::new_claimed(seed)));
    loop {
        let head = global.thread_list.load(Ordering::Acquire);
        unsafe {
            (*rec).next.store(head, Ordering::Relaxed);
        }
        if global
            .thread_list
            .compare_exchange_weak(head, rec, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            return rec;
        }
    }
}

/// A critical section, and the allocation/retirement facade reachable while
/// inside one. Dropping it exits the section.
pub struct Handle {
    pub(crate) global: Arc<GlobalState>,
    pub(crate) record: *mut ThreadRecord,
}

unsafe impl Send for Handle {}

impl Handle {
    pub(crate) fn enter(global: Arc<GlobalState>) -> Handle {
        let rec_ptr = local::record_for(&global);
        loop {
            let rec = unsafe { &*rec_ptr };
            let prev = rec.count.fetch_add(1, Ordering::Relaxed);
            full_fence();

            if prev == 1 {
                let current = global.current.load(Ordering::Relaxed);
                if current != rec.observed_epoch.load(Ordering::Relaxed) {
                    rec.observed_epoch.store(current, Ordering::Relaxed);
                    rec.entries_since_reclaim.store(0, Ordering::Relaxed);
                } else {
                    let n = rec.entries_since_reclaim.fetch_add(1, Ordering::Relaxed);
                    if n >= ENTRIES_PER_RECLAIM_ATTEMPT {
                        rec.entries_since_reclaim.store(0, Ordering::Relaxed);
                        full_fence();
                        rec.count.fetch_sub(1, Ordering::Relaxed);
                        reclaim(&global);
                        continue;
                    }
                }
            }

            return Handle { global, record: rec_ptr };
        }
    }

    fn rec(&self) -> &ThreadRecord {
        unsafe { &*self.record }
    }

    pub fn next_rand(&self) -> u64 {
        self.rec().next_rand()
    }

    /// Allocates a block from the given size class.
    pub fn alloc(&self, size_class: usize) -> *mut u8 {
        let rec = self.rec();
        let local = unsafe { &mut *rec.alloc_cache[size_class].get() };
        if let Some(block) = local.pop() {
            return block;
        }

        let classes = self.global.size_classes.read().unwrap();
        let class = &classes[size_class];
        if let Some(chunk) = class.shared_filled.pop() {
            local.push_chunk(chunk);
            return local.pop().expect("refilled chunk must be non-empty");
        }

        // Shared pool is empty: grow it, by +12.5% of the last refill size
        // (the reference allocator's `get_alloc_chunk` growth rule), then
        // take the first freshly made chunk directly rather than round
        // tripping through the shared stack.
        let n = class.refill_count.load(Ordering::Relaxed);
        let grown = n + (n >> 3).max(1);
        class.refill_count.store(grown, Ordering::Relaxed);
        class.grow(grown);
        let chunk = class
            .shared_filled
            .pop()
            .expect("just grew this size class's shared pool");
        local.push_chunk(chunk);
        local.pop().expect("refilled chunk must be non-empty")
    }

    /// Retires a block: it becomes reusable only after the current epoch
    /// has safely advanced past any reader that might still hold it.
    pub fn free(&self, size_class: usize, ptr: *mut u8) {
        let rec = self.rec();
        let epoch = rec.observed_epoch.load(Ordering::Relaxed);
        let list = unsafe { &mut *rec.garbage[epoch][size_class].get() };
        list.push(ptr, Chunk::new_empty);
    }

    /// Frees a block that was never exposed to another thread: safe to
    /// reuse immediately, no epoch delay required.
    pub fn unsafe_free(&self, size_class: usize, ptr: *mut u8) {
        let rec = self.rec();
        let local = unsafe { &mut *rec.alloc_cache[size_class].get() };
        local.push(ptr, Chunk::new_empty);
    }

    /// Queues `ptr` for delivery to hook `hook_id`, two epochs from now.
    pub fn add_ptr_to_hook(&self, hook_id: usize, ptr: *mut u8) {
        let rec = self.rec();
        let epoch = rec.observed_epoch.load(Ordering::Relaxed);
        let payloads = unsafe { &mut *rec.hook_payloads[epoch][hook_id].get() };
        payloads.push(ptr);
    }

    /// Schedules `Box::from_raw(ptr)` to run, and its result to drop, once
    /// the current epoch has safely advanced. For values that own their own
    /// memory (allocated with `Box::new`, not drawn from a size class) and
    /// so need real destructors run rather than byte-block recycling.
    ///
    /// Safety: `ptr` must have come from `Box::into_raw` of a `Box<T>`, must
    /// not be reachable by any other thread by the time this is called, and
    /// must not be retired more than once.
    pub unsafe fn retire<T>(&self, ptr: *mut T) {
        unsafe fn drop_glue<T>(ptr: *mut u8) {
            drop(unsafe { Box::from_raw(ptr as *mut T) });
        }
        let rec = self.rec();
        let epoch = rec.observed_epoch.load(Ordering::Relaxed);
        let list = unsafe { &mut *rec.typed_garbage[epoch].get() };
        list.push((ptr as *mut u8, drop_glue::<T>));
    }
}

impl Clone for Handle {
    fn clone(&self) -> Handle {
        Handle::enter(self.global.clone())
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        full_fence();
        self.rec().count.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Attempts the single-reclaimer pass: recycles the generation three epochs
/// behind the current one and advances the epoch if every active thread has
/// observed it.
pub(crate) fn reclaim(global: &GlobalState) {
    if global
        .in_reclaim
        .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
        .is_err()
    {
        warn!("epoch-reclaim: skipping reclaim, another thread is already reclaiming");
        if global.yield_to_help_progress {
            std::thread::yield_now();
        }
        return;
    }

    let epoch = global.current.load(Ordering::Relaxed);
    let three_ago = (epoch + 1) % NR_EPOCHS;
    // The weakly-ordered variant also poisons `garbage[(epoch + 2) %
    // NR_EPOCHS]` here to force a fault in a straggling reader; not needed
    // when critical-section entry and exit both issue a full fence.

    let mut cur = global.thread_list.load(Ordering::Acquire);
    while !cur.is_null() {
        let rec = unsafe { &*cur };
        if rec.count.load(Ordering::Relaxed) > 1 && rec.observed_epoch.load(Ordering::Relaxed) != epoch {
            warn!("epoch-reclaim: skipping reclaim, a thread hasn't observed epoch {}", epoch);
            global.in_reclaim.store(false, Ordering::Release);
            if global.yield_to_help_progress {
                std::thread::yield_now();
            }
            return;
        }
        cur = rec.next.load(Ordering::Relaxed);
    }

    full_fence();

    let hooks = global.hooks.read().unwrap();
    let classes = global.size_classes.read().unwrap();
    let mut cur = global.thread_list.load(Ordering::Relaxed);
    while !cur.is_null() {
        let rec = unsafe { &*cur };

        for size_class in 0..classes.len() {
            let retired = unsafe { (*rec.garbage[three_ago][size_class].get()).take() };
            if !retired.is_empty() {
                retired.drain_into(&classes[size_class].shared_filled);
            }
        }

        for hook_id in 0..hooks.len() {
            let payloads = unsafe { &mut *rec.hook_payloads[three_ago][hook_id].get() };
            if !payloads.is_empty() {
                trace!("epoch-reclaim: dispatching {} payload(s) to hook {}", payloads.len(), hook_id);
            }
            for ptr in payloads.drain(..) {
                hooks.invoke(hook_id, ptr);
            }
        }

        let typed = unsafe { &mut *rec.typed_garbage[three_ago].get() };
        for (ptr, drop_fn) in typed.drain(..) {
            unsafe { drop_fn(ptr) };
        }

        cur = rec.next.load(Ordering::Relaxed);
    }
    drop(hooks);

    let next_epoch = (epoch + 1) % NR_EPOCHS;
    full_fence();
    global.current.store(next_epoch, Ordering::Release);
    trace!("epoch-reclaim: advanced epoch {} -> {}", epoch, next_epoch);

    if next_epoch == epoch {
        error!("epoch-reclaim: NR_EPOCHS must be greater than 1");
    }

    global.in_reclaim.store(false, Ordering::Release);
}
