use std::alloc::Layout;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering};
use std::sync::{OnceLock, RwLock};

use log::{error, trace};

use crate::collector::chunk::{Chunk, ChunkStack};
use crate::collector::hooks::HookTable;
use crate::collector::thread::ThreadRecord;
use crate::mem::CachePadded;

pub struct SizeClass {
    pub block_size: usize,
    pub tag: String,
    pub shared_filled: ChunkStack,
    pub refill_count: AtomicUsize,
}

impl SizeClass {
    fn new(block_size: usize, tag: String) -> SizeClass {
        let class = SizeClass {
            block_size,
            tag,
            shared_filled: ChunkStack::new(),
            refill_count: AtomicUsize::new(crate::collector::ALLOC_CHUNKS_PER_LIST),
        };
        class.grow(crate::collector::ALLOC_CHUNKS_PER_LIST);
        class
    }

    /// Builds `n` freshly allocated, fully packed chunks and pushes them
    /// onto the shared chain. Called at registration time, and again by
    /// `Handle::alloc` on a total miss.
    pub fn grow(&self, n: usize) {
        let layout = Layout::array::<u8>(self.block_size.max(1)).unwrap();
        for _ in 0..n {
            let mut chunk = Chunk::new_empty();
            while !chunk.is_full() {
                let block = unsafe { std::alloc::alloc(layout) };
                if block.is_null() {
                    error!("epoch-reclaim: out of memory allocating size class '{}'", self.tag);
                    std::process::abort();
                }
                chunk.push(block);
            }
            self.shared_filled.push(chunk);
        }
        trace!(
            "epoch-reclaim: grew size class '{}' by {} chunks ({} bytes/block)",
            self.tag,
            n,
            self.block_size
        );
    }
}

/// Process-visible (but not process-global -- see `Collector`) reclamation
/// state: the current epoch, the single-reclaimer guard, the registered
/// size classes and hooks, the thread registry, and the shared empty-chunk
/// pool. Segregated onto separate cache lines the way the reference
/// allocator's `gc_global_st` lays its hot fields out.
pub(crate) struct GlobalState {
    pub current: CachePadded<AtomicUsize>,
    pub in_reclaim: CachePadded<AtomicBool>,
    pub size_classes: CachePadded<RwLock<Vec<SizeClass>>>,
    pub hooks: CachePadded<RwLock<HookTable>>,
    pub thread_list: CachePadded<AtomicPtr<ThreadRecord>>,
    /// Size classes for the skip list's per-level forward-pointer arrays,
    /// registered once no matter how many `SkipMap`s share this collector.
    pub skiplist_levels: OnceLock<Vec<usize>>,
    pub yield_to_help_progress: bool,
}

impl GlobalState {
    pub fn new(yield_to_help_progress: bool) -> GlobalState {
        GlobalState {
            current: CachePadded::new(AtomicUsize::new(0)),
            in_reclaim: CachePadded::new(AtomicBool::new(false)),
            size_classes: CachePadded::new(RwLock::new(Vec::new())),
            hooks: CachePadded::new(RwLock::new(HookTable::new())),
            thread_list: CachePadded::new(AtomicPtr::new(ptr::null_mut())),
            skiplist_levels: OnceLock::new(),
            yield_to_help_progress,
        }
    }

    pub fn register_size_class(&self, block_size: usize, tag: &str) -> usize {
        let mut classes = self.size_classes.write().unwrap();
        if classes.len() >= crate::collector::MAX_SIZES {
            error!(
                "epoch-reclaim: exceeded MAX_SIZES ({}) registering size class '{}'",
                crate::collector::MAX_SIZES,
                tag
            );
            std::process::abort();
        }
        classes.push(SizeClass::new(block_size, tag.to_owned()));
        classes.len() - 1
    }
}

impl Drop for GlobalState {
    fn drop(&mut self) {
        // Thread records are intentionally never unlinked while the
        // collector is live (see thread.rs); reclaim them here, once,
        // since nothing can observe the registry after this point.
        let mut cur = self.thread_list.load(Ordering::Relaxed);
        while !cur.is_null() {
            let boxed = unsafe { Box::from_raw(cur) };
            cur = boxed.next.load(Ordering::Relaxed);
        }
    }
}
