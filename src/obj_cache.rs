//! A thin typed facade over the reclamation core's raw chunk allocator.
//!
//! Registers one size class per call to [`ObjCache::new`], reserving an
//! extra word per block for future metadata -- matching the reference
//! allocator's `size + sizeof(void*)` accounting. There's no destructor:
//! a registered size class lives as long as its collector, the same
//! no-remove policy the reclamation core applies to its thread registry.
//!
//! The reference implementation this was distilled from called its
//! underlying allocator twice per `obj_cache_alloc` -- once directly and
//! once more through the critical-section helper it had just invoked.
//! Nothing downstream frees a matching second block, so that's treated
//! here as a merge artifact rather than a feature; `alloc`/`alloc_critical`
//! each allocate exactly once. See DESIGN.md.

use crate::collector::{Collector, Handle};

/// A size class drawn from a [`Collector`], with `alloc`/`free` convenience
/// methods that enter and exit their own critical section.
pub struct ObjCache {
    collector: Collector,
    size_class: usize,
}

impl ObjCache {
    /// Registers a class of `size`-byte objects (plus one reserved word).
    pub fn new(collector: &Collector, size: usize, tag: &str) -> ObjCache {
        let block_size = size + std::mem::size_of::<usize>();
        ObjCache {
            collector: collector.clone(),
            size_class: collector.register_size_class(block_size, tag),
        }
    }

    /// Allocates a block, entering and exiting a critical section for the
    /// call. Prefer [`ObjCache::alloc_critical`] in a tight loop that
    /// already holds a `Handle`.
    pub fn alloc(&self) -> *mut u8 {
        let handle = self.collector.enter();
        self.alloc_critical(&handle)
    }

    /// Allocates a block using an already-entered critical section.
    pub fn alloc_critical(&self, handle: &Handle) -> *mut u8 {
        handle.alloc(self.size_class)
    }

    /// Frees a block, entering and exiting a critical section for the call.
    pub fn free(&self, ptr: *mut u8) {
        let handle = self.collector.enter();
        self.free_critical(&handle, ptr);
    }

    /// Frees a block using an already-entered critical section. The block
    /// becomes reusable only once the epoch has advanced past any reader
    /// that might still hold it.
    pub fn free_critical(&self, handle: &Handle, ptr: *mut u8) {
        handle.free(self.size_class, ptr);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn alloc_free_roundtrip() {
        let collector = Collector::new();
        let cache = ObjCache::new(&collector, 24, "widgets");
        let block = cache.alloc();
        assert!(!block.is_null());
        cache.free(block);
    }

    #[test]
    fn critical_variants_reuse_a_held_handle() {
        let collector = Collector::new();
        let cache = ObjCache::new(&collector, 8, "ints");
        let handle = collector.enter();
        let a = cache.alloc_critical(&handle);
        let b = cache.alloc_critical(&handle);
        assert_ne!(a, b);
        cache.free_critical(&handle, a);
        cache.free_critical(&handle, b);
    }

    #[test]
    fn distinct_caches_get_distinct_size_classes() {
        let collector = Collector::new();
        let small = ObjCache::new(&collector, 8, "small");
        let large = ObjCache::new(&collector, 256, "large");
        assert_ne!(small.size_class, large.size_class);
    }
}
