//! Low-level utilities shared by the reclamation core and the skip list.

use std::ops::{Deref, DerefMut};

/// Pads and aligns a value to the width of a cache line, so that it does not
/// share a line with neighboring fields that are written by other threads.
///
/// Used throughout the global and per-thread reclamation state to keep the
/// epoch counter, the reclaim guard, and the allocator chains from
/// false-sharing with each other.
#[repr(align(64))]
pub struct CachePadded<T> {
    value: T,
}

unsafe impl<T: Send> Send for CachePadded<T> {}
unsafe impl<T: Sync> Sync for CachePadded<T> {}

impl<T> CachePadded<T> {
    pub fn new(value: T) -> CachePadded<T> {
        CachePadded { value }
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T> Deref for CachePadded<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for CachePadded<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T: Default> Default for CachePadded<T> {
    fn default() -> Self {
        CachePadded::new(T::default())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::mem::{align_of, size_of};

    #[test]
    fn pads_to_cache_line() {
        assert_eq!(align_of::<CachePadded<u8>>(), 64);
        assert!(size_of::<CachePadded<u8>>() >= 64);
    }

    #[test]
    fn derefs_to_inner() {
        let p = CachePadded::new(41);
        assert_eq!(*p, 41);
    }
}
