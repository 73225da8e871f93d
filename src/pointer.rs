//! Atomic, nullable pointer types used to build the skip list's forward
//! links.
//!
//! These mirror `Box<T>`, `&'a T` and `AtomicPtr<T>`, but tie the lifetime of
//! a loaded reference to a `Guard` so that it cannot outlive the critical
//! section that produced it. They carry no opinion about how or when the
//! pointee is freed -- that's the reclamation core's job, reached through
//! `Handle::retire`.

use std::marker::PhantomData;
use std::mem;
use std::ops::{Deref, DerefMut};
use std::ptr;
use std::sync::atomic::{self, AtomicPtr, Ordering};

use crate::collector::Handle;

/// Like `Box<T>`: owned, heap-allocated data not yet published anywhere.
pub struct Owned<T> {
    data: Box<T>,
}

impl<T> Owned<T> {
    pub fn new(t: T) -> Owned<T> {
        Owned { data: Box::new(t) }
    }

    fn as_raw(&self) -> *mut T {
        self.deref() as *const _ as *mut _
    }

    pub fn into_inner(self) -> T {
        *self.data
    }
}

impl<T> Deref for Owned<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.data
    }
}

impl<T> DerefMut for Owned<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.data
    }
}

/// Like `&'a T`: a shared reference good for the lifetime of a `Guard`.
pub struct Shared<'a, T: 'a> {
    data: &'a T,
}

impl<'a, T> Copy for Shared<'a, T> {}
impl<'a, T> Clone for Shared<'a, T> {
    fn clone(&self) -> Shared<'a, T> {
        Shared { data: self.data }
    }
}

impl<'a, T> PartialEq for Shared<'a, T> {
    fn eq(&self, other: &Self) -> bool {
        self.as_raw() == other.as_raw()
    }
}
impl<'a, T> Eq for Shared<'a, T> {}

impl<'a, T> Deref for Shared<'a, T> {
    type Target = T;
    fn deref(&self) -> &T {
        self.data
    }
}

impl<'a, T> Shared<'a, T> {
    unsafe fn from_raw(raw: *mut T) -> Option<Shared<'a, T>> {
        if raw.is_null() {
            None
        } else {
            Some(Shared {
                data: &*raw,
            })
        }
    }

    unsafe fn from_owned(owned: Owned<T>) -> Shared<'a, T> {
        let ret = Shared { data: mem::transmute::<&T, &'a T>(owned.deref()) };
        mem::forget(owned);
        ret
    }

    pub fn as_raw(&self) -> *mut T {
        self.data as *const _ as *mut _
    }
}

/// Like `std::sync::atomic::AtomicPtr`, but the pointee is reclaimed through
/// the epoch collector rather than by `Drop`.
///
/// `#[repr(transparent)]` over a bare `AtomicPtr<T>` so a buffer of `Atomic<T>`
/// can be carved out of raw chunk-pool memory and initialized slot-by-slot,
/// the way the skip list's forward-pointer arrays are.
#[repr(transparent)]
pub struct Atomic<T> {
    ptr: AtomicPtr<T>,
    _marker: PhantomData<*const ()>,
}

unsafe impl<T: Sync> Send for Atomic<T> {}
unsafe impl<T: Sync> Sync for Atomic<T> {}

fn opt_shared_into_raw<T>(val: Option<Shared<T>>) -> *mut T {
    val.map(|p| p.as_raw()).unwrap_or(ptr::null_mut())
}

fn opt_owned_as_raw<T>(val: &Option<Owned<T>>) -> *mut T {
    val.as_ref().map(Owned::as_raw).unwrap_or(ptr::null_mut())
}

fn opt_owned_into_raw<T>(val: Option<Owned<T>>) -> *mut T {
    let ptr = opt_owned_as_raw(&val);
    mem::forget(val);
    ptr
}

impl<T> Atomic<T> {
    pub const fn null() -> Atomic<T> {
        Atomic {
            ptr: AtomicPtr::new(ptr::null_mut()),
            _marker: PhantomData,
        }
    }

    pub fn from_raw(raw: *mut T) -> Atomic<T> {
        Atomic {
            ptr: AtomicPtr::new(raw),
            _marker: PhantomData,
        }
    }

    /// Loads the pointer. Panics if `ord` is `Release` or `AcqRel`.
    pub fn load<'a>(&self, ord: Ordering, _: &'a Handle) -> Option<Shared<'a, T>> {
        unsafe { Shared::from_raw(self.ptr.load(ord)) }
    }

    /// Raw load bypassing the guard, used only where the caller separately
    /// guarantees the pointee cannot be reclaimed (e.g. the low-bit mark
    /// check on a pointer already protected by an outer load).
    pub fn load_raw(&self, ord: Ordering) -> *mut T {
        self.ptr.load(ord)
    }

    pub fn store(&self, val: Option<Owned<T>>, ord: Ordering) {
        self.ptr.store(opt_owned_into_raw(val), ord)
    }

    /// Raw store bypassing ownership tracking; paired with `load_raw` and
    /// `cas_raw` for the skip list's own mark-bit-tagged pointers.
    pub fn store_raw(&self, raw: *mut T, ord: Ordering) {
        self.ptr.store(raw, ord)
    }

    pub fn store_shared(&self, val: Option<Shared<T>>, ord: Ordering) {
        self.ptr.store(opt_shared_into_raw(val), ord)
    }

    pub fn store_and_ref<'a>(&self, val: Owned<T>, ord: Ordering, _: &'a Handle) -> Shared<'a, T> {
        unsafe {
            let shared = Shared::from_owned(val);
            self.store_shared(Some(shared), ord);
            shared
        }
    }

    /// CAS from a raw (possibly mark-bit-tagged) value to another raw value.
    /// Used directly by the skip list, which manages its own mark bit on top
    /// of these pointers.
    pub fn cas_raw(&self, old: *mut T, new: *mut T, ord: Ordering) -> Result<(), *mut T> {
        match self.ptr.compare_exchange(old, new, ord, Ordering::Relaxed) {
            Ok(_) => Ok(()),
            Err(found) => Err(found),
        }
    }

    pub fn cas(&self, old: Option<Shared<T>>, new: Option<Owned<T>>, ord: Ordering) -> Result<(), Option<Owned<T>>> {
        let old_raw = opt_shared_into_raw(old);
        match self.ptr.compare_exchange(old_raw, opt_owned_as_raw(&new), ord, Ordering::Relaxed) {
            Ok(_) => {
                mem::forget(new);
                Ok(())
            }
            Err(_) => Err(new),
        }
    }

    pub fn swap<'a>(&self, new: Option<Owned<T>>, ord: Ordering, _: &'a Handle) -> Option<Shared<'a, T>> {
        unsafe { Shared::from_raw(self.ptr.swap(opt_owned_into_raw(new), ord)) }
    }
}

/// Issues a full fence. Thin wrapper kept so call sites read the same way
/// the teacher's epoch module reads (`atomic::fence(SeqCst)`).
#[inline(always)]
pub fn full_fence() {
    atomic::fence(Ordering::SeqCst);
}
