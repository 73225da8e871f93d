//! Epoch-based deferred reclamation, a lock-free ordered map built on it,
//! and a thin object-cache facade over the same allocator.
//!
//! - [`collector`] owns the reclamation domain: epochs, size classes,
//!   hooks, and the thread registry.
//! - [`pointer`] has the atomic pointer types (`Atomic`, `Owned`, `Shared`)
//!   used to build lock-free structures on top of a collector.
//! - [`skiplist`] is the one container shipped here: an ordered,
//!   lock-free `SkipMap<K, V>`.
//! - [`obj_cache`] is a minimal typed allocator facade for callers who
//!   just want epoch-safe blocks without a container.
//! - [`stub_fifo`] is a mutex-guarded FIFO queue, kept as a stand-in --
//!   see its module docs.

pub mod collector;
pub mod mem;
pub mod obj_cache;
pub mod pointer;
pub mod skiplist;
pub mod stub_fifo;
