//! A lock-free ordered map built as a skip list over the reclamation core.
//!
//! Nodes are split into two allocations: a plain `Box<Node<K, V>>` header
//! (key, value, bookkeeping) handled by the ordinary Rust allocator so `K`
//! and `V` get their natural alignment and destructors, and a
//! size-classed forward-pointer array, one class per level, drawn from the
//! collector's chunk pool -- the part of a node whose size genuinely varies
//! with its height. A node's header is retired through `Handle::retire`
//! once logically and physically unlinked; its forward array goes back to
//! its size class through the ordinary `free`/`alloc` path.
//!
//! Deletion follows the usual lock-free recipe: the value pointer is
//! CAS'd to null as the linearization point, then each level's forward
//! pointer is mark-bit-tagged top down so concurrent searches help finish
//! unlinking a node they pass through rather than ever linking after it.

use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::collector::{Collector, Handle};
use crate::pointer::{Atomic, Owned};

/// Maximum node height. Chosen generously for millions of entries at the
/// default climb probability of 1/2; see `random_level`.
const NUM_LEVELS: usize = 20;

fn mark<T>(p: *mut T) -> *mut T {
    ((p as usize) | 1) as *mut T
}

fn unmark<T>(p: *mut T) -> *mut T {
    ((p as usize) & !1) as *mut T
}

fn is_marked<T>(p: *mut T) -> bool {
    (p as usize) & 1 != 0
}

struct Node<K, V> {
    level: usize,
    key: K,
    value: Atomic<V>,
    /// Gates which of possibly several concurrent deleters performs the
    /// final re-search-and-retire; without it two threads could both try
    /// to retire the same node.
    claimed_for_delete: AtomicBool,
    /// Buffer of `level` atomics drawn from this level's size class.
    forward: *mut Atomic<Node<K, V>>,
}

unsafe impl<K: Send, V: Send> Send for Node<K, V> {}
unsafe impl<K: Sync, V: Sync> Sync for Node<K, V> {}

impl<K, V> Node<K, V> {
    fn forward(&self, i: usize) -> &Atomic<Node<K, V>> {
        debug_assert!(i < self.level);
        unsafe { &*self.forward.add(i) }
    }

    unsafe fn alloc(collector: &Collector, handle: &Handle, level: usize, key: K, value: V) -> *mut Node<K, V> {
        let classes = collector.skiplist_level_classes(NUM_LEVELS);
        let buf = handle.alloc(classes[level - 1]) as *mut Atomic<Node<K, V>>;
        for i in 0..level {
            unsafe { buf.add(i).write(Atomic::null()) };
        }
        let value_slot = Atomic::null();
        value_slot.store(Some(Owned::new(value)), Ordering::Relaxed);
        let node = Box::new(Node {
            level,
            key,
            value: value_slot,
            claimed_for_delete: AtomicBool::new(false),
            forward: buf,
        });
        Box::into_raw(node)
    }

    /// Retires a node that was successfully unlinked: its forward array
    /// rejoins the chunk pool, its header (and any still-live value) is
    /// dropped once the epoch has safely advanced past any reader.
    unsafe fn retire(collector: &Collector, handle: &Handle, node: *mut Node<K, V>) {
        let level = unsafe { (*node).level };
        let classes = collector.skiplist_level_classes(NUM_LEVELS);
        handle.free(classes[level - 1], unsafe { (*node).forward as *mut u8 });
        unsafe { handle.retire(node) };
    }

    /// Tears down a node that was never published (a losing insert race):
    /// no reader can hold it, so both allocations are reclaimed at once.
    unsafe fn destroy_unpublished(collector: &Collector, handle: &Handle, node: *mut Node<K, V>) {
        let level = unsafe { (*node).level };
        let classes = collector.skiplist_level_classes(NUM_LEVELS);
        handle.unsafe_free(classes[level - 1], unsafe { (*node).forward as *mut u8 });
        drop(unsafe { Box::from_raw(node) });
    }

    fn mark_level(&self, level: usize) {
        loop {
            let next = self.forward(level).load_raw(Ordering::Acquire);
            if is_marked(next) {
                return;
            }
            if self
                .forward(level)
                .cas_raw(next, mark(next), Ordering::AcqRel)
                .is_ok()
            {
                return;
            }
        }
    }

    /// Marks every forward pointer from the node's top level down to 0,
    /// the same top-down order `remove` uses so a half-linked node never
    /// ends up marked at a low level but not yet at a level above it.
    fn mark_all_levels(&self) {
        for level in (1..self.level).rev() {
            self.mark_level(level);
        }
        self.mark_level(0);
    }
}

impl<K, V> Drop for Node<K, V> {
    fn drop(&mut self) {
        let raw = self.value.load_raw(Ordering::Relaxed);
        if !raw.is_null() {
            drop(unsafe { Box::from_raw(raw) });
        }
    }
}

fn random_level(handle: &Handle, max: usize) -> usize {
    let mut level = 1;
    while level < max && (handle.next_rand() & 1) == 0 {
        level += 1;
    }
    level
}

struct SearchResult<K, V> {
    preds: [*mut Node<K, V>; NUM_LEVELS],
    succs: [*mut Node<K, V>; NUM_LEVELS],
}

/// A lock-free, ordered key-value map.
///
/// Every operation takes a [`Handle`] obtained from the same collector the
/// map was built on, keeping a reference to a node alive for the
/// operation's duration.
pub struct SkipMap<K, V> {
    collector: Collector,
    heads: Box<[Atomic<Node<K, V>>]>,
    len: AtomicUsize,
}

unsafe impl<K: Send + Sync, V: Send + Sync> Send for SkipMap<K, V> {}
unsafe impl<K: Send + Sync, V: Send + Sync> Sync for SkipMap<K, V> {}

impl<K: Ord, V> SkipMap<K, V> {
    pub fn new(collector: &Collector) -> SkipMap<K, V> {
        // Registers the NUM_LEVELS forward-array size classes up front
        // rather than lazily on first insert, so the first writer never
        // pays the registration cost under contention.
        collector.skiplist_level_classes(NUM_LEVELS);
        SkipMap {
            collector: collector.clone(),
            heads: (0..NUM_LEVELS).map(|_| Atomic::null()).collect::<Vec<_>>().into_boxed_slice(),
            len: AtomicUsize::new(0),
        }
    }

    fn forward_at(&self, node: *mut Node<K, V>, level: usize) -> &Atomic<Node<K, V>> {
        if node.is_null() {
            &self.heads[level]
        } else {
            unsafe { (&*node).forward(level) }
        }
    }

    /// "Strong" search: finds the per-level predecessor/successor pair for
    /// `key`, physically unlinking any fully mark-bit-tagged node it steps
    /// over along the way. Used by `insert` and `remove`.
    fn search(&self, key: &K, _handle: &Handle) -> SearchResult<K, V> {
        'retry: loop {
            let mut preds = [ptr::null_mut(); NUM_LEVELS];
            let mut succs = [ptr::null_mut(); NUM_LEVELS];
            let mut pred: *mut Node<K, V> = ptr::null_mut();

            for level in (0..NUM_LEVELS).rev() {
                let mut curr = self.forward_at(pred, level).load_raw(Ordering::Acquire);
                loop {
                    let curr_node = unmark(curr);
                    if curr_node.is_null() {
                        break;
                    }
                    let node = unsafe { &*curr_node };
                    let next = node.forward(level).load_raw(Ordering::Acquire);
                    if is_marked(next) {
                        let spliced = unmark(next);
                        match self.forward_at(pred, level).cas_raw(curr_node, spliced, Ordering::AcqRel) {
                            Ok(()) => {
                                curr = spliced;
                                continue;
                            }
                            Err(_) => continue 'retry,
                        }
                    }
                    if node.key < *key {
                        pred = curr_node;
                        curr = next;
                        continue;
                    }
                    break;
                }
                preds[level] = pred;
                succs[level] = unmark(curr);
            }

            return SearchResult { preds, succs };
        }
    }

    /// A remover can mark a node's forward pointers before this node is
    /// done being linked in by an inserter still climbing its levels (see
    /// `link_new_node`). If that happens, the remover's own helping search
    /// may run before the inserter links the later levels, so nothing ever
    /// splices those edges back out. Called once an inserter is done
    /// climbing (however far it got): if the node turns out to already be
    /// fully mark-tagged and nobody has claimed it yet, finishes the job
    /// the remover couldn't -- re-searches to splice every level the node
    /// is now linked and marked at, then retires it.
    fn help_full_delete(&self, node: *mut Node<K, V>, handle: &Handle) {
        let n = unsafe { &*node };
        if !is_marked(n.forward(0).load_raw(Ordering::Acquire)) {
            return;
        }
        // A splice pass run here always re-threads predecessors past every
        // level we finished linking above, even when a remover already won
        // the race to retire this node: its own pass may have run before
        // we linked some of those levels in, and we're still inside a live
        // critical section, so the node can't have been physically freed
        // out from under us yet.
        let _ = self.search(&n.key, handle);
        if n.claimed_for_delete
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            unsafe { Node::retire(&self.collector, handle, node) };
        }
    }

    /// Allocates and links a node for a key confirmed absent by `r`. On a
    /// lost level-0 race the node can't have been observed by anyone, so it
    /// is reclaimed immediately and its key/value handed back for the
    /// caller to retry with a fresh search.
    fn link_new_node(&self, key: K, value: V, r: &SearchResult<K, V>, handle: &Handle) -> Result<(), (K, V)> {
        let level = random_level(handle, NUM_LEVELS);
        let node = unsafe { Node::alloc(&self.collector, handle, level, key, value) };
        for i in 0..level {
            unsafe { &*node }.forward(i).store_raw(r.succs[i], Ordering::Relaxed);
        }

        if self
            .forward_at(r.preds[0], 0)
            .cas_raw(r.succs[0], node, Ordering::AcqRel)
            .is_err()
        {
            // `ManuallyDrop` keeps `Node`'s own `Drop` (which would
            // otherwise free the value a second time) from firing while we
            // pick the fields back apart.
            let boxed = unsafe { Box::from_raw(node) };
            let salvaged = std::mem::ManuallyDrop::new(*boxed);
            let forward_buf = salvaged.forward;
            let key = unsafe { ptr::read(&salvaged.key) };
            let value_raw = salvaged.value.load_raw(Ordering::Relaxed);
            let value = *unsafe { Box::from_raw(value_raw) };
            let classes = self.collector.skiplist_level_classes(NUM_LEVELS);
            handle.unsafe_free(classes[level - 1], forward_buf as *mut u8);
            return Err((key, value));
        }

        self.len.fetch_add(1, Ordering::Relaxed);

        'levels: for i in 1..level {
            let mut pred = r.preds[i];
            let mut succ = r.succs[i];
            loop {
                // A remover can mark our own node's forward pointer at this
                // level before we've linked it in (`remove` marks top down,
                // independent of how far the inserter has climbed). If it
                // has, stop climbing: the node is already on its way out.
                let current = unsafe { &*node }.forward(i).load_raw(Ordering::Acquire);
                if is_marked(current) {
                    break 'levels;
                }
                if current != succ {
                    match unsafe { &*node }.forward(i).cas_raw(current, succ, Ordering::AcqRel) {
                        Ok(()) => {}
                        Err(raced) => {
                            if is_marked(raced) {
                                break 'levels;
                            }
                            continue;
                        }
                    }
                }
                match self.forward_at(pred, i).cas_raw(succ, node, Ordering::AcqRel) {
                    Ok(()) => break,
                    Err(_) => {
                        let refreshed = self.search(unsafe { &(*node).key }, handle);
                        pred = refreshed.preds[i];
                        succ = refreshed.succs[i];
                    }
                }
            }
        }

        // Whether we climbed every level or bailed early because the node
        // was already being removed out from under us, check once whether
        // it needs a hand finishing that removal: a concurrent remover's
        // own splice pass can only unlink levels that were linked by the
        // time it ran.
        self.help_full_delete(node, handle);

        Ok(())
    }

    /// Inserts `key`/`value`, overwriting and returning the prior value if
    /// the key was already present. Equivalent to `update(k, v, true)`.
    pub fn insert(&self, key: K, value: V, handle: &Handle) -> Option<V>
    where
        V: Clone,
    {
        let mut key = key;
        let mut value = value;
        'outer: loop {
            let r = self.search(&key, handle);
            let existing = r.succs[0];
            if !existing.is_null() && unsafe { &*existing }.key == key {
                let node = unsafe { &*existing };
                let mut new_owned = Owned::new(value);
                loop {
                    let old = match node.value.load(Ordering::Acquire, handle) {
                        None => {
                            // Concurrently removed; the key is momentarily
                            // absent, so this is really an insert-after-delete.
                            // Strong search only splices nodes already
                            // mark-tagged, so mark this one ourselves rather
                            // than spin waiting for the remover to get to it.
                            node.mark_all_levels();
                            value = new_owned.into_inner();
                            continue 'outer;
                        }
                        Some(old) => old,
                    };
                    match node.value.cas(Some(old), Some(new_owned), Ordering::AcqRel) {
                        Ok(()) => {
                            let prev = (*old).clone();
                            unsafe { handle.retire(old.as_raw()) };
                            return Some(prev);
                        }
                        Err(returned) => {
                            new_owned = returned.unwrap();
                            continue;
                        }
                    }
                }
            }

            match self.link_new_node(key, value, &r, handle) {
                Ok(()) => return None,
                Err((k, v)) => {
                    key = k;
                    value = v;
                    continue 'outer;
                }
            }
        }
    }

    /// Inserts `key`/`value` only if `key` is not already mapped. If it is,
    /// the existing value is left untouched and returned; otherwise `value`
    /// is installed and returned. Equivalent to `update(k, v, false)`.
    pub fn insert_if_absent(&self, key: K, value: V, handle: &Handle) -> V
    where
        V: Clone,
    {
        let mut key = key;
        let mut value = value;
        'outer: loop {
            let r = self.search(&key, handle);
            let existing = r.succs[0];
            if !existing.is_null() && unsafe { &*existing }.key == key {
                let node = unsafe { &*existing };
                match node.value.load(Ordering::Acquire, handle) {
                    Some(v) => return (*v).clone(),
                    None => {
                        // Concurrently removed; the key is momentarily
                        // absent. Mark the node ourselves so progress
                        // doesn't depend on the remover being scheduled.
                        node.mark_all_levels();
                        continue 'outer;
                    }
                }
            }

            let ret = value.clone();
            match self.link_new_node(key, value, &r, handle) {
                Ok(()) => return ret,
                Err((k, v)) => {
                    key = k;
                    value = v;
                    continue 'outer;
                }
            }
        }
    }

    /// Removes `key` if present, returning whether it was found. The
    /// value's disappearance, not the node's physical unlinking, is the
    /// operation's linearization point.
    pub fn remove(&self, key: &K, handle: &Handle) -> bool {
        let r = self.search(key, handle);
        let found = r.succs[0];
        if found.is_null() {
            return false;
        }
        let node = unsafe { &*found };
        if &node.key != key {
            return false;
        }

        let old = match node.value.swap(None, Ordering::AcqRel, handle) {
            Some(old) => old,
            // Lost a race with a concurrent remove of the same key.
            None => return false,
        };
        unsafe { handle.retire(old.as_raw()) };

        node.mark_all_levels();

        if node
            .claimed_for_delete
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            // Re-searching physically splices out every level this node's
            // forward pointers are now marked at.
            let _ = self.search(key, handle);
            unsafe { Node::retire(&self.collector, handle, found) };
        }

        self.len.fetch_sub(1, Ordering::Relaxed);
        true
    }

    /// Looks up `key`, cloning the value out so it can outlive `handle`.
    /// A "weak" search: it doesn't help unlink marked nodes it passes, only
    /// the predecessor chase needed to find the key.
    pub fn lookup(&self, key: &K, handle: &Handle) -> Option<V>
    where
        V: Clone,
    {
        let mut pred: *mut Node<K, V> = ptr::null_mut();
        for level in (0..NUM_LEVELS).rev() {
            let mut curr = unmark(self.forward_at(pred, level).load_raw(Ordering::Acquire));
            while !curr.is_null() {
                let node = unsafe { &*curr };
                if &node.key < key {
                    pred = curr;
                    curr = unmark(node.forward(level).load_raw(Ordering::Acquire));
                } else {
                    break;
                }
            }
        }
        let candidate = unmark(self.forward_at(pred, 0).load_raw(Ordering::Acquire));
        if candidate.is_null() {
            return None;
        }
        let node = unsafe { &*candidate };
        if &node.key != key {
            return None;
        }
        node.value.load(Ordering::Acquire, handle).map(|v| (*v).clone())
    }

    /// Visits every live entry once, in ascending key order, calling `f`
    /// with `(self, key, value, user_arg)`. A concurrent remove of an
    /// entry not yet visited simply removes it from the walk; one observed
    /// mid-insert is visited only if its level-0 link landed before this
    /// traversal reached that point. `f` may safely call `remove` on the
    /// key it was just handed: the successor is read before `f` runs, so
    /// the walk doesn't depend on the node it just removed.
    pub fn for_each<A, F>(&self, handle: &Handle, user_arg: &mut A, mut f: F)
    where
        F: FnMut(&SkipMap<K, V>, &K, &V, &mut A),
    {
        let mut curr = unmark(self.heads[0].load_raw(Ordering::Acquire));
        while !curr.is_null() {
            let node = unsafe { &*curr };
            let next = unmark(node.forward(0).load_raw(Ordering::Acquire));
            if let Some(v) = node.value.load(Ordering::Acquire, handle) {
                f(self, &node.key, &v, user_arg);
            }
            curr = next;
        }
    }

    /// Best-effort count of live entries; concurrent writers may make this
    /// stale by the time it's read.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V> Drop for SkipMap<K, V> {
    fn drop(&mut self) {
        // No concurrent access is possible once we're being dropped, so
        // there's no reader to wait out: tear every remaining node down
        // immediately rather than scheduling it through the collector.
        let handle = self.collector.enter();
        let mut curr = unmark(self.heads[0].load_raw(Ordering::Relaxed));
        while !curr.is_null() {
            let next = unmark(unsafe { &*curr }.forward(0).load_raw(Ordering::Relaxed));
            unsafe { Node::destroy_unpublished(&self.collector, &handle, curr) };
            curr = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn insert_then_lookup_roundtrip() {
        let collector = Collector::new();
        let map: SkipMap<u64, u64> = SkipMap::new(&collector);
        let handle = collector.enter();
        for i in 0..200u64 {
            assert_eq!(map.insert(i, i * 10, &handle), None);
        }
        for i in 0..200u64 {
            assert_eq!(map.lookup(&i, &handle), Some(i * 10));
        }
        assert_eq!(map.len(), 200);
    }

    #[test]
    fn insert_overwrites_and_returns_old_value() {
        let collector = Collector::new();
        let map: SkipMap<u64, u64> = SkipMap::new(&collector);
        let handle = collector.enter();
        assert_eq!(map.insert(5, 1, &handle), None);
        assert_eq!(map.insert(5, 2, &handle), Some(1));
        assert_eq!(map.lookup(&5, &handle), Some(2));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn insert_if_absent_leaves_existing_value_untouched() {
        let collector = Collector::new();
        let map: SkipMap<u64, u64> = SkipMap::new(&collector);
        let handle = collector.enter();
        assert_eq!(map.insert_if_absent(5, 1, &handle), 1);
        assert_eq!(map.insert_if_absent(5, 2, &handle), 1);
        assert_eq!(map.lookup(&5, &handle), Some(1));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn remove_absent_key_returns_false() {
        let collector = Collector::new();
        let map: SkipMap<u64, u64> = SkipMap::new(&collector);
        let handle = collector.enter();
        assert!(!map.remove(&42, &handle));
    }

    #[test]
    fn remove_then_lookup_misses_then_reinsert_succeeds() {
        let collector = Collector::new();
        let map: SkipMap<u64, u64> = SkipMap::new(&collector);
        let handle = collector.enter();
        map.insert(7, 70, &handle);
        assert!(map.remove(&7, &handle));
        assert_eq!(map.lookup(&7, &handle), None);
        assert_eq!(map.insert(7, 700, &handle), None);
        assert_eq!(map.lookup(&7, &handle), Some(700));
    }

    #[test]
    fn for_each_visits_in_ascending_order() {
        let collector = Collector::new();
        let map: SkipMap<u64, u64> = SkipMap::new(&collector);
        let handle = collector.enter();
        for i in [5u64, 1, 4, 2, 3] {
            map.insert(i, i, &handle);
        }
        let mut seen = Vec::new();
        map.for_each(&handle, &mut seen, |_set, k, _v, seen| seen.push(*k));
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn for_each_visitor_can_remove_current_key_mid_traversal() {
        let collector = Collector::new();
        let map: SkipMap<u64, u64> = SkipMap::new(&collector);
        let handle = collector.enter();
        for i in 0..9u64 {
            map.insert(i, i, &handle);
        }

        let mut visited = Vec::new();
        map.for_each(&handle, &mut visited, |set, k, _v, visited| {
            visited.push(*k);
            if k % 3 == 0 {
                assert!(set.remove(k, &handle));
            }
        });

        assert_eq!(visited, (0..9u64).collect::<Vec<_>>());
        for i in 0..9u64 {
            let expected = if i % 3 == 0 { None } else { Some(i) };
            assert_eq!(map.lookup(&i, &handle), expected);
        }
        assert_eq!(map.len(), 6);
    }

    #[test]
    fn eight_threads_concurrent_insert_and_lookup() {
        let collector = Collector::new();
        let map = Arc::new(SkipMap::<u64, u64>::new(&collector));
        let threads: Vec<_> = (0..8u64)
            .map(|t| {
                let map = map.clone();
                let collector = collector.clone();
                thread::spawn(move || {
                    let handle = collector.enter();
                    for i in 0..500u64 {
                        let key = t * 500 + i;
                        map.insert(key, key, &handle);
                    }
                    for i in 0..500u64 {
                        let key = t * 500 + i;
                        assert_eq!(map.lookup(&key, &handle), Some(key));
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(map.len(), 4000);
    }

    #[test]
    fn concurrent_insert_and_remove_leaves_consistent_state() {
        let collector = Collector::new();
        let map = Arc::new(SkipMap::<u64, u64>::new(&collector));
        let handle = collector.enter();
        for i in 0..100u64 {
            map.insert(i, i, &handle);
        }
        drop(handle);

        let remover = {
            let map = map.clone();
            let collector = collector.clone();
            thread::spawn(move || {
                let handle = collector.enter();
                for i in (0..100u64).step_by(2) {
                    assert!(map.remove(&i, &handle));
                }
            })
        };
        let reader = {
            let map = map.clone();
            let collector = collector.clone();
            thread::spawn(move || {
                let handle = collector.enter();
                for i in (1..100u64).step_by(2) {
                    assert_eq!(map.lookup(&i, &handle), Some(i));
                }
            })
        };
        remover.join().unwrap();
        reader.join().unwrap();

        let handle = collector.enter();
        for i in (0..100u64).step_by(2) {
            assert_eq!(map.lookup(&i, &handle), None);
        }
        for i in (1..100u64).step_by(2) {
            assert_eq!(map.lookup(&i, &handle), Some(i));
        }
        assert_eq!(map.len(), 50);
    }

    #[test]
    fn hooks_fire_for_nodes_unlinked_by_the_skip_list() {
        use std::sync::atomic::AtomicUsize as StdAtomicUsize;

        let collector = Collector::new();
        let freed = Arc::new(StdAtomicUsize::new(0));
        let freed2 = freed.clone();
        collector.register_hook(move |_| {
            freed2.fetch_add(1, Ordering::Relaxed);
        });
        // The hook above is never wired to a node pointer by the skip list
        // itself (node retirement goes through `Handle::retire`'s typed
        // drop-glue channel, not `add_ptr_to_hook`); this test only checks
        // that registering a hook on a collector a `SkipMap` also uses
        // doesn't disturb the map's own reclamation.
        let map: SkipMap<u64, u64> = SkipMap::new(&collector);
        let handle = collector.enter();
        map.insert(1, 1, &handle);
        assert!(map.remove(&1, &handle));
        drop(handle);
        for _ in 0..4 {
            collector.reclaim_now();
        }
        assert_eq!(map.lookup(&1, &collector.enter()), None);
    }
}
