//! Thread-local cache of which `ThreadRecord` this OS thread owns in each
//! `Collector` it participates in.
//!
//! Entries are few in practice (almost always one), so a linear scan over a
//! small `Vec` beats maintaining a hash map per thread. The `Drop` impl on
//! each entry is the only place a thread's slot is ever released back to
//! `count == 0` -- never an explicit unlink of the registry node itself.

use std::cell::RefCell;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::collector::global::GlobalState;
use crate::collector::thread::{claim_or_create_record, ThreadRecord};

struct TlsEntry {
    global: *const GlobalState,
    record: *mut ThreadRecord,
}

impl Drop for TlsEntry {
    fn drop(&mut self) {
        unsafe {
            (*self.record).count.store(0, Ordering::Release);
        }
    }
}

thread_local! {
    static RECORDS: RefCell<Vec<TlsEntry>> = RefCell::new(Vec::new());
}

pub(crate) fn record_for(global: &Arc<GlobalState>) -> *mut ThreadRecord {
    let key = Arc::as_ptr(global);
    RECORDS.with(|cell| {
        let mut records = cell.borrow_mut();
        if let Some(entry) = records.iter().find(|e| e.global == key) {
            return entry.record;
        }
        let record = claim_or_create_record(global);
        records.push(TlsEntry { global: key, record });
        record
    })
}
