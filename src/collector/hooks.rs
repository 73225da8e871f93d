//! Per-epoch user callbacks ("hooks").
//!
//! A hook is registered once and then fed retired pointers through
//! `Handle::add_ptr_to_hook`; the reclaimer calls it exactly once per
//! pointer, two epochs after retirement, from inside the reclaim pass (so
//! never concurrently with another hook invocation for the same hook).

use log::error;

use crate::collector::MAX_HOOKS;

pub type HookFn = Box<dyn Fn(*mut u8) + Send + Sync>;

pub struct HookTable {
    hooks: Vec<HookFn>,
}

impl HookTable {
    pub fn new() -> HookTable {
        HookTable { hooks: Vec::new() }
    }

    pub fn register(&mut self, f: HookFn) -> usize {
        if self.hooks.len() >= MAX_HOOKS {
            error!("epoch-reclaim: exceeded MAX_HOOKS ({}) registered hooks", MAX_HOOKS);
            std::process::abort();
        }
        self.hooks.push(f);
        self.hooks.len() - 1
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn invoke(&self, id: usize, ptr: *mut u8) {
        (self.hooks[id])(ptr)
    }
}

impl Default for HookTable {
    fn default() -> HookTable {
        HookTable::new()
    }
}
