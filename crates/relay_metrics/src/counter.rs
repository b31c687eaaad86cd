//! Named counters for tracking runtime events

use std::cell::RefCell;
use std::collections::BTreeMap;

/// Monotonic counters keyed by static metric names.
#[derive(Debug, Default)]
pub struct Counter {
    counters: RefCell<BTreeMap<&'static str, u64>>,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            counters: RefCell::new(BTreeMap::new()),
        }
    }

    #[inline]
    pub fn bump(&self, name: &'static str) {
        self.add(name, 1);
    }

    pub fn add(&self, name: &'static str, value: u64) {
        *self.counters.borrow_mut().entry(name).or_insert(0) += value;
    }

    pub fn get(&self, name: &str) -> u64 {
        self.counters.borrow().get(name).copied().unwrap_or(0)
    }

    /// Sorted copy of every counter that has been touched.
    pub fn snapshot(&self) -> Vec<(&'static str, u64)> {
        self.counters
            .borrow()
            .iter()
            .map(|(name, value)| (*name, *value))
            .collect()
    }

    pub fn reset(&self) {
        self.counters.borrow_mut().clear();
    }
}
