use std::sync::Mutex;

use super::lock;

/// Pool of candidate urls shared by every worker. Each candidate is handed out exactly once,
/// in no particular order.
#[derive(Debug)]
pub struct SharedQueue {
    items: Mutex<Vec<String>>,
    total: usize,
}

impl SharedQueue {
    pub fn new(items: Vec<String>) -> Self {
        let total = items.len();
        Self {
            items: Mutex::new(items),
            total,
        }
    }

    /// Removes one candidate, or `None` once the pool is exhausted.
    pub fn pop(&self) -> Option<String> {
        lock(&self.items).pop()
    }

    /// Size of the original pool, not what is left of it.
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn remaining(&self) -> usize {
        lock(&self.items).len()
    }
}
