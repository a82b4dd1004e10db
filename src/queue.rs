//! Pop-only work queue shared by the upload workers

use parking_lot::Mutex;
use std::collections::VecDeque;

use crate::walk::WorkItem;

/// Thread-safe queue of pending work items.
///
/// The only mutation after construction is `take`, which atomically removes
/// the front item. An empty result means the batch is drained; workers
/// terminate on it rather than wait, so no condition variable is needed.
pub struct WorkQueue {
    items: Mutex<VecDeque<WorkItem>>,
}

impl WorkQueue {
    pub fn new(items: Vec<WorkItem>) -> Self {
        Self {
            items: Mutex::new(items.into()),
        }
    }

    /// Remove and return the item at the front, or `None` if the queue is
    /// empty. Each item is handed to exactly one caller.
    pub fn take(&self) -> Option<WorkItem> {
        self.items.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}
