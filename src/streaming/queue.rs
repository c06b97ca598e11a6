//! Mutex-guarded task queue with a configurable pop order

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::core::QueueOrder;

/// Shared work queue. Every operation holds the lock for a single push or pop.
#[derive(Debug)]
pub struct TaskQueue<T> {
    items: Mutex<VecDeque<T>>,
    order: QueueOrder,
}

impl<T> TaskQueue<T> {
    pub fn new(order: QueueOrder) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            order,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, item: T) {
        self.lock().push_back(item);
    }

    /// Push several items under one lock acquisition
    pub fn extend(&self, items: impl IntoIterator<Item = T>) {
        self.lock().extend(items);
    }

    /// Pop the next item according to the queue order
    pub fn pop(&self) -> Option<T> {
        let mut items = self.lock();
        match self.order {
            QueueOrder::Lifo => items.pop_back(),
            QueueOrder::Fifo => items.pop_front(),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn order(&self) -> QueueOrder {
        self.order
    }
}
