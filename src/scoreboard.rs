use std::collections::VecDeque;

use crate::error::{Result, Violation};
use crate::rstb_obj::RstbObj;

/// Ordered record of what the driver got accepted, consumed by the checker
/// in the same order. Handles are cheap clones of the same queue.
pub struct ReferenceQueue<T>(RstbObj<QueueInner<T>>);

struct QueueInner<T> {
    exp_q: VecDeque<T>,
    capacity: usize,
    pushed: u64,
    popped: u64,
}

impl<T> Clone for ReferenceQueue<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> ReferenceQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self(RstbObj::new(QueueInner {
            exp_q: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
            pushed: 0,
            popped: 0,
        }))
    }

    pub fn push(&self, item: T) -> Result<()> {
        self.0.with_mut(|q| {
            if q.exp_q.len() >= q.capacity {
                return Err(Violation::QueueOverflow { capacity: q.capacity }.into());
            }
            q.exp_q.push_back(item);
            q.pushed += 1;
            Ok(())
        })
    }

    /// Removes the oldest entry. `case` is the index the consumer is about to
    /// check and only ends up in the error.
    pub fn pop(&self, case: u64) -> Result<T> {
        self.0.with_mut(|q| match q.exp_q.pop_front() {
            Some(item) => {
                q.popped += 1;
                Ok(item)
            }
            None => Err(Violation::QueueUnderflow { case }.into()),
        })
    }

    pub fn clear(&self) {
        self.0.with_mut(|q| q.exp_q.clear());
    }
    pub fn len(&self) -> usize {
        self.0.get().exp_q.len()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    pub fn pushed(&self) -> u64 {
        self.0.get().pushed
    }
    pub fn popped(&self) -> u64 {
        self.0.get().popped
    }
    pub fn summary(&self) -> String {
        let q = self.0.get();
        format!(
            "pushed={}, popped={}, pending={}, capacity={}",
            q.pushed,
            q.popped,
            q.exp_q.len(),
            q.capacity
        )
    }
}
