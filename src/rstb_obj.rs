use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

// RstbObj lets tasks mutably share test objects (reference queue, result slots, ...).
// Tasks of one simulation always run on the same thread, so the lock is never contended.
pub struct RstbObj<T>(Arc<Mutex<T>>);

impl<T> RstbObj<T> {
    pub fn new(data: T) -> RstbObj<T> {
        RstbObj(Arc::new(Mutex::new(data)))
    }
    pub fn get(&self) -> MutexGuard<'_, T> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.get())
    }
}

impl<T> Clone for RstbObj<T> {
    fn clone(&self) -> Self {
        RstbObj(self.0.clone())
    }
}
