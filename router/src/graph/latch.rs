use std::sync::{Condvar, Mutex};

/// Counter that can be raised and lowered from any thread; `wait` blocks
/// until it returns to zero.
#[derive(Default)]
pub struct CountingLatch {
    count: Mutex<usize>,
    zero: Condvar,
}

impl CountingLatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count_up(&self) {
        *self.lock() += 1;
    }

    pub fn count_down(&self) {
        let mut count = self.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.zero.notify_all();
        }
    }

    pub fn outstanding(&self) -> usize {
        *self.lock()
    }

    pub fn wait(&self) {
        let mut count = self.lock();
        while *count > 0 {
            count = self
                .zero
                .wait(count)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, usize> {
        self.count
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
