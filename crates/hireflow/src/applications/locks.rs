use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use super::domain::ApplicationId;

/// Mutual exclusion scoped to a single application id.
#[derive(Debug, Default)]
pub(crate) struct ApplicationLocks {
    slots: Mutex<HashMap<ApplicationId, Arc<Mutex<()>>>>,
}

impl ApplicationLocks {
    /// Run `f` while holding the lock for `id`. Different ids never block
    /// each other.
    pub(crate) fn with_lock<T>(&self, id: ApplicationId, f: impl FnOnce() -> T) -> T {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.entry(id).or_default().clone()
        };

        let result = {
            let _guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };

        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        // Clones are only taken under `slots`, so two owners means nobody waits.
        if Arc::strong_count(&slot) == 2 {
            slots.remove(&id);
        }
        result
    }

    #[cfg(test)]
    pub(crate) fn tracked(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn serializes_same_id() {
        let locks = Arc::new(ApplicationLocks::default());
        let inside = Arc::new(AtomicUsize::new(0));
        let overlap = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = locks.clone();
                let inside = inside.clone();
                let overlap = overlap.clone();
                thread::spawn(move || {
                    locks.with_lock(ApplicationId(7), || {
                        if inside.fetch_add(1, Ordering::SeqCst) > 0 {
                            overlap.fetch_add(1, Ordering::SeqCst);
                        }
                        thread::sleep(Duration::from_millis(5));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    })
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("worker finished");
        }

        assert_eq!(overlap.load(Ordering::SeqCst), 0);
        assert_eq!(locks.tracked(), 0);
    }

    #[test]
    fn returns_closure_value() {
        let locks = ApplicationLocks::default();
        assert_eq!(locks.with_lock(ApplicationId(1), || 42), 42);
        assert_eq!(locks.tracked(), 0);
    }
}
