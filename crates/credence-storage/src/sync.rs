//! Poison-tolerant locking for the std mutexes guarding blocking resources.

use std::sync::{Mutex, MutexGuard};

/// Extension trait recovering the guard of a poisoned [`Mutex`].
pub trait MutexExt<T> {
    /// Lock the mutex; if a previous holder panicked, log and take the data anyway.
    fn lock_or_recover(&self) -> MutexGuard<'_, T>;
}

impl<T> MutexExt<T> for Mutex<T> {
    #[track_caller]
    fn lock_or_recover(&self) -> MutexGuard<'_, T> {
        match self.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                let loc = std::panic::Location::caller();
                tracing::error!(
                    mutex_type = std::any::type_name::<T>(),
                    file = loc.file(),
                    line = loc.line(),
                    "Mutex poisoned by a panicking holder; recovered"
                );
                poisoned.into_inner()
            }
        }
    }
}
