//! Lock primitives used to serialize keychain access.
//!
//! Two flavours are provided:
//!
//! - [`Lock`]: a non-reentrant mutual-exclusion lock. Used by the store
//!   factory to guard its instance table, where no nested acquisition happens.
//! - [`RecursiveLock`]: a reentrant lock that the owning thread may acquire
//!   again without deadlocking. Used per keychain store, because compound
//!   operations (for example `set`) call back into other synchronized
//!   operations (`contains_data`).
//!
//! Both locks hand out RAII guards. Releasing a lock is dropping its guard,
//! so a lock is released on every exit path of the protected section,
//! including early returns and panics. Locks are not poisoned by a panic.
//!
//! # Example
//!
//! ```
//! use keyvault_core::lock::{Lock, RecursiveLock};
//!
//! let counter = Lock::new(0_u32);
//! counter.synchronized(|value| *value += 1);
//! assert_eq!(*counter.lock(), 1);
//!
//! let recursive = RecursiveLock::new(());
//! recursive.synchronized(|()| {
//!     // Same thread, same lock: no deadlock.
//!     recursive.synchronized(|()| {});
//! });
//! ```

use std::time::Duration;

use parking_lot::{Mutex, ReentrantMutex};

/// Guard returned by [`Lock`]; the lock is released when it is dropped.
pub type LockGuard<'a, T> = parking_lot::MutexGuard<'a, T>;

/// Guard returned by [`RecursiveLock`]; one level of acquisition is released
/// when it is dropped.
pub type RecursiveLockGuard<'a, T> = parking_lot::ReentrantMutexGuard<'a, T>;

/// Non-reentrant mutual-exclusion lock protecting a value of type `T`.
///
/// Acquiring the lock twice from the same thread deadlocks. Use
/// [`RecursiveLock`] where nested acquisition is possible.
#[derive(Debug, Default)]
pub struct Lock<T = ()> {
    inner: Mutex<T>,
}

impl<T> Lock<T> {
    /// Creates an unlocked lock protecting `value`.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    /// Blocks the current thread until the lock is acquired.
    ///
    /// No fairness or ordering is guaranteed between waiting threads.
    pub fn lock(&self) -> LockGuard<'_, T> {
        self.inner.lock()
    }

    /// Attempts to acquire the lock without blocking.
    ///
    /// Returns `None` if another thread currently holds it.
    pub fn try_lock(&self) -> Option<LockGuard<'_, T>> {
        self.inner.try_lock()
    }

    /// Attempts to acquire the lock, waiting at most `timeout`.
    ///
    /// Returns `None` if the lock could not be acquired in time.
    pub fn try_lock_for(&self, timeout: Duration) -> Option<LockGuard<'_, T>> {
        self.inner.try_lock_for(timeout)
    }

    /// Runs `work` while holding the lock and returns its result.
    ///
    /// The lock is released when `work` returns or unwinds.
    pub fn synchronized<R, F>(&self, work: F) -> R
    where
        F: FnOnce(&mut T) -> R,
    {
        let mut guard = self.inner.lock();
        work(&mut guard)
    }

    /// Returns `true` if some thread currently holds the lock.
    ///
    /// The answer may be stale by the time the caller acts on it; use it for
    /// diagnostics and tests only.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }
}

/// Reentrant lock protecting a value of type `T`.
///
/// The thread holding the lock may acquire it again; every acquisition hands
/// out its own guard and the lock becomes available to other threads once all
/// of them are dropped. Only shared access to `T` is given out, so state that
/// must change under the lock uses interior mutability (`Cell`, `RefCell`).
#[derive(Debug, Default)]
pub struct RecursiveLock<T = ()> {
    inner: ReentrantMutex<T>,
}

impl<T> RecursiveLock<T> {
    /// Creates an unlocked recursive lock protecting `value`.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            inner: ReentrantMutex::new(value),
        }
    }

    /// Blocks until the lock is acquired, or returns immediately if the current
    /// thread already holds it.
    pub fn lock(&self) -> RecursiveLockGuard<'_, T> {
        self.inner.lock()
    }

    /// Attempts to acquire the lock without blocking.
    ///
    /// Always succeeds when the current thread already holds the lock.
    pub fn try_lock(&self) -> Option<RecursiveLockGuard<'_, T>> {
        self.inner.try_lock()
    }

    /// Attempts to acquire the lock, waiting at most `timeout`.
    pub fn try_lock_for(&self, timeout: Duration) -> Option<RecursiveLockGuard<'_, T>> {
        self.inner.try_lock_for(timeout)
    }

    /// Runs `work` while holding the lock and returns its result.
    ///
    /// `work` may itself call `synchronized` on the same lock.
    pub fn synchronized<R, F>(&self, work: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        let guard = self.inner.lock();
        work(&guard)
    }

    /// Returns `true` if some thread currently holds the lock.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::{mpsc, Arc};
    use std::thread;

    #[test]
    fn test_lock_is_exclusive() {
        let lock = Lock::new(());
        let guard = lock.lock();
        assert!(lock.is_locked());
        assert!(lock.try_lock().is_none());

        drop(guard);
        assert!(!lock.is_locked());
        assert!(lock.try_lock().is_some());
    }

    #[test]
    fn test_try_lock_for_times_out_while_held() {
        let lock = Arc::new(Lock::new(()));
        let (locked_tx, locked_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let holder = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                let _guard = lock.lock();
                locked_tx.send(()).expect("signal locked");
                release_rx.recv().expect("wait release");
            })
        };

        locked_rx.recv().expect("wait locked");
        assert!(lock.try_lock_for(Duration::from_millis(20)).is_none());

        release_tx.send(()).expect("release");
        holder.join().expect("thread join");
        assert!(lock.try_lock_for(Duration::from_millis(20)).is_some());
    }

    #[test]
    fn test_synchronized_releases_on_panic() {
        let lock = Lock::new(0_u32);
        let result = catch_unwind(AssertUnwindSafe(|| {
            lock.synchronized(|value| {
                *value = 7;
                panic!("boom");
            });
        }));
        assert!(result.is_err());
        assert!(!lock.is_locked());
        assert_eq!(lock.synchronized(|value| *value), 7);
    }

    #[test]
    fn test_synchronized_serializes_threads() {
        let lock = Arc::new(Lock::new(0_u64));
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let lock = Arc::clone(&lock);
                thread::spawn(move || {
                    for _ in 0..1_000 {
                        lock.synchronized(|value| *value += 1);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().expect("thread join");
        }
        assert_eq!(*lock.lock(), 8_000);
    }

    #[test]
    fn test_recursive_lock_reenters_on_same_thread() {
        let lock = RecursiveLock::new(Cell::new(0_u32));
        let depth = lock.synchronized(|outer| {
            outer.set(outer.get() + 1);
            lock.synchronized(|inner| {
                inner.set(inner.get() + 1);
                lock.try_lock().map(|guard| guard.get())
            })
        });
        assert_eq!(depth, Some(2));
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_recursive_lock_requires_every_guard_released() {
        let lock = Arc::new(RecursiveLock::new(()));
        let outer = lock.lock();
        let inner = lock.lock();
        drop(inner);

        let contender = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || lock.try_lock().is_some())
        };
        assert!(!contender.join().expect("thread join"));

        drop(outer);
        let contender = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || lock.try_lock().is_some())
        };
        assert!(contender.join().expect("thread join"));
    }
}
