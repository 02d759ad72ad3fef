//! Spinlocks and busy-wait backoff.
//!
//! Debugging runs with interrupts and scheduling effectively suspended
//! system-wide, so nothing here ever blocks or yields to a scheduler:
//! cores that have to wait spin. The backoff strategy is injectable so
//! host-side tests can substitute something kinder to the test runner.

use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};

/// A bare test-and-set spinlock.
#[derive(Debug, Default)]
pub struct RawSpinLock {
    locked: AtomicBool,
}

impl RawSpinLock {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }

    /// Non-blocking acquisition attempt.
    pub fn try_lock(&self) -> bool {
        !self.locked.swap(true, Ordering::Acquire)
    }

    /// Spin until acquired.
    pub fn lock(&self) {
        while !self.try_lock() {
            std::hint::spin_loop();
        }
    }

    pub fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }

    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }
}

/// A value guarded by a [`RawSpinLock`].
#[derive(Debug, Default)]
pub struct SpinLock<T> {
    raw: RawSpinLock,
    value: UnsafeCell<T>,
}

// Safety: the guard hands out at most one mutable borrow at a time.
unsafe impl<T: Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    pub const fn new(value: T) -> Self {
        Self {
            raw: RawSpinLock::new(),
            value: UnsafeCell::new(value),
        }
    }

    /// Spin until the lock is held.
    pub fn lock(&self) -> SpinGuard<'_, T> {
        self.raw.lock();
        SpinGuard { lock: self }
    }

    /// Non-blocking acquisition attempt.
    pub fn try_lock(&self) -> Option<SpinGuard<'_, T>> {
        if self.raw.try_lock() {
            Some(SpinGuard { lock: self })
        } else {
            None
        }
    }
}

/// Guard releasing the lock on drop.
pub struct SpinGuard<'a, T> {
    lock: &'a SpinLock<T>,
}

impl<T> Deref for SpinGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Safety: holding the guard means holding the lock.
        unsafe { &*self.lock.value.get() }
    }
}

impl<T> DerefMut for SpinGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // Safety: holding the guard means holding the lock.
        unsafe { &mut *self.lock.value.get() }
    }
}

impl<T> Drop for SpinGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.raw.unlock();
    }
}

/// Busy-wait strategy used while a core parks or retries.
pub trait Backoff: Sync {
    /// The shortest pause, used inside tight acquisition loops.
    fn relax(&self);

    /// A longer pause, used while waiting for other cores to arrive.
    fn delay(&self) {
        for _ in 0..1000 {
            self.relax();
        }
    }
}

/// Default backoff: plain processor spin hints.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpinBackoff;

impl Backoff for SpinBackoff {
    fn relax(&self) {
        std::hint::spin_loop();
    }
}
