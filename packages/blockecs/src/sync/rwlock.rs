//! A reader/writer lock with writer preference on release.

use std::cell::UnsafeCell;
use std::fmt::{self, Debug, Formatter};
use std::ops::{Deref, DerefMut};

use parking_lot::{Condvar, Mutex};

#[derive(Default)]
struct LockState {
    readers: usize,
    writer: bool,
}

/// A lock allowing either many readers or one writer.
///
/// Releasing a write lock wakes one waiting writer and then every waiting
/// reader. The last reader out wakes one waiting writer.
pub struct ReadWriteLock<T> {
    state: Mutex<LockState>,
    read_ready: Condvar,
    write_ready: Condvar,
    value: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for ReadWriteLock<T> {}

unsafe impl<T: Send + Sync> Sync for ReadWriteLock<T> {}

impl<T> ReadWriteLock<T> {
    /// Create a new, unlocked lock around `value`.
    pub fn new(value: T) -> ReadWriteLock<T> {
        ReadWriteLock {
            state: Mutex::new(LockState::default()),
            read_ready: Condvar::new(),
            write_ready: Condvar::new(),
            value: UnsafeCell::new(value),
        }
    }

    /// Consume the lock, returning the value.
    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }

    /// Get the value mutably. No locking is needed, since the borrow is unique.
    pub fn get_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }

    /// Block until no writer holds the lock, then take a read lock.
    pub fn read(&self) -> ReadGuard<'_, T> {
        let mut state = self.state.lock();
        while state.writer {
            self.read_ready.wait(&mut state);
        }

        state.readers += 1;
        ReadGuard { lock: self }
    }

    /// Take a read lock if that can be done without blocking.
    pub fn try_read(&self) -> Option<ReadGuard<'_, T>> {
        let mut state = self.state.lock();
        if state.writer {
            return None;
        }

        state.readers += 1;
        Some(ReadGuard { lock: self })
    }

    /// Block until nobody holds the lock, then take a write lock.
    pub fn write(&self) -> WriteGuard<'_, T> {
        let mut state = self.state.lock();
        while state.writer || state.readers > 0 {
            self.write_ready.wait(&mut state);
        }

        state.writer = true;
        WriteGuard { lock: self }
    }

    /// Take a write lock if that can be done without blocking.
    pub fn try_write(&self) -> Option<WriteGuard<'_, T>> {
        let mut state = self.state.lock();
        if state.writer || state.readers > 0 {
            return None;
        }

        state.writer = true;
        Some(WriteGuard { lock: self })
    }

    fn unlock_read(&self) {
        let mut state = self.state.lock();
        state.readers -= 1;
        if state.readers == 0 {
            self.write_ready.notify_one();
        }
    }

    fn unlock_write(&self) {
        let mut state = self.state.lock();
        state.writer = false;
        self.write_ready.notify_one();
        self.read_ready.notify_all();
    }
}

impl<T: Default> Default for ReadWriteLock<T> {
    fn default() -> ReadWriteLock<T> {
        ReadWriteLock::new(T::default())
    }
}

impl<T> Debug for ReadWriteLock<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        write!(f, "ReadWriteLock {{ readers: {}, writer: {} }}", state.readers, state.writer)
    }
}

/// A held read lock.
pub struct ReadGuard<'a, T> {
    lock: &'a ReadWriteLock<T>,
}

impl<'a, T> Deref for ReadGuard<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.value.get() }
    }
}

impl<'a, T> Drop for ReadGuard<'a, T> {
    fn drop(&mut self) {
        self.lock.unlock_read();
    }
}

/// A held write lock.
pub struct WriteGuard<'a, T> {
    lock: &'a ReadWriteLock<T>,
}

impl<'a, T> Deref for WriteGuard<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.value.get() }
    }
}

impl<'a, T> DerefMut for WriteGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.value.get() }
    }
}

impl<'a, T> Drop for WriteGuard<'a, T> {
    fn drop(&mut self) {
        self.lock.unlock_write();
    }
}
