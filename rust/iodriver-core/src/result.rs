//! Result channels through which operations hand their output to the caller.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Receives the typed result of an operation.
pub trait ResultSink<T>: Send + Sync {
    fn accept(&self, value: T);
}

/// A shared, last-write-wins slot for a single result.
///
/// Clones share the same slot, so a workload can hand one clone to the
/// producing operation and keep another to read the value afterwards.
pub struct ResultSlot<T> {
    inner: Arc<Mutex<Option<T>>>,
}

impl<T> ResultSlot<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(None)),
        }
    }

    pub fn is_filled(&self) -> bool {
        self.inner.lock().is_some()
    }

    pub fn set(&self, value: T) {
        *self.inner.lock() = Some(value);
    }
}

impl<T: Clone> ResultSlot<T> {
    pub fn get(&self) -> Option<T> {
        self.inner.lock().clone()
    }
}

impl<T> Clone for ResultSlot<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Default for ResultSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for ResultSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ResultSlot").field(&*self.inner.lock()).finish()
    }
}

impl<T: Send> ResultSink<T> for ResultSlot<T> {
    fn accept(&self, value: T) {
        self.set(value);
    }
}

/// Append-only collector, for operations that may deliver more than once.
pub struct ResultLog<T> {
    inner: Arc<Mutex<Vec<T>>>,
}

impl<T> ResultLog<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl<T: Clone> ResultLog<T> {
    pub fn snapshot(&self) -> Vec<T> {
        self.inner.lock().clone()
    }
}

impl<T> Clone for ResultLog<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ResultLog<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ResultLog").field(&*self.inner.lock()).finish()
    }
}

impl<T> Default for ResultLog<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send> ResultSink<T> for ResultLog<T> {
    fn accept(&self, value: T) {
        self.inner.lock().push(value);
    }
}

/// Adapts a closure into a [`ResultSink`].
pub struct FnSink<F>(F);

impl<F> FnSink<F> {
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<T, F> ResultSink<T> for FnSink<F>
where
    F: Fn(T) + Send + Sync,
{
    fn accept(&self, value: T) {
        (self.0)(value)
    }
}
