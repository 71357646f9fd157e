//! A module which decides which synchronization primitives to use throughout the rest of the crate
//! depending on features and configuration options

// std or no_std, non-test
#[cfg(all(not(loom), not(feature = "shuttle")))]
pub(crate) use core::sync::atomic::{AtomicIsize, AtomicPtr, AtomicUsize, Ordering};

// core has no stable 128-bit atomic; portable-atomic uses cmpxchg16b or casp where the target has it
#[cfg(all(not(loom), not(feature = "shuttle")))]
pub(crate) use portable_atomic::AtomicU128;

// loom
#[cfg(loom)]
pub(crate) use loom::sync::atomic::{AtomicIsize, AtomicPtr, AtomicU64, AtomicUsize, Ordering};

#[cfg(loom)]
pub(crate) use loom::cell::UnsafeCell;

// shuttle
#[cfg(all(feature = "shuttle", not(loom)))]
pub(crate) use shuttle::sync::atomic::{AtomicIsize, AtomicPtr, AtomicU64, AtomicUsize, Ordering};

/// A stand-in for loom's `UnsafeCell` which exposes the same closure-based API over the core
/// `UnsafeCell`, so node code reads the same whether or not it runs under loom.
#[cfg(not(loom))]
#[derive(Debug)]
#[repr(transparent)]
pub(crate) struct UnsafeCell<T>(core::cell::UnsafeCell<T>);

#[cfg(not(loom))]
impl<T> UnsafeCell<T> {
    #[inline]
    pub(crate) fn new(data: T) -> Self {
        Self(core::cell::UnsafeCell::new(data))
    }

    #[inline]
    pub(crate) fn with_mut<R>(&self, f: impl FnOnce(*mut T) -> R) -> R {
        f(self.0.get())
    }
}
