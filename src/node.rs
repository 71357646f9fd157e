//! Heap allocation of stack nodes and the cell their payload lives in.

use crate::err::AllocError;
use crate::sync::UnsafeCell;
use alloc::alloc::{alloc, Layout};
use alloc::boxed::Box;

/// Allocate a node built from `value` with the global allocator.
///
/// Nothing is written anywhere but the fresh allocation, so on failure the caller gets `value`
/// back and no shared state has been touched.
pub(crate) fn try_allocate<T, N>(
    value: T,
    build: impl FnOnce(T) -> N,
) -> Result<*mut N, AllocError<T>> {
    let layout: Layout = Layout::new::<N>();
    debug_assert!(layout.size() != 0, "nodes always carry a link");

    let ptr: *mut N = unsafe { alloc(layout) } as *mut N;
    if ptr.is_null() {
        return Err(AllocError {
            value,
            size: layout.size(),
            align: layout.align(),
        });
    }
    unsafe { ptr.write(build(value)) };
    Ok(ptr)
}

/// Release a node produced by [try_allocate].
///
/// # Safety
/// `ptr` must come from [try_allocate] with the same `N`, and no thread may touch the node
/// afterwards. Each node must be freed exactly once.
pub(crate) unsafe fn free<N>(ptr: *mut N) {
    // try_allocate used Layout::new::<N>(), which is the layout Box expects
    drop(Box::from_raw(ptr));
    #[cfg(all(test, feature = "std", not(feature = "shuttle"), not(loom)))]
    tests::NODES_FREED.with(|freed| freed.set(freed.get() + 1));
}

/// A payload which is set when the node is built and moved out at most once afterwards.
pub(crate) struct ValueCell<T>(UnsafeCell<Option<T>>);

impl<T> ValueCell<T> {
    pub(crate) fn new(value: T) -> Self {
        Self(UnsafeCell::new(Some(value)))
    }

    /// Move the payload out, leaving the cell empty.
    ///
    /// # Safety
    /// The caller must be the only thread which can reach the payload, which for a stack node means
    /// the thread whose compare-and-swap detached it.
    pub(crate) unsafe fn take(&self) -> Option<T> {
        self.0.with_mut(|value| (*value).take())
    }
}
