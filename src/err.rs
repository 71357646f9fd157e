use core::fmt::{Debug, Formatter};
use displaydoc::Display;

/// The global allocator could not provide {size} bytes (align {align}) for a stack node.
#[derive(Display, Eq, PartialEq)]
pub struct AllocError<T> {
    pub(crate) value: T,
    pub(crate) size: usize,
    pub(crate) align: usize,
}

// The stack is left exactly as it was before the push began.
impl<T> AllocError<T> {
    /// Recover the value which could not be pushed.
    pub fn into_inner(self) -> T {
        self.value
    }

    /// The size in bytes of the node allocation which failed.
    pub fn size(&self) -> usize {
        self.size
    }

    /// The alignment of the node allocation which failed.
    pub fn align(&self) -> usize {
        self.align
    }
}

// The rejected value is not required to be Debug.
impl<T> Debug for AllocError<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AllocError")
            .field("size", &self.size)
            .field("align", &self.align)
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "std")]
impl<T> std::error::Error for AllocError<T> where Self: core::fmt::Display {}
