//! A lock-free, multi-producer multi-consumer stack with safe memory reclamation.
//!
//! [LockFreeStack] is the primary design. The head of the stack is a single word holding both a
//! pointer to the top node and an external count of the threads which have claimed that node.
//! Each node carries an internal count of released claims, and a node is freed exactly once, by
//! whichever thread reconciles the two counts back to zero.
//!
//! [CoarseStack] is a fallback which gates reclamation on a global count of threads inside `pop`.
//! It is simpler but frees nothing while pops overlap.
//!
//! ```
//! use splitstack::LockFreeStack;
//!
//! let stack: LockFreeStack<u32> = LockFreeStack::new();
//! stack.push(1);
//! stack.push(2);
//! assert_eq!(stack.pop(), Some(2));
//! assert_eq!(stack.pop(), Some(1));
//! assert_eq!(stack.pop(), None);
//! ```
#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[cfg(not(feature = "alloc"))]
compile_error!("splitstack allocates its nodes: enable the `alloc` or `std` feature");

extern crate alloc;

pub mod err;

mod coarse;
mod link;
mod node;
mod stack;
mod sync;

pub use crate::coarse::CoarseStack;
pub use crate::err::AllocError;
pub use crate::stack::LockFreeStack;

/// The operations every stack in this crate offers, so callers can be generic over the
/// reclamation strategy.
pub trait ConcurrentStack<T>: Send + Sync {
    /// Push `value`, handing it back inside the error if its node could not be allocated. The
    /// stack is unchanged on failure.
    fn try_push(&self, value: T) -> Result<(), AllocError<T>>;

    /// Push `value`, treating allocation failure like any other out-of-memory condition.
    fn push(&self, value: T);

    /// Pop the most recently pushed value, or `None` if the stack was empty at some point during
    /// the call.
    fn pop(&self) -> Option<T>;

    /// Whether the stack held no values at the moment of the check. Other threads may push or pop
    /// right after it returns.
    fn is_empty(&self) -> bool;
}
