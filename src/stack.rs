//! The split reference counting stack.
//!
//! Every link stored in `head` carries an external count: the number of threads which have claimed
//! the node by reading it out of `head`. Every node carries an internal count which threads
//! decrement as they let go of their claims. Whichever thread brings the sum of the two back to
//! zero frees the node, so no thread frees memory another thread may still dereference.

use crate::err::AllocError;
use crate::link::{AtomicCountedLink, CountedLink};
use crate::node::{self, ValueCell};
use crate::sync::{AtomicIsize, Ordering};
use crate::ConcurrentStack;
use alloc::alloc::{handle_alloc_error, Layout};
use core::fmt::{Debug, Formatter};
use tracing::{instrument, trace};

struct Node<T> {
    value: ValueCell<T>,
    /// Starts at zero. Losers of the detach race subtract their claim; the winner adds every claim
    /// but the two it accounts for itself. The node is freed by whoever brings it back to zero.
    internal_count: AtomicIsize,
    /// The head this node replaced when it was pushed. Never written once the node is published.
    next: CountedLink<Node<T>>,
}

/// A lock-free, multi-producer multi-consumer LIFO stack which reclaims popped nodes with split
/// reference counts.
///
/// Both [push](LockFreeStack::push) and [pop](LockFreeStack::pop) are lock-free: threads only ever
/// retry compare-and-swap loops on the head and never wait on one another.
pub struct LockFreeStack<T> {
    head: AtomicCountedLink<Node<T>>,
}

unsafe impl<T: Send> Send for LockFreeStack<T> {}
unsafe impl<T: Send> Sync for LockFreeStack<T> {}

impl<T> LockFreeStack<T> {
    pub fn new() -> Self {
        Self {
            head: AtomicCountedLink::new(CountedLink::null()),
        }
    }

    /// Push `value`, handing it back if a node for it could not be allocated.
    ///
    /// A `pop` which later observes the node also observes `value` fully written.
    #[instrument(level = "trace", skip_all)]
    pub fn try_push(&self, value: T) -> Result<(), AllocError<T>> {
        let mut current_head: CountedLink<Node<T>> = self.head.load(Ordering::Relaxed);
        let node_ptr: *mut Node<T> = node::try_allocate(value, |value| Node {
            value: ValueCell::new(value),
            internal_count: AtomicIsize::new(0),
            next: current_head,
        })?;
        let new_head: CountedLink<Node<T>> = CountedLink::new(node_ptr, 1);

        while let Err(actual_head) = self.head.compare_exchange_weak(
            current_head,
            new_head,
            Ordering::Release,
            Ordering::Relaxed,
        ) {
            // the node is not published yet, so nothing else can be reading next
            unsafe { (*node_ptr).next = actual_head };
            current_head = actual_head;
        }
        Ok(())
    }

    /// Push `value`. Allocation failure goes to [handle_alloc_error].
    pub fn push(&self, value: T) {
        if self.try_push(value).is_err() {
            handle_alloc_error(Layout::new::<Node<T>>());
        }
    }

    /// Pop the most recently pushed value, or `None` if the stack was empty at some point during
    /// the call.
    #[instrument(level = "trace", skip_all)]
    pub fn pop(&self) -> Option<T> {
        let mut old_head: CountedLink<Node<T>> = self.head.load(Ordering::Relaxed);
        loop {
            old_head = self.claim_head(old_head)?;
            let ptr: *mut Node<T> = old_head.ptr();

            // our claim keeps the node alive, so next can be read
            let next: CountedLink<Node<T>> = unsafe { (*ptr).next };
            match self
                .head
                .compare_exchange(old_head, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => {
                    // the value must be out before the counts are settled, since any thread may
                    // free the node from then on
                    let value: Option<T> = unsafe { (*ptr).value.take() };
                    Self::release_detached(ptr, old_head.external_count());
                    return value;
                }
                Err(actual_head) => {
                    trace!("lost the detach race; relinquishing claim");
                    Self::release_claim(ptr);
                    old_head = actual_head;
                }
            }
        }
    }

    /// A snapshot: another thread may push or pop right after this returns.
    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire).is_null()
    }

    /// Record a claim on whatever `head` currently is, starting from the guess `old_head`.
    ///
    /// Returns the claimed link, or `None` if `head` was null.
    fn claim_head(&self, mut old_head: CountedLink<Node<T>>) -> Option<CountedLink<Node<T>>> {
        loop {
            if old_head.is_null() {
                return None;
            }
            let claimed_head: CountedLink<Node<T>> = old_head.with_incremented_count();
            match self.head.compare_exchange(
                old_head,
                claimed_head,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Some(claimed_head),
                Err(actual_head) => old_head = actual_head,
            }
        }
    }

    /// Settle the counts of a node this thread just detached.
    ///
    /// The detaching thread accounts for two of the external claims: the one the push started
    /// with and its own. Every other claim belongs to a thread which will subtract one from the
    /// internal count when its detach fails.
    fn release_detached(ptr: *mut Node<T>, external_count: u64) {
        debug_assert!(external_count >= 2, "a detached link carries its push and our claim");
        let count_increase: isize = external_count as isize - 2;

        let internal_count: &AtomicIsize = unsafe { &(*ptr).internal_count };
        if internal_count.fetch_add(count_increase, Ordering::AcqRel) == -count_increase {
            trace!("no other claims outstanding; freeing detached node");
            unsafe { node::free(ptr) };
        } else {
            trace!(other_claims = count_increase, "deferring free to the last claimant");
        }
    }

    /// Let go of a claim on a node some other thread detached or is about to detach.
    fn release_claim(ptr: *mut Node<T>) {
        let internal_count: &AtomicIsize = unsafe { &(*ptr).internal_count };
        if internal_count.fetch_sub(1, Ordering::Release) == 1 {
            // synchronize with every other claimant's release before the memory goes away
            let _ = internal_count.load(Ordering::Acquire);
            trace!("last claimant on a detached node; freeing it");
            unsafe { node::free(ptr) };
        }
    }
}

impl<T> Default for LockFreeStack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for LockFreeStack<T> {
    fn drop(&mut self) {
        while self.pop().is_some() {}
    }
}

impl<T> Debug for LockFreeStack<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LockFreeStack")
            .field("head", &self.head)
            .finish()
    }
}

impl<T: Send> ConcurrentStack<T> for LockFreeStack<T> {
    fn try_push(&self, value: T) -> Result<(), AllocError<T>> {
        LockFreeStack::try_push(self, value)
    }

    fn push(&self, value: T) {
        LockFreeStack::push(self, value)
    }

    fn pop(&self) -> Option<T> {
        LockFreeStack::pop(self)
    }

    fn is_empty(&self) -> bool {
        LockFreeStack::is_empty(self)
    }
}
