//! A simpler stack which reclaims nodes only when a single thread is inside `pop`.
//!
//! Every `pop` registers itself in `threads_in_pop`. A popper which finds itself alone may free
//! its own node and everything waiting on the pending list; otherwise it parks its node on the
//! pending list for a later lone popper. Reclamation is serialized across all pops rather than per
//! node, so under constant pop contention the pending list keeps growing until some popper runs
//! alone.

use crate::err::AllocError;
use crate::node::{self, ValueCell};
use crate::sync::{AtomicPtr, AtomicUsize, Ordering};
use crate::ConcurrentStack;
use alloc::alloc::{handle_alloc_error, Layout};
use core::fmt::{Debug, Formatter};
use core::ptr;
use tracing::{instrument, trace};

struct Node<T> {
    value: ValueCell<T>,
    /// Atomic because chaining a detached node onto the pending list rewrites it while late
    /// poppers may still be reading it.
    next: AtomicPtr<Node<T>>,
}

/// A lock-free stack with coarse, pop-wide deferred reclamation.
///
/// Prefer [LockFreeStack](crate::LockFreeStack). This variant is easier to reason about but holds
/// on to popped nodes for as long as pops overlap.
pub struct CoarseStack<T> {
    head: AtomicPtr<Node<T>>,
    threads_in_pop: AtomicUsize,
    to_be_deleted: AtomicPtr<Node<T>>,
}

unsafe impl<T: Send> Send for CoarseStack<T> {}
unsafe impl<T: Send> Sync for CoarseStack<T> {}

impl<T> CoarseStack<T> {
    pub fn new() -> Self {
        Self {
            head: AtomicPtr::new(ptr::null_mut()),
            threads_in_pop: AtomicUsize::new(0),
            to_be_deleted: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Push `value`, handing it back if a node for it could not be allocated.
    #[instrument(level = "trace", skip_all)]
    pub fn try_push(&self, value: T) -> Result<(), AllocError<T>> {
        let mut current_head: *mut Node<T> = self.head.load(Ordering::Relaxed);
        let node_ptr: *mut Node<T> = node::try_allocate(value, |value| Node {
            value: ValueCell::new(value),
            next: AtomicPtr::new(current_head),
        })?;

        while let Err(actual_head) = self.head.compare_exchange_weak(
            current_head,
            node_ptr,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            unsafe { (*node_ptr).next.store(actual_head, Ordering::Relaxed) };
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
        self.threads_in_pop.fetch_add(1, Ordering::SeqCst);

        let mut old_head: *mut Node<T> = self.head.load(Ordering::SeqCst);
        while !old_head.is_null() {
            // nothing is freed while we are counted in threads_in_pop
            let next: *mut Node<T> = unsafe { (*old_head).next.load(Ordering::SeqCst) };
            match self.head.compare_exchange_weak(
                old_head,
                next,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => break,
                Err(actual_head) => old_head = actual_head,
            }
        }

        let value: Option<T> = if old_head.is_null() {
            None
        } else {
            unsafe { (*old_head).value.take() }
        };
        self.try_reclaim(old_head);
        value
    }

    /// A snapshot: another thread may push or pop right after this returns.
    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::SeqCst).is_null()
    }

    /// The number of popped nodes still waiting to be freed.
    pub fn pending_reclamation(&mut self) -> usize {
        let mut count: usize = 0;
        let mut current: *mut Node<T> = self.to_be_deleted.load(Ordering::Acquire);
        while !current.is_null() {
            count += 1;
            current = unsafe { (*current).next.load(Ordering::Acquire) };
        }
        count
    }

    /// Free `old_head` (null if the pop found nothing) now if this is the only thread in `pop`,
    /// otherwise leave it on the pending list.
    fn try_reclaim(&self, old_head: *mut Node<T>) {
        if self.threads_in_pop.load(Ordering::SeqCst) == 1 {
            let nodes_to_delete: *mut Node<T> =
                self.to_be_deleted.swap(ptr::null_mut(), Ordering::SeqCst);

            if self.threads_in_pop.fetch_sub(1, Ordering::SeqCst) == 1 {
                let freed: usize = unsafe { delete_nodes(nodes_to_delete) };
                if freed > 0 {
                    trace!(freed, "flushed the pending list");
                }
            } else if !nodes_to_delete.is_null() {
                // someone entered pop after we looked and may be holding one of these
                trace!("another popper arrived; handing the pending list back");
                unsafe { self.chain_pending_nodes(nodes_to_delete) };
            }

            // nobody else was in pop after we detached old_head, so nobody can be holding it
            if !old_head.is_null() {
                unsafe { node::free(old_head) };
            }
        } else {
            if !old_head.is_null() {
                trace!("pops overlap; deferring free");
                unsafe { self.chain_pending_node(old_head) };
            }
            self.threads_in_pop.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// # Safety
    /// `nodes` must be a non-null, detached, null-terminated chain owned by the caller.
    unsafe fn chain_pending_nodes(&self, nodes: *mut Node<T>) {
        let mut last: *mut Node<T> = nodes;
        loop {
            let next: *mut Node<T> = (*last).next.load(Ordering::Relaxed);
            if next.is_null() {
                break;
            }
            last = next;
        }
        self.chain_pending_range(nodes, last);
    }

    /// # Safety
    /// `node_ptr` must be a detached node owned by the caller.
    unsafe fn chain_pending_node(&self, node_ptr: *mut Node<T>) {
        self.chain_pending_range(node_ptr, node_ptr);
    }

    unsafe fn chain_pending_range(&self, first: *mut Node<T>, last: *mut Node<T>) {
        let mut current: *mut Node<T> = self.to_be_deleted.load(Ordering::SeqCst);
        loop {
            (*last).next.store(current, Ordering::SeqCst);
            match self.to_be_deleted.compare_exchange_weak(
                current,
                first,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }
}

/// Free every node of a null-terminated chain and return how many there were.
///
/// # Safety
/// No other thread may reach any node of the chain.
unsafe fn delete_nodes<T>(mut nodes: *mut Node<T>) -> usize {
    let mut freed: usize = 0;
    while !nodes.is_null() {
        let next: *mut Node<T> = (*nodes).next.load(Ordering::Relaxed);
        node::free(nodes);
        freed += 1;
        nodes = next;
    }
    freed
}

impl<T> Default for CoarseStack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for CoarseStack<T> {
    fn drop(&mut self) {
        while self.pop().is_some() {}
        let remaining: *mut Node<T> = self.to_be_deleted.swap(ptr::null_mut(), Ordering::Acquire);
        unsafe { delete_nodes(remaining) };
    }
}

impl<T> Debug for CoarseStack<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CoarseStack")
            .field("head", &self.head.load(Ordering::Relaxed))
            .field("threads_in_pop", &self.threads_in_pop.load(Ordering::Relaxed))
            .field("to_be_deleted", &self.to_be_deleted.load(Ordering::Relaxed))
            .finish()
    }
}

impl<T: Send> ConcurrentStack<T> for CoarseStack<T> {
    fn try_push(&self, value: T) -> Result<(), AllocError<T>> {
        CoarseStack::try_push(self, value)
    }

    fn push(&self, value: T) {
        CoarseStack::push(self, value)
    }

    fn pop(&self) -> Option<T> {
        CoarseStack::pop(self)
    }

    fn is_empty(&self) -> bool {
        CoarseStack::is_empty(self)
    }
}
