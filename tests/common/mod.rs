#![allow(dead_code)]

use splitstack::ConcurrentStack;
use tracing::debug;

cfg_if::cfg_if! {
    if #[cfg(loom)] {
        pub(crate) use loom::sync::Arc;
        pub(crate) use loom::thread;
    } else if #[cfg(feature = "shuttle")] {
        pub(crate) use shuttle::sync::Arc;
        pub(crate) use shuttle::thread;
    } else {
        pub(crate) use std::sync::Arc;
        pub(crate) use std::thread;
    }
}

/// Pop until the stack reports empty, returning the values in pop order.
pub(crate) fn drain<S: ConcurrentStack<usize>>(stack: &S) -> Vec<usize> {
    let mut values: Vec<usize> = Vec::new();
    while let Some(value) = stack.pop() {
        values.push(value);
    }
    values
}

fn assert_exactly(mut actual: Vec<usize>, expected: impl IntoIterator<Item = usize>) {
    actual.sort_unstable();
    let mut expected: Vec<usize> = expected.into_iter().collect();
    expected.sort_unstable();
    assert_eq!(actual, expected, "values were lost or returned more than once");
}

/// Several threads push disjoint ranges at once; a single thread then drains the stack and must
/// see every value exactly once, followed by an empty pop.
pub(crate) fn concurrent_pushes_then_drain<S>(num_threads: usize, values_per_thread: usize)
where
    S: ConcurrentStack<usize> + Default + 'static,
{
    let stack: Arc<S> = Arc::new(S::default());

    let join_handles: Vec<thread::JoinHandle<()>> = (0..num_threads)
        .map(|i| {
            let stack: Arc<S> = stack.clone();
            thread::spawn(move || {
                let start: usize = i * values_per_thread;
                (start..start + values_per_thread).for_each(|value| stack.push(value));
            })
        })
        .collect();
    join_handles
        .into_iter()
        .for_each(|join_handle| join_handle.join().expect("A thread panicked"));

    let popped: Vec<usize> = drain(stack.as_ref());
    debug!("drained {} values", popped.len());
    assert_exactly(popped, 0..num_threads * values_per_thread);
    assert_eq!(stack.pop(), None);
}

/// Every thread pops from a prefilled stack at once. More pops are issued than there are values,
/// so some threads come up empty, but no value may be handed out twice.
pub(crate) fn racing_pops<S>(num_threads: usize, pops_per_thread: usize, prefill: usize)
where
    S: ConcurrentStack<usize> + Default + 'static,
{
    let stack: Arc<S> = Arc::new(S::default());
    (0..prefill).for_each(|value| stack.push(value));

    let join_handles: Vec<thread::JoinHandle<Vec<usize>>> = (0..num_threads)
        .map(|_| {
            let stack: Arc<S> = stack.clone();
            thread::spawn(move || {
                (0..pops_per_thread)
                    .filter_map(|_| stack.pop())
                    .collect::<Vec<usize>>()
            })
        })
        .collect();

    let mut popped: Vec<usize> = join_handles
        .into_iter()
        .flat_map(|join_handle| join_handle.join().expect("A thread panicked"))
        .collect();
    popped.extend(drain(stack.as_ref()));
    assert_exactly(popped, 0..prefill);
}

/// Each thread pushes its own value and immediately pops one, racing the other threads' pushes
/// and pops. Whatever the interleaving, the values handed out plus whatever is left on the stack
/// are exactly the values pushed.
pub(crate) fn interleaved_push_pop<S>(num_threads: usize)
where
    S: ConcurrentStack<usize> + Default + 'static,
{
    let stack: Arc<S> = Arc::new(S::default());

    let join_handles: Vec<thread::JoinHandle<Option<usize>>> = (0..num_threads)
        .map(|i| {
            let stack: Arc<S> = stack.clone();
            thread::spawn(move || {
                stack.push(i);
                stack.pop()
            })
        })
        .collect();

    let mut popped: Vec<usize> = join_handles
        .into_iter()
        .map(|join_handle| join_handle.join().expect("A thread panicked"))
        .map(|value| value.expect("a thread's own push guarantees its pop finds something"))
        .collect();
    popped.extend(drain(stack.as_ref()));
    assert_exactly(popped, 0..num_threads);
}

/// Pops against a stack which never saw a push always come back empty.
pub(crate) fn pops_on_empty<S>(num_threads: usize)
where
    S: ConcurrentStack<usize> + Default + 'static,
{
    let stack: Arc<S> = Arc::new(S::default());

    let join_handles: Vec<thread::JoinHandle<Option<usize>>> = (0..num_threads)
        .map(|_| {
            let stack: Arc<S> = stack.clone();
            thread::spawn(move || stack.pop())
        })
        .collect();

    join_handles.into_iter().for_each(|join_handle| {
        assert_eq!(join_handle.join().expect("A thread panicked"), None);
    });
    assert!(stack.is_empty());
}
