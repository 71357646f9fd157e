#![cfg(all(not(loom), not(feature = "shuttle")))]

mod common;

use splitstack::{CoarseStack, ConcurrentStack, LockFreeStack};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Barrier;
use std::thread;
use test_log::test;

#[test]
fn test_two_threads_push_500_each_then_third_thread_pops_1000() {
    common::concurrent_pushes_then_drain::<LockFreeStack<usize>>(2, 500);
    common::concurrent_pushes_then_drain::<CoarseStack<usize>>(2, 500);
}

#[test]
fn test_many_threads_pushing_lose_nothing() {
    common::concurrent_pushes_then_drain::<LockFreeStack<usize>>(8, 2000);
    common::concurrent_pushes_then_drain::<CoarseStack<usize>>(8, 2000);
}

#[test]
fn test_more_pops_than_values_never_double_pop() {
    for _ in 0..20 {
        common::racing_pops::<LockFreeStack<usize>>(8, 200, 1000);
        common::racing_pops::<CoarseStack<usize>>(8, 200, 1000);
    }
}

#[test]
fn test_interleaved_push_pop_under_contention() {
    for _ in 0..200 {
        common::interleaved_push_pop::<LockFreeStack<usize>>(8);
        common::interleaved_push_pop::<CoarseStack<usize>>(8);
    }
}

#[test]
fn test_empty_stack_pops_empty_for_every_caller() {
    common::pops_on_empty::<LockFreeStack<usize>>(16);
    common::pops_on_empty::<CoarseStack<usize>>(16);
}

#[test]
fn test_lifo_for_non_overlapping_pushes() {
    fn check<S: ConcurrentStack<usize> + Default>() {
        let stack: S = S::default();
        thread::scope(|scope| {
            scope.spawn(|| stack.push(1)).join().expect("A thread panicked");
            scope.spawn(|| stack.push(2)).join().expect("A thread panicked");
        });
        assert_eq!(stack.pop(), Some(2));
        assert_eq!(stack.pop(), Some(1));
        assert_eq!(stack.pop(), None);
    }
    check::<LockFreeStack<usize>>();
    check::<CoarseStack<usize>>();
}

/// Producers and consumers run at the same time. Consumers keep popping until every produced
/// value has been consumed, so every value must come out exactly once.
fn producers_and_consumers<S: ConcurrentStack<usize> + Default>(
    num_producers: usize,
    num_consumers: usize,
    values_per_producer: usize,
) {
    let stack: S = S::default();
    let total: usize = num_producers * values_per_producer;
    let consumed: AtomicUsize = AtomicUsize::new(0);
    let barrier: Barrier = Barrier::new(num_producers + num_consumers);

    let popped: Vec<usize> = thread::scope(|scope| {
        for i in 0..num_producers {
            let stack: &S = &stack;
            let barrier: &Barrier = &barrier;
            scope.spawn(move || {
                barrier.wait();
                let start: usize = i * values_per_producer;
                (start..start + values_per_producer).for_each(|value| stack.push(value));
            });
        }

        let consumers: Vec<thread::ScopedJoinHandle<Vec<usize>>> = (0..num_consumers)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    let mut mine: Vec<usize> = Vec::new();
                    while consumed.load(Ordering::Acquire) < total {
                        match stack.pop() {
                            Some(value) => {
                                consumed.fetch_add(1, Ordering::AcqRel);
                                mine.push(value);
                            }
                            None => thread::yield_now(),
                        }
                    }
                    mine
                })
            })
            .collect();

        consumers
            .into_iter()
            .flat_map(|consumer| consumer.join().expect("A thread panicked"))
            .collect()
    });

    assert_eq!(popped.len(), total);
    let unique: HashSet<usize> = popped.into_iter().collect();
    assert_eq!(unique, (0..total).collect::<HashSet<usize>>());
    assert!(stack.is_empty());
}

#[test]
fn test_producers_and_consumers_split_count() {
    producers_and_consumers::<LockFreeStack<usize>>(4, 4, 5000);
}

#[test]
fn test_producers_and_consumers_coarse() {
    producers_and_consumers::<CoarseStack<usize>>(4, 4, 5000);
}
