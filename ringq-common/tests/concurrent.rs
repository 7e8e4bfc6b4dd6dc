use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use ringq_common::{BoundedQueue, QueueError};

const PRODUCERS: usize = 4;
const CONSUMERS: usize = 4;
const ITEMS: usize = 5_000;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn test_producers_consumers_conserve_items() {
    init_logger();

    let queue = Arc::new(BoundedQueue::new(8).unwrap());
    let remaining = Arc::new(AtomicUsize::new(PRODUCERS * ITEMS));

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let queue = queue.clone();
            thread::spawn(move || {
                for v in p * ITEMS..(p + 1) * ITEMS {
                    let mut item = v;
                    while let Err(back) = queue.try_push(item) {
                        item = back;
                        thread::yield_now();
                    }
                }
            })
        })
        .collect();

    let consumers: Vec<_> = (0..CONSUMERS)
        .map(|_| {
            let queue = queue.clone();
            let remaining = remaining.clone();
            thread::spawn(move || {
                let mut popped = vec![];
                while remaining.load(Ordering::Acquire) > 0 {
                    match queue.pop() {
                        Ok(v) => {
                            popped.push(v);
                            remaining.fetch_sub(1, Ordering::AcqRel);
                        }
                        Err(e) => {
                            assert_eq!(e, QueueError::Empty);
                            thread::yield_now();
                        }
                    }
                }
                popped
            })
        })
        .collect();

    for p in producers {
        p.join().unwrap();
    }

    let mut seen: HashMap<usize, usize> = HashMap::new();
    for c in consumers {
        for v in c.join().unwrap() {
            *seen.entry(v).or_default() += 1;
        }
    }

    assert_eq!(seen.len(), PRODUCERS * ITEMS);
    assert!(seen.values().all(|&n| n == 1));
    assert!((0..PRODUCERS * ITEMS).all(|v| seen.contains_key(&v)));
    assert!(queue.is_empty());
}

#[test]
fn test_each_producer_keeps_fifo_order() {
    let queue = Arc::new(BoundedQueue::new(4).unwrap());

    let producers: Vec<_> = (0..2u64)
        .map(|p| {
            let queue = queue.clone();
            thread::spawn(move || {
                for seq in 0..2_000u64 {
                    let mut item = (p, seq);
                    while let Err(back) = queue.try_push(item) {
                        item = back;
                        thread::yield_now();
                    }
                }
            })
        })
        .collect();

    let mut last: [Option<u64>; 2] = [None, None];
    let mut received = 0;
    while received < 4_000 {
        match queue.pop() {
            Ok((p, seq)) => {
                let prev = last[p as usize];
                assert!(prev.map_or(true, |prev| prev < seq));
                last[p as usize] = Some(seq);
                received += 1;
            }
            Err(_) => thread::yield_now(),
        }
    }

    for p in producers {
        p.join().unwrap();
    }
    assert_eq!(last, [Some(1_999), Some(1_999)]);
}

#[test]
fn test_cross_assign_does_not_deadlock() {
    init_logger();

    let a = Arc::new(BoundedQueue::new(16).unwrap());
    let b = Arc::new(BoundedQueue::new(16).unwrap());
    a.push(1u32).unwrap();
    b.push(2u32).unwrap();

    let forward = {
        let (a, b) = (a.clone(), b.clone());
        thread::spawn(move || {
            for _ in 0..10_000 {
                a.assign_from(&b);
            }
        })
    };
    let backward = {
        let (a, b) = (a.clone(), b.clone());
        thread::spawn(move || {
            for _ in 0..10_000 {
                b.assign_from(&a);
            }
        })
    };

    forward.join().unwrap();
    backward.join().unwrap();

    // every assignment copied a whole snapshot, never a torn one
    assert_eq!(a.len(), 1);
    assert_eq!(b.len(), 1);
    assert_eq!(a.peek_front(), b.peek_front());
}

#[test]
fn test_clone_under_concurrent_mutation() {
    let queue = Arc::new(BoundedQueue::new(32).unwrap());

    let writer = {
        let queue = queue.clone();
        thread::spawn(move || {
            for i in 0..20_000u64 {
                if queue.push(i).is_err() {
                    let _ = queue.drain();
                }
            }
        })
    };

    for _ in 0..2_000 {
        let snapshot = queue.clone();
        let items = snapshot.drain();
        assert!(items.len() <= 32);
        // a consistent snapshot is a run of consecutive pushes
        assert!(items.windows(2).all(|w| w[1] == w[0] + 1));
    }

    writer.join().unwrap();
}

#[test]
fn test_take_while_pushing() {
    let source = Arc::new(BoundedQueue::new(64).unwrap());
    let pushed = Arc::new(AtomicUsize::new(0));

    let writer = {
        let (source, pushed) = (source.clone(), pushed.clone());
        thread::spawn(move || {
            for i in 0..1_000usize {
                if source.push(i).is_ok() {
                    pushed.fetch_add(1, Ordering::AcqRel);
                }
            }
        })
    };

    let taken = source.take();
    writer.join().unwrap();

    // pushes landing after the move hit the detached source and are rejected
    assert_eq!(source.capacity(), 0);
    assert!(source.is_empty());
    assert_eq!(taken.capacity(), 64);
    assert_eq!(taken.len(), pushed.load(Ordering::Acquire));

    let items = taken.drain();
    assert!(items.windows(2).all(|w| w[0] < w[1]));
}
