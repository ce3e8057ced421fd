//! Branch lifecycle, ordering, and shutdown behavior.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use workgrove::{HandleSet, Job, JobError, PoolError, WaitStrategy, WorkBranch};

/// Polls `pred` until it holds or `timeout` elapses.
fn eventually(timeout: Duration, mut pred: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if pred() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    pred()
}

#[test]
fn zero_workers_rounds_up_to_one() {
    let branch = WorkBranch::new(0, WaitStrategy::LowLatency);
    assert_eq!(branch.num_workers(), 1);
}

#[test]
fn worker_count_follows_adds_and_acknowledged_dels() {
    let branch = WorkBranch::new(2, WaitStrategy::Blocking);
    branch.add_worker();
    branch.add_worker();
    assert_eq!(branch.num_workers(), 4);

    branch.del_worker().unwrap();
    assert!(eventually(Duration::from_secs(2), || branch.num_workers() == 3));

    branch.del_worker().unwrap();
    branch.del_worker().unwrap();
    assert!(eventually(Duration::from_secs(2), || branch.num_workers() == 1));
}

#[test]
fn del_worker_on_a_drained_branch_reports_empty() {
    let branch = WorkBranch::new(1, WaitStrategy::LowLatency);
    branch.del_worker().unwrap();
    assert!(eventually(Duration::from_secs(2), || branch.num_workers() == 0));

    let err = branch.del_worker().unwrap_err();
    assert!(matches!(err, PoolError::EmptyBranch));
    assert_eq!(branch.num_workers(), 0);
}

#[test]
fn wait_tasks_drains_every_submission() {
    let branch = WorkBranch::new(4, WaitStrategy::Blocking);
    let counter = Arc::new(AtomicUsize::new(0));
    for _ in 0..1000 {
        let counter = Arc::clone(&counter);
        branch.submit(move || {
            counter.fetch_add(1, Ordering::Relaxed);
        });
    }
    assert!(branch.wait_tasks());
    assert_eq!(counter.load(Ordering::Relaxed), 1000);
    assert_eq!(branch.num_tasks(), 0);
}

#[test]
fn single_worker_preserves_submission_order() {
    let branch = WorkBranch::new(1, WaitStrategy::LowLatency);
    let order = Arc::new(Mutex::new(Vec::new()));
    for i in 0..100 {
        let order = Arc::clone(&order);
        branch.submit(move || order.lock().unwrap().push(i));
    }
    assert!(branch.wait_tasks());
    assert_eq!(*order.lock().unwrap(), (0..100).collect::<Vec<_>>());
}

#[test]
fn urgent_submission_jumps_the_queue() {
    let branch = WorkBranch::new(1, WaitStrategy::LowLatency);
    let order = Arc::new(Mutex::new(Vec::new()));

    // Occupy the lone worker so everything below stays queued behind it.
    {
        let order = Arc::clone(&order);
        branch.submit(move || {
            thread::sleep(Duration::from_millis(100));
            order.lock().unwrap().push("sleeper".to_owned());
        });
    }
    thread::sleep(Duration::from_millis(20));

    for i in 0..10 {
        let order = Arc::clone(&order);
        branch.submit(move || order.lock().unwrap().push(format!("n{i}")));
    }
    {
        let order = Arc::clone(&order);
        branch.submit_urgent(move || order.lock().unwrap().push("urgent".to_owned()));
    }

    assert!(branch.wait_tasks());
    let order = order.lock().unwrap();
    assert_eq!(order[0], "sleeper");
    assert_eq!(order[1], "urgent");
    let expected: Vec<String> = (0..10).map(|i| format!("n{i}")).collect();
    assert_eq!(order[2..], expected[..]);
}

#[test]
fn sequence_members_never_interleave_with_other_tasks() {
    let branch = WorkBranch::new(2, WaitStrategy::Blocking);
    let text = Arc::new(Mutex::new(String::new()));

    let append = |ch: char, pause: u64| {
        let text = Arc::clone(&text);
        Job::new(move || {
            thread::sleep(Duration::from_millis(pause));
            text.lock().unwrap().push(ch);
        })
    };
    branch.submit_sequence([append('a', 5), append('b', 5), append('c', 5)]);
    for _ in 0..20 {
        let text = Arc::clone(&text);
        branch.submit(move || text.lock().unwrap().push('x'));
    }

    assert!(branch.wait_tasks());
    let text = text.lock().unwrap();
    assert!(text.contains("abc"), "sequence was interleaved: {}", *text);
    assert_eq!(text.matches('x').count(), 20);
}

#[test]
fn bounded_wait_gives_up_on_a_busy_branch() {
    let branch = WorkBranch::new(1, WaitStrategy::LowLatency);
    branch.submit(|| thread::sleep(Duration::from_millis(200)));
    thread::sleep(Duration::from_millis(20));

    assert!(!branch.wait_tasks_for(Duration::ZERO));

    // The failed barrier must leave the branch serviceable.
    let handle = branch.submit_with_result(|| 7);
    assert_eq!(handle.join().unwrap(), 7);
    assert!(branch.wait_tasks());
}

#[test]
fn back_to_back_barriers_stay_consistent() {
    let branch = WorkBranch::new(3, WaitStrategy::Balance);
    let counter = Arc::new(AtomicUsize::new(0));
    for round in 1..=4 {
        for _ in 0..50 {
            let counter = Arc::clone(&counter);
            branch.submit(move || {
                counter.fetch_add(1, Ordering::Relaxed);
            });
        }
        assert!(branch.wait_tasks());
        assert_eq!(counter.load(Ordering::Relaxed), round * 50);
        assert_eq!(branch.num_tasks(), 0);
    }
}

#[test]
fn result_submissions_resolve_in_order_through_a_handle_set() {
    let branch = WorkBranch::new(1, WaitStrategy::Blocking);
    let mut set = HandleSet::new();
    for i in 0..100usize {
        set.add_back(branch.submit_with_result(move || i * i));
    }
    let results: Vec<usize> = set.join_all().into_iter().map(Result::unwrap).collect();
    let expected: Vec<usize> = (0..100).map(|i| i * i).collect();
    assert_eq!(results, expected);
}

#[test]
fn urgent_result_submission_overtakes_the_queue() {
    let branch = WorkBranch::new(1, WaitStrategy::Blocking);
    let stamp = Arc::new(AtomicUsize::new(0));

    branch.submit(|| thread::sleep(Duration::from_millis(50)));
    thread::sleep(Duration::from_millis(10));

    let normal = {
        let stamp = Arc::clone(&stamp);
        branch.submit_with_result(move || stamp.fetch_add(1, Ordering::SeqCst))
    };
    let urgent = {
        let stamp = Arc::clone(&stamp);
        branch.submit_urgent_with_result(move || stamp.fetch_add(1, Ordering::SeqCst))
    };

    assert_eq!(urgent.join().unwrap(), 0);
    assert_eq!(normal.join().unwrap(), 1);
}

#[test]
fn user_panic_is_transported_to_the_handle() {
    let branch = WorkBranch::new(1, WaitStrategy::Blocking);
    let handle = branch.submit_with_result(|| -> u32 { panic!("sour grapes") });

    let err = handle.join().unwrap_err();
    assert!(err.is_panic());
    assert!(err.to_string().contains("sour grapes"));

    // The worker survived the panic.
    assert_eq!(branch.num_workers(), 1);
    assert_eq!(branch.submit_with_result(|| 1).join().unwrap(), 1);
}

#[test]
fn void_panics_never_kill_workers() {
    let branch = WorkBranch::new(1, WaitStrategy::Blocking);
    for _ in 0..10 {
        branch.submit(|| panic!("suppressed"));
    }
    assert!(branch.wait_tasks());
    assert_eq!(branch.num_workers(), 1);

    let counter = Arc::new(AtomicUsize::new(0));
    {
        let counter = Arc::clone(&counter);
        branch.submit(move || {
            counter.fetch_add(1, Ordering::Relaxed);
        });
    }
    assert!(branch.wait_tasks());
    assert_eq!(counter.load(Ordering::Relaxed), 1);
}

#[test]
fn try_join_and_join_timeout_cover_the_slow_path() {
    let branch = WorkBranch::new(1, WaitStrategy::Blocking);

    let slow = branch.submit_with_result(|| {
        thread::sleep(Duration::from_millis(100));
        9
    });
    assert!(slow.try_join().is_none());
    let mut out = None;
    assert!(eventually(Duration::from_secs(2), || {
        match slow.try_join() {
            Some(result) => {
                out = Some(result);
                true
            }
            None => false,
        }
    }));
    assert_eq!(out.unwrap().unwrap(), 9);

    let stuck = branch.submit_with_result(|| {
        thread::sleep(Duration::from_millis(300));
    });
    let err = stuck.join_timeout(Duration::from_millis(10)).unwrap_err();
    assert!(matches!(err, JobError::Timeout { .. }));
    assert!(branch.wait_tasks());
}

#[test]
fn queued_jobs_dropped_at_shutdown_resolve_to_dropped() {
    let branch = WorkBranch::new(1, WaitStrategy::Blocking);
    branch.submit(|| thread::sleep(Duration::from_millis(200)));
    thread::sleep(Duration::from_millis(20));

    // Still queued behind the sleeper when the branch goes away.
    let handle = branch.submit_with_result(|| 5);
    drop(branch);
    assert!(matches!(handle.join(), Err(JobError::Dropped)));
}

#[test]
fn shutdown_under_load_finishes_every_started_task() {
    let started = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicUsize::new(0));

    let branch = WorkBranch::new(4, WaitStrategy::Blocking);
    for _ in 0..10_000 {
        let started = Arc::clone(&started);
        let finished = Arc::clone(&finished);
        branch.submit(move || {
            started.fetch_add(1, Ordering::SeqCst);
            finished.fetch_add(1, Ordering::SeqCst);
        });
    }
    drop(branch);

    // Whatever ran, ran to completion; the rest was dropped unexecuted.
    assert_eq!(
        started.load(Ordering::SeqCst),
        finished.load(Ordering::SeqCst)
    );
    assert!(started.load(Ordering::SeqCst) <= 10_000);
}
