//! Scheduling policy scenarios driven through `Kernel::execute`

use std::sync::{Arc, Mutex};

use exo_threads::{HaltReason, Kernel, KernelConfig, SchedulingPolicy};

#[test]
fn test_round_robin_preempts_on_quantum() {
    let config = KernelConfig::new().with_policy(SchedulingPolicy::RoundRobin { quantum: 10 });
    let kernel = Kernel::new(config);
    let k = kernel.clone();

    let report = kernel
        .run(move || {
            let worker = |k: Kernel| {
                k.execute(25);
                k.exit(false, 0);
            };
            let a = k.fork("A", worker, k.clone());
            let b = k.fork("B", worker, k.clone());
            k.join(a);
            k.join(b);
            k.exit(true, 0);
        })
        .unwrap();

    assert_eq!(report.stats.dispatch_trace, vec![0, 1, 2, 1, 2, 1, 2, 0]);
    assert_eq!(report.total_ticks, 50);

    let a = report.exit_of(1).unwrap();
    assert_eq!(a.instructions, 25);
    assert_eq!(a.total_burst, 25);
    assert_eq!(a.bursts, 3);
    assert_eq!(a.max_burst, 10);
    assert_eq!(a.min_burst, 5);
    assert_eq!(a.exit_tick, 45);
    // 100 * 25 / 45
    assert_eq!(a.utilization, 55);
    assert_eq!(a.wait_time, 20);

    assert_eq!(report.stats.busy_time, 50);
    assert_eq!(report.stats.num_bursts, 6);
}

#[test]
fn test_fcfs_never_preempts() {
    let kernel = Kernel::new(KernelConfig::default());
    let k = kernel.clone();

    let report = kernel
        .run(move || {
            let worker = |k: Kernel| {
                k.execute(500);
                k.exit(false, 0);
            };
            let a = k.fork("A", worker, k.clone());
            let b = k.fork("B", worker, k.clone());
            k.join(a);
            k.join(b);
            k.exit(true, 0);
        })
        .unwrap();

    assert_eq!(report.stats.dispatch_trace, vec![0, 1, 2, 0]);
    assert_eq!(report.exit_of(1).unwrap().bursts, 1);
}

#[test]
fn test_unix_decay_raises_priority_of_busy_thread() {
    let config = KernelConfig::new().with_policy(SchedulingPolicy::UnixDecay { quantum: 1000 });
    let kernel = Kernel::new(config);
    let k = kernel.clone();
    let priorities = Arc::new(Mutex::new(Vec::new()));
    let priorities_in = priorities.clone();

    kernel
        .run(move || {
            let hog = k.fork(
                "hog",
                move |k: Kernel| {
                    for _ in 0..5 {
                        k.execute(100);
                        k.yield_now();
                        let pid = k.current_pid();
                        let priority = k.with_thread(pid, |t| t.current_priority()).unwrap();
                        priorities_in.lock().unwrap().push(priority);
                    }
                    k.exit(false, 0);
                },
                k.clone(),
            );
            k.join(hog);
            k.exit(true, 0);
        })
        .unwrap();

    // base 50, cpu = (cpu + 100) / 2, priority = base + cpu / 2
    assert_eq!(*priorities.lock().unwrap(), vec![75, 87, 93, 96, 98]);
}

#[test]
fn test_unix_decay_prefers_light_threads() {
    let config = KernelConfig::new().with_policy(SchedulingPolicy::UnixDecay { quantum: 200 });
    let kernel = Kernel::new(config);
    let k = kernel.clone();

    let report = kernel
        .run(move || {
            let hog = k.fork(
                "hog",
                |k: Kernel| {
                    k.execute(300);
                    k.exit(false, 0);
                },
                k.clone(),
            );
            let light = |k: Kernel| {
                for _ in 0..2 {
                    k.execute(5);
                    k.yield_now();
                }
                k.exit(false, 0);
            };
            let l1 = k.fork("light", light, k.clone());
            let l2 = k.fork("light", light, k.clone());
            k.join(hog);
            k.join(l1);
            k.join(l2);
            k.exit(true, 0);
        })
        .unwrap();

    // after its first quantum the hog waits until both light threads are done
    assert_eq!(
        report.stats.dispatch_trace,
        vec![0, 1, 2, 3, 2, 3, 2, 3, 1, 0]
    );
    assert_eq!(report.exit_of(1).unwrap().bursts, 2);
}

#[test]
fn test_static_priority_order() {
    let config = KernelConfig::new().with_policy(SchedulingPolicy::StaticPriority);
    let kernel = Kernel::new(config);
    let k = kernel.clone();
    let order = Arc::new(Mutex::new(Vec::new()));
    let order_in = order.clone();

    kernel
        .run(move || {
            let mut children = Vec::new();
            for priority in [9, 3, 5] {
                let order = order_in.clone();
                children.push(k.fork_with_priority(
                    "prio",
                    priority,
                    move |k: Kernel| {
                        order.lock().unwrap().push(priority);
                        k.exit(false, 0);
                    },
                    k.clone(),
                ));
            }
            for child in children {
                k.join(child);
            }
            k.exit(true, 0);
        })
        .unwrap();

    assert_eq!(*order.lock().unwrap(), vec![3, 5, 9]);
}

#[test]
fn test_static_priority_yield_keeps_best_thread() {
    let config = KernelConfig::new().with_policy(SchedulingPolicy::StaticPriority);
    let kernel = Kernel::new(config);
    let k = kernel.clone();
    let events = Arc::new(Mutex::new(Vec::new()));
    let events_in = events.clone();

    let report = kernel
        .run(move || {
            let log_a = events_in.clone();
            let urgent = k.fork_with_priority(
                "urgent",
                1,
                move |k: Kernel| {
                    log_a.lock().unwrap().push("urgent yields");
                    k.yield_now();
                    log_a.lock().unwrap().push("urgent resumes");
                    k.exit(false, 0);
                },
                k.clone(),
            );
            let log_b = events_in.clone();
            let background = k.fork_with_priority(
                "background",
                9,
                move |k: Kernel| {
                    log_b.lock().unwrap().push("background runs");
                    k.exit(false, 0);
                },
                k.clone(),
            );
            k.join(urgent);
            k.join(background);
            k.exit(true, 0);
        })
        .unwrap();

    assert_eq!(
        *events.lock().unwrap(),
        vec!["urgent yields", "urgent resumes", "background runs"]
    );
    // re-selecting the yielder is not a switch
    assert_eq!(report.stats.dispatch_trace, vec![0, 1, 2, 0]);
}

#[test]
fn test_shortest_prediction_converges_and_orders() {
    let config = KernelConfig::new().with_policy(SchedulingPolicy::ShortestPrediction);
    let kernel = Kernel::new(config);
    let k = kernel.clone();
    let predictions = Arc::new(Mutex::new(Vec::new()));
    let predictions_in = predictions.clone();

    let report = kernel
        .run(move || {
            let steady = k.fork(
                "steady",
                move |k: Kernel| {
                    for _ in 0..8 {
                        k.execute(40);
                        k.yield_now();
                        let pid = k.current_pid();
                        let predicted = k.with_thread(pid, |t| t.predicted_burst()).unwrap();
                        predictions_in.lock().unwrap().push(predicted);
                    }
                    k.exit(false, 0);
                },
                k.clone(),
            );
            k.join(steady);
            k.exit(true, 0);
        })
        .unwrap();

    let predictions = predictions.lock().unwrap();
    assert_eq!(&predictions[..3], &[20.0, 30.0, 35.0]);
    assert!((predictions[7] - 40.0).abs() < 1.0);
    // 40 * (1 + 1/2 + ... + 1/128)
    assert!((report.stats.estimation_error - 79.6875).abs() < 1e-9);
}

#[test]
fn test_shortest_prediction_runs_short_bursts_first() {
    let config = KernelConfig::new().with_policy(SchedulingPolicy::ShortestPrediction);
    let kernel = Kernel::new(config);
    let k = kernel.clone();

    let report = kernel
        .run(move || {
            let short = |k: Kernel| {
                for _ in 0..3 {
                    k.execute(10);
                    k.yield_now();
                }
                k.exit(false, 0);
            };
            k.fork("short", short, k.clone());
            k.fork("short", short, k.clone());
            let long = k.fork(
                "long",
                |k: Kernel| {
                    for _ in 0..2 {
                        k.execute(100);
                        k.yield_now();
                    }
                    k.exit(false, 0);
                },
                k.clone(),
            );
            k.join(long);
            k.exit(true, 0);
        })
        .unwrap();

    assert_eq!(report.reason, HaltReason::AllThreadsExited);
    assert_eq!(
        report.stats.dispatch_trace,
        vec![0, 1, 2, 3, 1, 2, 1, 2, 1, 2, 3, 0]
    );
}
