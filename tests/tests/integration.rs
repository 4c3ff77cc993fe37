use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use shedq_kernel::Criticality;
use shedq_testing::{Harness, assert_cancelled, settle};

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

#[tokio::test]
async fn test_fifo_preserved_without_shedding() -> anyhow::Result<()> {
    let h = Harness::new(3, 1)?;
    let labels: Vec<String> = (0..8).map(|i| format!("job-{i}")).collect();
    for (i, label) in labels.iter().enumerate() {
        h.insert(label, Criticality::ALL[i % 4], h.context());
    }
    assert!(h.wait_for_len(labels.len()).await);

    let mut out = Vec::new();
    while let Some(v) = h.queue.remove() {
        h.clock.advance(ms(5));
        out.push(v);
    }
    assert_eq!(out, labels);
    assert_cancelled!(h.probe, 0);
    Ok(())
}

#[tokio::test]
async fn test_len_tracks_inserts_removes_and_sheds() -> anyhow::Result<()> {
    let h = Harness::new(2, 0)?;
    let contexts: Vec<_> = (0..6).map(|_| h.context()).collect();
    for (i, ctx) in contexts.iter().enumerate() {
        h.insert(&format!("r{i}"), Criticality::Critical, ctx.clone());
        assert_eq!(h.queue.len(), i + 1);
    }

    assert!(h.queue.remove().is_some());
    contexts[3].cancel();
    contexts[5].cancel();
    assert!(h.wait_for_len(3).await);

    let metrics = h.queue.metrics();
    assert_eq!(metrics.inserted, 6);
    assert_eq!(metrics.dequeued, 1);
    assert_eq!(metrics.shed_terminated, 2);
    assert_eq!(
        h.queue.len() as u64,
        metrics.inserted - metrics.dequeued - metrics.shed_total()
    );
    assert_cancelled!(h.probe, 2);
    Ok(())
}

#[tokio::test]
async fn test_trimmed_mean_of_observed_intervals() -> anyhow::Result<()> {
    let h = Harness::new(5, 1)?;
    for (i, interval) in [10, 50, 20, 40, 30].into_iter().enumerate() {
        h.insert(&format!("r{i}"), Criticality::Critical, h.context());
        h.clock.advance(ms(interval));
        assert!(h.queue.remove().is_some());
        if i < 4 {
            assert_eq!(h.queue.expected_wait(), Duration::ZERO);
        }
    }
    assert_eq!(h.queue.expected_wait(), ms(30));
    Ok(())
}

#[tokio::test]
async fn test_cold_start_never_sheds_on_deadline() -> anyhow::Result<()> {
    let h = Harness::new(3, 0)?;
    h.warm_up(2, ms(200));
    assert_eq!(h.queue.expected_wait(), Duration::ZERO);

    for i in 0..5 {
        h.insert(&format!("tight-{i}"), Criticality::Sheddable, h.context_within(ms(1)));
    }
    tokio::time::sleep(ms(20)).await;
    assert_eq!(h.queue.len(), 5);
    assert_cancelled!(h.probe, 0);

    // Once the deadlines actually pass, dead-context removal still applies.
    h.clock.advance(ms(2));
    let summary = h.queue.shed();
    assert_eq!(summary.terminated, 5);
    assert_eq!(summary.missed_deadline, 0);
    assert!(h.queue.is_empty());
    assert_cancelled!(h.probe, 5);
    Ok(())
}

#[tokio::test]
async fn test_raising_criticality_never_increases_shedding() -> anyhow::Result<()> {
    let mut shed_by_tier = Vec::new();
    for tier in Criticality::ALL {
        let h = Harness::new(2, 0)?;
        h.warm_up(2, ms(100));
        assert_eq!(h.queue.expected_wait(), ms(100));

        h.insert("a", Criticality::SheddablePlus, h.context());
        h.insert("b", Criticality::Critical, h.context());
        h.insert("c", Criticality::CriticalPlus, h.context());
        h.insert("target", tier, h.context_within(ms(250)));
        h.queue.shed();

        shed_by_tier.push(h.probe.times_cancelled("target") == 1);
        assert_eq!(h.probe.times_cancelled("a"), 0);
        assert_eq!(h.probe.times_cancelled("b"), 0);
        assert_eq!(h.probe.times_cancelled("c"), 0);
    }

    // Slots ahead of the target: 3, 3, 2, 1 at 100ms each against a 250ms deadline.
    assert_eq!(shed_by_tier, vec![true, true, false, false]);
    assert!(shed_by_tier.windows(2).all(|w| w[0] || !w[1]));
    Ok(())
}

#[tokio::test]
async fn test_lower_criticality_shed_first_with_equal_deadlines() -> anyhow::Result<()> {
    let h = Harness::new(2, 0)?;
    h.warm_up(2, ms(100));

    h.insert("filler", Criticality::Critical, h.context());
    h.insert("low", Criticality::Sheddable, h.context_within(ms(150)));
    h.insert("high", Criticality::CriticalPlus, h.context_within(ms(150)));
    h.queue.shed();

    assert_eq!(h.probe.cancelled(), vec!["low".to_string()]);
    assert_eq!(h.queue.remove().as_deref(), Some("filler"));
    assert_eq!(h.queue.remove().as_deref(), Some("high"));
    Ok(())
}

#[tokio::test]
async fn test_scenario_a_warm_up_estimate() -> anyhow::Result<()> {
    let h = Harness::new(2, 0)?;
    for label in ["one", "two", "three"] {
        h.insert(label, Criticality::Critical, h.context());
    }

    h.clock.advance(ms(100));
    assert_eq!(h.queue.remove().as_deref(), Some("one"));
    h.clock.advance(ms(300));
    assert_eq!(h.queue.remove().as_deref(), Some("two"));

    assert_eq!(h.queue.expected_wait(), ms(200));
    assert_eq!(h.queue.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_scenario_b_item_beyond_capacity_is_shed() -> anyhow::Result<()> {
    let h = Harness::new(2, 0)?;
    h.warm_up(2, ms(200));
    assert_eq!(h.queue.expected_wait(), ms(200));

    h.insert("first", Criticality::Critical, h.context());
    h.insert("second", Criticality::Critical, h.context());
    assert!(h.wait_for_len(2).await);

    h.insert("late", Criticality::Critical, h.context_within(ms(150)));
    assert_eq!(h.queue.len(), 3);

    // The watcher's immediate pass projects "late" at 400ms.
    assert!(h.wait_for_len(2).await);
    assert_eq!(h.probe.cancelled(), vec!["late".to_string()]);
    assert_eq!(h.queue.metrics().shed_deadline, 1);
    Ok(())
}

#[tokio::test]
async fn test_scenario_c_critical_item_displaces_lower_tier() -> anyhow::Result<()> {
    let h = Harness::new(2, 0)?;
    h.warm_up(2, ms(200));

    h.insert("x", Criticality::Sheddable, h.context_within(ms(300)));
    h.insert("y", Criticality::Sheddable, h.context_within(ms(300)));
    assert!(h.wait_for_len(2).await);
    assert_cancelled!(h.probe, 0);

    h.insert("urgent", Criticality::CriticalPlus, h.context_within(ms(50)));

    // "urgent" takes slot 0; "x" moves to 200ms, "y" to 400ms and misses.
    assert!(h.wait_for_len(2).await);
    assert_eq!(h.probe.cancelled(), vec!["y".to_string()]);

    // The buffer itself is never reordered.
    assert_eq!(h.queue.remove().as_deref(), Some("x"));
    assert_eq!(h.queue.remove().as_deref(), Some("urgent"));
    Ok(())
}

#[tokio::test]
async fn test_already_cancelled_request_is_rejected_on_insert() -> anyhow::Result<()> {
    let h = Harness::new(2, 0)?;
    let ctx = h.context();
    ctx.cancel();
    h.insert("dead", Criticality::CriticalPlus, ctx);

    assert!(h.wait_for_len(0).await);
    assert_eq!(h.probe.times_cancelled("dead"), 1);
    Ok(())
}

#[tokio::test]
async fn test_len_does_not_shed_but_remove_does() -> anyhow::Result<()> {
    let h = Harness::new(2, 0)?;
    h.insert("expiring", Criticality::Critical, h.context_within(ms(100)));
    settle().await;
    assert_eq!(h.queue.len(), 1);
    assert_cancelled!(h.probe, 0);

    h.clock.advance(ms(150));
    assert_eq!(h.queue.len(), 1);
    assert_eq!(h.queue.remove(), None);
    assert_eq!(h.probe.cancelled(), vec!["expiring".to_string()]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_every_request_is_served_or_cancelled_exactly_once() -> anyhow::Result<()> {
    const PRODUCERS: usize = 4;
    const PER_PRODUCER: usize = 100;

    let h = Arc::new(Harness::new(10, 1)?);
    let contexts = Arc::new(Mutex::new(Vec::new()));
    let served = Arc::new(Mutex::new(Vec::new()));

    let mut tasks = Vec::new();
    for p in 0..PRODUCERS {
        let h = Arc::clone(&h);
        let contexts = Arc::clone(&contexts);
        tasks.push(tokio::spawn(async move {
            for i in 0..PER_PRODUCER {
                let ctx = h.context();
                h.insert(&format!("p{p}-{i}"), Criticality::ALL[i % 4], ctx.clone());
                if i % 3 == 0 {
                    ctx.cancel();
                }
                contexts.lock().push(ctx);
                tokio::task::yield_now().await;
            }
        }));
    }
    for _ in 0..2 {
        let h = Arc::clone(&h);
        let served = Arc::clone(&served);
        tasks.push(tokio::spawn(async move {
            for _ in 0..PER_PRODUCER {
                if let Some(v) = h.queue.remove() {
                    served.lock().push(v);
                }
                tokio::task::yield_now().await;
            }
        }));
    }
    for task in tasks {
        task.await?;
    }

    for ctx in contexts.lock().iter() {
        ctx.cancel();
    }
    assert!(h.wait_for_len(0).await);

    let served = served.lock().clone();
    let cancelled = h.probe.cancelled();
    assert_eq!(served.len() + cancelled.len(), PRODUCERS * PER_PRODUCER);

    let mut seen = HashSet::new();
    for label in served.iter().chain(cancelled.iter()) {
        assert!(seen.insert(label.clone()), "{label} finished twice");
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_metrics_snapshot_never_counts_more_outcomes_than_inserts() -> anyhow::Result<()> {
    const REQUESTS: usize = 400;

    let h = Arc::new(Harness::new(10, 1)?);
    let producer = {
        let h = Arc::clone(&h);
        tokio::spawn(async move {
            for i in 0..REQUESTS {
                let ctx = h.context();
                if i % 4 == 0 {
                    ctx.cancel();
                }
                h.insert(&format!("m{i}"), Criticality::ALL[i % 4], ctx);
                tokio::task::yield_now().await;
            }
        })
    };
    let consumer = {
        let h = Arc::clone(&h);
        tokio::spawn(async move {
            for _ in 0..REQUESTS {
                let _ = h.queue.remove();
                tokio::task::yield_now().await;
            }
        })
    };

    while !(producer.is_finished() && consumer.is_finished()) {
        let m = h.queue.metrics();
        assert!(
            m.inserted >= m.dequeued + m.shed_total(),
            "inconsistent snapshot: {m:?}"
        );
        tokio::task::yield_now().await;
    }
    producer.await?;
    consumer.await?;

    let m = h.queue.metrics();
    assert_eq!(m.inserted, REQUESTS as u64);
    assert!(m.inserted >= m.dequeued + m.shed_total());
    Ok(())
}

#[tokio::test]
async fn test_invalid_config_is_rejected_at_construction() {
    let err = Harness::new(2, 1).err().expect("config must be rejected");
    assert!(err.to_string().contains("discard_outliers (1)"));
}
