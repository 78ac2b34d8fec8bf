//! End-to-end tests for the spill scheduler.
//!
//! Drives the full memory → disk → memory cycle through configurations a
//! deployment would actually use, including the degenerate zero-memory
//! setup where every record must take the disk detour.

use std::sync::Arc;
use std::time::Duration;

use telespool::{
    estimated_size, BufferConfig, BufferRegistry, DataRecord, DiskRetentionPolicy,
    ExecutionFormat, FieldValue, SpillScheduler, SpillTarget, TimeFormat,
};
use tempfile::tempdir;
use tokio::sync::watch;

fn numbered_record(route: &str, seq: i64) -> DataRecord {
    let mut record = DataRecord::new(route);
    record
        .append_row(
            &["seq"],
            &[seq.into()],
            chrono::DateTime::from_timestamp_millis(1_700_000_000_000 + seq).unwrap(),
            TimeFormat::UnixMillis,
        )
        .unwrap();
    record
}

fn seq_of(record: &DataRecord) -> f64 {
    match record.samples[0].fields()[0].value {
        FieldValue::Number(v) => v,
        _ => panic!("seq field is not numeric"),
    }
}

#[tokio::test]
async fn test_zero_memory_budget_routes_everything_through_disk() {
    let dir = tempdir().unwrap();
    let config = BufferConfig {
        memory_buffer_size: "0B".to_string(),
        disk_buffer_size: "1MB".to_string(),
        buffer_path: dir.path().display().to_string(),
        ..BufferConfig::default()
    };

    let registry = Arc::new(BufferRegistry::new());
    let target = SpillTarget::from_config("r", &config).unwrap();
    let scheduler = SpillScheduler::new(
        Arc::clone(&registry),
        vec![target],
        config.interval().unwrap(),
        config.execution_format,
    );

    registry.enqueue("r", numbered_record("r", 1));

    // First pass: over the zero budget, so the record spills.
    scheduler.tick().await;
    assert_eq!(registry.depth_of("r"), 0);
    let policy = DiskRetentionPolicy::for_route(dir.path(), "r").unwrap();
    assert_eq!(policy.stats().file_count, 1);

    // Second pass: memory is empty, so the record comes back.
    scheduler.tick().await;
    assert_eq!(registry.depth_of("r"), 1);
    let recovered = registry.try_dequeue("r").unwrap();
    assert_eq!(seq_of(&recovered), 1.0);
    assert_eq!(policy.rescan().unwrap().file_count, 0);
}

#[tokio::test]
async fn test_overflow_spills_oldest_and_recovers_in_recency_order() {
    let dir = tempdir().unwrap();
    let registry = Arc::new(BufferRegistry::new());
    let per_record = estimated_size(&numbered_record("r", 0));

    // Budget for two records in memory.
    let policy = DiskRetentionPolicy::for_route(dir.path(), "r").unwrap();
    let target = SpillTarget::new("r", policy, per_record * 2, u64::MAX, 0, true);
    let scheduler = SpillScheduler::new(
        Arc::clone(&registry),
        vec![target],
        Duration::from_secs(1),
        ExecutionFormat::Parallel,
    );

    for seq in 0..5 {
        registry.enqueue("r", numbered_record("r", seq));
    }

    scheduler.tick().await;

    // The three oldest records (0, 1, 2) spilled; 3 and 4 stayed.
    assert_eq!(registry.depth_of("r"), 2);
    assert_eq!(seq_of(&registry.try_dequeue("r").unwrap()), 3.0);
    assert_eq!(seq_of(&registry.try_dequeue("r").unwrap()), 4.0);

    // Memory now empty: the next pass recovers newest-spilled first, as
    // much as the two-record budget admits.
    scheduler.tick().await;
    let recovered: Vec<f64> = std::iter::from_fn(|| registry.try_dequeue("r"))
        .map(|r| seq_of(&r))
        .collect();
    assert_eq!(recovered, vec![2.0, 1.0]);

    // A further pass brings back the remainder.
    scheduler.tick().await;
    assert_eq!(seq_of(&registry.try_dequeue("r").unwrap()), 0.0);
}

#[tokio::test]
async fn test_disk_pressure_evicts_oldest_spill_files() {
    let dir = tempdir().unwrap();
    let registry = Arc::new(BufferRegistry::new());

    // Zero memory and a two-file disk cap: sustained overflow must cost
    // the oldest spilled records, never the newest.
    let policy = DiskRetentionPolicy::for_route(dir.path(), "r").unwrap();
    let target = SpillTarget::new("r", policy, 0, u64::MAX, 2, true);
    let scheduler = SpillScheduler::new(
        Arc::clone(&registry),
        vec![target],
        Duration::from_secs(1),
        ExecutionFormat::Sequence,
    );

    for seq in 0..5 {
        registry.enqueue("r", numbered_record("r", seq));
        scheduler.tick().await;
        // Distinct mtimes keep the eviction order unambiguous.
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let policy = DiskRetentionPolicy::for_route(dir.path(), "r").unwrap();
    assert_eq!(policy.stats().file_count, 2);

    let survivors = policy.recover_eligible(u64::MAX, 0).unwrap();
    let seqs: Vec<f64> = survivors.iter().map(seq_of).collect();
    assert_eq!(seqs, vec![4.0, 3.0]);
}

#[tokio::test]
async fn test_run_loop_balances_and_shuts_down() {
    let dir = tempdir().unwrap();
    let registry = Arc::new(BufferRegistry::new());
    let policy = DiskRetentionPolicy::for_route(dir.path(), "r").unwrap();
    let target = SpillTarget::new("r", policy, 0, u64::MAX, 0, true);
    let scheduler = Arc::new(SpillScheduler::new(
        Arc::clone(&registry),
        vec![target],
        Duration::from_millis(20),
        ExecutionFormat::Parallel,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move { scheduler.run(shutdown_rx).await })
    };

    registry.enqueue("r", numbered_record("r", 1));

    // Within a few periods the record must have spilled.
    let policy = DiskRetentionPolicy::for_route(dir.path(), "r").unwrap();
    let mut spilled = false;
    for _ in 0..100 {
        if registry.depth_of("r") == 0 && policy.rescan().unwrap().file_count > 0 {
            spilled = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(spilled, "running scheduler never spilled the record");

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("scheduler ignored shutdown")
        .unwrap();
}

#[tokio::test]
async fn test_sequence_and_parallel_reach_the_same_state() {
    for format in [ExecutionFormat::Parallel, ExecutionFormat::Sequence] {
        let dir = tempdir().unwrap();
        let registry = Arc::new(BufferRegistry::new());
        let per_record = estimated_size(&numbered_record("a", 0));

        let targets = vec![
            SpillTarget::new(
                "a",
                DiskRetentionPolicy::for_route(dir.path(), "a").unwrap(),
                per_record,
                u64::MAX,
                0,
                true,
            ),
            SpillTarget::new(
                "b",
                DiskRetentionPolicy::for_route(dir.path(), "b").unwrap(),
                per_record * 10,
                u64::MAX,
                0,
                true,
            ),
        ];
        let scheduler = SpillScheduler::new(
            Arc::clone(&registry),
            targets,
            Duration::from_secs(1),
            format,
        );

        for seq in 0..3 {
            registry.enqueue("a", numbered_record("a", seq));
            registry.enqueue("b", numbered_record("b", seq));
        }
        scheduler.tick().await;

        assert_eq!(registry.depth_of("a"), 1, "{format:?}");
        assert_eq!(registry.depth_of("b"), 3, "{format:?}");
        let policy = DiskRetentionPolicy::for_route(dir.path(), "a").unwrap();
        assert_eq!(policy.stats().file_count, 2, "{format:?}");
    }
}
