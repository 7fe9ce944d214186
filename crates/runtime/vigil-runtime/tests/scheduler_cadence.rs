use std::sync::Arc;
use std::time::Duration;
use vigil_runtime::{InMemoryStateStore, Scheduler, ValidatorConfig};
use vigil_types::WorkerResponse;

mod helpers;
use helpers::{harness, snapshot, test_config, Behavior};

/// Block cadences far enough apart that only the sync loop is due in these tests.
fn sync_only_config() -> ValidatorConfig {
    ValidatorConfig {
        healthcheck_blocks: 10_000,
        volume_blocks: 10_000,
        auto_update: false,
        ..test_config()
    }
}

async fn advance_blocks(seconds: u64) {
    tokio::time::sleep(Duration::from_secs(seconds)).await;
}

#[tokio::test(start_paused = true)]
async fn test_sync_loop_fires_once_per_interval() -> anyhow::Result<()> {
    let h = harness(sync_only_config(), snapshot(&["a"]), Arc::new(InMemoryStateStore::new())).await?;
    h.ledger.set_tempo(1_000_000);
    let mut scheduler = Scheduler::new(h.validator.clone());
    scheduler.start();

    advance_blocks(3).await;
    assert_eq!(h.validator.reputation().step().await, 0);

    h.ledger.set_block(6);
    advance_blocks(3).await;
    assert_eq!(h.validator.reputation().step().await, 1);

    // Still block 6: the checkpoint moved, so no further syncs.
    advance_blocks(5).await;
    assert_eq!(h.validator.reputation().step().await, 1);

    h.ledger.set_block(11);
    advance_blocks(2).await;
    assert_eq!(h.validator.reputation().step().await, 1);

    h.ledger.set_block(12);
    advance_blocks(2).await;
    assert_eq!(h.validator.reputation().step().await, 2);

    scheduler.shutdown().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_failed_sync_is_retried_without_moving_checkpoint() -> anyhow::Result<()> {
    let h = harness(sync_only_config(), snapshot(&["a"]), Arc::new(InMemoryStateStore::new())).await?;
    h.ledger.set_tempo(1_000_000);
    h.ledger.fail_registry_reads(2);
    h.ledger.set_block(6);

    let mut scheduler = Scheduler::new(h.validator.clone());
    scheduler.start();

    // The first iteration fails (both attempts). Since the checkpoint is still
    // at 0, the next iteration at the same block is due again and succeeds.
    advance_blocks(3).await;
    assert_eq!(h.validator.reputation().step().await, 1);

    advance_blocks(3).await;
    assert_eq!(h.validator.reputation().step().await, 1);

    // The successful run moved the checkpoint to block 6, not beyond it.
    h.ledger.set_block(11);
    advance_blocks(2).await;
    assert_eq!(h.validator.reputation().step().await, 1);

    h.ledger.set_block(12);
    advance_blocks(2).await;
    assert_eq!(h.validator.reputation().step().await, 2);

    scheduler.shutdown().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_loops_are_isolated_from_each_other() -> anyhow::Result<()> {
    let config = ValidatorConfig {
        healthcheck_blocks: 1,
        volume_blocks: 1,
        auto_update: true,
        ..sync_only_config()
    };
    let h = harness(config, snapshot(&["a"]), Arc::new(InMemoryStateStore::new())).await?;
    // Volume sampling cannot place replies in a tempo and fails on every iteration.
    h.ledger.set_tempo(0);
    h.transport.reply(0, WorkerResponse::Pong { version: "2.0.0".into() }, 5);
    h.ledger.set_block(6);

    let mut scheduler = Scheduler::new(h.validator.clone());
    scheduler.start();
    advance_blocks(3).await;

    assert_eq!(h.validator.reputation().step().await, 1);
    assert_eq!(h.validator.versions().await.len(), 1);

    scheduler.shutdown().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_abandons_stuck_loops_after_grace() -> anyhow::Result<()> {
    let config = ValidatorConfig {
        healthcheck_blocks: 1,
        shutdown_grace_ms: 2_000,
        ..sync_only_config()
    };
    let h = harness(config, snapshot(&["a"]), Arc::new(InMemoryStateStore::new())).await?;
    h.ledger.set_tempo(1_000_000);
    h.ledger.set_block(1);
    h.transport.set(0, Behavior::Hang);

    let mut scheduler = Scheduler::new(h.validator.clone());
    scheduler.start();
    advance_blocks(1).await;

    let started = tokio::time::Instant::now();
    scheduler.shutdown().await;
    let waited = started.elapsed();
    assert!(waited >= Duration::from_secs(2));
    assert!(waited < Duration::from_secs(3));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_auto_update_refreshes_queries_each_tempo() -> anyhow::Result<()> {
    let config = ValidatorConfig {
        auto_update: true,
        ..sync_only_config()
    };
    let h = harness(config, snapshot(&["a"]), Arc::new(InMemoryStateStore::new())).await?;
    h.ledger.set_tempo(1_000_000);

    let mut scheduler = Scheduler::new(h.validator.clone());
    scheduler.start();
    advance_blocks(1).await;
    assert_eq!(h.validator.queries().await.len(), 2);

    scheduler.shutdown().await;
    Ok(())
}
