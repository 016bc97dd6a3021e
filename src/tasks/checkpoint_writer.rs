//! Debounced checkpoint writer

use std::time::Duration;
use tokio::{
    sync::watch,
    time::{interval, MissedTickBehavior},
};
use tracing::{error, info};

use crate::{services::FileCheckpoint, state::TimerSnapshot};

/// Persist the committed seconds as they change.
///
/// Stops (pause, reset) are written straight away; while the timer runs,
/// writes happen at most once per `every`. A final write is made when the
/// timer goes away. The first observed value is written unless the file
/// already holds it.
pub async fn checkpoint_task(
    mut snapshots: watch::Receiver<TimerSnapshot>,
    store: FileCheckpoint,
    every: Duration,
) {
    info!("Starting checkpoint writer for {}", store.path().display());

    let mut last_written = store.load().await.ok().flatten();
    let initial = snapshots.borrow_and_update().elapsed_seconds;
    persist(&store, initial, &mut last_written).await;

    let mut flush = interval(every);
    flush.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                if !snapshot.running {
                    persist(&store, snapshot.elapsed_seconds, &mut last_written).await;
                }
            }
            _ = flush.tick() => {
                let seconds = snapshots.borrow().elapsed_seconds;
                persist(&store, seconds, &mut last_written).await;
            }
        }
    }

    let seconds = snapshots.borrow().elapsed_seconds;
    persist(&store, seconds, &mut last_written).await;
    info!("Checkpoint writer stopped at {}s", seconds);
}

async fn persist(store: &FileCheckpoint, seconds: u64, last_written: &mut Option<u64>) {
    if *last_written == Some(seconds) {
        return;
    }
    match store.save(seconds).await {
        Ok(()) => *last_written = Some(seconds),
        Err(e) => error!("Failed to save checkpoint: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{BackgroundMode, TimerPhase};
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;
    use tokio::time::{sleep, timeout};

    fn snapshot(elapsed_seconds: u64, running: bool) -> TimerSnapshot {
        TimerSnapshot {
            elapsed_seconds,
            running,
            phase: if running { TimerPhase::Running } else { TimerPhase::Paused },
            background: BackgroundMode::Disabled,
            advisory: None,
        }
    }

    async fn wait_for(store: &FileCheckpoint, expected: u64) {
        let reached = timeout(Duration::from_secs(3), async {
            loop {
                if store.load().await == Ok(Some(expected)) {
                    return;
                }
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(reached.is_ok(), "checkpoint never reached {}", expected);
    }

    fn scratch(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "session-clock-writer-{}-{}",
            std::process::id(),
            name
        ))
    }

    #[tokio::test]
    async fn stops_are_written_immediately_and_running_values_debounced() {
        let path = scratch("debounce");
        let store = FileCheckpoint::new(&path);
        let (tx, rx) = watch::channel(snapshot(0, false));
        let writer = tokio::spawn(checkpoint_task(rx, store.clone(), Duration::from_millis(200)));

        tx.send_replace(snapshot(42, false));
        wait_for(&store, 42).await;

        tx.send_replace(snapshot(43, true));
        wait_for(&store, 43).await;

        tx.send_replace(snapshot(44, true));
        drop(tx);
        writer.await.unwrap();
        assert_eq!(store.load().await, Ok(Some(44)));
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn unchanged_seed_is_not_rewritten() {
        let path = scratch("seed");
        let store = FileCheckpoint::new(&path);
        store.save(7).await.unwrap();
        let written_at = std::fs::metadata(&path).unwrap().modified().unwrap();

        let (tx, rx) = watch::channel(snapshot(7, false));
        let writer = tokio::spawn(checkpoint_task(rx, store.clone(), Duration::from_millis(50)));

        sleep(Duration::from_millis(150)).await;
        drop(tx);
        writer.await.unwrap();
        assert_eq!(store.load().await, Ok(Some(7)));
        assert_eq!(std::fs::metadata(&path).unwrap().modified().unwrap(), written_at);
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn value_changed_before_writer_starts_is_persisted() {
        let path = scratch("early");
        let store = FileCheckpoint::new(&path);
        let (tx, rx) = watch::channel(snapshot(0, false));
        tx.send_replace(snapshot(42, false));

        let writer = tokio::spawn(checkpoint_task(rx, store.clone(), Duration::from_secs(60)));
        wait_for(&store, 42).await;

        drop(tx);
        writer.await.unwrap();
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn corrupt_checkpoint_is_replaced_by_the_seed() {
        let path = scratch("corrupt");
        std::fs::write(&path, "not a number").unwrap();
        let store = FileCheckpoint::new(&path);
        assert!(store.load().await.is_err());

        let (tx, rx) = watch::channel(snapshot(0, false));
        let writer = tokio::spawn(checkpoint_task(rx, store.clone(), Duration::from_secs(60)));
        wait_for(&store, 0).await;

        drop(tx);
        writer.await.unwrap();
        let _ = std::fs::remove_file(path);
    }
}
