use anyhow::Result;
use env::{eventually, Env};
use logstream::service::LogStreamService;
use logstream::snapshot::{ComposedSnapshot, SnapshotController, SnapshotStorage, SnapshotSupport};
use logstream_tests::*;
use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;

#[serial]
#[tokio::test(flavor = "multi_thread")]
async fn n1_snapshot_and_recover() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut e = Env::new(true);
    e.add_node(0, 1).await?;
    e.bootstrap(0, 0).await?;
    let p = e.process(0, 0);

    let counter = Arc::new(Counter::new());
    let controller = SnapshotController::new(
        p.log().clone(),
        ComposedSnapshot::new(vec![counter.clone() as Arc<dyn SnapshotSupport>]),
        SnapshotStorage::open(dir.path())?,
    );

    for i in 0..20 {
        p.append_and_wait(i % 4, payload(i)).await?;
    }
    counter.catch_up(p.log())?;
    let first = counter.processed();
    assert!(controller.take_snapshot(first).await?);
    assert!(!controller.take_snapshot(first).await?);

    for i in 0..20 {
        p.append_and_wait(i % 4, payload(i)).await?;
    }
    counter.catch_up(p.log())?;
    let second = counter.processed();
    assert!(controller.take_snapshot(second).await?);
    assert_eq!(p.log().snapshot_position(), second);
    // The log is kept from the older snapshot.
    assert_eq!(p.log().head_position(), first);

    let restored = Arc::new(Counter::new());
    let controller = SnapshotController::new(
        p.log().clone(),
        ComposedSnapshot::new(vec![restored.clone() as Arc<dyn SnapshotSupport>]),
        SnapshotStorage::open(dir.path())?,
    );
    assert_eq!(controller.recover().await?, Some(second));
    assert_eq!(restored.processed(), second);
    assert_eq!(restored.counts(), counter.counts());
    assert_eq!(restored.count(0), 10);

    // Replaying the rest of the log on top of the snapshot.
    let last = p.append_and_wait(0, payload(100)).await?;
    restored.catch_up(p.log())?;
    assert_eq!(restored.processed(), last);
    assert_eq!(restored.count(0), 11);
    Ok(())
}

#[serial]
#[tokio::test(flavor = "multi_thread")]
async fn n1_service_takes_snapshots() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut e = Env::new(true);
    e.add_node(0, 1).await?;
    e.bootstrap(0, 0).await?;
    let p = e.process(0, 0);

    let counter = Arc::new(Counter::new());
    let controller = Arc::new(SnapshotController::new(
        p.log().clone(),
        ComposedSnapshot::new(vec![counter.clone() as Arc<dyn SnapshotSupport>]),
        SnapshotStorage::open(dir.path())?,
    ));
    let service = {
        let counter = counter.clone();
        LogStreamService::new(p.log().clone()).with_snapshots(
            controller.clone(),
            Duration::from_millis(50),
            move || counter.processed(),
        )
    };
    service.start();
    assert!(service.is_running());

    for i in 0..10 {
        p.append_and_wait(i, payload(i)).await?;
    }
    counter.catch_up(p.log())?;
    let processed = counter.processed();

    eventually(Duration::from_secs(10), || {
        let controller = controller.clone();
        async move { controller.latest_position() == processed }
    })
    .await?;
    service.stop();
    assert!(!service.is_running());
    assert_eq!(service.get().snapshot_position(), processed);
    Ok(())
}
