use anyhow::Result;
use env::Env;
use logstream::log_storage::{LogEntry, LogStorage};
use logstream::process::{ElectionState, RaftStorage};
use logstream::{Error, NULL_POSITION};
use logstream_tests::*;
use serial_test::serial;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

#[serial]
#[tokio::test(flavor = "multi_thread")]
async fn failed_write_fails_the_stream() -> Result<()> {
    let (db, broken) = env::failing_db()?;
    let storage = LogStorage::new(Arc::new(db));
    let log = storage.open_stream(0)?;

    let p0 = log.append(LogEntry::event(0, payload(0)).at(NULL_POSITION, 1)).await?;
    assert!(!log.is_failed());

    broken.store(true, Ordering::SeqCst);
    let e = log
        .append(LogEntry::event(1, payload(1)).at(NULL_POSITION, 1))
        .await
        .unwrap_err();
    assert!(matches!(e.downcast_ref::<Error>(), Some(Error::Storage(_))));
    assert!(log.is_failed());
    assert_eq!(log.last_position(), p0);

    // The stream stays failed after the disk comes back.
    broken.store(false, Ordering::SeqCst);
    let e = log
        .append(LogEntry::event(2, payload(2)).at(NULL_POSITION, 1))
        .await
        .unwrap_err();
    assert!(matches!(e.downcast_ref::<Error>(), Some(Error::Storage(_))));
    Ok(())
}

#[serial]
#[tokio::test(flavor = "multi_thread")]
async fn n1_leader_steps_down_on_storage_failure() -> Result<()> {
    let (db, broken) = env::failing_db()?;
    let mut e = Env::new(true);
    e.add_node_on(0, 1, RaftStorage::new(db)).await?;
    e.bootstrap(0, 0).await?;

    let p = e.process(0, 0);
    let last = p.append_and_wait(0, payload(0)).await?;

    broken.store(true, Ordering::SeqCst);
    let err = p.append(1, payload(1)).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<Error>(),
        Some(Error::Storage(_))
    ));
    assert!(p.log().is_failed());
    assert_eq!(p.election_state().await, ElectionState::Follower);
    assert_eq!(p.leader().await, None);

    // A failed process doesn't campaign again.
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(!p.is_leader().await);
    let err = p.append(2, payload(2)).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<Error>(),
        Some(Error::NotLeader { .. })
    ));
    assert!(p.log().commit_position() >= last);
    Ok(())
}
