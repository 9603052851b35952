use anyhow::Result;
use env::Env;
use logstream::log_storage::{EntryKind, LogEntry};
use logstream::process::ElectionState;
use logstream::{Error, RaftConfig};
use logstream_tests::*;
use serial_test::serial;

#[serial]
#[tokio::test(flavor = "multi_thread")]
async fn n1_bootstrap_and_commit() -> Result<()> {
    let mut e = Env::new(true);
    e.add_node(0, 1).await?;
    e.bootstrap(0, 0).await?;

    let p = e.process(0, 0);
    assert_eq!(p.election_state().await, ElectionState::Leader);
    assert!(p.term().await >= 1);
    assert_eq!(p.leader().await, Some(env::endpoint(0)));
    assert_eq!(p.membership().len(), 1);

    let mut last = -1;
    for i in 0..10 {
        let position = p.append_and_wait(i, payload(i)).await?;
        assert!(position > last);
        last = position;
    }
    assert!(p.log().commit_position() >= last);

    let entry = p.log().read_committed(last)?;
    assert_eq!(entry.kind, EntryKind::Event);
    assert_eq!(entry.key, 9);
    assert_eq!(entry.payload, payload(9));
    Ok(())
}

#[serial]
#[tokio::test(flavor = "multi_thread")]
async fn n1_bootstrap_twice() -> Result<()> {
    let mut e = Env::new(true);
    e.add_node(0, 1).await?;
    e.bootstrap(0, 0).await?;

    let err = e.bootstrap(0, 0).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<Error>(),
        Some(Error::InvalidArgument(_))
    ));
    Ok(())
}

#[serial]
#[tokio::test(flavor = "multi_thread")]
async fn n1_append_without_leadership() -> Result<()> {
    let mut e = Env::new(true);
    e.add_node(0, 1).await?;

    let p = e.process(0, 0);
    let err = p.append(1, payload(1)).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<Error>(),
        Some(Error::NotLeader { leader: None })
    ));
    Ok(())
}

#[serial]
#[tokio::test(flavor = "multi_thread")]
async fn n1_only_events_are_appended() -> Result<()> {
    let mut e = Env::new(true);
    e.add_node(0, 1).await?;
    e.bootstrap(0, 0).await?;

    let err = e
        .process(0, 0)
        .append_entry(LogEntry::noop())
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<Error>(),
        Some(Error::Validation(_))
    ));
    Ok(())
}

#[serial]
#[tokio::test(flavor = "multi_thread")]
async fn n1_reject_oversized_event() -> Result<()> {
    let mut e = Env::new(true).with_config(RaftConfig {
        max_bytes_per_append: 1024,
        ..env::test_config()
    });
    e.add_node(0, 1).await?;
    e.bootstrap(0, 0).await?;
    let p = e.process(0, 0);

    let before = p.log().current_append_position();
    let err = p
        .append(1, bytes::Bytes::from(vec![0; 1024]))
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<Error>(),
        Some(Error::InvalidArgument(_))
    ));
    assert_eq!(p.log().current_append_position(), before);

    // Anything that fits still goes through.
    p.append_and_wait(2, bytes::Bytes::from(vec![0; 512])).await?;
    Ok(())
}

#[serial]
#[tokio::test(flavor = "multi_thread")]
async fn n1_restart_recovers() -> Result<()> {
    let mut e = Env::new(true);
    e.add_node(0, 1).await?;
    e.bootstrap(0, 0).await?;

    let p = e.process(0, 0);
    let mut last = -1;
    for i in 0..5 {
        last = p.append_and_wait(i, payload(i)).await?;
    }
    let old_term = p.term().await;
    drop(p);

    e.restart_node(0).await?;
    let p = e.process(0, 0);
    assert!(p.membership().contains(&env::endpoint(0)));
    assert!(p.log().last_position() >= last);

    // The commit position is learned again once the process leads.
    e.wait_leader(0).await?;
    assert!(p.term().await > old_term);
    e.wait_commit(0, last).await?;
    assert_eq!(p.log().read_committed(last)?.payload, payload(4));

    let position = p.append_and_wait(5, payload(5)).await?;
    assert!(position > last);
    Ok(())
}
