use anyhow::Result;
use bytes::Bytes;
use env::Env;
use logstream::RaftConfig;
use logstream_tests::*;
use serial_test::serial;
use std::collections::BTreeSet;

#[serial]
#[tokio::test(flavor = "multi_thread")]
async fn n3_concurrent_appends() -> Result<()> {
    let mut e = Env::new(true);
    e.cluster(&[0, 1, 2], 1).await?;
    let leader = e.wait_leader(0).await?;
    let p = e.process(leader, 0);

    let mut futs = vec![];
    for i in 0..100 {
        let p = p.clone();
        futs.push(async move { p.append_and_wait(i % 10, payload(i)).await });
    }
    let positions: BTreeSet<i64> = futures::future::try_join_all(futs)
        .await?
        .into_iter()
        .collect();
    assert_eq!(positions.len(), 100);

    let last = *positions.last().unwrap();
    e.wait_commit(0, last).await?;

    let committed = |log: &logstream::log_storage::LogStream| -> Result<Vec<_>> {
        let mut entries = log.read_from(0, 1000)?;
        entries.retain(|e| e.position <= last);
        Ok(entries)
    };
    let expected = committed(p.log())?;
    for id in e.ids() {
        let log = e.process(id, 0).log().clone();
        assert_eq!(committed(&log)?, expected, "log of node {id} diverged");

        let counter = Counter::new();
        counter.catch_up(&log)?;
        for key in 0..10 {
            assert_eq!(counter.count(key), 10);
        }
    }
    Ok(())
}

#[serial]
#[tokio::test(flavor = "multi_thread")]
async fn n3_lagging_follower_catches_up() -> Result<()> {
    let mut e = Env::new(true);
    e.cluster(&[0, 1, 2], 1).await?;
    let leader = e.wait_leader(0).await?;
    let lagging = (leader + 1) % 3;

    e.isolate(lagging);
    let p = e.process(leader, 0);
    let mut last = -1;
    // More than a single append request carries.
    for i in 0..250 {
        last = p.append_and_wait(i, payload(i)).await?;
    }
    assert!(e.process(lagging, 0).log().last_position() < last);

    e.heal();
    e.wait_commit(0, last).await?;
    let entry = e.process(lagging, 0).log().read_committed(last)?;
    assert_eq!(entry.payload, payload(249));
    Ok(())
}

#[serial]
#[tokio::test(flavor = "multi_thread")]
async fn n3_large_events_are_sent_in_pieces() -> Result<()> {
    let mut e = Env::new(true).with_config(RaftConfig {
        max_bytes_per_append: 64 * 1024,
        ..env::test_config()
    });
    e.cluster(&[0, 1, 2], 1).await?;
    let leader = e.wait_leader(0).await?;
    let lagging = (leader + 1) % 3;

    e.isolate(lagging);
    let p = e.process(leader, 0);
    let mut last = -1;
    // Far beyond one request's byte limit but within its entry count.
    for i in 0..40 {
        last = p.append_and_wait(i, Bytes::from(vec![i as u8; 16 * 1024])).await?;
    }

    e.heal();
    e.wait_commit(0, last).await?;
    let committed = |log: &logstream::log_storage::LogStream| -> Result<Vec<_>> {
        let mut entries = log.read_from(0, usize::MAX)?;
        entries.retain(|e| e.position <= last);
        Ok(entries)
    };
    let log = e.process(lagging, 0).log().clone();
    assert_eq!(committed(&log)?, committed(p.log())?);
    assert_eq!(log.read_committed(last)?.payload, Bytes::from(vec![39; 16 * 1024]));
    Ok(())
}

#[serial]
#[tokio::test(flavor = "multi_thread")]
async fn n3_p3_partitions_elect_independently() -> Result<()> {
    let mut e = Env::new(true);
    e.cluster(&[0, 1, 2], 3).await?;

    for partition_id in 0..3 {
        let leader = e.wait_leader(partition_id).await?;
        let position = e
            .process(leader, partition_id)
            .append_and_wait(partition_id as u64, payload(partition_id as u64))
            .await?;
        e.wait_commit(partition_id, position).await?;
    }
    for id in e.ids() {
        for partition_id in 0..3 {
            let counter = Counter::new();
            counter.catch_up(e.process(id, partition_id).log())?;
            assert_eq!(counter.counts().len(), 1);
            assert_eq!(counter.count(partition_id as u64), 1);
        }
    }
    Ok(())
}
