use anyhow::Result;
use env::{eventually, Env};
use logstream::codec::VoteRequest;
use logstream::{NULL_POSITION, NULL_TERM};
use logstream_tests::*;
use serial_test::serial;
use std::time::Duration;

#[serial]
#[tokio::test(flavor = "multi_thread")]
async fn n3_isolated_leader_is_replaced() -> Result<()> {
    let mut e = Env::new(true);
    e.cluster(&[0, 1, 2], 1).await?;
    let old_leader = e.wait_leader(0).await?;
    let old = e.process(old_leader, 0);
    for i in 0..10 {
        old.append_and_wait(i, payload(i)).await?;
    }
    let old_term = old.term().await;

    e.isolate(old_leader);
    let new_leader = e.wait_new_leader(0, old_leader).await?;
    let new = e.process(new_leader, 0);
    assert!(new.term().await > old_term);

    // The isolated leader still accepts events but can't commit them.
    assert!(old.is_leader().await);
    let orphan = old.append(100, payload(100)).await?;
    let orphan_commit = old.log().wait_for_commit(orphan);

    let mut last = -1;
    for i in 10..20 {
        last = new.append_and_wait(i, payload(i)).await?;
    }

    e.heal();
    eventually(Duration::from_secs(10), || {
        let old = old.clone();
        async move { !old.is_leader().await }
    })
    .await?;
    assert!(tokio::time::timeout(Duration::from_secs(10), orphan_commit)
        .await?
        .is_err());

    e.wait_commit(0, last).await?;
    assert_eq!(old.log().read_committed(last)?, new.log().read_committed(last)?);

    let counter = Counter::new();
    counter.catch_up(old.log())?;
    assert_eq!(counter.count(100), 0);
    assert_eq!(counter.counts().len(), 20);
    Ok(())
}

#[serial]
#[tokio::test(flavor = "multi_thread")]
async fn n3_leader_crash() -> Result<()> {
    let mut e = Env::new(true);
    e.cluster(&[0, 1, 2], 1).await?;
    let old_leader = e.wait_leader(0).await?;
    let last = e
        .process(old_leader, 0)
        .append_and_wait(1, payload(1))
        .await?;

    e.remove_node(old_leader);
    let new_leader = e.wait_leader(0).await?;
    assert_ne!(new_leader, old_leader);

    let new = e.process(new_leader, 0);
    assert_eq!(new.log().read(last)?.payload, payload(1));
    new.append_and_wait(2, payload(2)).await?;
    Ok(())
}

#[serial]
#[tokio::test(flavor = "multi_thread")]
async fn n3_follower_restart() -> Result<()> {
    let mut e = Env::new(true);
    e.cluster(&[0, 1, 2], 1).await?;
    let leader = e.wait_leader(0).await?;
    let follower = (leader + 1) % 3;

    let p = e.process(leader, 0);
    for i in 0..10 {
        p.append_and_wait(i, payload(i)).await?;
    }
    e.restart_node(follower).await?;
    assert!(e
        .process(follower, 0)
        .membership()
        .contains(&env::endpoint(follower)));

    let last = p.append_and_wait(10, payload(10)).await?;
    e.wait_commit(0, last).await?;
    Ok(())
}

#[serial]
#[tokio::test(flavor = "multi_thread")]
async fn n3_leader_yields_to_newer_term_of_a_member() -> Result<()> {
    let mut e = Env::new(true);
    e.cluster(&[0, 1, 2], 1).await?;
    let leader = e.wait_leader(0).await?;
    let follower = (leader + 1) % 3;
    let p = e.process(leader, 0);
    let term = p.term().await;

    let vote = |candidate: logstream::Endpoint, term| VoteRequest {
        id: 0,
        term,
        last_entry_position: NULL_POSITION,
        last_entry_term: NULL_TERM,
        candidate,
    };

    // Not a member: ignored while the leader is alive.
    let resp = e
        .node(follower)
        .get_handle(0)
        .connect(&env::endpoint(leader))
        .request_vote(vote(env::endpoint(9), term + 5))
        .await?;
    assert!(!resp.granted);
    assert_eq!(resp.term, term);
    assert!(p.is_leader().await);

    let resp = e
        .node(follower)
        .get_handle(0)
        .connect(&env::endpoint(leader))
        .request_vote(vote(env::endpoint(follower), term + 5))
        .await?;
    // The candidate's log is behind so the vote is not granted, but the term is taken.
    assert!(!resp.granted);
    assert_eq!(resp.term, term + 5);
    assert!(p.term().await >= term + 5);

    let new_leader = e.wait_leader(0).await?;
    let position = e.process(new_leader, 0).append_and_wait(1, payload(1)).await?;
    e.wait_commit(0, position).await?;
    Ok(())
}
