use anyhow::Result;
use env::Env;
use logstream_tests::*;
use rand::Rng;
use serial_test::serial;
use std::sync::Arc;

#[serial]
#[tokio::test(flavor = "multi_thread")]
async fn n1_p10_independent_streams() -> Result<()> {
    const P: u32 = 10;
    let mut e = Env::new(true);
    e.add_node(0, P).await?;
    let e = Arc::new(e);

    let mut futs = vec![];
    for partition_id in 0..P as i32 {
        let e = e.clone();
        futs.push(async move { e.bootstrap(0, partition_id).await });
    }
    futures::future::try_join_all(futs).await?;

    let mut counts = [0u64; P as usize];
    for i in 0..100 {
        let partition_id = rand::thread_rng().gen_range(0..P) as i32;
        e.process(0, partition_id)
            .append_and_wait(i, payload(i))
            .await?;
        counts[partition_id as usize] += 1;
    }

    for partition_id in 0..P as i32 {
        let counter = Counter::new();
        counter.catch_up(e.process(0, partition_id).log())?;
        let n: u64 = counter.counts().values().sum();
        assert_eq!(n, counts[partition_id as usize]);
    }
    Ok(())
}
