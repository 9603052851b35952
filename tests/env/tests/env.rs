use anyhow::Result;
use env::Env;
use serial_test::serial;

#[serial]
#[tokio::test(flavor = "multi_thread")]
async fn create() -> Result<()> {
    let _e = Env::new(true);
    Ok(())
}

#[serial]
#[tokio::test(flavor = "multi_thread")]
async fn add_and_remove_nodes() -> Result<()> {
    let mut e = Env::new(true);
    for id in 0..3 {
        e.add_node(id, 2).await?;
    }
    assert_eq!(e.ids(), vec![0, 1, 2]);
    assert_eq!(e.node(1).list_processes(), vec![0, 1]);

    e.remove_node(1);
    assert_eq!(e.ids(), vec![0, 2]);
    Ok(())
}

#[serial]
#[tokio::test(flavor = "multi_thread")]
async fn restart_keeps_partitions() -> Result<()> {
    let mut e = Env::new(true);
    e.add_node(0, 3).await?;
    e.restart_node(0).await?;
    assert_eq!(e.node(0).list_processes(), vec![0, 1, 2]);
    Ok(())
}
