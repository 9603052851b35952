use anyhow::Result;
use env::{eventually, test_config};
use logstream::node::{transport, RaftNode, TcpTransport};
use logstream::process::{RaftProcess, RaftStorage};
use logstream::Endpoint;
use logstream_tests::*;
use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

struct Server {
    node: Arc<RaftNode>,
    serve: tokio::task::JoinHandle<Result<()>>,
}

impl Server {
    async fn start() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        let endpoint = Endpoint::new("127.0.0.1", port);
        let node = Arc::new(RaftNode::new(endpoint, Arc::new(TcpTransport::new())));

        let storage = RaftStorage::in_memory()?;
        let process = RaftProcess::new(&storage, node.get_handle(0), test_config()).await?;
        node.attach_process(process);

        let serve = tokio::spawn(transport::serve(node.clone(), listener));
        Ok(Self {
            node,
            serve,
        })
    }

    fn process(&self) -> Arc<RaftProcess> {
        self.node.get_process(0).unwrap()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.serve.abort();
    }
}

#[serial]
#[tokio::test(flavor = "multi_thread")]
async fn n2_replicate_over_tcp() -> Result<()> {
    let s0 = Server::start().await?;
    let s1 = Server::start().await?;

    s0.process().bootstrap().await?;
    let resp = s1.process().join(s0.node.self_endpoint()).await?;
    assert!(resp.succeeded);
    assert_eq!(resp.members.len(), 2);

    let follower = s1.process();
    let me = s1.node.self_endpoint().clone();
    eventually(Duration::from_secs(10), || {
        let follower = follower.clone();
        let me = me.clone();
        async move { follower.membership().contains(&me) }
    })
    .await?;

    let leader = s0.process();
    let mut last = -1;
    for i in 0..20 {
        last = leader.append_and_wait(i, payload(i)).await?;
    }
    eventually(Duration::from_secs(10), || {
        let follower = follower.clone();
        async move { follower.log().commit_position() >= last }
    })
    .await?;
    assert_eq!(
        follower.log().read_committed(last)?,
        leader.log().read_committed(last)?
    );
    assert_eq!(follower.leader().await, Some(s0.node.self_endpoint().clone()));
    Ok(())
}
