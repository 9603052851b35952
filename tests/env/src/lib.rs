use anyhow::{bail, Result};
use logstream::node::{LocalNetwork, RaftNode};
use logstream::process::{RaftProcess, RaftStorage};
use logstream::{Endpoint, PartitionId, RaftConfig};
use std::collections::{BTreeMap, HashSet};
use redb::backends::InMemoryBackend;
use redb::StorageBackend;
use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;
use tracing::info;

static INIT: Once = Once::new();

/// Timing used by the tests. Short enough to make elections quick.
pub fn test_config() -> RaftConfig {
    RaftConfig {
        heartbeat_interval: Duration::from_millis(50),
        election_timeout_min: Duration::from_millis(300),
        election_timeout_max: Duration::from_millis(600),
        request_timeout: Duration::from_millis(300),
        commit_timeout: Duration::from_secs(5),
        max_entries_per_append: 100,
        max_bytes_per_append: 1024 * 1024,
        snapshot_interval: Duration::from_secs(1),
    }
}

pub fn endpoint(id: u8) -> Endpoint {
    Endpoint::new(format!("node-{id}"), 50000 + id as u16)
}

/// Poll `f` until it returns true. Fails after `timeout`.
pub async fn eventually<F, Fut>(timeout: Duration, mut f: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if f().await {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            bail!("condition not met in {timeout:?}");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// A disk on memory whose writes fail while it is broken.
#[derive(Debug)]
struct FailingDisk {
    mem: InMemoryBackend,
    broken: Arc<AtomicBool>,
}

impl FailingDisk {
    fn check(&self) -> io::Result<()> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(io::Error::other("disk is broken"));
        }
        Ok(())
    }
}

impl StorageBackend for FailingDisk {
    fn len(&self) -> io::Result<u64> {
        self.mem.len()
    }

    fn read(&self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        self.mem.read(offset, len)
    }

    fn set_len(&self, len: u64) -> io::Result<()> {
        self.check()?;
        self.mem.set_len(len)
    }

    fn sync_data(&self, eventual: bool) -> io::Result<()> {
        self.check()?;
        self.mem.sync_data(eventual)
    }

    fn write(&self, offset: u64, data: &[u8]) -> io::Result<()> {
        self.check()?;
        self.mem.write(offset, data)
    }
}

/// A database whose writes start failing once the returned switch is set.
pub fn failing_db() -> Result<(redb::Database, Arc<AtomicBool>)> {
    let broken = Arc::new(AtomicBool::new(false));
    let disk = FailingDisk {
        mem: InMemoryBackend::new(),
        broken: broken.clone(),
    };
    let db = redb::Database::builder().create_with_backend(disk)?;
    Ok((db, broken))
}

struct Node {
    raft: Arc<RaftNode>,
    storage: Arc<RaftStorage>,
}

/// A cluster of `RaftNode`s on a `LocalNetwork`.
pub struct Env {
    network: LocalNetwork,
    nodes: BTreeMap<u8, Node>,
    isolated: HashSet<u8>,
    config: RaftConfig,
}

impl Env {
    pub fn new(with_logging: bool) -> Self {
        if with_logging {
            INIT.call_once(|| {
                let filter = tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
                tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_test_writer()
                    .compact()
                    .try_init()
                    .ok();
            });
        }
        Self {
            network: LocalNetwork::new(),
            nodes: BTreeMap::new(),
            isolated: HashSet::new(),
            config: test_config(),
        }
    }

    pub fn with_config(mut self, config: RaftConfig) -> Self {
        self.config = config;
        self
    }

    pub fn network(&self) -> &LocalNetwork {
        &self.network
    }

    /// Start a node with fresh storage hosting partitions `0..n_partitions`.
    pub async fn add_node(&mut self, id: u8, n_partitions: u32) -> Result<()> {
        let storage = Arc::new(RaftStorage::in_memory()?);
        self.start_node(id, storage, n_partitions).await
    }

    /// Start a node on the given storage hosting partitions `0..n_partitions`.
    pub async fn add_node_on(
        &mut self,
        id: u8,
        n_partitions: u32,
        storage: RaftStorage,
    ) -> Result<()> {
        self.start_node(id, Arc::new(storage), n_partitions).await
    }

    async fn start_node(
        &mut self,
        id: u8,
        storage: Arc<RaftStorage>,
        n_partitions: u32,
    ) -> Result<()> {
        let ep = endpoint(id);
        let raft = Arc::new(RaftNode::new(ep.clone(), self.network.transport(ep)));
        for partition_id in 0..n_partitions as PartitionId {
            let process =
                RaftProcess::new(&storage, raft.get_handle(partition_id), self.config.clone())
                    .await?;
            raft.attach_process(process);
        }
        self.network.register(&raft);
        info!("node {id} started");
        self.nodes.insert(id, Node { raft, storage });
        Ok(())
    }

    /// Stop the node. Its storage is gone with it.
    pub fn remove_node(&mut self, id: u8) {
        if let Some(node) = self.nodes.remove(&id) {
            self.stop(&node);
            info!("node {id} removed");
        }
    }

    /// Stop the node and start it again on the same storage.
    pub async fn restart_node(&mut self, id: u8) -> Result<()> {
        let Some(node) = self.nodes.remove(&id) else {
            bail!("node {id} not found");
        };
        let n_partitions = node.raft.list_processes().len() as u32;
        self.stop(&node);
        let storage = node.storage.clone();
        drop(node);

        // Requests already delivered to the old processes finish first.
        let closed = storage.clone();
        eventually(Duration::from_secs(10), || {
            let storage = closed.clone();
            async move {
                (0..n_partitions as PartitionId).all(|p| !storage.log_storage().is_open(p))
            }
        })
        .await?;
        self.start_node(id, storage, n_partitions).await
    }

    fn stop(&self, node: &Node) {
        self.network.unregister(node.raft.self_endpoint());
        for partition_id in node.raft.list_processes() {
            node.raft.detach_process(partition_id);
        }
    }

    pub fn node(&self, id: u8) -> Arc<RaftNode> {
        self.nodes[&id].raft.clone()
    }

    pub fn process(&self, id: u8, partition_id: PartitionId) -> Arc<RaftProcess> {
        self.nodes[&id]
            .raft
            .get_process(partition_id)
            .unwrap_or_else(|| panic!("partition {partition_id} not found on node {id}"))
    }

    pub fn ids(&self) -> Vec<u8> {
        self.nodes.keys().cloned().collect()
    }

    pub fn isolate(&mut self, id: u8) {
        self.network.isolate(&endpoint(id));
        self.isolated.insert(id);
    }

    pub fn heal(&mut self) {
        self.network.heal();
        self.isolated.clear();
    }

    /// Wait until one of the connected nodes leads the partition.
    pub async fn wait_leader(&self, partition_id: PartitionId) -> Result<u8> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            for (&id, node) in &self.nodes {
                if self.isolated.contains(&id) {
                    continue;
                }
                if let Some(p) = node.raft.get_process(partition_id) {
                    if p.is_leader().await {
                        return Ok(id);
                    }
                }
            }
            if tokio::time::Instant::now() >= deadline {
                bail!("no leader for partition {partition_id}");
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Wait until a leader other than `old` is elected.
    pub async fn wait_new_leader(&self, partition_id: PartitionId, old: u8) -> Result<u8> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            let id = self.wait_leader(partition_id).await?;
            if id != old {
                return Ok(id);
            }
            if tokio::time::Instant::now() >= deadline {
                bail!("leader of partition {partition_id} is still {old}");
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Make node `id` the first member of the partition.
    pub async fn bootstrap(&self, id: u8, partition_id: PartitionId) -> Result<()> {
        self.process(id, partition_id).bootstrap().await
    }

    /// Add node `id` to the partition through the current leader and wait until
    /// the node sees itself in the committed membership.
    pub async fn join(&self, id: u8, partition_id: PartitionId) -> Result<()> {
        let p = self.process(id, partition_id);
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            let leader = self.wait_leader(partition_id).await?;
            match p.join(&endpoint(leader)).await {
                Ok(resp) if resp.succeeded => break,
                Ok(_) => {}
                Err(e) => info!("join of node {id} failed: {e:#}"),
            }
            if tokio::time::Instant::now() >= deadline {
                bail!("node {id} couldn't join partition {partition_id}");
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        let me = endpoint(id);
        eventually(Duration::from_secs(10), || {
            let p = p.clone();
            let me = me.clone();
            async move { p.membership().contains(&me) }
        })
        .await
    }

    /// Remove node `id` from the partition through the current leader.
    pub async fn leave(&self, id: u8, partition_id: PartitionId) -> Result<()> {
        let p = self.process(id, partition_id);
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            let leader = self.wait_leader(partition_id).await?;
            match p.leave(&endpoint(leader)).await {
                Ok(resp) if resp.succeeded => return Ok(()),
                Ok(_) => {}
                Err(e) => info!("leave of node {id} failed: {e:#}"),
            }
            if tokio::time::Instant::now() >= deadline {
                bail!("node {id} couldn't leave partition {partition_id}");
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Bootstrap on node `ids[0]` and join the rest one by one.
    pub async fn cluster(&mut self, ids: &[u8], n_partitions: u32) -> Result<()> {
        for &id in ids {
            self.add_node(id, n_partitions).await?;
        }
        for partition_id in 0..n_partitions as PartitionId {
            self.bootstrap(ids[0], partition_id).await?;
            for &id in &ids[1..] {
                self.join(id, partition_id).await?;
            }
        }
        Ok(())
    }

    /// Wait until every connected node has committed `position` of the partition.
    pub async fn wait_commit(&self, partition_id: PartitionId, position: i64) -> Result<()> {
        let procs: Vec<Arc<RaftProcess>> = self
            .ids()
            .into_iter()
            .filter(|id| !self.isolated.contains(id))
            .map(|id| self.process(id, partition_id))
            .collect();
        eventually(Duration::from_secs(10), || {
            let procs = procs.clone();
            async move { procs.iter().all(|p| p.log().commit_position() >= position) }
        })
        .await
    }
}
