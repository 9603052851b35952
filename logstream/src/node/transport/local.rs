use super::*;

use std::collections::HashSet;
use std::sync::Weak;

#[derive(Default)]
struct Links {
    nodes: HashMap<Endpoint, Weak<RaftNode>>,
    isolated: HashSet<Endpoint>,
    /// Directed links that drop messages.
    cut: HashSet<(Endpoint, Endpoint)>,
}

impl Links {
    fn is_linked(&self, from: &Endpoint, to: &Endpoint) -> bool {
        !self.isolated.contains(from)
            && !self.isolated.contains(to)
            && !self.cut.contains(&(from.clone(), to.clone()))
    }
}

/// In-process network of `RaftNode`s. Links can be cut and restored.
#[derive(Clone, Default)]
pub struct LocalNetwork {
    links: Arc<spin::RwLock<Links>>,
}

impl LocalNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport of the node at `from`.
    pub fn transport(&self, from: Endpoint) -> Arc<dyn Transport> {
        Arc::new(LocalTransport {
            network: self.clone(),
            from,
        })
    }

    pub fn register(&self, node: &Arc<RaftNode>) {
        self.links
            .write()
            .nodes
            .insert(node.self_endpoint().clone(), Arc::downgrade(node));
    }

    pub fn unregister(&self, endpoint: &Endpoint) {
        self.links.write().nodes.remove(endpoint);
    }

    /// Drop the messages between `a` and `b` in both directions.
    pub fn disconnect(&self, a: &Endpoint, b: &Endpoint) {
        let mut links = self.links.write();
        links.cut.insert((a.clone(), b.clone()));
        links.cut.insert((b.clone(), a.clone()));
    }

    /// Drop every message from or to `endpoint`.
    pub fn isolate(&self, endpoint: &Endpoint) {
        self.links.write().isolated.insert(endpoint.clone());
    }

    /// Restore every link.
    pub fn heal(&self) {
        let mut links = self.links.write();
        links.isolated.clear();
        links.cut.clear();
    }

    fn is_linked(&self, from: &Endpoint, to: &Endpoint) -> bool {
        self.links.read().is_linked(from, to)
    }

    fn route(&self, from: &Endpoint, to: &Endpoint) -> Option<Arc<RaftNode>> {
        let links = self.links.read();
        if !links.is_linked(from, to) {
            return None;
        }
        links.nodes.get(to).and_then(|node| node.upgrade())
    }
}

struct LocalTransport {
    network: LocalNetwork,
    from: Endpoint,
}

#[async_trait::async_trait]
impl Transport for LocalTransport {
    async fn request(&self, dest: &Endpoint, message: Bytes, timeout: Duration) -> Result<Bytes> {
        let Some(node) = self.network.route(&self.from, dest) else {
            bail!(Error::Unreachable(dest.clone()));
        };
        // The receiver runs on its own task so a timeout here doesn't cancel it halfway.
        let fut = tokio::spawn(async move { node.handle(message).await });
        let resp = match tokio::time::timeout(timeout, fut).await {
            Ok(resp) => resp?,
            Err(_) => bail!(Error::Timeout(format!(
                "no response from {dest} in {timeout:?}"
            ))),
        };
        // The response is lost if the link is cut meanwhile.
        if !self.network.is_linked(dest, &self.from) {
            bail!(Error::Unreachable(dest.clone()));
        }
        resp.ok_or_else(|| anyhow::Error::new(Error::Unreachable(dest.clone())))
    }
}
