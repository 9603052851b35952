use super::*;

/// Member list committed at a position of the log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    pub position: Position,
    pub members: Vec<Member>,
}

impl Configuration {
    pub fn empty() -> Self {
        Self {
            position: NULL_POSITION,
            members: vec![],
        }
    }

    pub fn contains(&self, endpoint: &Endpoint) -> bool {
        self.members.iter().any(|m| &m.endpoint == endpoint)
    }

    /// Number of members making a strict majority.
    pub fn quorum(&self) -> usize {
        self.members.len() / 2 + 1
    }

    pub fn endpoints(&self) -> impl Iterator<Item = &Endpoint> {
        self.members.iter().map(|m| &m.endpoint)
    }
}

/// The committed member list of a partition.
///
/// Readers get an immutable snapshot of the list. A new list is published as a whole
/// when a configuration entry is committed, so a reader never sees a half-updated list.
#[derive(Clone)]
pub struct MembershipDirectory {
    current: Arc<spin::RwLock<Arc<Configuration>>>,
}

impl Default for MembershipDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl MembershipDirectory {
    pub fn new() -> Self {
        Self {
            current: Arc::new(spin::RwLock::new(Arc::new(Configuration::empty()))),
        }
    }

    pub fn current(&self) -> Arc<Configuration> {
        self.current.read().clone()
    }

    pub fn members(&self) -> Vec<Member> {
        self.current().members.clone()
    }

    pub fn contains(&self, endpoint: &Endpoint) -> bool {
        self.current().contains(endpoint)
    }

    pub fn len(&self) -> usize {
        self.current().members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the member list. A configuration older than the current one is ignored.
    pub(crate) fn publish(&self, config: Configuration) -> bool {
        let mut cur = self.current.write();
        if config.position < cur.position {
            return false;
        }
        *cur = Arc::new(config);
        true
    }
}
