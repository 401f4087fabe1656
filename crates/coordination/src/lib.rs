use tokio::sync::{oneshot, watch};

mod memory;
pub use memory::MemoryCoordination;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("znode '{0}' does not exist")]
    NoNode(String),
    #[error("znode '{0}' already exists")]
    NodeExists(String),
    #[error("version check failed for '{path}': expected {expect}, actual {actual}")]
    BadVersion {
        path: String,
        expect: i64,
        actual: i64,
    },
    #[error("znode '{0}' has children")]
    NotEmpty(String),
    #[error("invalid znode path '{0}'")]
    BadPath(String),
    #[error("coordination session was lost")]
    SessionLost,
    #[error("timed out establishing coordination session")]
    ConnectTimeout,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Lifecycle of the shared coordination session.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Connected,
    Expired,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CreateMode {
    Persistent,
    /// The created path gains a monotonic ten-digit suffix, and the znode
    /// is discarded with the session which created it.
    EphemeralSequential,
}

/// Znode metadata: the monotonic data version used for optimistic
/// concurrency. Versions start at 0 and increment with every set.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Stat {
    pub version: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchEvent {
    pub path: String,
    pub kind: EventKind,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EventKind {
    DataChanged,
    ChildrenChanged,
    Deleted,
}

/// Coordination is the capability surface of the durable coordination
/// service: hierarchical, versioned znodes with one-shot watches. Any
/// strongly-consistent hierarchical service can back it, and the rest of
/// the control plane is agnostic to which one does.
///
/// Watches fire once, on the next data change, child change, or deletion
/// of the watched znode, and are delivered in the order the triggering
/// mutations were applied. A dropped watch (its sender going away with the
/// session) surfaces as a receive error, not an event.
#[async_trait::async_trait]
pub trait Coordination: Send + Sync {
    /// Create a znode at `path` holding `data`, returning the path actually
    /// created (sequential modes append a suffix).
    async fn create(&self, path: &str, data: Vec<u8>, mode: CreateMode) -> Result<String>;

    async fn exists(&self, path: &str) -> Result<Option<Stat>>;

    async fn get(&self, path: &str) -> Result<(Vec<u8>, Stat)>;

    /// Overwrite `path` with `data`. When `expect` is Some, the write only
    /// applies if it matches the znode's current version.
    async fn set(&self, path: &str, data: Vec<u8>, expect: Option<i64>) -> Result<Stat>;

    async fn delete(&self, path: &str, expect: Option<i64>) -> Result<()>;

    /// Names (not paths) of the direct children of `path`.
    async fn children(&self, path: &str) -> Result<Vec<String>>;

    /// Register a one-shot watch on an existing znode.
    async fn watch(&self, path: &str) -> Result<oneshot::Receiver<WatchEvent>>;

    /// Observe the session lifecycle.
    fn session(&self) -> watch::Receiver<SessionState>;
}

/// Block until the session reaches Connected, or time out. Callers must
/// not issue control operations before this resolves.
pub async fn sync_connected(
    dcs: &dyn Coordination,
    timeout: std::time::Duration,
) -> Result<()> {
    let mut session = dcs.session();
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        match *session.borrow() {
            SessionState::Connected => return Ok(()),
            SessionState::Expired => return Err(Error::SessionLost),
            SessionState::Connecting => (),
        }
        match tokio::time::timeout_at(deadline, session.changed()).await {
            Ok(Ok(())) => (),
            Ok(Err(_)) => return Err(Error::SessionLost),
            Err(_) => return Err(Error::ConnectTimeout),
        }
    }
}
