use crate::{CreateMode, Error, EventKind, Result, SessionState, Stat, WatchEvent};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{oneshot, watch};

/// MemoryCoordination is a complete in-process coordination service:
/// hierarchical znodes with monotonic versions, ephemeral-sequential
/// creates, and one-shot watches fired in mutation order. It backs tests
/// and single-process deployments; networked coordination services
/// implement the same trait out of tree.
#[derive(Clone)]
pub struct MemoryCoordination {
    inner: Arc<Inner>,
}

struct Inner {
    tree: Mutex<Tree>,
    session: watch::Sender<SessionState>,
}

#[derive(Default)]
struct Tree {
    znodes: BTreeMap<String, Znode>,
    watches: HashMap<String, Vec<oneshot::Sender<WatchEvent>>>,
    sequence: u64,
}

#[derive(Default)]
struct Znode {
    data: Vec<u8>,
    version: i64,
    ephemeral: bool,
}

impl Default for MemoryCoordination {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCoordination {
    /// An in-process service is connected from the moment it exists.
    pub fn new() -> Self {
        let (session, _) = watch::channel(SessionState::Connected);
        Self {
            inner: Arc::new(Inner {
                tree: Mutex::new(Tree::default()),
                session,
            }),
        }
    }

    /// Expire the session: every subsequent operation fails SessionLost,
    /// outstanding watches are dropped (their receivers error rather than
    /// fire), and ephemeral znodes are discarded.
    pub fn expire(&self) {
        let mut tree = self.inner.tree.lock().unwrap();
        self.inner.session.send_replace(SessionState::Expired);
        tree.watches.clear();
        tree.znodes.retain(|_, znode| !znode.ephemeral);
        tracing::debug!("expired in-process coordination session");
    }

    // Lock the tree, failing if the session is gone.
    fn locked(&self) -> Result<MutexGuard<'_, Tree>> {
        if *self.inner.session.borrow() != SessionState::Connected {
            return Err(Error::SessionLost);
        }
        Ok(self.inner.tree.lock().unwrap())
    }
}

#[async_trait::async_trait]
impl crate::Coordination for MemoryCoordination {
    async fn create(&self, path: &str, data: Vec<u8>, mode: CreateMode) -> Result<String> {
        validate(path)?;
        let mut tree = self.locked()?;

        let (actual, ephemeral) = match mode {
            CreateMode::Persistent => (path.to_string(), false),
            CreateMode::EphemeralSequential => {
                let actual = format!("{path}{:010}", tree.sequence);
                tree.sequence += 1;
                (actual, true)
            }
        };
        if tree.znodes.contains_key(&actual) {
            return Err(Error::NodeExists(actual));
        }
        if let Some(parent) = parent_of(&actual) {
            if !tree.znodes.contains_key(parent) {
                return Err(Error::NoNode(parent.to_string()));
            }
        }
        tree.znodes.insert(
            actual.clone(),
            Znode {
                data,
                version: 0,
                ephemeral,
            },
        );
        if let Some(parent) = parent_of(&actual) {
            fire(&mut tree, parent, EventKind::ChildrenChanged);
        }
        Ok(actual)
    }

    async fn exists(&self, path: &str) -> Result<Option<Stat>> {
        let tree = self.locked()?;
        Ok(tree.znodes.get(path).map(|znode| Stat {
            version: znode.version,
        }))
    }

    async fn get(&self, path: &str) -> Result<(Vec<u8>, Stat)> {
        let tree = self.locked()?;
        let znode = tree
            .znodes
            .get(path)
            .ok_or_else(|| Error::NoNode(path.to_string()))?;
        Ok((
            znode.data.clone(),
            Stat {
                version: znode.version,
            },
        ))
    }

    async fn set(&self, path: &str, data: Vec<u8>, expect: Option<i64>) -> Result<Stat> {
        let mut tree = self.locked()?;
        let znode = tree
            .znodes
            .get_mut(path)
            .ok_or_else(|| Error::NoNode(path.to_string()))?;

        if let Some(expect) = expect {
            if expect != znode.version {
                return Err(Error::BadVersion {
                    path: path.to_string(),
                    expect,
                    actual: znode.version,
                });
            }
        }
        znode.data = data;
        znode.version += 1;
        let stat = Stat {
            version: znode.version,
        };
        fire(&mut tree, path, EventKind::DataChanged);
        Ok(stat)
    }

    async fn delete(&self, path: &str, expect: Option<i64>) -> Result<()> {
        let mut tree = self.locked()?;
        let znode = tree
            .znodes
            .get(path)
            .ok_or_else(|| Error::NoNode(path.to_string()))?;

        if let Some(expect) = expect {
            if expect != znode.version {
                return Err(Error::BadVersion {
                    path: path.to_string(),
                    expect,
                    actual: znode.version,
                });
            }
        }
        if children_of(&tree, path).next().is_some() {
            return Err(Error::NotEmpty(path.to_string()));
        }
        tree.znodes.remove(path);
        fire(&mut tree, path, EventKind::Deleted);
        if let Some(parent) = parent_of(path) {
            fire(&mut tree, parent, EventKind::ChildrenChanged);
        }
        Ok(())
    }

    async fn children(&self, path: &str) -> Result<Vec<String>> {
        let tree = self.locked()?;
        if !tree.znodes.contains_key(path) {
            return Err(Error::NoNode(path.to_string()));
        }
        Ok(children_of(&tree, path).collect())
    }

    async fn watch(&self, path: &str) -> Result<oneshot::Receiver<WatchEvent>> {
        let mut tree = self.locked()?;
        if !tree.znodes.contains_key(path) {
            return Err(Error::NoNode(path.to_string()));
        }
        let (tx, rx) = oneshot::channel();
        tree.watches.entry(path.to_string()).or_default().push(tx);
        Ok(rx)
    }

    fn session(&self) -> watch::Receiver<SessionState> {
        self.inner.session.subscribe()
    }
}

fn validate(path: &str) -> Result<()> {
    let valid = path.len() > 1
        && path.starts_with('/')
        && !path.ends_with('/')
        && !path[1..].split('/').any(str::is_empty);

    if valid {
        Ok(())
    } else {
        Err(Error::BadPath(path.to_string()))
    }
}

// Parent path, or None for a top-level znode.
fn parent_of(path: &str) -> Option<&str> {
    match path.rsplit_once('/') {
        Some(("", _)) => None,
        Some((parent, _)) => Some(parent),
        None => None,
    }
}

// Names of the direct children of `path`, in order.
fn children_of<'t>(tree: &'t Tree, path: &str) -> impl Iterator<Item = String> + 't {
    let prefix = format!("{path}/");
    let skip = prefix.len();
    tree.znodes
        .range(prefix.clone()..)
        .take_while(move |(key, _)| key.starts_with(&prefix))
        .filter_map(move |(key, _)| {
            let name = &key[skip..];
            (!name.contains('/')).then(|| name.to_string())
        })
}

// Fire and consume every one-shot watch registered on `path`.
fn fire(tree: &mut Tree, path: &str, kind: EventKind) {
    if let Some(senders) = tree.watches.remove(path) {
        for sender in senders {
            // A receiver which has gone away is not an error.
            let _ = sender.send(WatchEvent {
                path: path.to_string(),
                kind,
            });
        }
    }
}
