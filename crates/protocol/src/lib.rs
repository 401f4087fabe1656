mod message;
mod metadata;

pub use message::{AdminMessage, AdminOp};
pub use metadata::{MetadataSnapshot, NodeRecord};

// Coordination znode layout.
// NOTE these constants must match what launched kv-server processes expect.

/// Persistent root beneath which every storage node has its admin znode.
pub const SERVER_ROOT: &str = "/kv_servers";

/// Znode holding the serialized active-ring snapshot.
pub const METADATA: &str = "/metadata";

/// Admin znode of the named storage node.
pub fn server_znode(name: &str) -> String {
    format!("{SERVER_ROOT}/{name}")
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Codec(#[from] serde_json::Error),
    #[error("invalid hash range bound {0:?}")]
    BadRange(String),
}

pub type Result<T> = std::result::Result<T, Error>;
