mod node;
mod range;
mod ring;

pub use node::{CachePolicy, CacheStrategy, Node, Status};
pub use range::HashRange;
pub use ring::{HashRing, Member};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("ring position {position:032x} of '{name}' is already held by '{other}'")]
    DuplicateHash {
        position: u128,
        name: String,
        other: String,
    },
    #[error("hash ring is empty")]
    RingEmpty,
    #[error("'{name}' is not a ring member")]
    NotMember { name: String },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Ring position of the node addressed by `host:port`:
/// its MD5 digest read as an unsigned big-endian 128-bit integer.
pub fn position(host: &str, port: u16) -> u128 {
    hash(format!("{host}:{port}").as_bytes())
}

/// Ring position to which `key` hashes.
pub fn key_position(key: &str) -> u128 {
    hash(key.as_bytes())
}

/// 32-char lowercase hex rendering of a ring position.
pub fn position_hex(position: u128) -> String {
    format!("{position:032x}")
}

/// Parse a 32-char hex ring position.
pub fn parse_position(hex: &str) -> Option<u128> {
    if hex.len() != 32 {
        return None;
    }
    u128::from_str_radix(hex, 16).ok()
}

fn hash(b: &[u8]) -> u128 {
    u128::from_be_bytes(md5::compute(b).0)
}
