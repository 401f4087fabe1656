use crate::{Error, HashRange, Node, Result};
use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Unbounded};

/// Member is a node's entry within the HashRing: its identity and the
/// hash range it currently owns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Member {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub range: HashRange,
}

impl Member {
    pub fn position(&self) -> u128 {
        self.range.end
    }
}

/// HashRing is the ordered ring of active storage nodes, keyed by the MD5
/// position of each node's `host:port` identity. Every member owns the arc
/// (predecessor, self] of the key space, so member ranges partition the
/// space with no gaps or overlaps. A key is routed to the first member at
/// or after its hash, wrapping to the smallest position past the largest.
#[derive(Clone, Debug, Default)]
pub struct HashRing {
    members: BTreeMap<u128, Member>,
}

impl HashRing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `node` at its hash position. Recomputes the range of the new
    /// member and of its successor, whose lower bound shifts.
    pub fn add(&mut self, node: &Node) -> Result<()> {
        let position = node.position();

        if let Some(other) = self.members.get(&position) {
            return Err(Error::DuplicateHash {
                position,
                name: node.name.clone(),
                other: other.name.clone(),
            });
        }
        self.members.insert(
            position,
            Member {
                name: node.name.clone(),
                host: node.host.clone(),
                port: node.port,
                range: HashRange {
                    begin: position,
                    end: position,
                },
            },
        );
        self.recompute(position);
        let successor = self.successor_of(position);
        self.recompute(successor);
        Ok(())
    }

    /// Remove `node`. The successor's lower bound becomes the removed
    /// member's old predecessor.
    pub fn remove(&mut self, node: &Node) -> Result<()> {
        let position = node.position();

        if self.members.remove(&position).is_none() {
            return Err(Error::NotMember {
                name: node.name.clone(),
            });
        }
        if !self.members.is_empty() {
            let successor = self.successor_of(position);
            self.recompute(successor);
        }
        Ok(())
    }

    pub fn remove_all(&mut self) {
        self.members.clear();
    }

    /// Member responsible for `key` under the upper-bound rule.
    pub fn node_for_key(&self, key: &str) -> Result<&Member> {
        self.node_for_hash(crate::key_position(key))
    }

    /// Member responsible for a raw `hash`: the first member at or after
    /// it, wrapping to the smallest position.
    pub fn node_for_hash(&self, hash: u128) -> Result<&Member> {
        self.members
            .range(hash..)
            .next()
            .or_else(|| self.members.iter().next())
            .map(|(_, member)| member)
            .ok_or(Error::RingEmpty)
    }

    /// Range (lower, upper] currently owned by the named member.
    pub fn range_of(&self, node: &Node) -> Result<HashRange> {
        self.members
            .get(&node.position())
            .map(|member| member.range)
            .ok_or_else(|| Error::NotMember {
                name: node.name.clone(),
            })
    }

    /// Members in ascending position order.
    pub fn iter(&self) -> impl Iterator<Item = &Member> {
        self.members.values()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    // Re-derive the range of the member at `position` from its predecessor.
    fn recompute(&mut self, position: u128) {
        let begin = self.predecessor_of(position);
        let member = self.members.get_mut(&position).unwrap();
        member.range = HashRange {
            begin,
            end: position,
        };
    }

    // Position preceding `position` on the ring: the largest position
    // below it, wrapping to the largest overall. The sole member of a
    // one-node ring is its own predecessor.
    fn predecessor_of(&self, position: u128) -> u128 {
        self.members
            .range(..position)
            .next_back()
            .or_else(|| self.members.iter().next_back())
            .map(|(p, _)| *p)
            .unwrap()
    }

    // Position following `position` on the ring, wrapping to the smallest.
    fn successor_of(&self, position: u128) -> u128 {
        self.members
            .range((Excluded(position), Unbounded))
            .next()
            .or_else(|| self.members.iter().next())
            .map(|(p, _)| *p)
            .unwrap()
    }
}
