use hash_ring::HashRing;

/// NodeRecord is one active node within the published metadata snapshot.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    pub name: String,
    pub host: String,
    pub port: u16,
    /// Exclusive lower bound of the node's hash range, 32-char hex.
    pub range_low: String,
    /// Inclusive upper bound of the node's hash range, 32-char hex.
    pub range_high: String,
}

/// MetadataSnapshot is the complete active ring as published to the
/// metadata znode. Readers receive the whole ring on every update, in
/// ascending position order.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MetadataSnapshot {
    pub nodes: Vec<NodeRecord>,
}

impl MetadataSnapshot {
    pub fn of_ring(ring: &HashRing) -> Self {
        let nodes = ring
            .iter()
            .map(|member| NodeRecord {
                name: member.name.clone(),
                host: member.host.clone(),
                port: member.port,
                range_low: member.range.begin_hex(),
                range_high: member.range.end_hex(),
            })
            .collect();
        Self { nodes }
    }

    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap()
    }

    pub fn decode(data: &[u8]) -> crate::Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}
