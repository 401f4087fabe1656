use hash_ring::{CachePolicy, HashRange};

/// AdminOp identifies an administrative command, or the acknowledgement
/// of one.
#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdminOp {
    Init,
    Start,
    Stop,
    Shutdown,
    MoveData,
    ReceiveData,
    Ack,
}

/// AdminMessage is the self-describing record exchanged through a node's
/// admin znode: controller-to-node commands and node-to-controller acks.
/// Optional operands are omitted from the wire form when unset.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminMessage {
    pub op_type: AdminOp,
    /// Hash range operand of MOVE_DATA, as [low, high] 32-char hex.
    #[serde(skip_serializing_if = "Option::is_none", with = "hex_range")]
    pub range: Option<HashRange>,
    /// `host:port` operand of MOVE_DATA naming the receiving node.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    /// Opaque operand: the cache-policy blob of INIT, or the op which an
    /// ACK acknowledges.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

// Wire form of AdminMessage, before its hash range bounds are parsed.
#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct Wire {
    op_type: AdminOp,
    #[serde(default)]
    range: Option<[String; 2]>,
    #[serde(default)]
    destination: Option<String>,
    #[serde(default)]
    payload: Option<serde_json::Value>,
}

impl AdminMessage {
    fn bare(op_type: AdminOp) -> Self {
        Self {
            op_type,
            range: None,
            destination: None,
            payload: None,
        }
    }

    pub fn init(policy: &CachePolicy) -> Self {
        Self {
            payload: Some(serde_json::to_value(policy).unwrap()),
            ..Self::bare(AdminOp::Init)
        }
    }

    pub fn start() -> Self {
        Self::bare(AdminOp::Start)
    }

    pub fn stop() -> Self {
        Self::bare(AdminOp::Stop)
    }

    pub fn shutdown() -> Self {
        Self::bare(AdminOp::Shutdown)
    }

    pub fn move_data(range: HashRange, destination: String) -> Self {
        Self {
            range: Some(range),
            destination: Some(destination),
            ..Self::bare(AdminOp::MoveData)
        }
    }

    pub fn receive_data() -> Self {
        Self::bare(AdminOp::ReceiveData)
    }

    /// Acknowledge `op`. Acks name the op they acknowledge, so a stale ack
    /// of a prior command is distinguishable from the ack of this one.
    pub fn ack(op: AdminOp) -> Self {
        Self {
            payload: Some(serde_json::to_value(op).unwrap()),
            ..Self::bare(AdminOp::Ack)
        }
    }

    pub fn is_ack(&self) -> bool {
        self.op_type == AdminOp::Ack
    }

    /// The op which this ACK acknowledges, if it is one.
    pub fn acked_op(&self) -> Option<AdminOp> {
        if !self.is_ack() {
            return None;
        }
        self.payload
            .as_ref()
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap()
    }

    pub fn decode(data: &[u8]) -> crate::Result<Self> {
        let Wire {
            op_type,
            range,
            destination,
            payload,
        } = serde_json::from_slice(data)?;

        let range = match range {
            None => None,
            Some([low, high]) => Some(HashRange {
                begin: parse_bound(&low)?,
                end: parse_bound(&high)?,
            }),
        };
        Ok(Self {
            op_type,
            range,
            destination,
            payload,
        })
    }
}

// A range bound must be a 32-char hex ring position.
fn parse_bound(bound: &str) -> crate::Result<u128> {
    hash_ring::parse_position(bound).ok_or_else(|| crate::Error::BadRange(bound.to_string()))
}

mod hex_range {
    use hash_ring::HashRange;
    use serde::{Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        range: &Option<HashRange>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        // skip_serializing_if guarantees Some.
        let range = range.as_ref().unwrap();
        [range.begin_hex(), range.end_hex()].serialize(serializer)
    }
}
