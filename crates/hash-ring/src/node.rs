/// Status of a storage node within the provisioning lifecycle.
///
/// Nodes move strictly forward except for the Stopped <-> Active cycle:
/// Idle -> Inactive -> Stopped <-> Active, with Removed terminal.
#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Idle,
    Inactive,
    Stopped,
    Active,
    Removed,
}

impl Status {
    /// Whether the lifecycle permits moving from `self` to `next`.
    pub fn may_transition(self, next: Status) -> bool {
        use Status::*;
        matches!(
            (self, next),
            (Idle, Inactive)
                | (Inactive, Stopped)
                | (Inactive, Removed)
                | (Stopped, Active)
                | (Stopped, Removed)
                | (Active, Stopped)
                | (Active, Removed)
        )
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Status::Idle => "IDLE",
            Status::Inactive => "INACTIVE",
            Status::Stopped => "STOPPED",
            Status::Active => "ACTIVE",
            Status::Removed => "REMOVED",
        };
        f.write_str(s)
    }
}

/// Cache replacement strategy of a storage node.
/// Opaque to the controller, which only forwards it at INIT.
#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CacheStrategy {
    Fifo,
    Lru,
    Lfu,
}

impl std::str::FromStr for CacheStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "FIFO" => Ok(CacheStrategy::Fifo),
            "LRU" => Ok(CacheStrategy::Lru),
            "LFU" => Ok(CacheStrategy::Lfu),
            _ => Err(format!(
                "invalid cache strategy {s:?} (expected FIFO, LRU, or LFU)"
            )),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CachePolicy {
    pub strategy: CacheStrategy,
    pub size: u64,
}

/// Node is a storage node known to the controller: network identity,
/// lifecycle status, and the cache policy it was (or will be) started with.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Node {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub status: Status,
    pub policy: Option<CachePolicy>,
}

impl Node {
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            status: Status::Idle,
            policy: None,
        }
    }

    /// Ring position determined by the node's network identity.
    pub fn position(&self) -> u128 {
        crate::position(&self.host, self.port)
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_status_transitions() {
        use Status::*;

        let cases = [
            (Idle, Inactive, true),
            (Inactive, Stopped, true),
            (Inactive, Removed, true),
            (Stopped, Active, true),
            (Active, Stopped, true),
            (Stopped, Removed, true),
            (Active, Removed, true),
            // No backward transitions outside the Stopped <-> Active cycle.
            (Inactive, Idle, false),
            (Stopped, Inactive, false),
            (Active, Idle, false),
            (Removed, Stopped, false),
            (Removed, Active, false),
            (Idle, Active, false),
        ];
        for (from, to, expect) in cases {
            assert_eq!(from.may_transition(to), expect, "{from} -> {to}");
        }
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("LRU".parse::<CacheStrategy>(), Ok(CacheStrategy::Lru));
        assert_eq!("fifo".parse::<CacheStrategy>(), Ok(CacheStrategy::Fifo));
        assert_eq!("lfu".parse::<CacheStrategy>(), Ok(CacheStrategy::Lfu));
        assert!("ARC".parse::<CacheStrategy>().is_err());
    }

    #[test]
    fn test_wire_forms() {
        assert_eq!(
            serde_json::to_value(Status::Inactive).unwrap(),
            serde_json::json!("INACTIVE")
        );
        let policy = CachePolicy {
            strategy: CacheStrategy::Lfu,
            size: 128,
        };
        assert_eq!(
            serde_json::to_value(&policy).unwrap(),
            serde_json::json!({"strategy": "LFU", "size": 128})
        );
    }
}
