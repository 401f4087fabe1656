use hash_ring::Node;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{line:?}: expected 3 tokens, got {count}")]
    Format { line: String, count: usize },
    #[error("{line:?}: invalid port")]
    Port {
        line: String,
        #[source]
        source: std::num::ParseIntError,
    },
}

/// Parse the seed configuration of candidate storage nodes: one node per
/// line as `<name> <host> <port>`, single-space separated. Duplicate names
/// are logged and skipped; anything else malformed (blank lines included)
/// is an error carrying the offending line.
pub fn parse_seed_config(input: &str) -> Result<Vec<Node>, ConfigError> {
    let mut nodes: Vec<Node> = Vec::new();

    for line in input.lines() {
        let tokens: Vec<&str> = line.split(' ').collect();
        let &[name, host, port] = &tokens[..] else {
            return Err(ConfigError::Format {
                line: line.to_string(),
                count: if line.is_empty() { 0 } else { tokens.len() },
            });
        };
        let port: u16 = port.parse().map_err(|source| ConfigError::Port {
            line: line.to_string(),
            source,
        })?;

        if nodes.iter().any(|node| node.name == name) {
            tracing::warn!(name, line, "duplicate node name in seed config; skipping");
            continue;
        }
        nodes.push(Node::new(name, host, port));
    }
    Ok(nodes)
}

pub fn load_seed_config(path: &std::path::Path) -> Result<Vec<Node>, ConfigError> {
    let input = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_seed_config(&input)
}
