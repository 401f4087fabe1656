use coordination::{Coordination, EventKind};
use hash_ring::Node;
use protocol::AdminMessage;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Failure of a single multicast target.
#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    #[error("timed out awaiting acknowledgement")]
    Timeout,
    #[error("failed to write admin message: {0}")]
    WriteFailed(coordination::Error),
    #[error("coordination session was lost")]
    SessionLost,
    #[error("target znode is gone")]
    TargetGone,
}

/// Outcome of one multicast: the targets which acknowledged, and the
/// error of each target which did not.
#[derive(Debug, Default)]
pub struct Outcome {
    pub acked: Vec<String>,
    pub errors: BTreeMap<String, TargetError>,
}

impl Outcome {
    pub fn all_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Multicaster fans one admin command out to a set of nodes through their
/// admin znodes and collects per-node acknowledgements under a single
/// deadline. Targets are independent: a slow node cannot block a fast one,
/// there is no cross-target ordering, and there is no implicit retry.
pub struct Multicaster {
    dcs: Arc<dyn Coordination>,
}

impl Multicaster {
    pub fn new(dcs: Arc<dyn Coordination>) -> Self {
        Self { dcs }
    }

    #[tracing::instrument(skip_all, fields(op = ?msg.op_type, targets = targets.len()))]
    pub async fn send(
        &self,
        msg: &AdminMessage,
        targets: &[Node],
        timeout: std::time::Duration,
    ) -> Outcome {
        let deadline = tokio::time::Instant::now() + timeout;

        let deliveries = targets.iter().map(|node| {
            let dcs = self.dcs.clone();
            async move {
                let result = deliver(dcs.as_ref(), msg, node, deadline).await;
                (node.name.clone(), result)
            }
        });

        let mut outcome = Outcome::default();
        for (name, result) in futures::future::join_all(deliveries).await {
            match result {
                Ok(()) => outcome.acked.push(name),
                Err(err) => {
                    outcome.errors.insert(name, err);
                }
            }
        }
        tracing::debug!(
            acked = outcome.acked.len(),
            failed = outcome.errors.len(),
            "multicast complete"
        );
        outcome
    }
}

async fn deliver(
    dcs: &dyn Coordination,
    msg: &AdminMessage,
    node: &Node,
    deadline: tokio::time::Instant,
) -> Result<(), TargetError> {
    let path = protocol::server_znode(&node.name);

    // Overwrite whatever the znode last held. A node which already
    // acknowledged an identical command simply re-acks.
    dcs.set(&path, msg.encode(), None).await.map_err(classify)?;

    loop {
        // Register the watch before re-reading, so an ack landing between
        // the two is observed either way. Acks of a different op are stale
        // leftovers and don't satisfy this command.
        let watch = dcs.watch(&path).await.map_err(classify)?;
        let (data, _) = dcs.get(&path).await.map_err(classify)?;

        if let Ok(reply) = AdminMessage::decode(&data) {
            if reply.acked_op() == Some(msg.op_type) {
                return Ok(());
            }
        }
        match tokio::time::timeout_at(deadline, watch).await {
            Err(_) => return Err(TargetError::Timeout),
            Ok(Err(_)) => return Err(TargetError::SessionLost),
            Ok(Ok(event)) if event.kind == EventKind::Deleted => {
                return Err(TargetError::TargetGone)
            }
            Ok(Ok(_)) => (),
        }
    }
}

fn classify(err: coordination::Error) -> TargetError {
    match err {
        coordination::Error::SessionLost => TargetError::SessionLost,
        coordination::Error::NoNode(_) => TargetError::TargetGone,
        err => TargetError::WriteFailed(err),
    }
}
