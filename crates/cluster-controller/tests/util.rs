use cluster_controller::{Controller, LaunchFn, Timeouts};
use coordination::{Coordination, MemoryCoordination};
use futures::FutureExt;
use protocol::{AdminMessage, AdminOp, MetadataSnapshot};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

/// Seed config of three candidate nodes. Their endpoint MD5 positions put
/// them on the ring in the order alpha (422db4e6…), gamma (ebfbdbaa…),
/// beta (f29316d0…).
pub const SEED: &str = "alpha 127.0.0.1 9001\nbeta 127.0.0.1 9002\ngamma 127.0.0.1 9003\n";

/// How a stubbed storage node behaves once launched.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Behavior {
    /// Acknowledge every command.
    Responsive,
    /// Launch, but never acknowledge anything.
    Deaf,
    /// Acknowledge everything except the given op.
    Ignoring(AdminOp),
    /// Fail the launch itself.
    LaunchError,
}

/// Launcher which runs each "launched" node as an in-process task that
/// watches its admin znode and acknowledges commands per its behavior.
pub fn stub_launcher(
    dcs: Arc<MemoryCoordination>,
    behaviors: HashMap<String, Behavior>,
) -> LaunchFn {
    Box::new(move |node| {
        let dcs = dcs.clone();
        let name = node.name.clone();
        let behavior = behaviors
            .get(&name)
            .copied()
            .unwrap_or(Behavior::Responsive);

        async move {
            match behavior {
                Behavior::LaunchError => anyhow::bail!("no route to host {name}"),
                Behavior::Deaf => (),
                behavior => {
                    tokio::spawn(run_stub_node(dcs, name, behavior));
                }
            }
            Ok(())
        }
        .boxed()
    })
}

async fn run_stub_node(dcs: Arc<MemoryCoordination>, name: String, behavior: Behavior) {
    let path = protocol::server_znode(&name);

    loop {
        // Watch first, then read, so no command slips between the two.
        let Ok(watch) = dcs.watch(&path).await else { return };
        let Ok((data, _)) = dcs.get(&path).await else { return };

        if let Ok(msg) = AdminMessage::decode(&data) {
            let ignored = matches!(behavior, Behavior::Ignoring(op) if op == msg.op_type);

            if !msg.is_ack() && !ignored {
                let halt = msg.op_type == AdminOp::Shutdown;
                let ack = AdminMessage::ack(msg.op_type).encode();
                if dcs.set(&path, ack, None).await.is_err() {
                    return;
                }
                if halt {
                    return;
                }
            }
        }
        if watch.await.is_err() {
            return;
        }
    }
}

pub async fn harness(
    seed: &str,
    behaviors: &[(&str, Behavior)],
) -> (Controller, Arc<MemoryCoordination>) {
    let dcs = Arc::new(MemoryCoordination::new());

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(seed.as_bytes()).unwrap();
    file.flush().unwrap();

    let behaviors: HashMap<String, Behavior> = behaviors
        .iter()
        .map(|(name, behavior)| (name.to_string(), *behavior))
        .collect();

    let controller = Controller::init(
        dcs.clone(),
        file.path(),
        stub_launcher(dcs.clone(), behaviors),
        Timeouts {
            connect: Duration::from_secs(1),
            multicast: Duration::from_millis(500),
            launch: Duration::from_secs(1),
        },
    )
    .await
    .unwrap();

    (controller, dcs)
}

pub async fn read_metadata(dcs: &MemoryCoordination) -> MetadataSnapshot {
    let (data, _) = dcs.get(protocol::METADATA).await.unwrap();
    MetadataSnapshot::decode(&data).unwrap()
}
