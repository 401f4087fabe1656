mod util;

use cluster_controller::config::ConfigError;
use cluster_controller::{Controller, Timeouts};
use coordination::MemoryCoordination;
use hash_ring::{CacheStrategy, Status};
use protocol::MetadataSnapshot;
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_add_start_stop_cycle() {
    let (mut controller, dcs) = util::harness(util::SEED, &[]).await;

    let added = controller
        .add_nodes(3, CacheStrategy::Lru, 64)
        .await
        .unwrap();
    assert_eq!(added.len(), 3);
    assert!(added.iter().all(|n| n.status == Status::Stopped));
    assert!(controller.await_nodes(3, Duration::from_millis(100)).await);
    assert!(!controller.await_nodes(4, Duration::from_millis(100)).await);

    assert!(controller.start().await);
    assert_eq!(controller.ring().len(), 3);
    assert!(controller
        .nodes()
        .values()
        .all(|n| n.status == Status::Active));

    // The published snapshot is the ring, in ascending position order.
    let metadata = util::read_metadata(&dcs).await;
    assert_eq!(metadata, MetadataSnapshot::of_ring(controller.ring()));
    let names: Vec<&str> = metadata.nodes.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, ["alpha", "gamma", "beta"]);

    // alpha sits at MD5("127.0.0.1:9001") and owns the wrapped arc from
    // beta, the largest position, around through its own.
    assert_eq!(
        metadata.nodes[0].range_high,
        "422db4e6da7b4bba46bd476612df0469"
    );
    assert_eq!(
        metadata.nodes[0].range_low,
        "f29316d06d7f5c505bf92924ef4c7ba4"
    );

    // Key routing follows the upper-bound rule, wrapping past beta.
    assert_eq!(controller.node_by_key("apple").unwrap().name, "alpha");
    assert_eq!(controller.node_by_key("banana").unwrap().name, "gamma");
    assert_eq!(controller.node_by_key("olive").unwrap().name, "alpha");

    assert!(controller.stop().await);
    assert!(controller.ring().is_empty());
    assert!(controller
        .nodes()
        .values()
        .all(|n| n.status == Status::Stopped));
    assert!(util::read_metadata(&dcs).await.nodes.is_empty());
    assert!(controller.node_by_key("apple").is_none());
}

#[tokio::test]
async fn test_restart_is_a_ring_noop() {
    let (mut controller, dcs) = util::harness(util::SEED, &[]).await;

    controller
        .add_nodes(3, CacheStrategy::Fifo, 16)
        .await
        .unwrap();
    assert!(controller.start().await);
    let before = MetadataSnapshot::of_ring(controller.ring());

    // Every node is already ACTIVE: a second start has nothing to do and
    // leaves the ring and published metadata untouched.
    assert!(controller.start().await);
    assert_eq!(MetadataSnapshot::of_ring(controller.ring()), before);
    assert_eq!(util::read_metadata(&dcs).await, before);
}

#[tokio::test]
async fn test_remove_nodes() {
    let (mut controller, dcs) = util::harness(util::SEED, &[]).await;

    controller
        .add_nodes(3, CacheStrategy::Lru, 64)
        .await
        .unwrap();
    assert!(controller.start().await);

    assert!(controller.remove_nodes(&["gamma".to_string()]).await);
    assert!(!controller.nodes().contains_key("gamma"));
    assert_eq!(controller.ring().len(), 2);

    // gamma's arc folds into its successor beta.
    assert_eq!(controller.node_by_key("banana").unwrap().name, "beta");

    let metadata = util::read_metadata(&dcs).await;
    let names: Vec<&str> = metadata.nodes.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, ["alpha", "beta"]);

    assert!(!controller.remove_nodes(&["unknown".to_string()]).await);
}

#[tokio::test]
async fn test_shut_down_clears_cluster() {
    let (mut controller, dcs) = util::harness(util::SEED, &[]).await;

    controller
        .add_nodes(3, CacheStrategy::Lfu, 32)
        .await
        .unwrap();
    assert!(controller.start().await);

    assert!(controller.shut_down().await);
    assert!(controller.nodes().is_empty());
    assert!(controller.ring().is_empty());
    assert!(util::read_metadata(&dcs).await.nodes.is_empty());
}

#[tokio::test]
async fn test_transfer_data_drives_the_handoff_protocol() {
    let (mut controller, _dcs) = util::harness(util::SEED, &[]).await;

    controller
        .add_nodes(3, CacheStrategy::Lru, 64)
        .await
        .unwrap();
    assert!(controller.start().await);

    let range = controller.ring().range_of(&controller.nodes()["alpha"]).unwrap();
    assert!(controller.transfer_data("alpha", "beta", range).await);
    assert!(!controller.transfer_data("alpha", "unknown", range).await);
}

#[tokio::test]
async fn test_init_surfaces_config_errors() {
    let dcs = Arc::new(MemoryCoordination::new());

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"server1 10.0.0.1\n").unwrap();
    file.flush().unwrap();

    let err = Controller::init(
        dcs.clone(),
        file.path(),
        util::stub_launcher(dcs, HashMap::new()),
        Timeouts::default(),
    )
    .await
    .unwrap_err();

    let config_err = err.downcast_ref::<ConfigError>().unwrap();
    assert_eq!(
        config_err.to_string(),
        r#""server1 10.0.0.1": expected 3 tokens, got 2"#
    );
}
