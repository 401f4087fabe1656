use clap::Parser;
use cluster_controller::{config, launch, Controller, PartialFailure, Timeouts};
use coordination::MemoryCoordination;
use hash_ring::CacheStrategy;
use std::sync::Arc;

#[derive(clap::Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(subcommand)]
    mode: Mode,
}

#[derive(clap::Subcommand, Debug)]
enum Mode {
    /// Provision and start the cluster, run until interrupted, then shut
    /// it down.
    Serve(ServeArgs),
}

#[derive(clap::Args, Debug, serde::Serialize)]
struct ServeArgs {
    /// Seed configuration of candidate nodes: one `name host port` per line.
    #[clap(long)]
    config: std::path::PathBuf,
    /// Number of nodes to provision from the idle pool.
    #[clap(long, default_value_t = 3)]
    count: usize,
    /// Cache replacement strategy forwarded to every node.
    #[clap(long, default_value = "LRU")]
    cache_strategy: CacheStrategy,
    /// Cache capacity forwarded to every node.
    #[clap(long, default_value_t = 1024)]
    cache_size: u64,
    /// Deadline for establishing the coordination session.
    #[clap(long, default_value = "10s")]
    #[serde(with = "humantime_serde")]
    #[arg(value_parser = humantime::parse_duration)]
    connect_timeout: std::time::Duration,
    /// Deadline for collecting multicast acknowledgements.
    #[clap(long, default_value = "15s")]
    #[serde(with = "humantime_serde")]
    #[arg(value_parser = humantime::parse_duration)]
    multicast_timeout: std::time::Duration,
    /// Deadline for launching each storage node's process.
    #[clap(long, default_value = "30s")]
    #[serde(with = "humantime_serde")]
    #[arg(value_parser = humantime::parse_duration)]
    launch_timeout: std::time::Duration,
    /// Path of the kv-server binary launched on remote hosts.
    #[clap(long, default_value = "kv-server")]
    server_binary: String,
    /// Coordination endpoint passed to launched nodes.
    #[clap(long, default_value = "127.0.0.1:2181")]
    dcs_endpoint: String,
}

fn main() -> std::process::ExitCode {
    // Use reasonable defaults for printing structured logs to stderr.
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_ansi(if matches!(std::env::var("NO_COLOR"), Ok(v) if v == "1") {
            false
        } else {
            true
        })
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting tracing default failed");

    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to build tokio runtime");

    let result = runtime.block_on(async move {
        match cli.mode {
            Mode::Serve(args) => serve(args).await,
        }
    });
    runtime.shutdown_timeout(std::time::Duration::from_secs(5));

    match result {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(?err, "cluster controller failed");
            std::process::ExitCode::from(classify_exit(&err))
        }
    }
}

// Exit codes: 1 config error, 2 coordination service unreachable,
// 3 partial failure.
fn classify_exit(err: &anyhow::Error) -> u8 {
    if err.downcast_ref::<config::ConfigError>().is_some() {
        1
    } else if err.downcast_ref::<coordination::Error>().is_some() {
        2
    } else {
        3
    }
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    // The in-process coordination service serves single-controller
    // deployments; networked services back the same trait.
    let dcs = Arc::new(MemoryCoordination::new());
    let launch_fn = launch::ssh_launcher(args.server_binary, args.dcs_endpoint);
    let timeouts = Timeouts {
        connect: args.connect_timeout,
        multicast: args.multicast_timeout,
        launch: args.launch_timeout,
    };

    let mut controller = Controller::init(dcs, &args.config, launch_fn, timeouts).await?;

    let added = controller
        .add_nodes(args.count, args.cache_strategy, args.cache_size)
        .await;
    match added {
        None => anyhow::bail!(PartialFailure("node provisioning")),
        Some(nodes) if nodes.len() < args.count => {
            anyhow::bail!(PartialFailure("node initialization"))
        }
        Some(nodes) => {
            tracing::info!(nodes = nodes.len(), "provisioned storage nodes");
        }
    }
    if !controller.start().await {
        anyhow::bail!(PartialFailure("cluster start"));
    }
    tracing::info!("cluster is serving; ctrl-c to shut down");

    tokio::signal::ctrl_c().await?;

    if !controller.shut_down().await {
        anyhow::bail!(PartialFailure("cluster shutdown"));
    }
    Ok(())
}
