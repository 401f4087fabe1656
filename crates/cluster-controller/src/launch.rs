use anyhow::Context;
use futures::future::BoxFuture;
use futures::FutureExt;
use hash_ring::Node;

/// LaunchFn is the injected capability which starts a storage node's
/// process on its host. Production launches over ssh; tests substitute
/// in-process nodes.
pub type LaunchFn =
    Box<dyn Fn(&Node) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Launch `<server_binary> <name> <port> <dcs_endpoint>` on the node's
/// host over ssh, detached from the controller's lifetime.
pub fn ssh_launcher(server_binary: String, dcs_endpoint: String) -> LaunchFn {
    Box::new(move |node| {
        let name = node.name.clone();
        let host = node.host.clone();
        let port = node.port;
        let binary = server_binary.clone();
        let endpoint = dcs_endpoint.clone();

        async move {
            let command = format!(
                "nohup {binary} {name} {port} {endpoint} > /dev/null 2>&1 &"
            );
            tracing::info!(node = %name, %host, "launching storage node");

            let status = tokio::task::spawn_blocking(move || {
                std::process::Command::new("ssh")
                    .arg("-n")
                    .arg(&host)
                    .arg(command)
                    .status()
            })
            .await
            .context("ssh launch task failed")?
            .context("failed to spawn ssh")?;

            if !status.success() {
                anyhow::bail!("ssh launch of '{name}' exited with {status}");
            }
            Ok(())
        }
        .boxed()
    })
}
