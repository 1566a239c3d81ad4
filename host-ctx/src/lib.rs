//! Host Context (C9): wires the network group and dispatcher (`net-io`,
//! `net-group`), the block pool and multiplexed streams (`block-data`,
//! `net-stream`), and the reduce tables and location detection
//! (`reduce-core`, `loc-detect`) together behind one handle per worker
//! thread.
//!
//! Bootstrap (`# 6`, `# 10.3`): a rank and a host list drive the `Group`
//! handshake; on completion, `W` worker threads are spawned, each pinned to
//! a logical worker id and given a [`WorkerHandle`].

pub mod cli;
pub mod config;
mod context;
mod error;
pub mod logging;

pub use config::{Config, Topology};
pub use context::{HostContext, WorkerHandle};
pub use error::Error;

/// Run `job` to completion against every host described by `topology`.
///
/// For [`Topology::Distributed`], this host connects once and spawns its
/// own worker threads. For [`Topology::Local`], every simulated host is
/// bootstrapped concurrently in this one process (their `Group`s dial each
/// other over loopback) before each spawns its own workers — the `LOCAL`
/// single-process mesh from `# 6`.
pub async fn run<F>(topology: Topology, job: F) -> Result<(), Error>
where
    F: Fn(WorkerHandle) -> Result<(), Error> + Send + Sync + Clone + 'static,
{
    match topology {
        Topology::Distributed(config) => {
            let ctx = std::sync::Arc::new(HostContext::connect(&config).await?);
            let job = job.clone();
            tokio::task::spawn_blocking(move || ctx.run_workers(job))
                .await
                .expect("worker-thread supervisor task panicked")
        }
        Topology::Local(configs) => {
            let contexts: Vec<std::sync::Arc<HostContext>> = futures::future::try_join_all(
                configs.iter().map(|config| HostContext::connect(config)),
            )
            .await?
            .into_iter()
            .map(std::sync::Arc::new)
            .collect();

            let supervisors = contexts.into_iter().map(|ctx| {
                let job = job.clone();
                tokio::task::spawn_blocking(move || ctx.run_workers(job))
            });
            for result in futures::future::join_all(supervisors).await {
                result.expect("worker-thread supervisor task panicked")?;
            }
            Ok(())
        }
    }
}
