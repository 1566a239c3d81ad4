//! Bootstrap binary: parses the CLI/environment into a [`host_ctx::Topology`]
//! and runs a minimal demo job (a cluster-wide all-reduce sum) across every
//! worker, to prove the wiring end to end. The DIA user API and job entry
//! point are out of scope (`# 1`) — real jobs call [`host_ctx::run`] with
//! their own closure instead of this binary's demo.

use structopt::StructOpt as _;
use tracing::info;

use host_ctx::cli::Opt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    host_ctx::logging::init();

    let opt = Opt::from_args();
    let topology = opt.resolve()?;

    host_ctx::run(topology, |worker| {
        let value = (worker.global_worker() as u64) + 1;
        let total = worker.block_on(net_group::all_reduce(worker.flow(), value, |a, b| a + b))?;
        info!(
            rank = worker.rank(),
            local_worker = worker.local_worker(),
            value,
            total,
            "host-ctx: all-reduce complete"
        );
        Ok(())
    })
    .await?;

    Ok(())
}
