use std::sync::{Arc, Mutex};

use host_ctx::config::{local_configs, DEFAULT_BLOCK_SIZE, DEFAULT_MEM_LIMIT};
use host_ctx::{HostContext, Topology};

/// End-to-end smoke test: bootstrap a 3-host, 2-worker-per-host mesh over
/// loopback (the `LOCAL` single-process bootstrap), have every worker
/// all-reduce its global worker id, and check every worker on every host
/// agrees on the sum `0 + 1 + ... + 5 = 15`.
#[tokio::test]
async fn local_mesh_all_reduce_agrees_across_every_worker() {
    let configs = local_configs(3, 2, DEFAULT_BLOCK_SIZE, DEFAULT_MEM_LIMIT).unwrap();

    let contexts: Vec<Arc<HostContext>> = futures::future::try_join_all(
        configs.iter().map(|c| HostContext::connect(c)),
    )
    .await
    .unwrap()
    .into_iter()
    .map(Arc::new)
    .collect();

    let totals = Arc::new(Mutex::new(Vec::new()));
    let handles: Vec<_> = contexts
        .into_iter()
        .map(|ctx| {
            let totals = Arc::clone(&totals);
            tokio::task::spawn_blocking(move || {
                ctx.run_workers(move |worker| {
                    let value = worker.global_worker() as u64;
                    let total = worker.block_on(net_group::all_reduce(worker.flow(), value, |a, b| a + b))?;
                    totals.lock().unwrap().push(total);
                    Ok(())
                })
            })
        })
        .collect();

    for h in handles {
        h.await.unwrap().unwrap();
    }

    let totals = totals.lock().unwrap();
    assert_eq!(totals.len(), 6); // 3 hosts * 2 workers
    assert!(totals.iter().all(|&t| t == 15));
}

#[tokio::test]
async fn topology_from_env_requires_rank_and_hostlist_without_local() {
    std::env::remove_var("LOCAL");
    std::env::remove_var("RANK");
    std::env::remove_var("HOSTLIST");
    assert!(Topology::from_env().is_err());
}
