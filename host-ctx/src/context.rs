//! Per-host wiring (C9): one [`block_data::BlockPool`], one flow-control
//! [`net_group::Group`] (collectives), one data [`net_group::Group`] fronting
//! the [`net_stream::Multiplexer`], and `W` worker threads each holding a
//! [`WorkerHandle`].

use std::net::SocketAddr;
use std::sync::Arc;

use block_data::BlockPool;
use net_group::Group;
use net_stream::Multiplexer;
use tracing::{info, info_span};

use crate::{config::Config, Error};

/// Magic group ids distinguishing the flow-control mesh (used by
/// collectives) from the data mesh (used by the `Multiplexer`) — two
/// independent `Group`s per host, per `# 4.9`, so a collective in flight on
/// one never contends with the Dispatcher's stream traffic on the other.
const FLOW_GROUP_ID: u64 = 0x464c4f57_0001; // "FLOW"
const DATA_GROUP_ID: u64 = 0x44415441_0001; // "DATA"

/// Every simulated/real host binds two listeners: the flow-control group on
/// its advertised port, the data group one port above it. Both addresses
/// are derived from the single host list the job is configured with.
fn data_addr(addr: SocketAddr) -> SocketAddr {
    let mut data = addr;
    data.set_port(addr.port().wrapping_add(1));
    data
}

/// Everything one host needs to run worker threads: the shared pool, both
/// groups, and the multiplexer. Cloned cheaply (every field is an `Arc` or
/// `Arc`-backed handle) into each [`WorkerHandle`].
pub struct HostContext {
    rank: usize,
    workers_per_host: usize,
    block_size: usize,
    pool: BlockPool,
    flow: Arc<Group>,
    mux: Arc<Multiplexer>,
    runtime: tokio::runtime::Handle,
}

impl HostContext {
    /// Run the three-phase handshake (`# 4.3`) on both the flow and data
    /// groups concurrently, build the shared `BlockPool`, construct the
    /// `Multiplexer`, and start its per-peer receive loops.
    pub async fn connect(config: &Config) -> Result<Self, Error> {
        let span = info_span!("host_ctx::connect", rank = config.rank);
        let _enter = span.enter();

        let data_hosts: Vec<SocketAddr> = config.hosts.iter().copied().map(data_addr).collect();

        let (flow, data) = tokio::try_join!(
            Group::connect(config.rank, &config.hosts, FLOW_GROUP_ID),
            Group::connect(config.rank, &data_hosts, DATA_GROUP_ID),
        )?;
        info!(num_hosts = config.num_hosts(), "host context: groups connected");

        let pool = BlockPool::new(config.block_size, config.mem_limit)?;
        let mux = Multiplexer::new(Arc::new(data), config.workers_per_host, pool.clone());

        let runtime = tokio::runtime::Handle::current();
        let spawner = link_async::Spawner::tokio(runtime.clone());
        mux.spawn_receivers(&spawner);

        Ok(Self {
            rank: config.rank,
            workers_per_host: config.workers_per_host,
            block_size: config.block_size,
            pool,
            flow: Arc::new(flow),
            mux,
            runtime,
        })
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn num_hosts(&self) -> usize {
        self.flow.num_hosts()
    }

    pub fn workers_per_host(&self) -> usize {
        self.workers_per_host
    }

    pub fn pool(&self) -> &BlockPool {
        &self.pool
    }

    /// The handle given to worker `local_worker`'s thread, per `# 4.9`:
    /// `SendTo/Broadcast/AllReduce/...` on the flow group, `GetNewStream()`
    /// on the multiplexer, `GetFile()`/`GetNewBlock()` on the pool.
    pub fn worker(self: &Arc<Self>, local_worker: usize) -> WorkerHandle {
        assert!(
            local_worker < self.workers_per_host,
            "local worker {local_worker} out of range for {} workers per host",
            self.workers_per_host
        );
        WorkerHandle {
            ctx: Arc::clone(self),
            local_worker,
        }
    }

    /// Spawn one `std::thread` per worker, each running `job` with its own
    /// [`WorkerHandle`], and block until every worker has returned. Mirrors
    /// the concurrency model of `# 5`: worker threads are plain OS threads
    /// that hand off to the async dispatcher only through `BlockQueue`s and
    /// blocking collective calls, never by blocking inside the Dispatcher
    /// itself.
    pub fn run_workers<F>(self: &Arc<Self>, job: F) -> Result<(), Error>
    where
        F: Fn(WorkerHandle) -> Result<(), Error> + Send + Sync + 'static,
    {
        let job = Arc::new(job);
        let threads: Vec<_> = (0..self.workers_per_host)
            .map(|w| {
                let handle = self.worker(w);
                let job = Arc::clone(&job);
                std::thread::Builder::new()
                    .name(format!("worker-{}-{}", self.rank, w))
                    .spawn(move || job(handle))
                    .expect("failed to spawn worker thread")
            })
            .collect();

        let mut first_err = None;
        for t in threads {
            match t.join().expect("worker thread panicked") {
                Ok(()) => {}
                Err(e) if first_err.is_none() => first_err = Some(e),
                Err(_) => {}
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Per-worker facade over the host's shared subsystems (C9). Cheap to
/// clone; every field is an `Arc` or an `Arc`-backed handle shared with
/// sibling workers on the same host.
#[derive(Clone)]
pub struct WorkerHandle {
    ctx: Arc<HostContext>,
    local_worker: usize,
}

impl WorkerHandle {
    pub fn rank(&self) -> usize {
        self.ctx.rank
    }

    pub fn local_worker(&self) -> usize {
        self.local_worker
    }

    pub fn global_worker(&self) -> u32 {
        (self.ctx.rank * self.ctx.workers_per_host + self.local_worker) as u32
    }

    pub fn num_hosts(&self) -> usize {
        self.ctx.flow.num_hosts()
    }

    /// The flow-control group, for collectives (`net_group::{broadcast,
    /// reduce, all_reduce, ...}`).
    pub fn flow(&self) -> &Group {
        &self.ctx.flow
    }

    /// Block the calling (worker) thread on an async collective. Worker
    /// threads are synchronous per `# 5`; this is the bridge.
    pub fn block_on<T>(&self, fut: impl std::future::Future<Output = T>) -> T {
        self.ctx.runtime.block_on(fut)
    }

    pub fn pool(&self) -> &BlockPool {
        &self.ctx.pool
    }

    pub fn new_file(&self) -> block_data::File {
        block_data::File::new()
    }

    /// Open a `Writer` for `stream_id` addressed to `to_global_worker`, per
    /// `GetNewStream()` in `# 4.9`.
    pub fn writer(&self, stream_id: u32, to_global_worker: u32) -> net_stream::Writer {
        net_stream::Writer::new(
            Arc::clone(&self.ctx.mux),
            self.ctx.runtime.clone(),
            stream_id,
            self.global_worker(),
            to_global_worker,
            self.ctx.block_size,
        )
    }

    /// Open a `Reader` for everything delivered to this worker on
    /// `stream_id` across the whole cluster.
    pub fn reader(&self, stream_id: u32) -> net_stream::Reader {
        let queue = self.ctx.mux.reader_queue(stream_id, self.local_worker as u32);
        net_stream::Reader::new(queue)
    }

    /// All writers for `stream_id`, one per global worker in rank order —
    /// the shape `net_stream::scatter` expects.
    pub fn writers_for_all_workers(&self, stream_id: u32) -> Vec<net_stream::Writer> {
        (0..self.ctx.mux.num_global_workers())
            .map(|to| self.writer(stream_id, to as u32))
            .collect()
    }
}
