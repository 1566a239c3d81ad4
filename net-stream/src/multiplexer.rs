use std::{collections::HashMap, sync::Arc};

use block_data::BlockPool;
use net_group::Group;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::{
    header::StreamHeader,
    queue::InboundQueue,
    Error,
};

/// Demultiplexes inbound blocks into per-`(stream_id, to_worker)` queues and
/// provides the loopback fast path for sends whose destination worker lives
/// on this same host.
///
/// One `Multiplexer` is shared by every worker thread on a host (C9 wires
/// exactly one per host), fronting the host's data [`Group`].
pub struct Multiplexer {
    group: Arc<Group>,
    my_host_rank: usize,
    workers_per_host: usize,
    pool: BlockPool,
    inbound: Mutex<HashMap<(u32, u32), Arc<InboundQueue>>>,
    receiver_tasks: Mutex<Vec<link_async::Task<()>>>,
}

impl Multiplexer {
    pub fn new(group: Arc<Group>, workers_per_host: usize, pool: BlockPool) -> Arc<Self> {
        Arc::new(Self {
            my_host_rank: group.my_rank(),
            group,
            workers_per_host,
            pool,
            inbound: Mutex::new(HashMap::new()),
            receiver_tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn num_hosts(&self) -> usize {
        self.group.num_hosts()
    }

    pub fn workers_per_host(&self) -> usize {
        self.workers_per_host
    }

    pub fn num_global_workers(&self) -> usize {
        self.group.num_hosts() * self.workers_per_host
    }

    pub fn global_worker(&self, local_idx: usize) -> u32 {
        (self.my_host_rank * self.workers_per_host + local_idx) as u32
    }

    fn host_of(&self, global_worker: u32) -> usize {
        global_worker as usize / self.workers_per_host
    }

    fn inbound_queue(&self, stream_id: u32, to_worker: u32) -> Arc<InboundQueue> {
        let mut map = self.inbound.lock();
        map.entry((stream_id, to_worker))
            .or_insert_with(|| Arc::new(InboundQueue::new(self.num_global_workers())))
            .clone()
    }

    /// Fetch (creating on first sight) the inbound queue for a local worker
    /// on this stream, so it can be wrapped in a [`crate::stream::Reader`].
    pub fn reader_queue(&self, stream_id: u32, local_worker: u32) -> Arc<InboundQueue> {
        self.inbound_queue(stream_id, self.global_worker(local_worker as usize))
    }

    /// Send one block. Delivers locally without touching the network if
    /// `to_worker` lives on this host; otherwise frames the block with the
    /// wire header and sends it over the data group.
    pub async fn send_block(
        &self,
        stream_id: u32,
        from_worker: u32,
        to_worker: u32,
        item_count: u32,
        payload: Vec<u8>,
        close: bool,
    ) -> Result<(), Error> {
        let header = StreamHeader {
            stream_id,
            from_worker,
            to_worker,
            item_count,
            payload_size: payload.len() as u32,
            flags: if close { crate::header::CLOSE_FLAG } else { 0 },
        };

        if self.host_of(to_worker) == self.my_host_rank {
            trace!(stream_id, to_worker, "multiplexer: loopback delivery");
            let pool = self.pool.clone();
            let block = tokio::task::spawn_blocking(move || pool.allocate(payload))
                .await
                .expect("block pool allocation task panicked")?;
            self.inbound_queue(stream_id, to_worker)
                .deliver(block, item_count, close);
            return Ok(());
        }

        let peer_rank = self.host_of(to_worker);
        let mut message = Vec::with_capacity(StreamHeader::ENCODED_LEN + payload.len());
        message.extend_from_slice(&header.encode());
        message.extend_from_slice(&payload);
        self.group.send_bytes_to(peer_rank, &message).await?;
        Ok(())
    }

    /// Run the receive loop for one remote peer host: read one framed block
    /// at a time and demultiplex it into the addressed local queue. Returns
    /// once the peer's connection is closed.
    pub async fn run_receiver(&self, peer_rank: usize) -> Result<(), Error> {
        loop {
            let mut header_buf = [0u8; StreamHeader::ENCODED_LEN];
            match self.group.recv_bytes_from(peer_rank, &mut header_buf).await {
                Ok(()) => {}
                Err(net_group::Error::Transport(e)) if e.is_peer_closed() => {
                    debug!(peer_rank, "multiplexer: peer closed data connection");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }
            let header = StreamHeader::decode(&header_buf)?;

            let mut payload = vec![0u8; header.payload_size as usize];
            self.group.recv_bytes_from(peer_rank, &mut payload).await?;

            let pool = self.pool.clone();
            let block = tokio::task::spawn_blocking(move || pool.allocate(payload))
                .await
                .expect("block pool allocation task panicked")?;

            self.inbound_queue(header.stream_id, header.to_worker)
                .deliver(block, header.item_count, header.is_close());
        }
    }

    /// Spawn [`Multiplexer::run_receiver`] for every remote host, logging
    /// (rather than propagating) a peer's receive-loop failure so one bad
    /// peer does not take down the others. The spawned [`link_async::Task`]
    /// handles are retained for the `Multiplexer`'s lifetime: dropping them
    /// would abort the receive loops.
    pub fn spawn_receivers(self: &Arc<Self>, spawner: &link_async::Spawner) {
        let mut tasks = self.receiver_tasks.lock();
        for peer_rank in 0..self.num_hosts() {
            if peer_rank == self.my_host_rank {
                continue;
            }
            let mux = Arc::clone(self);
            tasks.push(spawner.spawn(async move {
                if let Err(e) = mux.run_receiver(peer_rank).await {
                    warn!(peer_rank, %e, "multiplexer: receive loop failed");
                }
            }));
        }
    }
}
