//! Rank-addressed peer connections: one [`Group`] per logical network (the
//! flow-control group and the data group, per host context §4.9), each
//! holding exactly `num_hosts - 1` live connections to every other rank.

use std::{net::SocketAddr, time::Duration};

use futures::future::try_join_all;
use net_io::{ConnState, Connection};
use tokio::{net::TcpListener, sync::Mutex};
use tracing::{debug, trace, warn};

use crate::{
    handshake::WelcomeMsg,
    wire::Wire,
    Error,
};

const INITIAL_BACKOFF: Duration = Duration::from_millis(10);
const MAX_BACKOFF: Duration = Duration::from_secs(40);
const MAX_ATTEMPTS_AT_CAP: u32 = 3;

/// A fully connected rank-addressed mesh: `num_hosts` peers, each holding a
/// live connection to every other peer (and none to itself).
pub struct Group {
    my_rank: usize,
    num_hosts: usize,
    group_id: u64,
    connections: Vec<Option<Mutex<Connection>>>,
}

impl Group {
    pub fn my_rank(&self) -> usize {
        self.my_rank
    }

    pub fn num_hosts(&self) -> usize {
        self.num_hosts
    }

    pub fn group_id(&self) -> u64 {
        self.group_id
    }

    /// Build a [`Group`] by binding `hosts[my_rank]` and connecting to every
    /// other entry in `hosts`, per the three-phase protocol in §4.3:
    ///
    /// 1. listen on our own address;
    /// 2. accept the `my_rank` connections expected from lower-ranked peers,
    ///    who dial us;
    /// 3. actively dial every higher-ranked peer, retrying with exponential
    ///    backoff until it accepts.
    ///
    /// The active side always sends its [`WelcomeMsg`] first; the passive
    /// (accepting) side always receives first, breaking the symmetry that
    /// would otherwise let both ends block on a blank socket buffer.
    pub async fn connect(my_rank: usize, hosts: &[SocketAddr], group_id: u64) -> Result<Self, Error> {
        let num_hosts = hosts.len();
        if my_rank >= num_hosts {
            return Err(Error::InvalidRank { rank: my_rank, num_hosts });
        }

        let listener = TcpListener::bind(hosts[my_rank]).await?;
        debug!(my_rank, addr = %hosts[my_rank], "group: listening");

        let accept_fut = Self::accept_lower_ranks(&listener, my_rank, num_hosts, group_id);
        let dial_fut = Self::dial_higher_ranks(hosts, my_rank, group_id);

        let (accepted, dialed) = tokio::try_join!(accept_fut, dial_fut)?;

        let mut connections: Vec<Option<Mutex<Connection>>> = (0..num_hosts).map(|_| None).collect();
        for (rank, conn) in accepted.into_iter().chain(dialed.into_iter()) {
            connections[rank] = Some(Mutex::new(conn));
        }

        Ok(Self {
            my_rank,
            num_hosts,
            group_id,
            connections,
        })
    }

    async fn accept_lower_ranks(
        listener: &TcpListener,
        my_rank: usize,
        num_hosts: usize,
        group_id: u64,
    ) -> Result<Vec<(usize, Connection)>, Error> {
        let mut out = Vec::with_capacity(my_rank);
        for _ in 0..my_rank {
            let (sock, peer_addr) = listener.accept().await?;
            let mut conn = Connection::new(sock, usize::MAX, group_id);

            let mut buf = [0u8; WelcomeMsg::ENCODED_LEN];
            conn.recv(&mut buf).await?;
            let hello = WelcomeMsg::decode(&buf)?;
            if hello.group_id != group_id {
                return Err(Error::BadHandshake(format!(
                    "group id mismatch from {}: {} != {}",
                    peer_addr, hello.group_id, group_id
                )));
            }
            let peer_rank = hello.sender_rank as usize;
            if peer_rank >= num_hosts {
                return Err(Error::InvalidRank { rank: peer_rank, num_hosts });
            }

            let reply = WelcomeMsg::new(group_id, my_rank as u64);
            conn.send(&reply.encode()).await?;
            conn.set_peer_rank(peer_rank);
            conn.set_state(ConnState::Connected);
            trace!(peer_rank, %peer_addr, "group: accepted peer");
            out.push((peer_rank, conn));
        }
        Ok(out)
    }

    async fn dial_higher_ranks(
        hosts: &[SocketAddr],
        my_rank: usize,
        group_id: u64,
    ) -> Result<Vec<(usize, Connection)>, Error> {
        let dials = (my_rank + 1..hosts.len()).map(|peer_rank| {
            let addr = hosts[peer_rank];
            async move {
                let sock = connect_with_backoff(addr).await?;
                let mut conn = Connection::new(sock, peer_rank, group_id);

                let hello = WelcomeMsg::new(group_id, my_rank as u64);
                conn.send(&hello.encode()).await?;

                let mut buf = [0u8; WelcomeMsg::ENCODED_LEN];
                conn.recv(&mut buf).await?;
                let reply = WelcomeMsg::decode(&buf)?;
                if reply.group_id != group_id {
                    return Err(Error::BadHandshake(format!(
                        "group id mismatch from {}: {} != {}",
                        addr, reply.group_id, group_id
                    )));
                }
                if reply.sender_rank as usize != peer_rank {
                    return Err(Error::BadHandshake(format!(
                        "dialed rank {} but peer claims rank {}",
                        peer_rank, reply.sender_rank
                    )));
                }

                conn.set_state(ConnState::Connected);
                trace!(peer_rank, %addr, "group: dialed peer");
                Ok::<_, Error>((peer_rank, conn))
            }
        });
        try_join_all(dials).await
    }

    /// Lock and return the connection to `peer_rank`, for use by a
    /// collective. Panics if `peer_rank == my_rank` or is out of range: both
    /// are caller bugs, not runtime conditions.
    pub(crate) async fn conn(&self, peer_rank: usize) -> tokio::sync::MutexGuard<'_, Connection> {
        self.connections[peer_rank]
            .as_ref()
            .expect("no connection to peer rank (self, or never connected)")
            .lock()
            .await
    }

    /// Send one `T` to `peer_rank`.
    pub async fn send_to<T: Wire>(&self, peer_rank: usize, value: T) -> Result<(), Error> {
        let mut conn = self.conn(peer_rank).await;
        conn.send(&value.encode()).await?;
        Ok(())
    }

    /// Receive one `T` from `peer_rank`.
    pub async fn recv_from<T: Wire>(&self, peer_rank: usize) -> Result<T, Error> {
        let mut conn = self.conn(peer_rank).await;
        let mut buf = vec![0u8; T::SIZE];
        conn.recv(&mut buf).await?;
        Ok(T::decode(&buf))
    }

    /// Send `out` to `peer_rank`, then receive a `T` back. Used by the
    /// lower-ranked side of a pairwise exchange so neither side is blocked
    /// writing into a full socket buffer while the other blocks reading.
    pub async fn send_receive<T: Wire>(&self, peer_rank: usize, out: T) -> Result<T, Error> {
        let mut conn = self.conn(peer_rank).await;
        let bytes = conn.send_receive(&out.encode(), T::SIZE).await?;
        Ok(T::decode(&bytes))
    }

    /// Receive a `T` from `peer_rank`, then send `out`. Dual of
    /// [`Group::send_receive`], used by the higher-ranked side.
    pub async fn receive_send<T: Wire>(&self, peer_rank: usize, out: T) -> Result<T, Error> {
        let mut conn = self.conn(peer_rank).await;
        let bytes = conn.receive_send(T::SIZE, &out.encode()).await?;
        Ok(T::decode(&bytes))
    }

    /// Send a raw byte payload to `peer_rank`, with no framing of its own.
    /// Used by the stream layer (C5), which frames its own messages with
    /// the wire header and manages its own connection group, separate from
    /// the group(s) used for collectives.
    pub async fn send_bytes_to(&self, peer_rank: usize, bytes: &[u8]) -> Result<(), Error> {
        let mut conn = self.conn(peer_rank).await;
        conn.send(bytes).await?;
        Ok(())
    }

    /// Receive exactly `buf.len()` raw bytes from `peer_rank`.
    pub async fn recv_bytes_from(&self, peer_rank: usize, buf: &mut [u8]) -> Result<(), Error> {
        let mut conn = self.conn(peer_rank).await;
        conn.recv(buf).await?;
        Ok(())
    }

    /// Send a length-prefixed vector of `T` to `peer_rank`, for collectives
    /// whose per-round payload size varies (all-gather).
    pub async fn send_vec_to<T: Wire>(&self, peer_rank: usize, values: &[T]) -> Result<(), Error> {
        let mut conn = self.conn(peer_rank).await;
        let len = values.len() as u32;
        conn.send(&len.to_le_bytes()).await?;
        let mut bytes = Vec::with_capacity(values.len() * T::SIZE);
        for v in values {
            bytes.extend(v.encode());
        }
        conn.send(&bytes).await?;
        Ok(())
    }

    /// Receive a length-prefixed vector of `T` from `peer_rank`.
    pub async fn recv_vec_from<T: Wire>(&self, peer_rank: usize) -> Result<Vec<T>, Error> {
        let mut conn = self.conn(peer_rank).await;
        let mut len_buf = [0u8; 4];
        conn.recv(&mut len_buf).await?;
        let len = u32::from_le_bytes(len_buf) as usize;
        let mut bytes = vec![0u8; len * T::SIZE];
        conn.recv(&mut bytes).await?;
        Ok((0..len)
            .map(|i| T::decode(&bytes[i * T::SIZE..(i + 1) * T::SIZE]))
            .collect())
    }
}

async fn connect_with_backoff(addr: SocketAddr) -> Result<tokio::net::TcpStream, Error> {
    let mut backoff = INITIAL_BACKOFF;
    let mut attempts_at_cap = 0;
    loop {
        match tokio::net::TcpStream::connect(addr).await {
            Ok(sock) => return Ok(sock),
            Err(e) => {
                let refused = e.kind() == std::io::ErrorKind::ConnectionRefused;
                if backoff >= MAX_BACKOFF {
                    attempts_at_cap += 1;
                    if attempts_at_cap > MAX_ATTEMPTS_AT_CAP {
                        return Err(if refused {
                            Error::ConnectRefused(addr)
                        } else {
                            Error::ConnectTimeout(addr)
                        });
                    }
                }
                warn!(%addr, %e, backoff_ms = backoff.as_millis() as u64, "group: retrying dial");
                link_async::sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        }
    }
}
