use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use tokio::net::TcpStream;
use tracing::{trace, warn};

use crate::error::Error;

/// Opaque handle identifying one registered connection with the
/// [`Dispatcher`]. Stands in for the "file descriptor" of the specification:
/// everything registered under one [`ConnId`] is cancelled together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(u64);

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

impl ConnId {
    pub fn next() -> Self {
        Self(NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// The async I/O reactor.
///
/// Per the design note in the specification (§9), the behavioral contract is
/// the suspension/ordering rules of the concurrency model, not a literal
/// epoll loop: this realization registers one [`link_async::Task`] per
/// registration, driven by tokio's own readiness and timer machinery, and
/// keeps book of which tasks belong to which [`ConnId`] so `cancel` can reap
/// them without invoking their callback — matching "in-flight async
/// transfers attached to that fd mark themselves done and are reaped on the
/// next dispatcher tick".
pub struct Dispatcher {
    spawner: link_async::Spawner,
    terminated: Arc<AtomicBool>,
    registrations: Mutex<HashMap<ConnId, Vec<link_async::Task<()>>>>,
}

impl Dispatcher {
    pub fn new(spawner: link_async::Spawner) -> Self {
        Self {
            spawner,
            terminated: Arc::new(AtomicBool::new(false)),
            registrations: Mutex::new(HashMap::new()),
        }
    }

    fn track(&self, id: ConnId, task: link_async::Task<()>) {
        self.registrations.lock().unwrap().entry(id).or_default().push(task);
    }

    /// Register a readable-readiness callback. `callback` is polled once per
    /// readiness notification and returns a re-arm flag; returning `false`
    /// deregisters.
    pub fn register_readable<F>(&self, id: ConnId, socket: Arc<TcpStream>, mut callback: F)
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let terminated = Arc::clone(&self.terminated);
        let task = self.spawner.spawn(async move {
            loop {
                if terminated.load(Ordering::Relaxed) {
                    return;
                }
                match socket.readable().await {
                    Ok(()) => {
                        if !callback() {
                            return;
                        }
                    },
                    Err(e) => {
                        warn!(err = %e, "readable() failed, dropping registration");
                        return;
                    },
                }
            }
        });
        self.track(id, task);
    }

    /// Register a writable-readiness callback, symmetric to
    /// [`Dispatcher::register_readable`].
    pub fn register_writable<F>(&self, id: ConnId, socket: Arc<TcpStream>, mut callback: F)
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let terminated = Arc::clone(&self.terminated);
        let task = self.spawner.spawn(async move {
            loop {
                if terminated.load(Ordering::Relaxed) {
                    return;
                }
                match socket.writable().await {
                    Ok(()) => {
                        if !callback() {
                            return;
                        }
                    },
                    Err(e) => {
                        warn!(err = %e, "writable() failed, dropping registration");
                        return;
                    },
                }
            }
        });
        self.track(id, task);
    }

    /// Register a periodic timer. `callback` fires every `period` and
    /// returns a re-arm flag; missed ticks are coalesced (we do not attempt
    /// to "catch up" on ticks that elapsed while the callback was running).
    pub fn register_timer<F>(&self, id: ConnId, period: Duration, mut callback: F)
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let terminated = Arc::clone(&self.terminated);
        let task = self.spawner.spawn(async move {
            loop {
                link_async::sleep(period).await;
                if terminated.load(Ordering::Relaxed) {
                    return;
                }
                if !callback() {
                    return;
                }
            }
        });
        self.track(id, task);
    }

    /// Read exactly `n` bytes, then invoke `on_done` exactly once. A
    /// mid-message EOF invokes `on_done` with an empty buffer rather than
    /// treating it as an error at this layer — the owner (the Multiplexer or
    /// Group) decides whether that is fatal.
    pub fn async_read_buffer<F>(&self, id: ConnId, socket: Arc<TcpStream>, n: usize, on_done: F)
    where
        F: FnOnce(Vec<u8>) + Send + 'static,
    {
        let task = self.spawner.spawn(async move {
            let mut buf = vec![0u8; n];
            match read_exact_best_effort(&socket, &mut buf).await {
                Ok(true) => on_done(buf),
                Ok(false) => on_done(Vec::new()),
                Err(e) => {
                    warn!(err = %e, "async read failed");
                    on_done(Vec::new())
                },
            }
        });
        self.track(id, task);
    }

    /// Write exactly `data.len()` bytes, then invoke `on_done` exactly once.
    /// `EPIPE`/broken-pipe is reported as a completed write — the owner
    /// detects peer loss through its own protocol (a failed subsequent read,
    /// or a missing end-of-stream sentinel), not through this callback.
    pub fn async_write_buffer<F>(&self, id: ConnId, socket: Arc<TcpStream>, data: Vec<u8>, on_done: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let task = self.spawner.spawn(async move {
            let _ = write_all_best_effort(&socket, &data).await;
            on_done();
        });
        self.track(id, task);
    }

    /// Remove every registration for `id`. In-flight tasks are aborted
    /// (dropped without completing), which is indistinguishable from the
    /// specification's "reaped without invoking their callback" from the
    /// caller's perspective.
    pub fn cancel(&self, id: ConnId) {
        if let Some(tasks) = self.registrations.lock().unwrap().remove(&id) {
            trace!(?id, count = tasks.len(), "cancelling registrations");
            for task in tasks {
                task.abort();
            }
        }
    }

    /// Flip the termination flag. Already-running dispatch iterations
    /// complete; no new ticks are scheduled afterwards.
    pub fn terminate(&self) {
        self.terminated.store(true, Ordering::Relaxed);
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Relaxed)
    }

    /// Block (asynchronously) until [`Dispatcher::terminate`] is called, or
    /// `timeout` elapses, whichever comes first — the bounded suspension
    /// point described in the concurrency model (§5): "inside
    /// Dispatch(timeout), bounded by the next timer deadline (or 10s if
    /// none)".
    pub async fn dispatch(&self, timeout: Duration) {
        let deadline = tokio::time::Instant::now() + timeout;
        while !self.is_terminated() && tokio::time::Instant::now() < deadline {
            link_async::sleep(Duration::from_millis(10)).await;
        }
    }
}

async fn read_exact_best_effort(socket: &TcpStream, buf: &mut [u8]) -> Result<bool, Error> {
    let mut read = 0;
    while read < buf.len() {
        socket.readable().await?;
        match socket.try_read(&mut buf[read..]) {
            Ok(0) => return Ok(read == buf.len()),
            Ok(n) => read += n,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(true)
}

async fn write_all_best_effort(socket: &TcpStream, data: &[u8]) -> Result<(), Error> {
    let mut written = 0;
    while written < data.len() {
        socket.writable().await?;
        match socket.try_write(&data[written..]) {
            Ok(n) => written += n,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => return Ok(()),
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
