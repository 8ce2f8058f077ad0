//! Pool façade: the public dispatch API.
//!
//! A [`Pool`] owns one listening endpoint and one job queue. Application
//! threads enqueue jobs through [`Pool::add`]; connected workers drain
//! them through their proxies. [`Pool::close`] publishes the quit token
//! and [`Pool::join`] waits for the listener and, transitively, every
//! proxy to terminate.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::config::PoolConfig;
use crate::error::{DevolveError, Result};
use crate::job::{BoxedJob, Job};
use crate::listener::{Listener, ProxyRoster};
use crate::proxy::ProxyReport;
use crate::queue::JobQueue;

/// A running dispatch pool.
///
/// Constructed by [`Pool::start`]; there is no process-wide singleton.
/// The single-endpoint property is enforced by the port bind itself. The
/// handle is cheap to share by reference; `add` and `close` take `&self`
/// and are safe from many application threads.
pub struct Pool {
    queue: Arc<JobQueue<BoxedJob>>,
    closed: Arc<AtomicBool>,
    local_addr: SocketAddr,
    roster: ProxyRoster,
    listener_thread: JoinHandle<()>,
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("local_addr", &self.local_addr)
            .finish_non_exhaustive()
    }
}

impl Pool {
    /// Validate `config`, bind the listener, and start accepting workers.
    pub fn start(config: PoolConfig) -> Result<Pool> {
        config.validate()?;

        let queue = Arc::new(JobQueue::new(config.queue_size));
        let closed = Arc::new(AtomicBool::new(false));
        let roster: ProxyRoster = Arc::new(Mutex::new(Vec::new()));

        let listener = Listener::bind(
            config.port,
            Arc::clone(&queue),
            Arc::clone(&closed),
            Arc::clone(&roster),
        )?;
        let local_addr = listener.local_addr()?;

        let listener_thread = thread::Builder::new()
            .name("devolve-listener".to_string())
            .spawn(move || listener.run())
            .map_err(|e| {
                DevolveError::Listener(format!("failed to spawn listener thread: {}", e))
            })?;

        tracing::info!(
            addr = %local_addr,
            queue_size = config.queue_size,
            "pool started"
        );

        Ok(Pool {
            queue,
            closed,
            local_addr,
            roster,
            listener_thread,
        })
    }

    /// Enqueue a job. Blocks while the queue is full.
    pub fn add<J: Job + 'static>(&self, job: J) {
        self.queue.put(Box::new(job));
    }

    /// Begin shutdown: publish the quit token. Idempotent and
    /// non-blocking; follow with [`Pool::join`] to wait for termination.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!("pool already closed");
            return;
        }
        self.queue.put_quit();
        tracing::info!("pool closed, quit token published");
    }

    /// Wait for the listener and all proxies to terminate.
    ///
    /// Consumes the pool: no operation is valid afterwards. Returns the
    /// final statistics.
    pub fn join(self) -> Result<PoolStats> {
        let Pool {
            queue,
            roster,
            listener_thread,
            ..
        } = self;
        listener_thread
            .join()
            .map_err(|_| DevolveError::Listener("listener thread panicked".into()))?;
        Ok(snapshot(&queue, &roster))
    }

    /// The address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// True once `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Point-in-time statistics. Proxy counters are settled once
    /// [`Pool::join`] has returned them.
    pub fn stats(&self) -> PoolStats {
        snapshot(&self.queue, &self.roster)
    }
}

fn snapshot(queue: &JobQueue<BoxedJob>, roster: &ProxyRoster) -> PoolStats {
    let proxies: Vec<ProxyReport> = roster
        .lock()
        .expect("proxy roster mutex poisoned")
        .iter()
        .map(|proxy| proxy.report())
        .collect();

    PoolStats {
        workers_seen: proxies.len(),
        jobs_completed: proxies.iter().map(|p| p.n_jobs).sum(),
        jobs_pending: queue.len(),
        quit_pending: queue.quit_pending(),
        proxies,
    }
}

/// Statistics for a pool and its proxies.
#[derive(Debug, Clone)]
pub struct PoolStats {
    /// Workers admitted over the pool's lifetime.
    pub workers_seen: usize,
    /// Jobs delivered with a non-null result, summed across proxies.
    pub jobs_completed: u64,
    /// Jobs still sitting in the queue.
    pub jobs_pending: usize,
    /// Whether the residual quit token is in the queue.
    pub quit_pending: bool,
    /// Per-proxy reports, in admission order.
    pub proxies: Vec<ProxyReport>,
}
