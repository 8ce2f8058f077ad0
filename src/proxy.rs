//! Worker proxy: the boss-side representative of one connected worker.
//!
//! Each proxy runs on its own thread and owns its worker socket
//! exclusively. The loop drains the shared job queue one job at a time:
//! send the payload, receive the result, deliver it to the job. A
//! published quit token ends the loop cleanly; any transport, protocol,
//! or application failure ends it with status `Error` and never disturbs
//! the other proxies.

use std::any::Any;
use std::io::Read;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::codec::{Frame, MessageStream};
use crate::error::{DevolveError, Result};
use crate::job::BoxedJob;
use crate::queue::{JobQueue, Queued};

/// How long to wait after sending `quit` for the worker to flush and
/// close its end of the socket.
const QUIT_GRACE: Duration = Duration::from_secs(1);

/// Lifecycle status of a worker proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyStatus {
    /// The proxy loop is running.
    Busy,
    /// The proxy terminated cleanly via the pool's quit token.
    Done,
    /// The proxy terminated on a transport, protocol, or application
    /// failure.
    Error,
}

const STATUS_BUSY: u8 = 0;
const STATUS_DONE: u8 = 1;
const STATUS_ERROR: u8 = 2;

impl ProxyStatus {
    fn as_u8(self) -> u8 {
        match self {
            Self::Busy => STATUS_BUSY,
            Self::Done => STATUS_DONE,
            Self::Error => STATUS_ERROR,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            STATUS_DONE => Self::Done,
            STATUS_ERROR => Self::Error,
            _ => Self::Busy,
        }
    }
}

/// Boss-side state for one connected worker.
///
/// Shared between the proxy thread and the pool's roster; the counters are
/// atomic, so reads are safe at any time and settled once the proxy thread
/// is joined.
pub struct WorkerProxy {
    name: String,
    peer_addr: SocketAddr,
    remote_pid: u32,
    n_jobs: AtomicU64,
    status: AtomicU8,
}

impl WorkerProxy {
    pub(crate) fn new(name: String, peer_addr: SocketAddr, remote_pid: u32) -> Self {
        Self {
            name,
            peer_addr,
            remote_pid,
            n_jobs: AtomicU64::new(0),
            status: AtomicU8::new(STATUS_BUSY),
        }
    }

    /// The name the worker announced in its handshake.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Remote address of the worker connection.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Process id the worker announced in its handshake.
    pub fn remote_pid(&self) -> u32 {
        self.remote_pid
    }

    /// Jobs completed by this worker (delivered with a non-null result).
    pub fn n_jobs(&self) -> u64 {
        self.n_jobs.load(Ordering::Relaxed)
    }

    /// Current lifecycle status.
    pub fn status(&self) -> ProxyStatus {
        ProxyStatus::from_u8(self.status.load(Ordering::SeqCst))
    }

    fn set_status(&self, status: ProxyStatus) {
        self.status.store(status.as_u8(), Ordering::SeqCst);
    }

    /// Snapshot this proxy for reporting.
    pub(crate) fn report(&self) -> ProxyReport {
        ProxyReport {
            name: self.name.clone(),
            peer_addr: self.peer_addr,
            remote_pid: self.remote_pid,
            n_jobs: self.n_jobs(),
            status: self.status(),
        }
    }
}

/// Point-in-time view of one worker proxy.
#[derive(Debug, Clone)]
pub struct ProxyReport {
    /// Worker name from the handshake.
    pub name: String,
    /// Remote address of the worker connection.
    pub peer_addr: SocketAddr,
    /// Worker process id from the handshake.
    pub remote_pid: u32,
    /// Jobs completed by this worker.
    pub n_jobs: u64,
    /// Lifecycle status.
    pub status: ProxyStatus,
}

/// Drive one worker until the quit token or a failure, then tear the
/// connection down.
pub(crate) fn run(
    proxy: &WorkerProxy,
    socket: TcpStream,
    mut stream: MessageStream<TcpStream, TcpStream>,
    queue: &JobQueue<BoxedJob>,
) {
    proxy.set_status(ProxyStatus::Busy);
    tracing::debug!(worker = %proxy.name(), pid = proxy.remote_pid(), "proxy started");

    let outcome = job_loop(proxy, &mut stream, queue);

    // Tell the worker to exit regardless of how the loop ended; if the
    // transport is already broken this is a no-op.
    if stream.send_quit().is_ok() {
        wait_for_close(&socket, QUIT_GRACE);
    }
    let _ = socket.shutdown(Shutdown::Both);

    match outcome {
        Ok(()) => {
            proxy.set_status(ProxyStatus::Done);
            tracing::info!(
                worker = %proxy.name(),
                jobs = proxy.n_jobs(),
                "worker proxy finished"
            );
        }
        Err(e) => {
            proxy.set_status(ProxyStatus::Error);
            tracing::warn!(
                worker = %proxy.name(),
                jobs = proxy.n_jobs(),
                error = %e,
                "worker proxy failed"
            );
        }
    }
}

/// Pop and dispatch jobs until the quit token or the first failure.
fn job_loop(
    proxy: &WorkerProxy,
    stream: &mut MessageStream<TcpStream, TcpStream>,
    queue: &JobQueue<BoxedJob>,
) -> Result<()> {
    loop {
        match queue.get() {
            Queued::Quit => {
                // Re-publish so every other proxy observes it too.
                queue.put_quit();
                tracing::debug!(worker = %proxy.name(), "quit token observed");
                return Ok(());
            }
            Queued::Work(mut job) => dispatch(proxy, stream, &mut job)?,
        }
    }
}

/// Run one job end-to-end against the worker socket.
///
/// On a transport or protocol failure the job is told via
/// `put_result(None)` exactly once before the error is returned.
fn dispatch(
    proxy: &WorkerProxy,
    stream: &mut MessageStream<TcpStream, TcpStream>,
    job: &mut BoxedJob,
) -> Result<()> {
    let payload = match panic::catch_unwind(AssertUnwindSafe(|| job.get_work())) {
        Ok(payload) => payload,
        Err(panic) => {
            // The job's own code failed before a dispatch attempt existed;
            // its callbacks are no longer trusted, so no delivery report.
            return Err(DevolveError::Application(format!(
                "get_work panicked: {}",
                panic_message(panic.as_ref())
            )));
        }
    };

    let exchange = stream.send(&payload).and_then(|_| stream.recv());
    match exchange {
        Ok(Frame::Payload(bytes)) => {
            deliver(job, Some(bytes))?;
            proxy.n_jobs.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
        Ok(Frame::Quit) => {
            let err = DevolveError::Protocol("unexpected quit sentinel from worker".into());
            tracing::warn!(worker = %proxy.name(), error = %err, "job delivery failed");
            deliver(job, None)?;
            Err(err)
        }
        Err(e) => {
            tracing::warn!(worker = %proxy.name(), error = %e, "job delivery failed");
            deliver(job, None)?;
            Err(e)
        }
    }
}

/// Hand the dispatch outcome to the job, isolating callback panics.
fn deliver(job: &mut BoxedJob, result: Option<Vec<u8>>) -> Result<()> {
    panic::catch_unwind(AssertUnwindSafe(|| job.put_result(result))).map_err(|panic| {
        DevolveError::Application(format!(
            "put_result panicked: {}",
            panic_message(panic.as_ref())
        ))
    })
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Bounded wait for the worker to flush and close its end of the socket.
fn wait_for_close(socket: &TcpStream, grace: Duration) {
    if socket.set_read_timeout(Some(grace)).is_err() {
        std::thread::sleep(grace);
        return;
    }
    let start = Instant::now();
    let mut sink = [0u8; 256];
    let mut conn = socket;
    while start.elapsed() < grace {
        match conn.read(&mut sink) {
            Ok(0) => break,        // worker closed
            Ok(_) => continue,     // stray bytes after quit, keep draining
            Err(_) => break,       // grace elapsed or connection reset
        }
    }
}
