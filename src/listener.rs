//! TCP listener: admits workers, performs the handshake, spawns proxies.
//!
//! A single thread owns the listening socket. The accept loop observes the
//! pool's closed flag at a short poll interval instead of a long accept
//! timeout, which gives the same termination semantics with sub-second
//! shutdown latency. On exit the listener closes the server socket and
//! joins every proxy it spawned before returning.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener as TcpSocket, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::codec::MessageStream;
use crate::error::{DevolveError, Result};
use crate::job::BoxedJob;
use crate::proxy::{self, ProxyStatus, WorkerProxy};
use crate::queue::JobQueue;

/// How often the accept loop re-checks the closed flag.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Read timeout applied to a freshly accepted socket for the handshake
/// only. A connection that sends nothing must not wedge the accept loop.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared list of every proxy admitted over the pool's lifetime.
pub(crate) type ProxyRoster = Arc<Mutex<Vec<Arc<WorkerProxy>>>>;

/// The pool's singleton accept loop.
pub(crate) struct Listener {
    socket: TcpSocket,
    queue: Arc<JobQueue<BoxedJob>>,
    closed: Arc<AtomicBool>,
    roster: ProxyRoster,
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener").finish_non_exhaustive()
    }
}

impl Listener {
    /// Bind the listening socket. Bind failure refuses to start the pool.
    pub(crate) fn bind(
        port: u16,
        queue: Arc<JobQueue<BoxedJob>>,
        closed: Arc<AtomicBool>,
        roster: ProxyRoster,
    ) -> Result<Self> {
        let socket = TcpSocket::bind(("0.0.0.0", port))
            .map_err(|e| DevolveError::Listener(format!("failed to bind port {}: {}", port, e)))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| DevolveError::Listener(format!("failed to configure socket: {}", e)))?;
        Ok(Self {
            socket,
            queue,
            closed,
            roster,
        })
    }

    /// The bound local address.
    pub(crate) fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Accept workers until the pool closes, then join every proxy.
    pub(crate) fn run(self) {
        let Listener {
            socket,
            queue,
            closed,
            roster,
        } = self;

        let mut registry: Vec<(Arc<WorkerProxy>, JoinHandle<()>)> = Vec::new();

        match socket.local_addr() {
            Ok(addr) => tracing::info!(%addr, "listener accepting workers"),
            Err(_) => tracing::info!("listener accepting workers"),
        }

        loop {
            if closed.load(Ordering::SeqCst) {
                tracing::debug!("close observed, leaving accept loop");
                break;
            }

            match socket.accept() {
                Ok((stream, peer_addr)) => {
                    match admit(stream, peer_addr, &queue, &roster) {
                        Ok(entry) => registry.push(entry),
                        Err(e) => {
                            tracing::warn!(peer = %peer_addr, error = %e, "worker rejected");
                        }
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::error!(error = %e, "accept failed, shutting down listener");
                    break;
                }
            }
        }

        // Close the server socket before waiting on proxies so no new
        // workers are admitted during wrapup.
        drop(socket);
        wrapup(registry);
    }
}

/// Handshake an accepted connection and start its proxy thread.
fn admit(
    stream: TcpStream,
    peer_addr: SocketAddr,
    queue: &Arc<JobQueue<BoxedJob>>,
    roster: &ProxyRoster,
) -> Result<(Arc<WorkerProxy>, JoinHandle<()>)> {
    // Accepted sockets can inherit the listener's non-blocking mode.
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT))?;

    let mut message_stream = MessageStream::from_tcp(&stream)?;
    let (name, pid) = handshake(&mut message_stream)?;

    stream.set_read_timeout(None)?;

    let proxy = Arc::new(WorkerProxy::new(name.clone(), peer_addr, pid));
    roster
        .lock()
        .expect("proxy roster mutex poisoned")
        .push(Arc::clone(&proxy));

    let queue = Arc::clone(queue);
    let thread_proxy = Arc::clone(&proxy);
    let handle = thread::Builder::new()
        .name(format!("proxy-{}", name))
        .spawn(move || proxy::run(&thread_proxy, stream, message_stream, &queue))
        .map_err(|e| DevolveError::Listener(format!("failed to spawn proxy thread: {}", e)))?;

    tracing::info!(worker = %name, pid, peer = %peer_addr, "worker admitted");
    Ok((proxy, handle))
}

/// Read the two-line worker handshake: name, then pid.
fn handshake<R: Read, W: Write>(stream: &mut MessageStream<R, W>) -> Result<(String, u32)> {
    let name = match stream.read_trimmed_line()? {
        Some(line) => line,
        None => {
            return Err(DevolveError::Handshake(
                "stream closed before worker name".into(),
            ));
        }
    };
    if name.is_empty() {
        return Err(DevolveError::Handshake("blank worker name".into()));
    }

    let pid_line = match stream.read_trimmed_line()? {
        Some(line) => line,
        None => {
            return Err(DevolveError::Handshake(
                "stream closed before worker pid".into(),
            ));
        }
    };
    let pid = pid_line
        .parse::<u32>()
        .ok()
        .filter(|pid| *pid > 0)
        .ok_or_else(|| DevolveError::Handshake(format!("invalid worker pid {:?}", pid_line)))?;

    Ok((name, pid))
}

/// Join every proxy thread. A busy proxy is simply awaited; a failed one
/// is joined and logged.
fn wrapup(registry: Vec<(Arc<WorkerProxy>, JoinHandle<()>)>) {
    tracing::info!(proxies = registry.len(), "listener wrapping up");
    for (proxy, handle) in registry {
        if handle.join().is_err() {
            tracing::error!(worker = %proxy.name(), "proxy thread panicked");
            continue;
        }
        match proxy.status() {
            ProxyStatus::Error => {
                tracing::warn!(
                    worker = %proxy.name(),
                    jobs = proxy.n_jobs(),
                    "proxy finished with error"
                );
            }
            status => {
                tracing::debug!(
                    worker = %proxy.name(),
                    jobs = proxy.n_jobs(),
                    ?status,
                    "proxy joined"
                );
            }
        }
    }
}
