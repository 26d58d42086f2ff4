use may::coroutine::JoinHandle;
use may::net::{TcpListener, TcpStream as CoTcpStream};
use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::request::MAX_HEADER_BYTES;
use super::session::{spawn_sweeper, SessionStore};
use super::worker::{serve_connection, ConnectionState};
use crate::dispatcher::Dispatch;
use crate::ids::ConnectionId;
use crate::runtime_config::DEFAULT_STACK_SIZE;
use crate::worker_pool::{WorkerPool, WorkerPoolConfig, WorkerPoolMetrics};

type Connection = (CoTcpStream, ConnectionId);

/// Tunables for [`SmartHttpServer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Cookie domain used when a request has no `Host` header.
    pub domain: String,
    pub worker_threads: usize,
    pub session_timeout: Duration,
    pub sweep_interval: Duration,
    pub stack_size: usize,
    pub max_header_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            domain: "localhost".to_string(),
            worker_threads: 10,
            session_timeout: Duration::from_secs(600),
            sweep_interval: Duration::from_secs(300),
            stack_size: DEFAULT_STACK_SIZE,
            max_header_bytes: MAX_HEADER_BYTES,
        }
    }
}

/// Listener, connection worker pool and session sweeper.
pub struct SmartHttpServer {
    settings: ServerSettings,
    dispatcher: Arc<dyn Dispatch>,
    sessions: Arc<SessionStore>,
}

/// Handle to a running server
///
/// Provides methods for waiting until the server is ready, stopping it, or
/// joining the listener.
pub struct ServerHandle {
    addr: SocketAddr,
    listener: JoinHandle<()>,
    sweeper: JoinHandle<()>,
    sessions: Arc<SessionStore>,
    metrics: Arc<WorkerPoolMetrics>,
}

impl ServerHandle {
    /// Address actually bound (useful with port 0).
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn metrics(&self) -> &Arc<WorkerPoolMetrics> {
        &self.metrics
    }

    /// Wait for the server to be ready to accept connections
    ///
    /// # Errors
    ///
    /// Returns `TimedOut` if the server doesn't accept within ~250ms
    /// (50 attempts × 5ms).
    pub fn wait_ready(&self) -> io::Result<()> {
        for _ in 0..50 {
            if TcpStream::connect(self.addr).is_ok() {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(5));
        }
        Err(io::Error::new(io::ErrorKind::TimedOut, "server not ready"))
    }

    /// Stop accepting and stop the sweeper.
    ///
    /// Cancelling the listener drops the pool's queue sender, so workers
    /// finish the connections already queued and then exit.
    pub fn stop(self) {
        info!(addr = %self.addr, "Stopping server");
        // SAFETY: may::JoinHandle::coroutine().cancel() is marked unsafe by the may runtime.
        // This is safe because:
        // - Both handles are valid (we're holding them)
        // - Listener and sweeper only hold Arc'd state, released on unwind
        // - Cancellation is the intended behavior during shutdown
        unsafe {
            self.listener.coroutine().cancel();
            self.sweeper.coroutine().cancel();
        }
        let _ = self.listener.join();
        let _ = self.sweeper.join();
    }

    /// Block until the listener coroutine finishes.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener panicked or was cancelled.
    pub fn join(self) -> std::thread::Result<()> {
        self.listener.join()
    }
}

impl SmartHttpServer {
    pub fn new(settings: ServerSettings, dispatcher: Arc<dyn Dispatch>) -> Self {
        let sessions = Arc::new(SessionStore::new(settings.session_timeout.as_secs()));
        Self {
            settings,
            dispatcher,
            sessions,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Bind `addr` and start serving.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid, cannot be bound, or a
    /// background coroutine cannot be spawned.
    pub fn start<A: ToSocketAddrs>(self, addr: A) -> io::Result<ServerHandle> {
        let addr = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "invalid address"))?;
        let listener = TcpListener::bind(addr)?;
        let local_addr = listener.local_addr()?;

        let state = Arc::new(ConnectionState {
            dispatcher: Arc::clone(&self.dispatcher),
            sessions: Arc::clone(&self.sessions),
            domain: self.settings.domain.clone(),
            max_header_bytes: self.settings.max_header_bytes,
        });
        let pool_config =
            WorkerPoolConfig::new(self.settings.worker_threads, self.settings.stack_size);
        // SAFETY: connection jobs only use the Arc'd state and their own stream.
        let pool = unsafe {
            WorkerPool::<Connection>::new("conn", pool_config, move |(stream, conn_id)| {
                serve_connection(stream, &state, conn_id)
            })
        };
        let metrics = Arc::clone(pool.metrics());

        let sweeper = spawn_sweeper(
            Arc::clone(&self.sessions),
            self.settings.sweep_interval,
            self.settings.stack_size,
        )?;

        // SAFETY: the listener coroutine owns the socket and the pool; both
        // are dropped on cancellation.
        let spawned = unsafe {
            may::coroutine::Builder::new()
                .name("listener".to_string())
                .stack_size(self.settings.stack_size)
                .spawn(move || {
                    for stream in listener.incoming() {
                        match stream {
                            Ok(stream) => {
                                let conn_id = ConnectionId::new();
                                debug!(conn_id = %conn_id, peer = ?stream.peer_addr().ok(), "Accepted");
                                if pool.submit((stream, conn_id)).is_err() {
                                    error!("No connection workers left; stopping listener");
                                    break;
                                }
                            }
                            Err(e) => warn!(error = %e, "Accept failed"),
                        }
                    }
                })
        };
        let listener = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                // SAFETY: see ServerHandle::stop.
                unsafe { sweeper.coroutine().cancel() };
                let _ = sweeper.join();
                return Err(e);
            }
        };

        info!(
            addr = %local_addr,
            workers = self.settings.worker_threads,
            session_timeout_secs = self.settings.session_timeout.as_secs(),
            "Server listening"
        );
        Ok(ServerHandle {
            addr: local_addr,
            listener,
            sweeper,
            sessions: Arc::clone(&self.sessions),
            metrics,
        })
    }
}
