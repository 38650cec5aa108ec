//! Socket listener backing exposed endpoints.
//!
//! A bound [`SocketListener`] is handed to an [`AcceptLoop`] running on its
//! own thread. The loop polls the non-blocking socket, hands every accepted
//! stream to the endpoint's [`ConnectionHandler`] on a fresh thread and
//! removes the Unix socket file once it stops.

use std::io;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread;
use std::time::Duration;

use nodegrid_config::SocketEndpoint;
use tracing::{debug, info, warn};

use super::{ConnectionHandler, ConnectionStream, LISTENER_TARGET, ListenerError};

#[cfg(unix)]
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::FileTypeExt;
#[cfg(unix)]
use std::os::unix::net::{UnixListener, UnixStream};
#[cfg(unix)]
use std::path::Path;

/// Pause between polls when no connection is waiting.
const IDLE_POLL: Duration = Duration::from_millis(25);
/// Pause after a failed accept.
const FAILURE_PAUSE: Duration = Duration::from_millis(150);

/// Listener bound to a socket endpoint.
#[derive(Debug)]
pub struct SocketListener {
    endpoint: SocketEndpoint,
    socket: BoundSocket,
}

#[derive(Debug)]
enum BoundSocket {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener),
}

impl BoundSocket {
    fn set_nonblocking(&self) -> io::Result<()> {
        match self {
            Self::Tcp(socket) => socket.set_nonblocking(true),
            #[cfg(unix)]
            Self::Unix(socket) => socket.set_nonblocking(true),
        }
    }

    /// Accepts one waiting connection, or `None` when nobody is waiting.
    fn poll_accept(&self) -> io::Result<Option<ConnectionStream>> {
        let accepted = match self {
            Self::Tcp(socket) => socket.accept().and_then(|(stream, _)| {
                stream.set_nonblocking(false)?;
                Ok(ConnectionStream::Tcp(stream))
            }),
            #[cfg(unix)]
            Self::Unix(socket) => socket.accept().and_then(|(stream, _)| {
                stream.set_nonblocking(false)?;
                Ok(ConnectionStream::Unix(stream))
            }),
        };
        match accepted {
            Ok(stream) => Ok(Some(stream)),
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(error) => Err(error),
        }
    }
}

impl SocketListener {
    /// Binds `endpoint`.
    ///
    /// A TCP endpoint with port `0` is rewritten to the port the OS chose, so
    /// [`SocketListener::endpoint`] always reports a connectable address.
    ///
    /// # Errors
    ///
    /// Returns a [`ListenerError`] when the address does not resolve, the
    /// socket cannot be bound, or a live Unix socket already occupies the
    /// path.
    pub fn bind(endpoint: &SocketEndpoint) -> Result<Self, ListenerError> {
        match endpoint {
            SocketEndpoint::Tcp { host, port } => {
                let socket = bind_tcp(host, *port)?;
                let bound = socket
                    .local_addr()
                    .map_err(|source| ListenerError::LocalAddr { source })?;
                Ok(Self {
                    endpoint: SocketEndpoint::tcp(host.clone(), bound.port()),
                    socket: BoundSocket::Tcp(socket),
                })
            }
            SocketEndpoint::Unix { path } => {
                #[cfg(unix)]
                {
                    endpoint
                        .prepare_filesystem()
                        .map_err(|source| ListenerError::UnixPrepare { source })?;
                    reclaim_stale_socket(path.as_std_path())?;
                    let socket = UnixListener::bind(path.as_std_path()).map_err(|source| {
                        ListenerError::BindUnix {
                            path: path.to_string(),
                            source,
                        }
                    })?;
                    Ok(Self {
                        endpoint: endpoint.clone(),
                        socket: BoundSocket::Unix(socket),
                    })
                }

                #[cfg(not(unix))]
                {
                    let _ = path;
                    Err(ListenerError::UnsupportedUnix {
                        endpoint: endpoint.to_string(),
                    })
                }
            }
        }
    }

    /// Endpoint the listener is bound to.
    #[must_use]
    pub fn endpoint(&self) -> &SocketEndpoint {
        &self.endpoint
    }

    /// Starts accepting connections on a background thread, serving each on
    /// its own thread through `handler`.
    ///
    /// # Errors
    ///
    /// Returns a [`ListenerError`] when the socket cannot be switched to
    /// non-blocking mode or the accept thread cannot start.
    pub fn start(self, handler: Arc<dyn ConnectionHandler>) -> Result<ListenerHandle, ListenerError> {
        if let Err(source) = self.socket.set_nonblocking() {
            release_endpoint(&self.endpoint);
            return Err(ListenerError::NonBlocking { source });
        }
        let endpoint = self.endpoint.clone();
        let stop = Arc::new(AtomicBool::new(false));
        let accept_loop = AcceptLoop {
            listener: self,
            handler,
            stop: Arc::clone(&stop),
            last_failure: None,
        };
        let thread = thread::Builder::new()
            .name(format!("grid-listener-{endpoint}"))
            .spawn(move || accept_loop.run())
            .map_err(|source| ListenerError::Spawn { source })?;
        Ok(ListenerHandle {
            endpoint,
            stop,
            thread: Some(thread),
        })
    }
}

/// Handle to the background listener thread.
#[derive(Debug)]
pub struct ListenerHandle {
    endpoint: SocketEndpoint,
    stop: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl ListenerHandle {
    /// Endpoint the listener is bound to.
    #[must_use]
    pub fn endpoint(&self) -> &SocketEndpoint {
        &self.endpoint
    }

    /// Asks the accept loop to stop after its current poll.
    pub fn shutdown(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Stops the accept loop and waits for it to exit.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::ThreadPanic`] when the accept thread
    /// panicked.
    pub fn join(mut self) -> Result<(), ListenerError> {
        self.shutdown();
        self.thread
            .take()
            .map_or(Ok(()), |thread| thread.join().map_err(|_| ListenerError::ThreadPanic))
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Polls a listener until asked to stop.
struct AcceptLoop {
    listener: SocketListener,
    handler: Arc<dyn ConnectionHandler>,
    stop: Arc<AtomicBool>,
    /// Kind of the previous accept failure; repeats are not logged again.
    last_failure: Option<io::ErrorKind>,
}

impl AcceptLoop {
    fn run(mut self) {
        let endpoint = self.listener.endpoint.clone();
        info!(target: LISTENER_TARGET, endpoint = %endpoint, "socket listener active");
        while !self.stop.load(Ordering::SeqCst) {
            let pause = match self.listener.socket.poll_accept() {
                Ok(Some(stream)) => {
                    self.last_failure = None;
                    self.serve(stream);
                    continue;
                }
                Ok(None) => IDLE_POLL,
                Err(error) => {
                    self.record_failure(&error);
                    FAILURE_PAUSE
                }
            };
            thread::sleep(pause);
        }
        release_endpoint(&endpoint);
        debug!(target: LISTENER_TARGET, endpoint = %endpoint, "socket listener stopped");
    }

    fn serve(&self, stream: ConnectionStream) {
        let handler = Arc::clone(&self.handler);
        let spawned = thread::Builder::new()
            .name(String::from("grid-connection"))
            .spawn(move || handler.handle(stream));
        if let Err(error) = spawned {
            warn!(
                target: LISTENER_TARGET,
                endpoint = %self.listener.endpoint,
                error = %error,
                "dropped connection: could not start its thread"
            );
        }
    }

    fn record_failure(&mut self, error: &io::Error) {
        if self.last_failure.replace(error.kind()) != Some(error.kind()) {
            warn!(
                target: LISTENER_TARGET,
                endpoint = %self.listener.endpoint,
                error = %error,
                "socket accept error"
            );
        }
    }
}

fn bind_tcp(host: &str, port: u16) -> Result<TcpListener, ListenerError> {
    let resolve = |source| ListenerError::Resolve {
        host: host.to_owned(),
        port,
        source,
    };
    let addr = (host, port)
        .to_socket_addrs()
        .map_err(resolve)?
        .find(|addr| matches!(addr, SocketAddr::V4(_) | SocketAddr::V6(_)))
        .ok_or_else(|| ListenerError::ResolveEmpty {
            host: host.to_owned(),
            port,
        })?;
    TcpListener::bind(addr).map_err(|source| ListenerError::BindTcp { addr, source })
}

/// Removes a socket file left behind by a listener that is no longer
/// running. A socket that still accepts connections is left alone.
#[cfg(unix)]
fn reclaim_stale_socket(path: &Path) -> Result<(), ListenerError> {
    let display = || path.display().to_string();
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(source) => {
            return Err(ListenerError::UnixMetadata {
                path: display(),
                source,
            });
        }
    };
    if !metadata.file_type().is_socket() {
        return Err(ListenerError::UnixNotSocket { path: display() });
    }
    match UnixStream::connect(path) {
        Ok(_live) => Err(ListenerError::UnixInUse { path: display() }),
        Err(error)
            if matches!(
                error.kind(),
                io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound
            ) =>
        {
            let stale_path = display();
            debug!(target: LISTENER_TARGET, path = %stale_path, "removing stale unix socket");
            fs::remove_file(path).map_err(|source| ListenerError::UnixCleanup {
                path: display(),
                source,
            })
        }
        Err(source) => Err(ListenerError::UnixConnect {
            path: display(),
            source,
        }),
    }
}

/// Removes the socket file behind a Unix endpoint.
#[cfg(unix)]
fn release_endpoint(endpoint: &SocketEndpoint) {
    let SocketEndpoint::Unix { path } = endpoint else {
        return;
    };
    if let Err(error) = fs::remove_file(path.as_std_path())
        && error.kind() != io::ErrorKind::NotFound
    {
        warn!(
            target: LISTENER_TARGET,
            error = %error,
            path = %path,
            "failed to remove unix socket file"
        );
    }
}

#[cfg(not(unix))]
fn release_endpoint(_endpoint: &SocketEndpoint) {}
