//! Outbound socket connections.

use std::io::{self, BufReader};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use nodegrid_config::SocketEndpoint;
use tracing::debug;

#[cfg(unix)]
use socket2::{Domain, SockAddr, Socket, Type};
#[cfg(unix)]
use std::os::fd::OwnedFd;
#[cfg(unix)]
use std::os::unix::net::UnixStream;

use super::{CONNECTOR_TARGET, ConnectionError, ConnectionStream, read_frame_into, write_frame};
use crate::protocol::{MessageEnvelope, Response};

/// Connects to `endpoint`, giving up after `timeout`.
pub fn connect(endpoint: &SocketEndpoint, timeout: Duration) -> Result<ConnectionStream, ConnectionError> {
    match endpoint {
        SocketEndpoint::Tcp { host, port } => {
            let address = resolve_tcp_address(host, *port).map_err(|source| {
                ConnectionError::Resolve {
                    endpoint: endpoint.to_string(),
                    source,
                }
            })?;

            TcpStream::connect_timeout(&address, timeout)
                .map(ConnectionStream::Tcp)
                .map_err(|source| connect_error(endpoint, source))
        }
        SocketEndpoint::Unix { path } => {
            #[cfg(unix)]
            {
                connect_unix(path.as_str(), timeout).map_err(|source| connect_error(endpoint, source))
            }

            #[cfg(not(unix))]
            {
                let _ = (path, timeout);
                Err(ConnectionError::UnsupportedUnix {
                    endpoint: endpoint.to_string(),
                })
            }
        }
    }
}

fn connect_error(endpoint: &SocketEndpoint, source: io::Error) -> ConnectionError {
    let endpoint = endpoint.to_string();
    if source.kind() == io::ErrorKind::TimedOut {
        ConnectionError::Timeout { endpoint, source }
    } else {
        ConnectionError::Connect { endpoint, source }
    }
}

fn resolve_tcp_address(host: &str, port: u16) -> io::Result<SocketAddr> {
    let mut addrs = (host, port).to_socket_addrs()?;
    addrs
        .find(|addr| matches!(addr, SocketAddr::V4(_) | SocketAddr::V6(_)))
        .ok_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "no resolved addresses"))
}

#[cfg(unix)]
fn connect_unix(path: &str, timeout: Duration) -> io::Result<ConnectionStream> {
    let socket = Socket::new(Domain::UNIX, Type::STREAM, None)?;
    let address = SockAddr::unix(path)?;
    socket.connect_timeout(&address, timeout)?;
    let stream = UnixStream::from(OwnedFd::from(socket));
    Ok(ConnectionStream::Unix(stream))
}

/// Bidirectional message channel to a remote router.
pub trait Channel: Send + std::fmt::Debug {
    /// Sends `envelope` and waits for the correlated reply.
    fn request(&mut self, envelope: &MessageEnvelope) -> Result<Response, ConnectionError>;

    /// Sends `envelope` without waiting for a reply.
    fn send(&mut self, envelope: &MessageEnvelope) -> Result<(), ConnectionError>;

    /// Display form of the remote endpoint.
    fn peer(&self) -> String;
}

/// JSONL channel over a socket stream.
///
/// A reply that arrives after its request timed out is discarded by the next
/// request on the channel, so one slow reply does not break the connection.
#[derive(Debug)]
pub struct SocketChannel {
    endpoint: SocketEndpoint,
    reader: BufReader<ConnectionStream>,
    writer: ConnectionStream,
    pending: Vec<u8>,
}

impl SocketChannel {
    /// Connects to `endpoint` and applies `read_timeout` to replies.
    pub fn open(
        endpoint: &SocketEndpoint,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self, ConnectionError> {
        let stream = connect(endpoint, connect_timeout)?;
        let configure = |source| ConnectionError::Configure {
            endpoint: endpoint.to_string(),
            source,
        };
        stream.set_read_timeout(Some(read_timeout)).map_err(configure)?;
        stream.set_write_timeout(Some(read_timeout)).map_err(configure)?;
        let writer = stream.try_clone().map_err(configure)?;
        debug!(target: CONNECTOR_TARGET, endpoint = %endpoint, "connection established");
        Ok(Self {
            endpoint: endpoint.clone(),
            reader: BufReader::new(stream),
            writer,
            pending: Vec::new(),
        })
    }

    fn read_response(&mut self) -> Result<Response, ConnectionError> {
        let frame = read_frame_into(&mut self.reader, &mut self.pending)
            .map_err(|error| ConnectionError::from_frame(&self.endpoint, error))?
            .ok_or_else(|| ConnectionError::Closed {
                endpoint: self.endpoint.to_string(),
            })?;
        serde_json::from_slice(&frame).map_err(|source| ConnectionError::Decode {
            endpoint: self.endpoint.to_string(),
            source,
        })
    }
}

impl Channel for SocketChannel {
    fn request(&mut self, envelope: &MessageEnvelope) -> Result<Response, ConnectionError> {
        self.send(envelope)?;
        loop {
            let response = self.read_response()?;
            if response.session_id == envelope.session_id && response.sequence < envelope.sequence {
                debug!(
                    target: CONNECTOR_TARGET,
                    endpoint = %self.endpoint,
                    sequence = response.sequence,
                    "discarded late reply"
                );
                continue;
            }
            if response.session_id != envelope.session_id || response.sequence != envelope.sequence {
                return Err(ConnectionError::Correlation {
                    expected_session: envelope.session_id.clone(),
                    expected: envelope.sequence,
                    received_session: response.session_id,
                    received: response.sequence,
                });
            }
            return Ok(response);
        }
    }

    fn send(&mut self, envelope: &MessageEnvelope) -> Result<(), ConnectionError> {
        write_frame(&mut self.writer, envelope)
            .map_err(|error| ConnectionError::from_frame(&self.endpoint, error))
    }

    fn peer(&self) -> String {
        self.endpoint.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Conversation, OperationRequest};
    use serde_json::{Value, json};
    use std::io::{BufRead, Write};
    use std::net::TcpListener;
    use std::thread;

    fn envelope(sequence: u64) -> MessageEnvelope {
        MessageEnvelope::new(
            &Conversation::new("s1", sequence),
            "n1",
            OperationRequest::new("lookupKsession", json!({"sessionId": "alpha"})),
        )
    }

    fn serve_once(reply: impl FnOnce(MessageEnvelope) -> Option<String> + Send + 'static) -> SocketEndpoint {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind listener");
        let addr = listener.local_addr().expect("listener address");
        thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept connection");
            let mut writer = stream.try_clone().expect("clone stream");
            let mut reader = BufReader::new(stream);
            let mut line = String::new();
            reader.read_line(&mut line).expect("read request");
            let request = MessageEnvelope::parse(line.as_bytes()).expect("parse request");
            if let Some(reply) = reply(request) {
                writer.write_all(reply.as_bytes()).expect("write reply");
            }
        });
        SocketEndpoint::from_socket_addr(addr)
    }

    #[test]
    fn request_returns_correlated_reply() {
        let endpoint = serve_once(|request| {
            let response = Response::value(&request.conversation(), Some(json!("iid-1")));
            Some(format!("{}\n", serde_json::to_string(&response).expect("encode")))
        });
        let mut channel = SocketChannel::open(&endpoint, Duration::from_secs(2), Duration::from_secs(2))
            .expect("open channel");

        let response = channel.request(&envelope(4)).expect("request");

        assert_eq!(response.sequence, 4);
        assert_eq!(response.into_result(), Ok(Some(Value::from("iid-1"))));
    }

    #[test]
    fn mismatched_sequence_is_rejected() {
        let endpoint = serve_once(|request| {
            let conversation = Conversation::new(request.session_id, request.sequence + 1);
            let response = Response::accepted(&conversation);
            Some(format!("{}\n", serde_json::to_string(&response).expect("encode")))
        });
        let mut channel = SocketChannel::open(&endpoint, Duration::from_secs(2), Duration::from_secs(2))
            .expect("open channel");

        let error = channel.request(&envelope(1)).expect_err("correlation failure");
        assert!(matches!(error, ConnectionError::Correlation { expected: 1, received: 2, .. }));
    }

    #[test]
    fn silent_peer_surfaces_timeout() {
        let (hold, held) = std::sync::mpsc::channel::<()>();
        let endpoint = serve_once(move |_| {
            // Keep the connection open without replying until the client
            // gives up.
            let _ = held.recv();
            None
        });
        let mut channel =
            SocketChannel::open(&endpoint, Duration::from_secs(2), Duration::from_millis(50))
                .expect("open channel");

        let error = channel.request(&envelope(1)).expect_err("timeout");
        drop(hold);
        assert!(error.is_timeout(), "expected timeout, got {error:?}");
    }

    #[test]
    fn late_replies_are_skipped_by_the_next_request() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind listener");
        let endpoint = SocketEndpoint::from_socket_addr(listener.local_addr().expect("address"));
        thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept connection");
            let mut writer = stream.try_clone().expect("clone stream");
            let mut reader = BufReader::new(stream);
            for delay in [Duration::from_millis(300), Duration::ZERO] {
                let mut line = String::new();
                reader.read_line(&mut line).expect("read request");
                let request = MessageEnvelope::parse(line.as_bytes()).expect("parse request");
                thread::sleep(delay);
                let response = Response::value(&request.conversation(), Some(json!(request.sequence)));
                let reply = format!("{}\n", serde_json::to_string(&response).expect("encode"));
                writer.write_all(reply.as_bytes()).expect("write reply");
            }
        });
        let mut channel =
            SocketChannel::open(&endpoint, Duration::from_secs(2), Duration::from_millis(100))
                .expect("open channel");

        let error = channel.request(&envelope(1)).expect_err("first reply is late");
        assert!(error.is_timeout(), "expected timeout, got {error:?}");
        thread::sleep(Duration::from_millis(300));

        let response = channel.request(&envelope(2)).expect("second request");
        assert_eq!(response.sequence, 2);
        assert_eq!(response.into_result(), Ok(Some(json!(2))));
    }

    #[test]
    fn refused_connection_is_a_connect_error() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind listener");
        let endpoint = SocketEndpoint::from_socket_addr(listener.local_addr().expect("address"));
        drop(listener);

        let error = connect(&endpoint, Duration::from_secs(1)).expect_err("refused");
        assert!(matches!(error, ConnectionError::Connect { .. }));
    }
}
