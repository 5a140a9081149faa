//! Non-blocking TCP transport
//!
//! A [`Connection`] over a `socket2` stream, optionally wrapped in a rustls
//! client session. Connect completion, TLS handshaking and backoff are all
//! advanced from inside the reactor's pass; nothing here blocks except
//! host name resolution.

use bytes::BytesMut;
use rustls::pki_types::ServerName;
use socket2::Socket;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, ToSocketAddrs};
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::policy::{Backoff, ReconnectPolicy};
use super::state::{ConnectionPhase, ConnectionStats};
use super::tls::build_client_config;
use super::{Connection, Interest};
use crate::config::TlsConfig;
use crate::handler::{Link, LinkEvent};
use crate::metrics::METRICS;
use crate::util::create_stream_socket;

/// Largest chunk taken from the socket by one read
const READ_CHUNK: usize = 64 * 1024;

enum Transport {
    Plain(Socket),
    Tls {
        socket: Socket,
        session: Box<rustls::ClientConnection>,
    },
}

impl Transport {
    fn socket(&self) -> &Socket {
        match self {
            Transport::Plain(socket) => socket,
            Transport::Tls { socket, .. } => socket,
        }
    }
}

/// Outbound TCP (or TLS over TCP) connection bound to a handler's [`Link`]
pub struct TcpConnection {
    host: String,
    port: u16,
    secure: bool,
    tls_config: Option<Arc<rustls::ClientConfig>>,
    link: Link,
    backoff: Backoff,
    phase: ConnectionPhase,
    transport: Option<Transport>,
    retry_at: Option<Instant>,
    stats: ConnectionStats,
    ever_established: bool,
    failure: Option<io::Error>,
}

impl TcpConnection {
    /// Create an idle connection; nothing happens until `connect()`
    pub fn new(host: &str, port: u16, secure: bool, link: Link, policy: &ReconnectPolicy) -> Self {
        Self {
            host: host.to_string(),
            port,
            secure,
            tls_config: None,
            link,
            backoff: policy.start(),
            phase: ConnectionPhase::Idle,
            transport: None,
            retry_at: None,
            stats: ConnectionStats::new(),
            ever_established: false,
            failure: None,
        }
    }

    /// Use a prepared TLS client config for secure sessions
    pub fn with_tls_config(mut self, config: Arc<rustls::ClientConfig>) -> Self {
        self.tls_config = Some(config);
        self
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    pub fn retries_left(&self) -> u32 {
        self.backoff.retries_left()
    }

    fn resolve(&self) -> io::Result<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("No addresses found for {}:{}", self.host, self.port),
                )
            })
    }

    fn open(&mut self) -> io::Result<()> {
        let addr = self.resolve()?;
        let socket = create_stream_socket(addr)?;

        match socket.connect(&addr.into()) {
            Ok(()) => {}
            Err(e) if is_in_progress(&e) => {}
            Err(e) => return Err(e),
        }

        debug!(
            host = %self.host,
            port = self.port,
            %addr,
            fd = socket.as_raw_fd(),
            "Connecting"
        );
        self.transport = Some(Transport::Plain(socket));
        self.phase = ConnectionPhase::Connecting;
        Ok(())
    }

    /// Release the socket and discard anything queued for it
    fn drop_transport(&mut self) {
        if let Some(transport) = self.transport.take() {
            let _ = transport.socket().shutdown(Shutdown::Both);
        }
        if self.phase == ConnectionPhase::Established {
            self.link.push_event(LinkEvent::Closed);
        }
        self.link.clear_outbound();
    }

    fn schedule_retry(&mut self) {
        let delay = self.backoff.next_delay();
        match self.backoff.schedule(Instant::now()) {
            Some(at) => {
                warn!(
                    host = %self.host,
                    port = self.port,
                    retries_left = self.backoff.retries_left(),
                    delay_ms = delay.as_millis() as u64,
                    "Reconnect scheduled"
                );
                self.retry_at = Some(at);
                self.phase = ConnectionPhase::Backoff;
            }
            None => {
                error!(
                    host = %self.host,
                    port = self.port,
                    "Too many reconnect failures, giving up"
                );
                self.retry_at = None;
                self.phase = ConnectionPhase::GaveUp;
            }
        }
    }

    fn tls_config(&mut self) -> io::Result<Arc<rustls::ClientConfig>> {
        if let Some(config) = &self.tls_config {
            return Ok(config.clone());
        }
        let config = build_client_config(&TlsConfig::default())
            .map_err(|e| io::Error::other(format!("{:#}", e)))?;
        self.tls_config = Some(config.clone());
        Ok(config)
    }

    /// Complete a non-blocking connect once the socket reports writable
    fn finish_connect(&mut self) -> io::Result<()> {
        match &self.transport {
            Some(Transport::Plain(socket)) => {
                if let Some(err) = socket.take_error()? {
                    return Err(err);
                }
                match socket.peer_addr() {
                    Ok(_) => {}
                    // Spurious wakeup, still connecting
                    Err(e) if e.kind() == io::ErrorKind::NotConnected => return Ok(()),
                    Err(e) => return Err(e),
                }
            }
            _ => return Err(not_connected()),
        }

        if !self.secure {
            self.mark_established();
            return Ok(());
        }

        let config = self.tls_config()?;
        let name = ServerName::try_from(self.host.as_str())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?
            .to_owned();
        let session = rustls::ClientConnection::new(config, name).map_err(io::Error::other)?;

        if let Some(Transport::Plain(socket)) = self.transport.take() {
            self.transport = Some(Transport::Tls {
                socket,
                session: Box::new(session),
            });
        }
        self.phase = ConnectionPhase::Handshaking;
        debug!(host = %self.host, "TLS handshake started");
        Ok(())
    }

    fn mark_established(&mut self) {
        if self.ever_established {
            self.stats.record_reconnect();
        }
        self.ever_established = true;
        self.phase = ConnectionPhase::Established;
        self.retry_at = None;
        self.stats.set_established();
        self.backoff.reset();
        self.link.push_event(LinkEvent::Established);
        METRICS.session_established();
        info!(
            host = %self.host,
            port = self.port,
            secure = self.secure,
            reconnects = self.stats.reconnects,
            "Connected"
        );
    }
}

impl Connection for TcpConnection {
    fn connect(&mut self) -> io::Result<()> {
        self.drop_transport();
        self.retry_at = None;
        METRICS.connect_attempt();

        match self.open() {
            Ok(()) => Ok(()),
            Err(e) => {
                self.drop_transport();
                self.schedule_retry();
                Err(e)
            }
        }
    }

    fn reconnect(&mut self) {
        if self.phase == ConnectionPhase::Stopped {
            debug!(host = %self.host, "Ignoring reconnect on stopped connection");
            return;
        }
        self.drop_transport();
        self.schedule_retry();
    }

    fn stop(&mut self) {
        if let Some(Transport::Tls { socket, session }) = self.transport.as_mut() {
            session.send_close_notify();
            let _ = session.write_tls(socket);
        }
        self.drop_transport();
        self.retry_at = None;
        self.phase = ConnectionPhase::Stopped;
        debug!(host = %self.host, port = self.port, "Connection stopped");
    }

    fn classify_interest(&mut self) -> Interest {
        if self.phase == ConnectionPhase::Backoff {
            match self.retry_at {
                Some(at) if Instant::now() >= at => {
                    if let Err(e) = self.connect() {
                        warn!(host = %self.host, error = %e, "Reconnect attempt failed");
                        self.failure = Some(e);
                        return Interest::NONE;
                    }
                }
                _ => return Interest::NONE,
            }
        }

        match (&self.phase, &self.transport) {
            (ConnectionPhase::Connecting, Some(_)) => Interest::writable(),
            (ConnectionPhase::Handshaking, Some(Transport::Tls { session, .. })) => {
                Interest::readable().with_writable(session.wants_write())
            }
            (ConnectionPhase::Established, Some(Transport::Plain(_))) => {
                Interest::readable().with_writable(self.link.has_outbound())
            }
            (ConnectionPhase::Established, Some(Transport::Tls { session, .. })) => {
                Interest::readable().with_writable(session.wants_write() || self.link.has_outbound())
            }
            _ => Interest::NONE,
        }
    }

    fn descriptor(&self) -> Option<RawFd> {
        self.transport.as_ref().map(|t| t.socket().as_raw_fd())
    }

    fn read_once(&mut self) -> io::Result<usize> {
        let mut handshake_done = false;

        let (read, data) = match self.transport.as_mut() {
            None => return Err(not_connected()),
            Some(Transport::Plain(_)) if self.phase == ConnectionPhase::Connecting => return Ok(0),
            Some(Transport::Plain(socket)) => {
                let mut buf = BytesMut::zeroed(READ_CHUNK);
                let n = match socket.read(&mut buf) {
                    Ok(0) => return Err(peer_closed()),
                    Ok(n) => n,
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(0),
                    Err(e) => return Err(e),
                };
                buf.truncate(n);
                (n, Some(buf.freeze()))
            }
            Some(Transport::Tls { socket, session }) => {
                let n = match session.read_tls(socket) {
                    Ok(0) => return Err(peer_closed()),
                    Ok(n) => n,
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(0),
                    Err(e) => return Err(e),
                };
                let state = session
                    .process_new_packets()
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

                let available = state.plaintext_bytes_to_read();
                let data = if available > 0 {
                    let mut buf = BytesMut::zeroed(available);
                    session.reader().read_exact(&mut buf)?;
                    Some(buf.freeze())
                } else {
                    None
                };
                handshake_done = !session.is_handshaking();
                (n, data)
            }
        };

        if self.phase == ConnectionPhase::Handshaking && handshake_done {
            self.mark_established();
        }
        self.stats.record_rx(read as u64);
        if let Some(data) = data {
            self.link.push_event(LinkEvent::Data(data));
        }
        Ok(read)
    }

    fn write_once(&mut self) -> io::Result<usize> {
        if self.phase == ConnectionPhase::Connecting {
            self.finish_connect()?;
            return Ok(0);
        }

        let established = self.phase == ConnectionPhase::Established;
        let written = match self.transport.as_mut() {
            None => return Err(not_connected()),
            Some(Transport::Plain(socket)) => {
                match self.link.write_outbound(|buf| socket.write(buf)) {
                    Ok(n) => n,
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => 0,
                    Err(e) => return Err(e),
                }
            }
            Some(Transport::Tls { socket, session }) => {
                if established {
                    self.link.write_outbound(|buf| session.writer().write(buf))?;
                }
                match session.write_tls(socket) {
                    Ok(n) => n,
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => 0,
                    Err(e) => return Err(e),
                }
            }
        };

        self.stats.record_tx(written as u64);
        Ok(written)
    }

    fn take_failure(&mut self) -> Option<io::Error> {
        self.failure.take()
    }
}

fn is_in_progress(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::EINPROGRESS) || err.kind() == io::ErrorKind::WouldBlock
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "no transport")
}

fn peer_closed() -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed by peer")
}
