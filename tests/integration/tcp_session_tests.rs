//! Loopback TCP sessions driven through the real poll probe

use parking_lot::Mutex;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use collab_mux::config::TlsConfig;
use collab_mux::connection::build_client_config;
use collab_mux::handler::Outbox;
use collab_mux::{Reactor, ReconnectPolicy, SessionHooks, StreamHandler};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};

#[derive(Default)]
struct Observed {
    received: Vec<u8>,
    connects: usize,
    disconnects: usize,
}

/// Sends a greeting on every connect and records what comes back
struct Greeter {
    observed: Arc<Mutex<Observed>>,
}

impl SessionHooks for Greeter {
    fn on_connect(&mut self, outbox: &mut Outbox<'_>) {
        self.observed.lock().connects += 1;
        outbox.send(b"hello\n");
    }

    fn on_data(&mut self, data: &[u8], _outbox: &mut Outbox<'_>) {
        self.observed.lock().received.extend_from_slice(data);
    }

    fn on_disconnect(&mut self) {
        self.observed.lock().disconnects += 1;
    }
}

fn quick_policy() -> ReconnectPolicy {
    ReconnectPolicy {
        max_retries: 5,
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(10),
        multiplier: 1.0,
    }
}

/// Tick until `done` holds or two seconds pass
fn drive<F>(reactor: &mut Reactor, mut done: F) -> bool
where
    F: FnMut(&Reactor) -> bool,
{
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        reactor.tick().unwrap();
        if done(&*reactor) {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}

fn echo<S: Read + Write>(mut stream: S) {
    let mut buf = [0u8; 1024];
    loop {
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => return,
            Ok(n) => {
                if stream.write_all(&buf[..n]).and_then(|()| stream.flush()).is_err() {
                    return;
                }
            }
        }
    }
}

/// Self-signed server config for 127.0.0.1, plus the certificate as PEM
fn tls_server() -> (Arc<rustls::ServerConfig>, String) {
    let certified = rcgen::generate_simple_self_signed(vec!["127.0.0.1".to_string()]).unwrap();
    let pem = certified.cert.pem();
    let cert = CertificateDer::from(certified.cert);
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(certified.key_pair.serialize_der()));

    let config = rustls::ServerConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .unwrap()
    .with_no_client_auth()
    .with_single_cert(vec![cert], key)
    .unwrap();

    (Arc::new(config), pem)
}

/// Accept one connection and echo over TLS until the client leaves
fn spawn_tls_echo(config: Arc<rustls::ServerConfig>) -> (u16, thread::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = thread::spawn(move || {
        let (tcp, _) = listener.accept().unwrap();
        let session = rustls::ServerConnection::new(config).unwrap();
        echo(rustls::StreamOwned::new(session, tcp));
    });
    (port, server)
}

#[test]
fn test_plain_session_round_trip() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        echo(stream);
    });

    let observed = Arc::new(Mutex::new(Observed::default()));
    let handler = StreamHandler::new(Greeter {
        observed: observed.clone(),
    })
    .with_policy(quick_policy());
    let link = handler.link();

    let mut reactor = Reactor::new();
    reactor.connect(handler, "127.0.0.1", port, false);
    assert!(!reactor.is_ready());

    assert!(drive(&mut reactor, |r| r.is_ready()));
    assert!(drive(&mut reactor, |_| observed.lock().received == b"hello\n"));

    // Host-side writes go through the same link
    link.send(b"ping\n");
    assert!(drive(&mut reactor, |_| observed.lock().received == b"hello\nping\n"));

    reactor.stop();
    assert!(!reactor.is_ready());
    assert_eq!(observed.lock().connects, 1);
    server.join().unwrap();
}

#[test]
fn test_peer_close_triggers_reconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let (keep_tx, keep_rx) = mpsc::channel();
    let server = thread::spawn(move || {
        // First session is closed once greeted, the second one is kept
        let (mut first, _) = listener.accept().unwrap();
        let mut greeting = [0u8; 6];
        first.read_exact(&mut greeting).unwrap();
        drop(first);
        let (second, _) = listener.accept().unwrap();
        keep_tx.send(second).unwrap();
    });

    let observed = Arc::new(Mutex::new(Observed::default()));
    let handler = StreamHandler::new(Greeter {
        observed: observed.clone(),
    })
    .with_policy(quick_policy());

    let mut reactor = Reactor::new();
    reactor.connect(handler, "127.0.0.1", port, false);

    assert!(drive(&mut reactor, |r| {
        let seen = observed.lock();
        seen.connects >= 2 && r.is_ready()
    }));
    assert!(observed.lock().disconnects >= 1);

    let _kept = keep_rx.recv_timeout(Duration::from_secs(2)).unwrap();
    reactor.stop();
    server.join().unwrap();
}

#[test]
fn test_refused_session_never_becomes_ready() {
    // Grab a free port, then close it so connecting is refused
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let observed = Arc::new(Mutex::new(Observed::default()));
    let handler = StreamHandler::new(Greeter {
        observed: observed.clone(),
    })
    .with_policy(ReconnectPolicy::disabled());

    let mut reactor = Reactor::new();
    reactor.connect(handler, "127.0.0.1", port, false);

    assert!(!drive(&mut reactor, |r| r.is_ready()));
    assert_eq!(observed.lock().connects, 0);
    assert_eq!(reactor.len(), 1);
    reactor.stop();
}

#[test]
fn test_tls_session_round_trip() {
    let (server_config, pem) = tls_server();
    let (port, server) = spawn_tls_echo(server_config);

    let ca_path = std::env::temp_dir()
        .join(format!("collab-mux-session-ca-{}.pem", std::process::id()));
    std::fs::write(&ca_path, pem).unwrap();
    let client_config = build_client_config(&TlsConfig {
        ca_path: Some(ca_path.to_string_lossy().into_owned()),
    });
    std::fs::remove_file(&ca_path).unwrap();

    let observed = Arc::new(Mutex::new(Observed::default()));
    let handler = StreamHandler::new(Greeter {
        observed: observed.clone(),
    })
    .with_policy(quick_policy())
    .with_tls_config(client_config.unwrap());
    let link = handler.link();

    // No process-level crypto provider is installed here
    let mut reactor = Reactor::new();
    reactor.connect(handler, "127.0.0.1", port, true);

    assert!(drive(&mut reactor, |r| r.is_ready()));
    assert!(drive(&mut reactor, |_| observed.lock().received == b"hello\n"));

    link.send(b"ping\n");
    assert!(drive(&mut reactor, |_| observed.lock().received == b"hello\nping\n"));

    reactor.stop();
    assert_eq!(observed.lock().connects, 1);
    server.join().unwrap();
}

#[test]
fn test_untrusted_tls_server_is_rejected() {
    let (server_config, _) = tls_server();
    let (port, server) = spawn_tls_echo(server_config);

    let observed = Arc::new(Mutex::new(Observed::default()));
    let handler = StreamHandler::new(Greeter {
        observed: observed.clone(),
    })
    .with_policy(ReconnectPolicy::disabled());

    // Only the webpki roots are trusted, so the handshake must fail cleanly
    let mut reactor = Reactor::new();
    reactor.connect(handler, "127.0.0.1", port, true);

    assert!(!drive(&mut reactor, |r| r.is_ready()));
    assert_eq!(observed.lock().connects, 0);

    reactor.stop();
    server.join().unwrap();
}
