//! Reactor dispatch scenarios with scripted collaborators

use std::io;

use collab_mux::connection::Interest;
use collab_mux::reactor::{Reactor, Readiness};
use collab_mux::testing::{
    Call, CallLog, Notice, RecordingNotifier, ScriptedConnection, ScriptedFactory, ScriptedProbe,
};
use collab_mux::ReactorError;

fn session(probe: ScriptedProbe) -> (Reactor<ScriptedProbe>, RecordingNotifier) {
    let notifier = RecordingNotifier::new();
    (Reactor::with_probe(probe, notifier.clone()), notifier)
}

fn factory(label: usize, connection: ScriptedConnection, log: &CallLog) -> ScriptedFactory {
    ScriptedFactory::new(label, connection, log.clone())
}

/// A failed write on one connection leaves the other's read in the same pass intact
#[test]
fn test_write_failure_is_isolated() {
    let log = CallLog::new();
    let (mut reactor, notifier) = session(ScriptedProbe::new(log.clone()));

    let writer = ScriptedConnection::new(1, 20, log.clone())
        .with_interest(Interest::writable())
        .failing_writes(io::ErrorKind::BrokenPipe);
    let reader = ScriptedConnection::new(2, 21, log.clone()).with_interest(Interest::readable());

    reactor.connect(factory(1, writer, &log), "collab.test", 3448, true);
    reactor.connect(factory(2, reader, &log), "collab.test", 3448, true);
    log.clear();

    reactor.tick().unwrap();

    assert_eq!(log.count(&Call::Write(1)), 1);
    assert_eq!(log.count(&Call::Reconnect(1)), 1);
    assert_eq!(log.count(&Call::Read(2)), 1);
    assert_eq!(log.count(&Call::Reconnect(2)), 0);
    assert!(log.position(&Call::Reconnect(1)).unwrap() < log.position(&Call::Read(2)).unwrap());
    assert_eq!(notifier.errors().len(), 1);
}

/// A failed read on one connection leaves the other's read in the same pass intact
#[test]
fn test_read_failure_is_isolated() {
    let log = CallLog::new();
    let (mut reactor, notifier) = session(ScriptedProbe::new(log.clone()));

    let broken = ScriptedConnection::new(1, 20, log.clone())
        .with_interest(Interest::readable())
        .failing_reads(io::ErrorKind::ConnectionReset);
    let healthy = ScriptedConnection::new(2, 21, log.clone()).with_interest(Interest::readable());

    reactor.connect(factory(1, broken, &log), "collab.test", 3448, true);
    reactor.connect(factory(2, healthy, &log), "collab.test", 3448, true);
    log.clear();

    reactor.tick().unwrap();

    assert_eq!(log.count(&Call::Read(1)), 1);
    assert_eq!(log.count(&Call::Reconnect(1)), 1);
    assert_eq!(log.count(&Call::Read(2)), 1);
    assert_eq!(log.count(&Call::Reconnect(2)), 0);
    assert!(log.position(&Call::Reconnect(1)).unwrap() < log.position(&Call::Read(2)).unwrap());

    let errors = notifier.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("Couldn't read from socket"));
}

/// A probe failure with a single participant is attributed to it
#[test]
fn test_single_connection_probe_failure_recovers() {
    let log = CallLog::new();
    let (mut reactor, notifier) =
        session(ScriptedProbe::new(log.clone()).then_fail(io::ErrorKind::InvalidInput));

    let conn = ScriptedConnection::new(1, 20, log.clone()).with_interest(Interest::readable());
    reactor.connect(factory(1, conn, &log), "collab.test", 3448, true);

    assert!(reactor.tick().is_ok());
    assert_eq!(log.count(&Call::Reconnect(1)), 1);
    assert_eq!(log.count(&Call::Read(1)), 0);

    let errors = notifier.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("Error in readiness probe"));
}

/// A probe failure shared by two connections cannot be attributed
#[test]
fn test_shared_probe_failure_is_fatal() {
    let log = CallLog::new();
    let (mut reactor, notifier) =
        session(ScriptedProbe::new(log.clone()).then_fail(io::ErrorKind::InvalidInput));

    let first = ScriptedConnection::new(1, 20, log.clone()).with_interest(Interest::readable());
    let second = ScriptedConnection::new(2, 21, log.clone()).with_interest(Interest::readable());
    reactor.connect(factory(1, first, &log), "collab.test", 3448, true);
    reactor.connect(factory(2, second, &log), "collab.test", 3448, true);

    let err = reactor.tick().unwrap_err();
    assert!(matches!(err, ReactorError::UnattributedProbe { participants: 2, .. }));
    assert_eq!(log.count(&Call::Reconnect(1)), 0);
    assert_eq!(log.count(&Call::Reconnect(2)), 0);
    assert_eq!(log.count(&Call::Read(1)), 0);
    assert_eq!(log.count(&Call::Read(2)), 0);
    assert_eq!(notifier.errors().len(), 1);
}

/// Readiness needs every factory, and regresses with any of them
#[test]
fn test_readiness_requires_every_factory() {
    let log = CallLog::new();
    let (mut reactor, _) = session(ScriptedProbe::new(log.clone()));
    assert!(!reactor.is_ready());

    let first = factory(1, ScriptedConnection::new(1, 20, log.clone()), &log);
    let second = factory(2, ScriptedConnection::new(2, 21, log.clone()), &log);
    let first_ready = first.readiness();
    let second_ready = second.readiness();

    reactor.connect(first, "collab.test", 3448, true);
    assert!(!reactor.is_ready());
    first_ready.set(true);
    assert!(reactor.is_ready());

    reactor.connect(second, "collab.test", 3448, true);
    assert!(!reactor.is_ready());
    second_ready.set(true);
    assert!(reactor.is_ready());

    first_ready.set(false);
    assert!(!reactor.is_ready());
    first_ready.set(true);
    assert!(reactor.is_ready());

    reactor.stop();
    assert!(!reactor.is_ready());
}

#[test]
fn test_empty_reactor_never_probes() {
    let log = CallLog::new();
    let (mut reactor, _) = session(ScriptedProbe::new(log.clone()));

    for _ in 0..5 {
        reactor.tick().unwrap();
    }
    reactor.stop();
    reactor.tick().unwrap();

    assert_eq!(log.probes(), 0);
}

/// The only active connection, reported in error, is neither read nor written
#[test]
fn test_errorable_connection_skips_io() {
    let log = CallLog::new();
    let readiness = Readiness::new(vec![20], vec![20], vec![20]);
    let (mut reactor, _) = session(ScriptedProbe::new(log.clone()).then_ready(readiness));

    let conn = ScriptedConnection::new(1, 20, log.clone())
        .with_interest(Interest::readable().with_writable(true));
    reactor.connect(factory(1, conn, &log), "collab.test", 3448, true);

    reactor.tick().unwrap();

    assert_eq!(log.count(&Call::Reconnect(1)), 1);
    assert_eq!(log.count(&Call::Read(1)), 0);
    assert_eq!(log.count(&Call::Write(1)), 0);
}

#[test]
fn test_failed_write_never_reads_in_same_pass() {
    let log = CallLog::new();
    let (mut reactor, _) = session(ScriptedProbe::new(log.clone()));

    let conn = ScriptedConnection::new(1, 20, log.clone())
        .with_interest(Interest::readable().with_writable(true))
        .failing_writes(io::ErrorKind::ConnectionReset);
    reactor.connect(factory(1, conn, &log), "collab.test", 3448, true);

    reactor.tick().unwrap();
    assert_eq!(log.count(&Call::Read(1)), 0);

    // The next pass tries again, and again skips the read
    reactor.tick().unwrap();
    assert_eq!(log.count(&Call::Write(1)), 2);
    assert_eq!(log.count(&Call::Read(1)), 0);
    assert_eq!(log.count(&Call::Reconnect(1)), 2);
}

/// `stop()` reaches every connection once no matter what went wrong before
#[test]
fn test_stop_after_failures() {
    let log = CallLog::new();
    let (mut reactor, notifier) = session(ScriptedProbe::new(log.clone()));

    let broken = ScriptedConnection::new(1, 20, log.clone())
        .with_interest(Interest::readable())
        .failing_connect(io::ErrorKind::ConnectionRefused)
        .failing_reads(io::ErrorKind::ConnectionReset);
    let healthy = ScriptedConnection::new(2, 21, log.clone()).with_interest(Interest::writable());
    let quiet = ScriptedConnection::new(3, 22, log.clone());

    reactor.connect(factory(1, broken, &log), "collab.test", 3448, true);
    reactor.connect(factory(2, healthy, &log), "collab.test", 3448, true);
    reactor.connect(factory(3, quiet, &log), "collab.test", 3448, true);
    reactor.tick().unwrap();

    reactor.stop();

    assert!(reactor.is_empty());
    for label in 1..=3 {
        assert_eq!(log.count(&Call::Stop(label)), 1);
    }
    assert_eq!(
        notifier.notices().last(),
        Some(&Notice::Status("Disconnected.".to_string()))
    );
}

/// Connections registered after a stop start a fresh session
#[test]
fn test_reconnect_session_after_stop() {
    let log = CallLog::new();
    let (mut reactor, _) = session(ScriptedProbe::new(log.clone()));

    let conn = ScriptedConnection::new(1, 20, log.clone()).with_interest(Interest::readable());
    let old = reactor.connect(factory(1, conn.clone(), &log), "collab.test", 3448, true);
    reactor.stop();

    let new = reactor.connect(factory(1, conn, &log), "collab.test", 3448, true);
    assert_ne!(old, new);
    assert!(!reactor.contains(old));

    log.clear();
    reactor.tick().unwrap();
    assert_eq!(log.count(&Call::Read(1)), 1);
}
