//! Unix channel server behaviour against real sockets.
//!
//! The connecting side is this test process, so the resolved peer
//! executable is the test binary itself. A foreign executable is played by
//! a copy of the test binary re-run with [`CONNECT_ENV`] set.

#![cfg(target_os = "linux")]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::sync::mpsc;

use desktop_session_host::channel::id::ChannelId;
use desktop_session_host::channel::peer::executable_of;
use desktop_session_host::channel::server::{
    channel_socket_path, platform_factory, ChannelServer, PeerConnection, UnixChannelServer,
};
use desktop_session_host::models::session::{ControllerState, SessionId, SessionKind};
use desktop_session_host::orchestrator::mailbox::ControllerEvent;
use desktop_session_host::AppError;

use super::test_helpers::Harness;

/// When set, [`connect_and_hang_up_when_asked`] connects to this socket.
const CONNECT_ENV: &str = "DESKTOP_SESSION_TEST_CONNECT";

fn start(
    server: &mut UnixChannelServer,
    channel_id: &ChannelId,
) -> mpsc::UnboundedReceiver<PeerConnection> {
    let (tx, rx) = mpsc::unbounded_channel();
    server
        .start(
            channel_id,
            Box::new(move |connection| {
                let _ = tx.send(connection);
            }),
        )
        .expect("server starts");
    rx
}

async fn next(rx: &mut mpsc::UnboundedReceiver<PeerConnection>) -> PeerConnection {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("connection delivered")
        .expect("server still running")
}

fn own_executable() -> PathBuf {
    executable_of(i32::try_from(std::process::id()).unwrap()).expect("own executable resolves")
}

/// Runs only inside the re-executed copy of the test binary.
#[test]
fn connect_and_hang_up_when_asked() {
    let Ok(path) = std::env::var(CONNECT_ENV) else {
        return;
    };
    drop(std::os::unix::net::UnixStream::connect(path).unwrap());
}

/// Connect to `socket` from a process whose executable is not this one.
async fn connect_from_foreign_executable(socket: &Path) {
    let own = std::env::current_exe().unwrap();
    let copy = own.with_file_name(format!("impostor-{}", ChannelId::generate()));
    std::fs::copy(&own, &copy).unwrap();

    let status = tokio::process::Command::new(&copy)
        .args([
            "--exact",
            "integration::channel_server_tests::connect_and_hang_up_when_asked",
            "--test-threads=1",
        ])
        .env(CONNECT_ENV, socket)
        .status()
        .await;
    let _ = std::fs::remove_file(&copy);

    assert!(status.unwrap().success());
}

#[tokio::test]
async fn connection_is_handed_over_with_peer_path() {
    let dir = tempfile::tempdir().unwrap();
    let mut server = UnixChannelServer::new(dir.path().to_path_buf());
    let channel_id = ChannelId::generate();
    let mut accepted = start(&mut server, &channel_id);

    let path = server.socket_path().unwrap().to_path_buf();
    assert_eq!(path, channel_socket_path(dir.path(), &channel_id));
    let mode = std::fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);

    let mut client = UnixStream::connect(&path).await.unwrap();
    let connection = next(&mut accepted).await;

    assert_eq!(connection.channel_id, channel_id);
    assert_eq!(connection.peer_path, Some(own_executable()));

    // The handed-over halves carry bytes both ways.
    let PeerConnection {
        reader, mut writer, ..
    } = connection;
    client.write_all(b"ping\n").await.unwrap();
    let mut line = String::new();
    BufReader::new(reader).read_line(&mut line).await.unwrap();
    assert_eq!(line, "ping\n");

    writer.write_all(b"pong\n").await.unwrap();
    let mut reply = String::new();
    BufReader::new(&mut client).read_line(&mut reply).await.unwrap();
    assert_eq!(reply, "pong\n");
}

#[tokio::test]
async fn socket_lives_in_a_private_directory() {
    let dir = tempfile::tempdir().unwrap();
    let mut server = UnixChannelServer::new(dir.path().to_path_buf());
    let channel_id = ChannelId::generate();
    let _rx = start(&mut server, &channel_id);

    let channel_dir = dir.path().join(channel_id.as_str());
    let mode = std::fs::metadata(&channel_dir).unwrap().permissions().mode();

    assert_eq!(mode & 0o777, 0o700);
    assert_eq!(server.socket_path().unwrap().parent(), Some(channel_dir.as_path()));
}

#[tokio::test]
async fn every_connection_is_handed_over_until_stopped() {
    let dir = tempfile::tempdir().unwrap();
    let mut server = UnixChannelServer::new(dir.path().to_path_buf());
    let mut accepted = start(&mut server, &ChannelId::generate());
    let path = server.socket_path().unwrap().to_path_buf();

    let first = UnixStream::connect(&path).await.unwrap();
    drop(next(&mut accepted).await);
    drop(first);

    assert!(path.exists());
    let _second = UnixStream::connect(&path).await.unwrap();
    let connection = next(&mut accepted).await;
    assert_eq!(connection.peer_path, Some(own_executable()));
}

#[tokio::test]
async fn starting_twice_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut server = UnixChannelServer::new(dir.path().to_path_buf());
    let _rx = start(&mut server, &ChannelId::generate());

    let err = server
        .start(&ChannelId::generate(), Box::new(|_| {}))
        .unwrap_err();

    assert!(matches!(err, AppError::Channel(_)));
}

#[tokio::test]
async fn name_collision_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let channel_id = ChannelId::generate();
    std::fs::create_dir(dir.path().join(channel_id.as_str())).unwrap();
    let mut server = UnixChannelServer::new(dir.path().to_path_buf());

    let err = server.start(&channel_id, Box::new(|_| {})).unwrap_err();

    assert!(err.to_string().contains("already in use"), "{err}");
    // The colliding directory belongs to someone else and is left alone.
    assert!(dir.path().join(channel_id.as_str()).exists());
}

#[tokio::test]
async fn missing_directory_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut server = UnixChannelServer::new(dir.path().join("missing"));

    let result = server.start(&ChannelId::generate(), Box::new(|_| {}));

    assert!(matches!(result, Err(AppError::Channel(_))));
}

#[tokio::test]
async fn stop_removes_the_endpoint_and_drops_the_callback() {
    let dir = tempfile::tempdir().unwrap();
    let mut server = UnixChannelServer::new(dir.path().to_path_buf());
    let mut accepted = start(&mut server, &ChannelId::generate());
    let path = server.socket_path().unwrap().to_path_buf();

    server.stop();
    server.stop();

    assert!(!path.exists());
    assert!(!path.parent().unwrap().exists());
    assert!(server.socket_path().is_none());
    assert!(UnixStream::connect(&path).await.is_err());
    // The accept task was aborted, so the callback (and its sender) is gone.
    assert!(tokio::time::timeout(Duration::from_secs(5), accepted.recv())
        .await
        .expect("sender dropped")
        .is_none());
}

#[tokio::test]
async fn dropping_the_server_removes_the_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let mut server = UnixChannelServer::new(dir.path().to_path_buf());
    let _rx = start(&mut server, &ChannelId::generate());
    let path = server.socket_path().unwrap().to_path_buf();

    drop(server);

    assert!(!path.exists());
    assert!(!path.parent().unwrap().exists());
}

// ── Controller over real sockets ─────────────────────────────────────────────

/// Feed mailbox events to the controller until a connection has been judged.
async fn process_next_connection(h: &mut Harness) {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), h.rx.recv())
            .await
            .expect("controller event arrives")
            .expect("mailbox open");
        let is_connection = matches!(event, ControllerEvent::NewConnection(_));
        h.controller.handle_event(event);
        if is_connection {
            return;
        }
    }
}

#[tokio::test]
async fn worker_attaches_after_a_foreign_executable_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = Harness::with_channel_servers(
        platform_factory(dir.path().to_path_buf()).unwrap(),
        own_executable(),
    );
    h.controller.attach_session(SessionId(7));
    let channel_id = h.controller.pending_channel().cloned().unwrap();
    let socket = channel_socket_path(dir.path(), &channel_id);

    connect_from_foreign_executable(&socket).await;
    process_next_connection(&mut h).await;

    assert_eq!(h.controller.state(), ControllerState::Starting);
    assert_eq!(h.controller.pending_channel(), Some(&channel_id));
    assert!(socket.exists());

    let _worker = UnixStream::connect(&socket).await.unwrap();
    process_next_connection(&mut h).await;

    assert_eq!(h.controller.state(), ControllerState::Attached);
    assert_eq!(h.controller.proxy().bound_kind(), Some(SessionKind::Channel));
    // Accepting the worker closes the rendezvous endpoint.
    assert!(!socket.exists());
}
