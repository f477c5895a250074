//! Per-attempt rendezvous server for the worker channel.
//!
//! A server is created per attach attempt and listens on an endpoint named
//! by a fresh [`ChannelId`]. Every inbound connection (with the peer's
//! resolved executable path) goes to its callback until the server is
//! stopped. It never decides acceptance; the controller stops the server
//! once it has accepted a connection.

use std::fmt::{Debug, Formatter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::channel::id::ChannelId;
use crate::Result;

/// Read half of a channel connection.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Write half of a channel connection.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Raw inbound connection plus the facts needed to judge it.
pub struct PeerConnection {
    /// Identifier of the endpoint the connection arrived on.
    pub channel_id: ChannelId,
    /// Resolved executable of the connecting process.
    pub peer_path: Option<PathBuf>,
    /// Inbound byte stream.
    pub reader: BoxedReader,
    /// Outbound byte stream.
    pub writer: BoxedWriter,
}

impl PeerConnection {
    /// Bundle a connection.
    #[must_use]
    pub fn new(
        channel_id: ChannelId,
        peer_path: Option<PathBuf>,
        reader: BoxedReader,
        writer: BoxedWriter,
    ) -> Self {
        Self {
            channel_id,
            peer_path,
            reader,
            writer,
        }
    }
}

impl Debug for PeerConnection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerConnection")
            .field("channel_id", &self.channel_id)
            .field("peer_path", &self.peer_path)
            .finish_non_exhaustive()
    }
}

/// Receives each connection a server accepts.
pub type ConnectionCallback = Box<dyn FnMut(PeerConnection) + Send + 'static>;

/// File name of the listening socket inside its per-channel directory.
pub const CHANNEL_SOCKET_NAME: &str = "channel.sock";

/// Where the worker finds the socket for `channel_id`:
/// `<channel_dir>/<channel_id>/channel.sock`.
#[must_use]
pub fn channel_socket_path(channel_dir: &Path, channel_id: &ChannelId) -> PathBuf {
    channel_dir
        .join(channel_id.as_str())
        .join(CHANNEL_SOCKET_NAME)
}

/// Rendezvous endpoint for one attach attempt.
pub trait ChannelServer: Send {
    /// Open the endpoint named by `channel_id`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Channel` if the endpoint cannot be created
    /// (name collision, resource exhaustion).
    fn start(&mut self, channel_id: &ChannelId, on_connection: ConnectionCallback) -> Result<()>;

    /// Close the endpoint and stop handing over connections. Idempotent.
    fn stop(&mut self);
}

/// Creates a fresh, unstarted server for each attempt.
pub type ChannelServerFactory = Arc<dyn Fn() -> Box<dyn ChannelServer> + Send + Sync>;

/// Factory for the platform's channel server.
///
/// # Errors
///
/// Returns `AppError::Channel` on platforms without a channel implementation.
#[cfg(unix)]
pub fn platform_factory(channel_dir: PathBuf) -> Result<ChannelServerFactory> {
    Ok(Arc::new(move || -> Box<dyn ChannelServer> {
        Box::new(unix::UnixChannelServer::new(channel_dir.clone()))
    }))
}

/// Factory for the platform's channel server.
///
/// # Errors
///
/// Returns `AppError::Channel` on platforms without a channel implementation.
#[cfg(not(unix))]
pub fn platform_factory(_channel_dir: PathBuf) -> Result<ChannelServerFactory> {
    Err(crate::AppError::Channel(
        "no channel server implementation for this platform".into(),
    ))
}

#[cfg(unix)]
pub use unix::UnixChannelServer;

#[cfg(unix)]
mod unix {
    use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
    use std::path::{Path, PathBuf};

    use tokio::net::UnixListener;
    use tokio::task::JoinHandle;
    use tokio_util::sync::CancellationToken;
    use tracing::{debug, info, info_span, warn, Instrument};

    use super::{channel_socket_path, ChannelServer, ConnectionCallback, PeerConnection};
    use crate::channel::id::ChannelId;
    use crate::channel::peer::resolve_peer_path;
    use crate::{AppError, Result};

    /// Unix domain socket server at `<channel_dir>/<channel_id>/channel.sock`.
    ///
    /// The per-channel directory is created with mode 0700 before the
    /// socket is bound, so the socket is never reachable by other users.
    #[derive(Debug)]
    pub struct UnixChannelServer {
        channel_dir: PathBuf,
        socket_path: Option<PathBuf>,
        cancel: CancellationToken,
        task: Option<JoinHandle<()>>,
    }

    impl UnixChannelServer {
        /// Construct an unstarted server rooted at `channel_dir`.
        #[must_use]
        pub fn new(channel_dir: PathBuf) -> Self {
            Self {
                channel_dir,
                socket_path: None,
                cancel: CancellationToken::new(),
                task: None,
            }
        }

        /// Socket path while the server is started.
        #[must_use]
        pub fn socket_path(&self) -> Option<&Path> {
            self.socket_path.as_deref()
        }
    }

    fn create_private_dir(dir: &Path) -> Result<()> {
        std::fs::DirBuilder::new()
            .mode(0o700)
            .create(dir)
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::AlreadyExists => AppError::Channel(format!(
                    "channel name already in use: {}",
                    dir.display()
                )),
                _ => AppError::Channel(format!("failed to create {}: {err}", dir.display())),
            })?;

        // The builder mode is masked by the umask; pin it exactly.
        std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700)).map_err(|err| {
            let _ = std::fs::remove_dir(dir);
            AppError::Channel(format!("failed to restrict channel directory: {err}"))
        })
    }

    fn bind_private(path: &Path) -> Result<UnixListener> {
        let listener = UnixListener::bind(path).map_err(|err| {
            AppError::Channel(format!("failed to bind {}: {err}", path.display()))
        })?;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).map_err(|err| {
            AppError::Channel(format!("failed to restrict channel permissions: {err}"))
        })?;
        Ok(listener)
    }

    fn remove_endpoint(path: &Path) {
        match std::fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "channel socket removed"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!(%err, path = %path.display(), "failed to remove channel socket"),
        }
        if let Some(dir) = path.parent() {
            match std::fs::remove_dir(dir) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => warn!(%err, dir = %dir.display(), "failed to remove channel directory"),
            }
        }
    }

    impl ChannelServer for UnixChannelServer {
        fn start(
            &mut self,
            channel_id: &ChannelId,
            mut on_connection: ConnectionCallback,
        ) -> Result<()> {
            if self.socket_path.is_some() {
                return Err(AppError::Channel("server already started".into()));
            }

            let path = channel_socket_path(&self.channel_dir, channel_id);
            let dir = self.channel_dir.join(channel_id.as_str());
            create_private_dir(&dir)?;

            let listener = match bind_private(&path) {
                Ok(listener) => listener,
                Err(err) => {
                    remove_endpoint(&path);
                    return Err(err);
                }
            };

            info!(channel_id = %channel_id, path = %path.display(), "channel server listening");

            let cancel = self.cancel.clone();
            let channel_id = channel_id.clone();
            let span = info_span!("channel_server", channel_id = %channel_id);

            self.task = Some(tokio::spawn(
                async move {
                    loop {
                        tokio::select! {
                            () = cancel.cancelled() => {
                                debug!("channel server cancelled");
                                break;
                            }
                            accepted = listener.accept() => match accepted {
                                Ok((stream, _addr)) => {
                                    let peer_path = resolve_peer_path(&stream);
                                    debug!(peer = ?peer_path, "inbound channel connection");
                                    let (reader, writer) = stream.into_split();
                                    on_connection(PeerConnection::new(
                                        channel_id.clone(),
                                        peer_path,
                                        Box::new(reader),
                                        Box::new(writer),
                                    ));
                                }
                                Err(err) => warn!(%err, "channel accept failed"),
                            }
                        }
                    }
                }
                .instrument(span),
            ));
            self.socket_path = Some(path);
            Ok(())
        }

        fn stop(&mut self) {
            self.cancel.cancel();
            if let Some(task) = self.task.take() {
                task.abort();
            }
            if let Some(path) = self.socket_path.take() {
                remove_endpoint(&path);
            }
        }
    }

    impl Drop for UnixChannelServer {
        fn drop(&mut self) {
            self.stop();
        }
    }
}
