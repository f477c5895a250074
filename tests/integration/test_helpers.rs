//! Shared test helpers for controller-level integration tests.
//!
//! Provides a [`Harness`] wiring a [`SessionController`] to a scripted
//! launcher, in-memory channel servers, and recording delegate/toggler so
//! individual test modules can focus on behaviour rather than plumbing.
//!
//! The harness drives the controller by hand: events are pumped from the
//! mailbox receiver with `try_recv`, so tests stay deterministic under a
//! paused clock.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::DuplexStream;
use tokio::sync::mpsc;

use desktop_session_host::channel::id::ChannelId;
use desktop_session_host::channel::server::{
    ChannelServer, ChannelServerFactory, ConnectionCallback, PeerConnection,
};
use desktop_session_host::desktop_environment::AppearanceToggler;
use desktop_session_host::models::desktop::{
    AudioPacket, ClipboardEvent, DesktopConfig, Frame, MouseCursor, ScreenList,
};
use desktop_session_host::models::session::{ControllerState, ErrorCause, SessionId};
use desktop_session_host::orchestrator::controller::{ControllerDeps, SessionController};
use desktop_session_host::orchestrator::delegate::ControllerDelegate;
use desktop_session_host::orchestrator::launcher::{SessionLauncher, SessionProcess};
use desktop_session_host::orchestrator::mailbox::{mailbox, ControllerEvent};
use desktop_session_host::{AppError, Result};

/// Deadline used by every harness controller.
pub const ATTACH_TIMEOUT: Duration = Duration::from_secs(60);

/// Path the harness treats as the legitimate worker executable.
pub fn worker_path() -> PathBuf {
    PathBuf::from("/opt/desktop-session/worker")
}

// ── Launcher ─────────────────────────────────────────────────────────────────

/// Launcher that records requests and optionally fails.
#[derive(Default)]
pub struct ScriptedLauncher {
    /// `(session, channel)` pairs passed to `launch`.
    pub launches: Mutex<Vec<(SessionId, ChannelId)>>,
    /// When set, `launch` fails.
    pub fail: Mutex<bool>,
}

impl ScriptedLauncher {
    pub fn launch_count(&self) -> usize {
        self.launches.lock().unwrap().len()
    }
}

impl SessionLauncher for ScriptedLauncher {
    fn launch(&self, session_id: SessionId, channel_id: &ChannelId) -> Result<SessionProcess> {
        if *self.fail.lock().unwrap() {
            return Err(AppError::Spawn("scripted failure".into()));
        }
        let mut launches = self.launches.lock().unwrap();
        launches.push((session_id, channel_id.clone()));
        let pid = 4000 + u32::try_from(launches.len()).unwrap();
        Ok(SessionProcess::detached(Some(pid)))
    }
}

// ── Channel servers ──────────────────────────────────────────────────────────

/// What one in-memory server went through.
#[derive(Default)]
pub struct ServerRecord {
    pub channel_id: Option<ChannelId>,
    pub callback: Option<ConnectionCallback>,
    pub stopped: bool,
}

/// Shared log of every server the factory created.
#[derive(Default)]
pub struct ServerLog {
    pub servers: Mutex<Vec<Arc<Mutex<ServerRecord>>>>,
    /// When set, `start` fails.
    pub fail: Mutex<bool>,
}

impl ServerLog {
    pub fn count(&self) -> usize {
        self.servers.lock().unwrap().len()
    }

    pub fn record(&self, index: usize) -> Arc<Mutex<ServerRecord>> {
        Arc::clone(&self.servers.lock().unwrap()[index])
    }

    pub fn channel_id(&self, index: usize) -> ChannelId {
        self.record(index)
            .lock()
            .unwrap()
            .channel_id
            .clone()
            .expect("server was started")
    }

    pub fn is_stopped(&self, index: usize) -> bool {
        self.record(index).lock().unwrap().stopped
    }

    /// Deliver a connection through server `index`, as its accept loop would.
    /// A stopped server accepts nothing.
    pub fn deliver(&self, index: usize, connection: PeerConnection) {
        let record = self.record(index);
        let mut record = record.lock().unwrap();
        if record.stopped {
            return;
        }
        let callback = record
            .callback
            .as_mut()
            .expect("server was started");
        callback(connection);
    }
}

struct MemoryServer {
    log: Arc<ServerLog>,
    record: Arc<Mutex<ServerRecord>>,
}

impl ChannelServer for MemoryServer {
    fn start(&mut self, channel_id: &ChannelId, on_connection: ConnectionCallback) -> Result<()> {
        if *self.log.fail.lock().unwrap() {
            return Err(AppError::Channel("scripted failure".into()));
        }
        let mut record = self.record.lock().unwrap();
        record.channel_id = Some(channel_id.clone());
        record.callback = Some(on_connection);
        Ok(())
    }

    fn stop(&mut self) {
        self.record.lock().unwrap().stopped = true;
    }
}

fn memory_factory(log: Arc<ServerLog>) -> ChannelServerFactory {
    Arc::new(move || -> Box<dyn ChannelServer> {
        let record = Arc::new(Mutex::new(ServerRecord::default()));
        log.servers.lock().unwrap().push(Arc::clone(&record));
        Box::new(MemoryServer {
            log: Arc::clone(&log),
            record,
        })
    })
}

// ── Delegate and toggler ─────────────────────────────────────────────────────

/// One delegate notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Note {
    Started,
    Screen { frame: bool, cursor: bool },
    Audio(usize),
    ScreenList(Vec<String>),
    Clipboard(String),
    State(ControllerState),
    Error(ErrorCause),
}

/// Delegate that records every call in order.
#[derive(Default)]
pub struct RecordingDelegate {
    pub notes: Mutex<Vec<Note>>,
}

impl RecordingDelegate {
    pub fn notes(&self) -> Vec<Note> {
        self.notes.lock().unwrap().clone()
    }

    pub fn started_count(&self) -> usize {
        self.notes().iter().filter(|n| **n == Note::Started).count()
    }

    pub fn errors(&self) -> Vec<ErrorCause> {
        self.notes()
            .into_iter()
            .filter_map(|n| match n {
                Note::Error(cause) => Some(cause),
                _ => None,
            })
            .collect()
    }

    pub fn states(&self) -> Vec<ControllerState> {
        self.notes()
            .into_iter()
            .filter_map(|n| match n {
                Note::State(state) => Some(state),
                _ => None,
            })
            .collect()
    }

    fn push(&self, note: Note) {
        self.notes.lock().unwrap().push(note);
    }
}

impl ControllerDelegate for RecordingDelegate {
    fn on_desktop_session_started(&self) {
        self.push(Note::Started);
    }

    fn on_screen_captured(&self, frame: Option<&Frame>, cursor: Option<&MouseCursor>) {
        self.push(Note::Screen {
            frame: frame.is_some(),
            cursor: cursor.is_some(),
        });
    }

    fn on_audio_captured(&self, packet: &AudioPacket) {
        self.push(Note::Audio(packet.data.len()));
    }

    fn on_screen_list_changed(&self, list: &ScreenList) {
        self.push(Note::ScreenList(
            list.screens.iter().map(|s| s.title.clone()).collect(),
        ));
    }

    fn on_clipboard_event(&self, event: &ClipboardEvent) {
        self.push(Note::Clipboard(event.mime_type.clone()));
    }

    fn on_state_changed(&self, state: ControllerState) {
        self.push(Note::State(state));
    }

    fn on_session_error(&self, cause: ErrorCause) {
        self.push(Note::Error(cause));
    }
}

/// Toggler that counts applies and reverts.
#[derive(Default)]
pub struct RecordingToggler {
    pub applied: Mutex<Vec<(bool, bool, bool)>>,
    pub reverts: Mutex<usize>,
}

impl RecordingToggler {
    pub fn applied(&self) -> Vec<(bool, bool, bool)> {
        self.applied.lock().unwrap().clone()
    }

    pub fn reverts(&self) -> usize {
        *self.reverts.lock().unwrap()
    }
}

impl AppearanceToggler for RecordingToggler {
    fn apply_settings(&self, wallpaper: bool, font_smoothing: bool, effects: bool) {
        self.applied
            .lock()
            .unwrap()
            .push((wallpaper, font_smoothing, effects));
    }

    fn revert(&self) {
        *self.reverts.lock().unwrap() += 1;
    }
}

// ── Harness ──────────────────────────────────────────────────────────────────

/// A controller plus everything it talks to.
pub struct Harness {
    pub controller: SessionController,
    pub deps: ControllerDeps,
    pub rx: mpsc::UnboundedReceiver<ControllerEvent>,
    pub launcher: Arc<ScriptedLauncher>,
    pub servers: Arc<ServerLog>,
    pub delegate: Arc<RecordingDelegate>,
    pub toggler: Arc<RecordingToggler>,
}

impl Harness {
    pub fn new() -> Self {
        let servers = Arc::new(ServerLog::default());
        let mut h = Self::with_channel_servers(memory_factory(Arc::clone(&servers)), worker_path());
        h.servers = servers;
        h
    }

    /// A harness whose controller opens channels through `channel_servers`
    /// and trusts `worker`. `servers` stays empty.
    pub fn with_channel_servers(channel_servers: ChannelServerFactory, worker: PathBuf) -> Self {
        let launcher = Arc::new(ScriptedLauncher::default());
        let servers = Arc::new(ServerLog::default());
        let delegate = Arc::new(RecordingDelegate::default());
        let toggler = Arc::new(RecordingToggler::default());

        let deps = ControllerDeps {
            launcher: Arc::clone(&launcher) as Arc<dyn SessionLauncher>,
            channel_servers,
            worker_path: worker,
            attach_timeout: ATTACH_TIMEOUT,
            toggler: Arc::clone(&toggler) as Arc<dyn AppearanceToggler>,
            desktop: DesktopConfig::default(),
            delegate: Arc::clone(&delegate) as Arc<dyn ControllerDelegate>,
        };

        let (mailbox, rx) = mailbox();
        Self {
            controller: SessionController::new(deps.clone(), mailbox),
            deps,
            rx,
            launcher,
            servers,
            delegate,
            toggler,
        }
    }

    /// A copy of the dependencies, for spawning a second controller.
    pub fn controller_deps(&self) -> ControllerDeps {
        self.deps.clone()
    }

    /// Let spawned tasks run and feed everything they queued back into the
    /// controller, until the mailbox stays empty.
    pub async fn pump(&mut self) {
        let mut idle = 0;
        while idle < 8 {
            tokio::task::yield_now().await;
            match self.rx.try_recv() {
                Ok(event) => {
                    self.controller.handle_event(event);
                    idle = 0;
                }
                Err(_) => idle += 1,
            }
        }
    }

    /// Move the paused clock forward and process whatever fired.
    pub async fn advance(&mut self, by: Duration) {
        tokio::time::advance(by).await;
        self.pump().await;
    }

    /// Deliver a connection from `peer` on server `index` and process it.
    /// Returns the worker's end of the channel.
    pub async fn connect(&mut self, index: usize, peer: Option<&Path>) -> DuplexStream {
        let channel_id = self.servers.channel_id(index);
        self.connect_on(index, channel_id, peer).await
    }

    /// As [`connect`](Self::connect), but claiming an arbitrary channel id.
    pub async fn connect_on(
        &mut self,
        index: usize,
        channel_id: ChannelId,
        peer: Option<&Path>,
    ) -> DuplexStream {
        let (connection, worker) = peer_connection(channel_id, peer);
        self.servers.deliver(index, connection);
        self.pump().await;
        worker
    }
}

/// In-memory connection pair: the service half as a [`PeerConnection`] and
/// the worker half as a raw stream.
pub fn peer_connection(channel_id: ChannelId, peer: Option<&Path>) -> (PeerConnection, DuplexStream) {
    let (service, worker) = tokio::io::duplex(64 * 1024);
    let (reader, writer) = tokio::io::split(service);
    (
        PeerConnection::new(
            channel_id,
            peer.map(Path::to_path_buf),
            Box::new(reader),
            Box::new(writer),
        ),
        worker,
    )
}
