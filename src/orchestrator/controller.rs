//! Attach/detach state machine for the desktop session.
//!
//! ```text
//! Stopped ──attach──▶ Starting ──valid connection──▶ Attached
//!    ▲                   │                              │
//!    │              error/timeout                session stopped / detach
//!    │                   ▼                              ▼
//!    └──────────── Stopping ◀──── re-attach timeout ── Detached
//! ```
//!
//! The controller runs as a single task draining a [`Mailbox`]. It is the
//! only writer of session state: it creates the channel server for each
//! attempt, launches the worker, validates whoever connects, and keeps the
//! [`SessionProxy`] bound to exactly one session (real or placeholder) from
//! the first attach until teardown.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::channel::id::ChannelId;
use crate::channel::peer::verify_peer;
use crate::channel::server::{ChannelServer, ChannelServerFactory, PeerConnection};
use crate::config::GlobalConfig;
use crate::desktop_environment::{AppearanceToggler, DesktopEnvironment};
use crate::models::desktop::{AudioPacket, ClipboardEvent, DesktopConfig, Frame, MouseCursor, ScreenList};
use crate::models::session::{ControllerState, ControllerStatus, ErrorCause, SessionId, SessionTag};
use crate::orchestrator::delegate::ControllerDelegate;
use crate::orchestrator::launcher::{SessionLauncher, SessionProcess};
use crate::orchestrator::mailbox::{mailbox, ControllerEvent, Mailbox, Retired};
use crate::orchestrator::timer::{AttachTimer, TimerPurpose};
use crate::session::channel::ChannelSession;
use crate::session::fake::FakeSession;
use crate::session::proxy::SessionProxy;
use crate::session::{DesktopSession, SessionEvent, SessionEventSink};
use crate::Result;

/// Collaborators and settings a controller needs.
#[derive(Clone)]
pub struct ControllerDeps {
    /// Spawns the worker process.
    pub launcher: Arc<dyn SessionLauncher>,
    /// Creates a fresh channel server per attempt.
    pub channel_servers: ChannelServerFactory,
    /// Executable every accepted peer must resolve to.
    pub worker_path: PathBuf,
    /// Attach and re-attach deadline.
    pub attach_timeout: Duration,
    /// Appearance overrides held while a real session is attached.
    pub toggler: Arc<dyn AppearanceToggler>,
    /// Initial appearance flags.
    pub desktop: DesktopConfig,
    /// Receives forwarded events.
    pub delegate: Arc<dyn ControllerDelegate>,
}

impl ControllerDeps {
    /// Assemble dependencies from validated configuration.
    #[must_use]
    pub fn from_config(
        config: &GlobalConfig,
        launcher: Arc<dyn SessionLauncher>,
        channel_servers: ChannelServerFactory,
        toggler: Arc<dyn AppearanceToggler>,
        delegate: Arc<dyn ControllerDelegate>,
    ) -> Self {
        Self {
            launcher,
            channel_servers,
            worker_path: config.worker_path.clone(),
            attach_timeout: config.attach_timeout(),
            toggler,
            desktop: config.desktop,
            delegate,
        }
    }
}

/// The attach/detach state machine. Driven by [`handle_event`](Self::handle_event)
/// from a single task; see [`SessionController::spawn`].
pub struct SessionController {
    deps: ControllerDeps,
    mailbox: Mailbox,
    state: ControllerState,
    session_id: Option<SessionId>,
    proxy: Arc<SessionProxy>,
    channel_server: Option<Box<dyn ChannelServer>>,
    pending_channel: Option<ChannelId>,
    process: Option<SessionProcess>,
    timer: AttachTimer,
    environment: Option<DesktopEnvironment>,
    last_tag: u64,
    attached_at: Option<chrono::DateTime<Utc>>,
    status_tx: watch::Sender<ControllerStatus>,
}

impl SessionController {
    /// Construct a stopped controller that schedules its own follow-up work
    /// on `mailbox`. The caller must feed the receiving end back into
    /// [`handle_event`](Self::handle_event).
    #[must_use]
    pub fn new(deps: ControllerDeps, mailbox: Mailbox) -> Self {
        info!("session controller created");
        let (status_tx, _) = watch::channel(ControllerStatus::default());
        Self {
            timer: AttachTimer::new(mailbox.clone()),
            deps,
            mailbox,
            state: ControllerState::Stopped,
            session_id: None,
            proxy: Arc::new(SessionProxy::new()),
            channel_server: None,
            pending_channel: None,
            process: None,
            environment: None,
            last_tag: 0,
            attached_at: None,
            status_tx,
        }
    }

    /// Spawn a controller task and return a handle to it.
    ///
    /// Cancelling `cancel` stops the task; the controller is then dropped,
    /// which runs the final teardown.
    #[must_use]
    pub fn spawn(
        deps: ControllerDeps,
        cancel: CancellationToken,
    ) -> (SessionControllerHandle, JoinHandle<()>) {
        let (mailbox, rx) = mailbox();
        let controller = Self::new(deps, mailbox);
        let handle = controller.handle();
        let task = tokio::spawn(
            controller
                .run(rx, cancel)
                .instrument(info_span!("session_controller")),
        );
        (handle, task)
    }

    /// Drain `rx` until `cancel` fires.
    pub async fn run(
        mut self,
        mut rx: mpsc::UnboundedReceiver<ControllerEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    info!("session controller cancelled");
                    break;
                }

                event = rx.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                }
            }
        }
    }

    /// Handle for external callers.
    #[must_use]
    pub fn handle(&self) -> SessionControllerHandle {
        SessionControllerHandle {
            mailbox: self.mailbox.clone(),
            proxy: Arc::clone(&self.proxy),
            status: self.status_tx.subscribe(),
        }
    }

    /// Shared façade over the bound session.
    #[must_use]
    pub fn proxy(&self) -> Arc<SessionProxy> {
        Arc::clone(&self.proxy)
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Identifier of the attempt currently waiting for a connection.
    #[must_use]
    pub fn pending_channel(&self) -> Option<&ChannelId> {
        self.pending_channel.as_ref()
    }

    /// Whether an attach or re-attach deadline is pending.
    #[must_use]
    pub fn is_timer_armed(&self) -> bool {
        self.timer.is_armed()
    }

    /// Process one queued event.
    pub fn handle_event(&mut self, event: ControllerEvent) {
        match event {
            ControllerEvent::Attach(session_id) => self.attach_session(session_id),
            ControllerEvent::Detach => self.detach_session(),
            ControllerEvent::Configure(config) => self.configure(config),
            ControllerEvent::NewConnection(connection) => self.on_new_connection(connection),
            ControllerEvent::TimerFired { generation } => self.on_timer_fired(generation),
            ControllerEvent::Session { tag, event } => self.on_session_event(tag, event),
            ControllerEvent::DeleteSoon(retired) => {
                debug!(?retired, "retired object destroyed");
                drop(retired);
            }
        }
    }

    // ── Transitions ──────────────────────────────────────────────────────

    /// Start (or restart) attaching the worker for `session_id`.
    pub fn attach_session(&mut self, session_id: SessionId) {
        if self.state == ControllerState::Attached {
            debug!(%session_id, "session already attached");
            return;
        }

        info!(%session_id, state = %self.state, "attach session");

        if self.state == ControllerState::Stopped {
            self.timer
                .start(self.deps.attach_timeout, TimerPurpose::Attach);
        }

        self.session_id = Some(session_id);
        self.set_state(ControllerState::Starting);

        if self.pending_channel.is_some() {
            info!("superseding pending attach attempt");
        }
        self.retire_pending_attempt();

        let channel_id = ChannelId::generate();
        let mut server = (self.deps.channel_servers)();
        let mailbox = self.mailbox.clone();
        let started = server.start(
            &channel_id,
            Box::new(move |connection| mailbox.post(ControllerEvent::NewConnection(connection))),
        );
        if let Err(err) = started {
            error!(%err, "failed to start channel server");
            self.on_error_occurred(ErrorCause::ChannelStartFailed);
            return;
        }
        self.channel_server = Some(server);
        self.pending_channel = Some(channel_id.clone());

        match self.deps.launcher.launch(session_id, &channel_id) {
            Ok(process) => {
                info!(pid = ?process.pid(), %channel_id, "session process created");
                self.process = Some(process);
            }
            Err(err) => {
                error!(%err, "failed to create session process");
                self.on_error_occurred(ErrorCause::SpawnFailed);
            }
        }
    }

    /// Judge an inbound connection and, if valid, bind it as the session.
    pub fn on_new_connection(&mut self, connection: PeerConnection) {
        if self.pending_channel.as_ref() != Some(&connection.channel_id) {
            warn!(
                channel_id = %connection.channel_id,
                "connection on a stale or unknown channel rejected"
            );
            return;
        }

        if let Err(err) = verify_peer(&self.deps.worker_path, connection.peer_path.as_deref()) {
            error!(%err, "connection attempt from an unknown application rejected");
            return;
        }

        info!(channel_id = %connection.channel_id, "session process connected");

        self.timer.stop();
        self.pending_channel = None;
        if let Some(mut server) = self.channel_server.take() {
            server.stop();
            self.mailbox.delete_soon(Retired::Server(server));
        }

        let tag = self.next_tag();
        let session = ChannelSession::new(connection, SessionEventSink::new(tag, self.mailbox.clone()));

        self.attached_at = Some(Utc::now());
        self.set_state(ControllerState::Attached);
        self.bind(tag, Box::new(session));
        self.proxy.configure(&self.deps.desktop);
        self.environment = Some(DesktopEnvironment::new(
            Arc::clone(&self.deps.toggler),
            self.deps.desktop,
        ));
        self.publish_status();
    }

    /// Unbind the current session. Unless tearing down, bind a placeholder
    /// and open the re-attach window.
    pub fn detach_session(&mut self) {
        if matches!(
            self.state,
            ControllerState::Stopped | ControllerState::Detached
        ) {
            info!(state = %self.state, "session already stopped or detached");
            return;
        }

        info!(state = %self.state, "detach session");

        let stopping = self.state == ControllerState::Stopping;
        if !stopping {
            self.set_state(ControllerState::Detached);
        }

        self.timer.stop();
        self.environment = None;
        self.attached_at = None;
        if self.pending_channel.is_none() {
            if let Some(process) = self.process.take() {
                self.mailbox.delete_soon(Retired::Process(process));
            }
        }

        if stopping {
            if let Some(previous) = self.proxy.stop_and_detach() {
                self.mailbox.delete_soon(Retired::Session(previous));
            }
            info!("session detached for teardown");
            self.publish_status();
            return;
        }

        self.timer
            .start(self.deps.attach_timeout, TimerPurpose::Reattach);

        // Swap in the placeholder in one step so the proxy is never empty.
        let tag = self.next_tag();
        let fake = FakeSession::new(SessionEventSink::new(tag, self.mailbox.clone()));
        self.bind(tag, Box::new(fake));
        info!("session detached; placeholder bound");
        self.publish_status();
    }

    /// Abandon the current attempt and come to rest in `Stopped`.
    pub fn on_error_occurred(&mut self, cause: ErrorCause) {
        if matches!(
            self.state,
            ControllerState::Stopped | ControllerState::Stopping
        ) {
            return;
        }

        warn!(?cause, "session error; stopping");

        self.set_state(ControllerState::Stopping);
        self.detach_session();
        self.retire_pending_attempt();
        self.set_state(ControllerState::Stopped);

        self.deps.delegate.on_session_error(cause);
    }

    /// Update appearance flags on the live environment and the session.
    pub fn configure(&mut self, config: DesktopConfig) {
        self.deps.desktop = config;
        if let Some(environment) = self.environment.as_mut() {
            environment.update(config);
        }
        self.proxy.configure(&config);
    }

    // ── Session callbacks ────────────────────────────────────────────────

    /// The bound session started producing output.
    pub fn on_desktop_session_started(&self) {
        self.deps.delegate.on_desktop_session_started();
    }

    /// The bound session ended on its own.
    pub fn on_desktop_session_stopped(&mut self) {
        self.detach_session();
    }

    /// Forward a frame/cursor update.
    pub fn on_screen_captured(&self, frame: Option<&Frame>, cursor: Option<&MouseCursor>) {
        self.deps.delegate.on_screen_captured(frame, cursor);
    }

    /// Forward captured audio.
    pub fn on_audio_captured(&self, packet: &AudioPacket) {
        self.deps.delegate.on_audio_captured(packet);
    }

    /// Forward a screen list change.
    pub fn on_screen_list_changed(&self, list: &ScreenList) {
        self.deps.delegate.on_screen_list_changed(list);
    }

    /// Forward a clipboard change.
    pub fn on_clipboard_event(&self, event: &ClipboardEvent) {
        self.deps.delegate.on_clipboard_event(event);
    }

    fn on_session_event(&mut self, tag: SessionTag, event: SessionEvent) {
        if self.proxy.bound_tag() != Some(tag) {
            debug!(tag = tag.0, ?event, "event from a retired session dropped");
            return;
        }

        match event {
            SessionEvent::Started => self.on_desktop_session_started(),
            SessionEvent::Stopped => self.on_desktop_session_stopped(),
            SessionEvent::ScreenCaptured { frame, cursor } => {
                self.on_screen_captured(frame.as_ref(), cursor.as_ref());
            }
            SessionEvent::AudioCaptured(packet) => self.on_audio_captured(&packet),
            SessionEvent::ScreenListChanged(list) => self.on_screen_list_changed(&list),
            SessionEvent::ClipboardEvent(event) => self.on_clipboard_event(&event),
        }
    }

    fn on_timer_fired(&mut self, generation: u64) {
        let Some(purpose) = self.timer.take_fired(generation) else {
            debug!(generation, "stale timer firing ignored");
            return;
        };

        if self.state == ControllerState::Attached {
            debug!(?purpose, "timer fired while attached; ignored");
            return;
        }

        match purpose {
            TimerPurpose::Attach => warn!("session attach timeout"),
            TimerPurpose::Reattach => error!("timeout while waiting for session"),
        }
        self.on_error_occurred(purpose.into());
    }

    // ── Helpers ──────────────────────────────────────────────────────────

    fn next_tag(&mut self) -> SessionTag {
        self.last_tag += 1;
        SessionTag(self.last_tag)
    }

    fn bind(&mut self, tag: SessionTag, session: Box<dyn DesktopSession>) {
        if let Some(previous) = self.proxy.attach_and_start(tag, session) {
            self.mailbox.delete_soon(Retired::Session(previous));
        }
    }

    fn retire_pending_attempt(&mut self) {
        if let Some(channel_id) = self.pending_channel.take() {
            debug!(%channel_id, "pending channel abandoned");
        }
        if let Some(mut server) = self.channel_server.take() {
            server.stop();
            self.mailbox.delete_soon(Retired::Server(server));
        }
        if let Some(process) = self.process.take() {
            self.mailbox.delete_soon(Retired::Process(process));
        }
    }

    fn set_state(&mut self, state: ControllerState) {
        if self.state == state {
            return;
        }
        debug!(from = %self.state, to = %state, "controller state transition");
        self.state = state;
        self.deps.delegate.on_state_changed(state);
        self.publish_status();
    }

    fn publish_status(&self) {
        self.status_tx.send_replace(ControllerStatus {
            state: self.state,
            session_id: self.session_id,
            bound: self.proxy.bound_kind(),
            attached_at: self.attached_at,
        });
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        info!(state = %self.state, "session controller shutting down");
        if self.state == ControllerState::Stopped {
            return;
        }

        self.set_state(ControllerState::Stopping);
        self.detach_session();
        self.retire_pending_attempt();
        self.set_state(ControllerState::Stopped);
    }
}

/// Cloneable handle to a running controller.
#[derive(Debug, Clone)]
pub struct SessionControllerHandle {
    mailbox: Mailbox,
    proxy: Arc<SessionProxy>,
    status: watch::Receiver<ControllerStatus>,
}

impl SessionControllerHandle {
    /// Request an attach.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Controller` if the controller task has exited.
    pub fn attach_session(&self, session_id: SessionId) -> Result<()> {
        self.mailbox.send(ControllerEvent::Attach(session_id))
    }

    /// Request a detach.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Controller` if the controller task has exited.
    pub fn detach_session(&self) -> Result<()> {
        self.mailbox.send(ControllerEvent::Detach)
    }

    /// Update appearance flags.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Controller` if the controller task has exited.
    pub fn configure(&self, config: DesktopConfig) -> Result<()> {
        self.mailbox.send(ControllerEvent::Configure(config))
    }

    /// Shared façade over the bound session.
    #[must_use]
    pub fn proxy(&self) -> Arc<SessionProxy> {
        Arc::clone(&self.proxy)
    }

    /// Latest published status.
    #[must_use]
    pub fn status(&self) -> ControllerStatus {
        self.status.borrow().clone()
    }
}
