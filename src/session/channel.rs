//! Session backed by a validated worker channel.
//!
//! Two tasks run per started session:
//!
//! - a reader that decodes [`DesktopToService`] lines and emits
//!   [`SessionEvent`]s, finishing with exactly one [`SessionEvent::Stopped`]
//!   when the worker closes the channel;
//! - a writer that drains queued [`ServiceToDesktop`] messages onto the
//!   channel.
//!
//! Stopping the session cancels both without emitting `Stopped`.

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::channel::codec::ChannelCodec;
use crate::channel::message::{encode_outbound, parse_inbound_line, DesktopToService, ServiceToDesktop};
use crate::channel::server::{BoxedReader, BoxedWriter, PeerConnection};
use crate::models::desktop::{
    ClipboardEvent, ControlAction, DesktopConfig, KeyEvent, MouseEvent, Screen,
};
use crate::models::session::SessionKind;
use crate::session::{DesktopSession, SessionEvent, SessionEventSink};
use crate::AppError;

/// Real session talking to the worker process.
#[derive(Debug)]
pub struct ChannelSession {
    sink: SessionEventSink,
    connection: Option<PeerConnection>,
    outbound_tx: mpsc::UnboundedSender<ServiceToDesktop>,
    outbound_rx: Option<mpsc::UnboundedReceiver<ServiceToDesktop>>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl ChannelSession {
    /// Wrap an accepted connection. Nothing is read or written until
    /// [`start`](DesktopSession::start).
    #[must_use]
    pub fn new(connection: PeerConnection, sink: SessionEventSink) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        Self {
            sink,
            connection: Some(connection),
            outbound_tx,
            outbound_rx: Some(outbound_rx),
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
        }
    }

    fn send(&self, message: ServiceToDesktop) {
        if self.cancel.is_cancelled() {
            return;
        }
        // The receiver only goes away once the writer has exited.
        if self.outbound_tx.send(message).is_err() {
            debug!(tag = self.sink.tag().0, "channel writer gone; message dropped");
        }
    }
}

impl DesktopSession for ChannelSession {
    fn kind(&self) -> SessionKind {
        SessionKind::Channel
    }

    fn start(&mut self) {
        let (Some(connection), Some(outbound_rx)) =
            (self.connection.take(), self.outbound_rx.take())
        else {
            return;
        };

        let tag = self.sink.tag().0;
        let channel_id = connection.channel_id.to_string();
        info!(tag, channel_id, "channel session started");

        self.tasks.push(tokio::spawn(
            run_reader(connection.reader, self.sink.clone(), self.cancel.clone())
                .instrument(info_span!("channel_reader", tag)),
        ));
        self.tasks.push(tokio::spawn(
            run_writer(connection.writer, outbound_rx, self.cancel.clone())
                .instrument(info_span!("channel_writer", tag)),
        ));

        self.send(ServiceToDesktop::Control {
            action: ControlAction::Enable,
        });
        self.sink.emit(SessionEvent::Started);
    }

    fn stop(&mut self) {
        if self.cancel.is_cancelled() {
            return;
        }
        debug!(tag = self.sink.tag().0, "channel session stopped");
        self.cancel.cancel();
        self.connection = None;
    }

    fn control(&mut self, action: ControlAction) {
        self.send(ServiceToDesktop::Control { action });
    }

    fn configure(&mut self, config: &DesktopConfig) {
        self.send(ServiceToDesktop::Configure { config: *config });
    }

    fn select_screen(&mut self, screen: &Screen) {
        self.send(ServiceToDesktop::SelectScreen {
            screen: screen.clone(),
        });
    }

    fn capture_screen(&mut self) {
        self.send(ServiceToDesktop::CaptureScreen);
    }

    fn inject_key_event(&mut self, event: &KeyEvent) {
        self.send(ServiceToDesktop::KeyEvent { event: *event });
    }

    fn inject_mouse_event(&mut self, event: &MouseEvent) {
        self.send(ServiceToDesktop::MouseEvent { event: *event });
    }

    fn inject_clipboard_event(&mut self, event: &ClipboardEvent) {
        self.send(ServiceToDesktop::ClipboardEvent {
            event: event.clone(),
        });
    }
}

impl Drop for ChannelSession {
    fn drop(&mut self) {
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

/// Map a worker message onto the session event it represents.
#[must_use]
pub fn into_event(message: DesktopToService) -> SessionEvent {
    match message {
        DesktopToService::ScreenCaptured { frame, cursor } => {
            SessionEvent::ScreenCaptured { frame, cursor }
        }
        DesktopToService::AudioCaptured { packet } => SessionEvent::AudioCaptured(packet),
        DesktopToService::ScreenListChanged { list } => SessionEvent::ScreenListChanged(list),
        DesktopToService::ClipboardEvent { event } => SessionEvent::ClipboardEvent(event),
    }
}

async fn run_reader(reader: BoxedReader, sink: SessionEventSink, cancel: CancellationToken) {
    let mut framed = FramedRead::new(reader, ChannelCodec::new());

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!("channel reader cancelled");
                return;
            }

            next = framed.next() => match next {
                None => {
                    info!("worker closed the channel");
                    break;
                }
                Some(Ok(line)) => match parse_inbound_line(&line) {
                    Ok(Some(message)) => sink.emit(into_event(message)),
                    Ok(None) => {}
                    Err(err) => warn!(%err, "skipping malformed worker message"),
                },
                Some(Err(AppError::Io(err))) => {
                    warn!(%err, "channel read failed");
                    break;
                }
                Some(Err(err)) => warn!(%err, "skipping oversized worker message"),
            }
        }
    }

    sink.emit(SessionEvent::Stopped);
}

async fn run_writer(
    mut writer: BoxedWriter,
    mut outbound_rx: mpsc::UnboundedReceiver<ServiceToDesktop>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => break,

            message = outbound_rx.recv() => {
                let Some(message) = message else { break };

                let mut line = match encode_outbound(&message) {
                    Ok(line) => line,
                    Err(err) => {
                        warn!(%err, "dropping unencodable message");
                        continue;
                    }
                };
                line.push('\n');

                if let Err(err) = writer.write_all(line.as_bytes()).await {
                    warn!(%err, "write to worker failed");
                    break;
                }
                if let Err(err) = writer.flush().await {
                    warn!(%err, "flush to worker failed");
                    break;
                }
            }
        }
    }

    debug!("channel writer stopped");
}
