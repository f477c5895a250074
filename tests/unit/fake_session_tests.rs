//! Unit tests for the placeholder session.

use tokio::sync::mpsc;

use desktop_session_host::models::desktop::{ControlAction, Screen};
use desktop_session_host::models::session::{SessionKind, SessionTag};
use desktop_session_host::orchestrator::mailbox::{mailbox, ControllerEvent};
use desktop_session_host::session::fake::{FakeSession, FAKE_SCREEN_HEIGHT, FAKE_SCREEN_WIDTH};
use desktop_session_host::session::{DesktopSession, SessionEvent, SessionEventSink};

fn session() -> (FakeSession, mpsc::UnboundedReceiver<ControllerEvent>) {
    let (mailbox, rx) = mailbox();
    (FakeSession::new(SessionEventSink::new(SessionTag(11), mailbox)), rx)
}

fn drain(rx: &mut mpsc::UnboundedReceiver<ControllerEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        match event {
            ControllerEvent::Session { tag, event } => {
                assert_eq!(tag, SessionTag(11));
                events.push(event);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
    events
}

#[test]
fn start_announces_placeholder_screen() {
    let (mut fake, mut rx) = session();

    fake.start();
    fake.start();

    let events = drain(&mut rx);
    assert_eq!(events.len(), 2, "second start is a no-op");
    assert_eq!(events[0], SessionEvent::Started);
    let SessionEvent::ScreenListChanged(list) = &events[1] else {
        panic!("expected screen list, got {:?}", events[1]);
    };
    assert_eq!(list.screens.len(), 1);
    assert_eq!(fake.kind(), SessionKind::Fake);
}

#[test]
fn capture_produces_blank_frame() {
    let (mut fake, mut rx) = session();
    fake.start();
    drain(&mut rx);

    fake.capture_screen();

    let events = drain(&mut rx);
    let [SessionEvent::ScreenCaptured {
        frame: Some(frame),
        cursor: None,
    }] = events.as_slice()
    else {
        panic!("expected one frame, got {events:?}");
    };
    assert_eq!((frame.width, frame.height), (FAKE_SCREEN_WIDTH, FAKE_SCREEN_HEIGHT));
}

#[test]
fn stopped_placeholder_is_silent() {
    let (mut fake, mut rx) = session();
    fake.start();
    fake.stop();
    drain(&mut rx);

    fake.capture_screen();
    fake.control(ControlAction::Logoff);
    fake.select_screen(&Screen {
        id: 1,
        title: "x".into(),
    });

    assert!(drain(&mut rx).is_empty());
}
