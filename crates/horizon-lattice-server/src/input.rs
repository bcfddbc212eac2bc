//! Event intake.
//!
//! Raw input arrives on its own port so that a burst of pointer motion never
//! queues behind a slow command. The intake loop classifies each envelope and
//! hands it to the [`Desktop`] synchronously.

use std::sync::Arc;

use crossbeam_channel::select;

use crate::logging::targets;
use crate::port::{Envelope, Port};
use crate::protocol::four_cc;
use crate::service::ShutdownListener;

pub const MOUSE_DOWN: i32 = four_cc(b"_MDN");
pub const MOUSE_UP: i32 = four_cc(b"_MUP");
pub const MOUSE_MOVED: i32 = four_cc(b"_MMV");
pub const MOUSE_WHEEL_CHANGED: i32 = four_cc(b"_MWC");
pub const KEY_DOWN: i32 = four_cc(b"_KYD");
pub const KEY_UP: i32 = four_cc(b"_KYU");
pub const UNMAPPED_KEY_DOWN: i32 = four_cc(b"_UKD");
pub const UNMAPPED_KEY_UP: i32 = four_cc(b"_UKU");
pub const MODIFIERS_CHANGED: i32 = four_cc(b"_MCH");

/// Kind of a raw input event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputClass {
    /// Pointer motion, button or wheel.
    Pointer,
    /// Key press, release or modifier change.
    Keyboard,
}

impl InputClass {
    /// Classify an input code. `None` for codes the intake does not route.
    pub fn of(code: i32) -> Option<Self> {
        match code {
            MOUSE_DOWN | MOUSE_UP | MOUSE_MOVED | MOUSE_WHEEL_CHANGED => Some(Self::Pointer),
            KEY_DOWN | KEY_UP | UNMAPPED_KEY_DOWN | UNMAPPED_KEY_UP | MODIFIERS_CHANGED => {
                Some(Self::Keyboard)
            }
            _ => None,
        }
    }
}

/// Receives routed input.
///
/// Handlers run on the intake thread and read the event's attachments from
/// `event` themselves.
pub trait Desktop: Send + Sync {
    /// Pointer motion, button or wheel event.
    fn mouse_event(&self, code: i32, event: &mut Envelope);
    /// Keyboard or modifier event.
    fn keyboard_event(&self, code: i32, event: &mut Envelope);
}

/// A desktop that only logs what it receives.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDesktop;

impl Desktop for TracingDesktop {
    fn mouse_event(&self, code: i32, event: &mut Envelope) {
        tracing::trace!(target: targets::INPUT, code, attachments = event.remaining(), "mouse event");
    }

    fn keyboard_event(&self, code: i32, event: &mut Envelope) {
        tracing::trace!(target: targets::INPUT, code, attachments = event.remaining(), "keyboard event");
    }
}

/// Route one envelope to the desktop.
pub fn route(desktop: &dyn Desktop, mut event: Envelope) {
    let code = event.code();
    match InputClass::of(code) {
        Some(InputClass::Pointer) => desktop.mouse_event(code, &mut event),
        Some(InputClass::Keyboard) => desktop.keyboard_event(code, &mut event),
        None => {
            tracing::warn!(target: targets::INPUT, code = format_args!("{code:#x}"), "unexpected input code");
        }
    }
}

/// Body of the intake thread.
///
/// Blocks on the input port and the shutdown listener together; returns once
/// shutdown is requested or every sender of the input port is gone.
pub fn intake_loop(port: Port, desktop: Arc<dyn Desktop>, shutdown: ShutdownListener) {
    tracing::info!(target: targets::INPUT, port = %port.id(), "listening for input");
    loop {
        select! {
            recv(port.receiver()) -> event => match event {
                Ok(event) => route(desktop.as_ref(), event),
                Err(_) => {
                    tracing::warn!(target: targets::INPUT, "input port disconnected");
                    break;
                }
            },
            recv(shutdown.receiver()) -> _ => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::port::PortTable;
    use crate::service::ServiceThread;
    use crate::testing::{RecordingDesktop, Routed};

    #[test]
    fn test_classification() {
        assert_eq!(InputClass::of(MOUSE_WHEEL_CHANGED), Some(InputClass::Pointer));
        assert_eq!(InputClass::of(MODIFIERS_CHANGED), Some(InputClass::Keyboard));
        assert_eq!(InputClass::of(UNMAPPED_KEY_UP), Some(InputClass::Keyboard));
        assert_eq!(InputClass::of(0), None);
    }

    #[test]
    fn test_route_reaches_handlers() {
        let desktop = RecordingDesktop::default();
        route(&desktop, Envelope::new(MOUSE_DOWN).with_int(10).with_int(20));
        route(&desktop, Envelope::new(KEY_UP).with_int(65));
        route(&desktop, Envelope::new(0x7777));

        assert_eq!(
            desktop.events(),
            [
                Routed::Mouse {
                    code: MOUSE_DOWN,
                    attachments: 2
                },
                Routed::Keyboard {
                    code: KEY_UP,
                    attachments: 1
                },
            ]
        );
    }

    #[test]
    fn test_intake_loop_routes_until_stopped() {
        let table = PortTable::new(4);
        let port = table.create("input", 16).unwrap();
        let link = port.link();
        let desktop = Arc::new(RecordingDesktop::default());

        let sink: Arc<dyn Desktop> = desktop.clone();
        let service = ServiceThread::spawn("test-intake", move |shutdown| {
            intake_loop(port, sink, shutdown)
        })
        .unwrap();

        link.send(Envelope::new(MOUSE_MOVED)).unwrap();
        link.send(Envelope::new(0x42)).unwrap();
        link.send(Envelope::new(KEY_DOWN)).unwrap();

        assert!(desktop.wait_for(2, Duration::from_secs(5)));
        assert!(service.stop_and_join());
        assert_eq!(desktop.events().len(), 2);
        assert_eq!(table.count(), 0);
    }
}
