//! ==============================================================================
//! display.rs - kiosk display channel
//! ==============================================================================
//!
//! purpose:
//!     one logical connection to the kiosk page. the controller sets five
//!     independent text fields; the page answers with a nickname submission
//!     or a cancel key press.
//!
//! protocol (json over the /ws socket):
//!     outbound: {"event":"text1".."text5","data":"..."}
//!               {"event":"json-data","data":"<raw scan>"}
//!     inbound:  {"event":"name-entered","data":<name record, maybe as a string>}
//!               {"event":"esc-key"}
//!
//! relationships:
//!     - written by: controller.rs
//!     - attached by: server.rs (websocket handler connects/disconnects)
//!
//! ==============================================================================

use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::domain::{decode_embedded, NameSubmission};

/// one of the five text fields on the kiosk page
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Slot {
    Text1,
    Text2,
    Text3,
    Text4,
    Text5,
}

impl Slot {
    pub const ALL: [Slot; 5] = [Slot::Text1, Slot::Text2, Slot::Text3, Slot::Text4, Slot::Text5];

    pub fn event_name(self) -> &'static str {
        match self {
            Slot::Text1 => "text1",
            Slot::Text2 => "text2",
            Slot::Text3 => "text3",
            Slot::Text4 => "text4",
            Slot::Text5 => "text5",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// last delivered text per slot
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DisplayFrame(pub [String; 5]);

impl DisplayFrame {
    #[cfg(test)]
    pub fn get(&self, slot: Slot) -> &str {
        &self.0[slot.index()]
    }
}

/// message pushed to the connected page
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DisplayMessage {
    Field { slot: Slot, text: String },
    ScanData(String),
}

impl DisplayMessage {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            DisplayMessage::Field { slot, text } => {
                serde_json::json!({ "event": slot.event_name(), "data": text })
            }
            DisplayMessage::ScanData(raw) => serde_json::json!({ "event": "json-data", "data": raw }),
        }
    }
}

/// signal received from the page
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DisplayEvent {
    NameEntered(NameSubmission),
    Cancel,
}

#[derive(Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
enum InboundFrame {
    NameEntered(serde_json::Value),
    EscKey,
}

impl DisplayEvent {
    /// parse an inbound socket frame; unknown or malformed frames yield `None`
    pub fn parse(text: &str) -> Option<Self> {
        match serde_json::from_str::<InboundFrame>(text) {
            Ok(InboundFrame::EscKey) => Some(DisplayEvent::Cancel),
            Ok(InboundFrame::NameEntered(payload)) => match decode_embedded(payload) {
                Ok(submission) => Some(DisplayEvent::NameEntered(submission)),
                Err(e) => {
                    tracing::debug!(error = %e, "dropping malformed name submission");
                    None
                }
            },
            Err(e) => {
                tracing::debug!(error = %e, "dropping unknown display frame");
                None
            }
        }
    }
}

/// receiving end handed to the socket task on connect
#[derive(Debug)]
pub struct DisplayConnection {
    pub id: u64,
    pub rx: mpsc::UnboundedReceiver<DisplayMessage>,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    active: Option<(u64, mpsc::UnboundedSender<DisplayMessage>)>,
    frame: DisplayFrame,
}

/// cloneable handle to the single display connection
#[derive(Clone, Default)]
pub struct Display {
    inner: Arc<Mutex<Inner>>,
}

impl Display {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// attach a page, replacing any earlier one
    pub fn connect(&self) -> DisplayConnection {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        if inner.active.replace((id, tx)).is_some() {
            tracing::info!(display = id, "display connected, replacing previous page");
        } else {
            tracing::info!(display = id, "display connected");
        }
        DisplayConnection { id, rx }
    }

    /// detach a page; ignored if a newer page already took over
    pub fn disconnect(&self, id: u64) {
        let mut inner = self.lock();
        if matches!(inner.active, Some((active, _)) if active == id) {
            inner.active = None;
            tracing::info!(display = id, "display disconnected");
        }
    }

    /// id of the connected page, if any
    pub fn connected(&self) -> Option<u64> {
        self.lock().active.as_ref().map(|(id, _)| *id)
    }

    /// whether inbound events from `id` should be acted on
    pub fn is_current(&self, id: u64) -> bool {
        self.connected() == Some(id)
    }

    pub fn set_field(&self, slot: Slot, text: impl Into<String>) {
        let text = text.into();
        let mut inner = self.lock();
        let Some((id, tx)) = inner.active.as_ref() else {
            return;
        };
        let id = *id;
        if tx.send(DisplayMessage::Field { slot, text: text.clone() }).is_err() {
            tracing::debug!(display = id, "display socket gone, dropping update");
            inner.active = None;
            return;
        }
        inner.frame.0[slot.index()] = text;
    }

    /// set all five slots in order
    pub fn show(&self, texts: [&str; 5]) {
        for (slot, text) in Slot::ALL.into_iter().zip(texts) {
            self.set_field(slot, text);
        }
    }

    /// diagnostic echo of the raw scan record
    pub fn send_scan_data(&self, raw: String) {
        let mut inner = self.lock();
        let Some((id, tx)) = inner.active.as_ref() else {
            return;
        };
        let id = *id;
        if tx.send(DisplayMessage::ScanData(raw)).is_err() {
            tracing::debug!(display = id, "display socket gone, dropping scan echo");
            inner.active = None;
        }
    }

    /// last text delivered per slot
    pub fn frame(&self) -> DisplayFrame {
        self.lock().frame.clone()
    }
}

impl std::fmt::Debug for Display {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Display")
            .field("connected", &self.connected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_field_without_page_is_a_noop() {
        let display = Display::new();
        display.set_field(Slot::Text3, "hello");
        display.send_scan_data("{}".into());
        assert_eq!(display.frame(), DisplayFrame::default());
    }

    #[test]
    fn delivers_in_order_and_mirrors_frame() {
        let display = Display::new();
        let mut conn = display.connect();

        display.show(["A", "B", "", "D", "E"]);
        display.set_field(Slot::Text2, "B2");

        let mut got = Vec::new();
        while let Ok(msg) = conn.rx.try_recv() {
            got.push(msg);
        }
        assert_eq!(got.len(), 6);
        assert_eq!(
            got[0],
            DisplayMessage::Field { slot: Slot::Text1, text: "A".into() }
        );
        assert_eq!(
            got[5],
            DisplayMessage::Field { slot: Slot::Text2, text: "B2".into() }
        );
        assert_eq!(display.frame().get(Slot::Text2), "B2");
        assert_eq!(display.frame().get(Slot::Text5), "E");
    }

    #[test]
    fn newer_page_replaces_older() {
        let display = Display::new();
        let mut old = display.connect();
        let mut new = display.connect();

        display.set_field(Slot::Text1, "x");
        assert!(old.rx.try_recv().is_err());
        assert!(new.rx.try_recv().is_ok());

        // stale disconnect must not detach the newer page
        display.disconnect(old.id);
        assert_eq!(display.connected(), Some(new.id));
        display.disconnect(new.id);
        assert_eq!(display.connected(), None);
    }

    #[test]
    fn dropped_receiver_detaches() {
        let display = Display::new();
        let conn = display.connect();
        drop(conn);
        display.set_field(Slot::Text1, "x");
        assert_eq!(display.connected(), None);
        assert_eq!(display.frame().get(Slot::Text1), "");
    }

    #[test]
    fn dropped_receiver_detaches_on_scan_echo() {
        let display = Display::new();
        let conn = display.connect();
        drop(conn);
        display.send_scan_data("{}".into());
        assert_eq!(display.connected(), None);

        let mut next = display.connect();
        display.send_scan_data("{}".into());
        assert_eq!(next.rx.try_recv(), Ok(DisplayMessage::ScanData("{}".into())));
        assert_eq!(display.connected(), Some(next.id));
    }

    #[test]
    fn outbound_json_shape() {
        let msg = DisplayMessage::Field { slot: Slot::Text4, text: "NAME TAKEN, TRY AGAIN".into() };
        assert_eq!(
            msg.to_json(),
            serde_json::json!({"event": "text4", "data": "NAME TAKEN, TRY AGAIN"})
        );
        assert_eq!(
            DisplayMessage::ScanData("{}".into()).to_json(),
            serde_json::json!({"event": "json-data", "data": "{}"})
        );
    }

    #[test]
    fn parses_inbound_frames() {
        assert_eq!(DisplayEvent::parse(r#"{"event":"esc-key"}"#), Some(DisplayEvent::Cancel));

        let encoded = r#"{"event":"name-entered","data":"{\"cyberdeck_device_id\":\"AA\",\"cyberdeck_game_name\":\"Zero\"}"}"#;
        match DisplayEvent::parse(encoded) {
            Some(DisplayEvent::NameEntered(sub)) => {
                assert_eq!(sub.nickname, "Zero");
                assert_eq!(sub.device_id.as_deref(), Some("AA"));
            }
            other => panic!("unexpected {:?}", other),
        }

        let plain = r#"{"event":"name-entered","data":{"cyberdeck_game_name":"Zero"}}"#;
        assert!(matches!(DisplayEvent::parse(plain), Some(DisplayEvent::NameEntered(_))));
    }

    #[test]
    fn drops_bad_inbound_frames() {
        assert_eq!(DisplayEvent::parse("nope"), None);
        assert_eq!(DisplayEvent::parse(r#"{"event":"reboot"}"#), None);
        assert_eq!(DisplayEvent::parse(r#"{"event":"name-entered","data":"{broken"}"#), None);
    }
}
