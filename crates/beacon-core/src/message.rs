//! Broadcast payloads.
//!
//! A [`BroadcastMessage`] is immutable once built. Its origin metadata
//! (worker identity and timestamp) only shapes the human-readable text that
//! [`BroadcastMessage::render`] produces; the bus carries the rendered text.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::ids::ProcessId;

/// What produced a broadcast.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Plain text a client sent, relayed to everyone.
    Chat,
    /// Reply to a control token (`ping` / `test`).
    Status,
    /// Lock-gated periodic notification.
    Periodic,
}

/// An immutable text payload plus its origin.
#[derive(Clone, Debug, Serialize)]
pub struct BroadcastMessage {
    kind: MessageKind,
    body: String,
    origin: ProcessId,
    timestamp: DateTime<Utc>,
}

impl BroadcastMessage {
    /// A client's text, relayed verbatim.
    pub fn chat(origin: ProcessId, body: impl Into<String>) -> Self {
        Self::new(MessageKind::Chat, origin, body.into())
    }

    /// A system status report triggered by a control token.
    pub fn status(origin: ProcessId, local_connections: usize) -> Self {
        Self::new(
            MessageKind::Status,
            origin,
            format!("status check OK, {local_connections} client(s) connected to this worker"),
        )
    }

    /// The periodic "still running" notification.
    pub fn periodic(origin: ProcessId) -> Self {
        Self::new(
            MessageKind::Periodic,
            origin,
            "Real-time notification: server is still running".to_owned(),
        )
    }

    fn new(kind: MessageKind, origin: ProcessId, body: String) -> Self {
        Self {
            kind,
            body,
            origin,
            timestamp: Utc::now(),
        }
    }

    /// Override the timestamp (deterministic rendering in tests).
    #[must_use]
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Payload kind.
    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Un-decorated body text.
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Worker that produced this message.
    pub fn origin(&self) -> ProcessId {
        self.origin
    }

    /// When the message was composed.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Text frame delivered to clients.
    ///
    /// Chat bodies are embedded unmodified so clients see exactly what the
    /// sender typed.
    pub fn render(&self) -> String {
        let time = self.timestamp.format("%H:%M:%S");
        match self.kind {
            MessageKind::Chat => format!("[worker {}] {}", self.origin, self.body),
            MessageKind::Status => {
                format!("[system] worker {} at {time}: {}", self.origin, self.body)
            }
            MessageKind::Periodic => {
                format!("[notification] {} (worker {}, {time})", self.body, self.origin)
            }
        }
    }
}

impl fmt::Display for BroadcastMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Greeting sent directly to a socket right after it is registered.
pub fn welcome(origin: ProcessId, connected_at: DateTime<Utc>) -> String {
    format!(
        "Welcome! Connected to worker {origin} at {}",
        connected_at.format("%Y-%m-%d %H:%M:%S UTC")
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::TimeZone;

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn chat_keeps_body_verbatim() {
        let msg = BroadcastMessage::chat(ProcessId::from(11), "hello \"world\" <3");
        assert_matches!(msg.kind(), MessageKind::Chat);
        assert_eq!(msg.render(), "[worker 11] hello \"world\" <3");
    }

    #[test]
    fn status_is_distinct_from_chat_of_same_word() {
        let status = BroadcastMessage::status(ProcessId::from(11), 2).render();
        let chat = BroadcastMessage::chat(ProcessId::from(11), "ping").render();
        assert_ne!(status, chat);
        assert!(status.starts_with("[system]"));
        assert!(status.contains("2 client(s)"));
    }

    #[test]
    fn periodic_names_worker_and_time() {
        let msg = BroadcastMessage::periodic(ProcessId::from(99)).at(noon());
        assert_matches!(msg.kind(), MessageKind::Periodic);
        let text = msg.render();
        assert!(text.starts_with("[notification]"));
        assert!(text.contains("worker 99"));
        assert!(text.contains("12:00:00"));
    }

    #[test]
    fn display_matches_render() {
        let msg = BroadcastMessage::chat(ProcessId::from(1), "x");
        assert_eq!(msg.to_string(), msg.render());
    }

    #[test]
    fn welcome_identifies_worker_and_time() {
        let text = welcome(ProcessId::from(321), noon());
        assert!(text.starts_with("Welcome!"));
        assert!(text.contains("worker 321"));
        assert!(text.contains("2026-01-01 12:00:00"));
    }

    #[test]
    fn accessors_expose_origin() {
        let msg = BroadcastMessage::chat(ProcessId::from(5), "body").at(noon());
        assert_eq!(msg.origin(), ProcessId::from(5));
        assert_eq!(msg.body(), "body");
        assert_eq!(msg.timestamp(), noon());
    }
}
