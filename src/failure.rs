//! Maps `<stream:error>` and `<failure>` stanzas to what the client must do next.
//!
//! Classification is pure; [`Client`](crate::client::Client) applies the outcome.

use crate::binary::Node;
use crate::types::events::{
    ConnectFailure, ConnectFailureReason, Event, LoggedOut, StreamError, StreamReplaced,
};

#[derive(Debug, Clone, PartialEq)]
pub enum StreamErrorOutcome {
    /// Code 515: the server wants a fresh connection.
    Reconnect,
    /// Code 401 with a `device_removed` conflict: the device was unlinked.
    LoggedOut,
    /// A `replaced` conflict: another client took over the session.
    Replaced,
    /// Code 503: the socket closes and auto-reconnect takes care of it.
    SelfHeal,
    Unknown { code: String, raw: Node },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectFailureOutcome {
    /// Reason 401: the stored credentials are no longer valid.
    LoggedOut,
    Other {
        reason: ConnectFailureReason,
        message: String,
        raw: Node,
    },
}

pub fn classify_stream_error(node: &Node) -> StreamErrorOutcome {
    let mut attrs = node.attrs();
    let code = attrs
        .optional_string("code")
        .map(|c| c.into_owned())
        .unwrap_or_default();
    let conflict_type = node
        .get_optional_child("conflict")
        .and_then(|c| c.attrs().optional_string("type").map(|t| t.into_owned()))
        .unwrap_or_default();

    match (code.as_str(), conflict_type.as_str()) {
        ("515", _) => StreamErrorOutcome::Reconnect,
        ("401", "device_removed") => StreamErrorOutcome::LoggedOut,
        (_, "replaced") => StreamErrorOutcome::Replaced,
        ("503", _) => StreamErrorOutcome::SelfHeal,
        _ => StreamErrorOutcome::Unknown {
            code,
            raw: node.clone(),
        },
    }
}

pub fn classify_connect_failure(node: &Node) -> ConnectFailureOutcome {
    let mut attrs = node.attrs();
    let reason = attrs
        .optional_string("reason")
        .map(|r| r.into_owned())
        .unwrap_or_default();
    if reason == "401" {
        return ConnectFailureOutcome::LoggedOut;
    }
    ConnectFailureOutcome::Other {
        reason: ConnectFailureReason::from(reason.as_str()),
        message: attrs
            .optional_string("message")
            .map(|m| m.into_owned())
            .unwrap_or_default(),
        raw: node.clone(),
    }
}

impl StreamErrorOutcome {
    pub fn marks_disconnect_expected(&self) -> bool {
        matches!(self, Self::LoggedOut | Self::Replaced)
    }

    pub fn purges_credentials(&self) -> bool {
        matches!(self, Self::LoggedOut)
    }

    /// The event observers get to see, if any.
    pub fn event(&self) -> Option<Event> {
        match self {
            Self::Reconnect | Self::SelfHeal => None,
            Self::LoggedOut => Some(Event::LoggedOut(LoggedOut {
                on_connect: false,
                reason: ConnectFailureReason::LoggedOut,
            })),
            Self::Replaced => Some(Event::StreamReplaced(StreamReplaced)),
            Self::Unknown { code, raw } => Some(Event::StreamError(StreamError {
                code: code.clone(),
                raw: Some(raw.clone()),
            })),
        }
    }
}

impl ConnectFailureOutcome {
    pub fn marks_disconnect_expected(&self) -> bool {
        true
    }

    pub fn purges_credentials(&self) -> bool {
        matches!(self, Self::LoggedOut)
    }

    pub fn event(&self) -> Event {
        match self {
            Self::LoggedOut => Event::LoggedOut(LoggedOut {
                on_connect: true,
                reason: ConnectFailureReason::LoggedOut,
            }),
            Self::Other {
                reason,
                message,
                raw,
            } => Event::ConnectFailure(ConnectFailure {
                reason: reason.clone(),
                message: message.clone(),
                raw: Some(raw.clone()),
            }),
        }
    }
}
