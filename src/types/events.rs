use crate::binary::{Jid, Node};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Everything the client reports to registered event handlers.
#[derive(Debug, Clone, Serialize)]
pub enum Event {
    Qr(Qr),
    PairSuccess(PairSuccess),
    PairError(PairError),
    QrScannedWithoutMultidevice(QrScannedWithoutMultidevice),

    Connected(Connected),
    Disconnected(Disconnected),
    LoggedOut(LoggedOut),
    StreamReplaced(StreamReplaced),
    ConnectFailure(ConnectFailure),
    StreamError(StreamError),
    KeepAliveTimeout(KeepAliveTimeout),
    KeepAliveRestored(KeepAliveRestored),

    // Raw stanzas handed through for the embedding application.
    HistorySync(Arc<Node>),
    Message(Arc<Node>),
    Receipt(Arc<Node>),
    Presence(Arc<Node>),
    GroupInfo(Arc<Node>),
    Notification(Arc<Node>),
}

impl Event {
    /// Short name of the variant, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Qr(_) => "Qr",
            Event::PairSuccess(_) => "PairSuccess",
            Event::PairError(_) => "PairError",
            Event::QrScannedWithoutMultidevice(_) => "QrScannedWithoutMultidevice",
            Event::Connected(_) => "Connected",
            Event::Disconnected(_) => "Disconnected",
            Event::LoggedOut(_) => "LoggedOut",
            Event::StreamReplaced(_) => "StreamReplaced",
            Event::ConnectFailure(_) => "ConnectFailure",
            Event::StreamError(_) => "StreamError",
            Event::KeepAliveTimeout(_) => "KeepAliveTimeout",
            Event::KeepAliveRestored(_) => "KeepAliveRestored",
            Event::HistorySync(_) => "HistorySync",
            Event::Message(_) => "Message",
            Event::Receipt(_) => "Receipt",
            Event::Presence(_) => "Presence",
            Event::GroupInfo(_) => "GroupInfo",
            Event::Notification(_) => "Notification",
        }
    }
}

/// Pairing codes to render as QR, the first one valid now.
#[derive(Debug, Clone, Serialize)]
pub struct Qr {
    pub codes: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PairSuccess {
    pub id: Jid,
    pub business_name: String,
    pub platform: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PairError {
    pub id: Jid,
    pub business_name: String,
    pub platform: String,
    pub error: String,
}

/// The QR code was scanned by a phone that does not have multi-device enabled.
#[derive(Debug, Clone, Serialize)]
pub struct QrScannedWithoutMultidevice;

#[derive(Debug, Clone, Serialize)]
pub struct Connected;

#[derive(Debug, Clone, Serialize)]
pub struct Disconnected;

#[derive(Debug, Clone, Serialize)]
pub struct KeepAliveTimeout {
    pub error_count: u32,
    pub last_success: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct KeepAliveRestored;

/// The device was unlinked. `on_connect` tells whether the server refused
/// the login or removed an established session.
#[derive(Debug, Clone, Serialize)]
pub struct LoggedOut {
    pub on_connect: bool,
    pub reason: ConnectFailureReason,
}

/// Another client connected with the same credentials.
#[derive(Debug, Clone, Serialize)]
pub struct StreamReplaced;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ConnectFailureReason {
    Generic,
    LoggedOut,
    TempBanned,
    MainDeviceGone,
    UnknownLogout,
    ClientOutdated,
    BadUserAgent,
    InternalServerError,
    Experimental,
    ServiceUnavailable,
    Unknown(i32),
    /// A reason the server sent that is not a numeric code, kept verbatim.
    Unrecognized(String),
}

impl From<i32> for ConnectFailureReason {
    fn from(code: i32) -> Self {
        match code {
            400 => Self::Generic,
            401 => Self::LoggedOut,
            402 => Self::TempBanned,
            403 => Self::MainDeviceGone,
            405 => Self::ClientOutdated,
            406 => Self::UnknownLogout,
            409 => Self::BadUserAgent,
            500 => Self::InternalServerError,
            501 => Self::Experimental,
            503 => Self::ServiceUnavailable,
            _ => Self::Unknown(code),
        }
    }
}

impl From<&str> for ConnectFailureReason {
    fn from(reason: &str) -> Self {
        reason
            .parse::<i32>()
            .map(Self::from)
            .unwrap_or_else(|_| Self::Unrecognized(reason.to_string()))
    }
}

impl ConnectFailureReason {
    pub fn code(&self) -> i32 {
        match self {
            Self::Generic => 400,
            Self::LoggedOut => 401,
            Self::TempBanned => 402,
            Self::MainDeviceGone => 403,
            Self::ClientOutdated => 405,
            Self::UnknownLogout => 406,
            Self::BadUserAgent => 409,
            Self::InternalServerError => 500,
            Self::Experimental => 501,
            Self::ServiceUnavailable => 503,
            Self::Unknown(code) => *code,
            Self::Unrecognized(_) => 0,
        }
    }

    pub fn is_logged_out(&self) -> bool {
        matches!(
            self,
            Self::LoggedOut | Self::MainDeviceGone | Self::UnknownLogout
        )
    }
}

impl fmt::Display for ConnectFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(code) => write!(f, "unknown ({code})"),
            Self::Unrecognized(reason) => write!(f, "unrecognized ({reason})"),
            other => write!(f, "{other:?} ({})", other.code()),
        }
    }
}

/// The server rejected the login for a reason other than logout.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectFailure {
    pub reason: ConnectFailureReason,
    pub message: String,
    pub raw: Option<Node>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StreamError {
    pub code: String,
    pub raw: Option<Node>,
}
