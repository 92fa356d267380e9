//! Transfer error taxonomy
//!
//! Decode-level problems ([`PacketError`](super::PacketError)) and traffic from
//! foreign addresses are recovered inside the session and never show up here.
//! A [`TransferError`] is always terminal for the transfer it belongs to and is
//! delivered to both the session's caller and the handler's end of the bridge.

use std::fmt;
use std::io;
use std::sync::Arc;

/// RFC 1350 error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// 0: not defined, see error message
    NotDefined = 0,
    /// 1: file not found
    FileNotFound = 1,
    /// 2: access violation
    AccessViolation = 2,
    /// 3: disk full or allocation exceeded
    DiskFull = 3,
    /// 4: illegal TFTP operation
    IllegalOperation = 4,
    /// 5: unknown transfer ID
    UnknownTransferId = 5,
    /// 6: file already exists
    FileAlreadyExists = 6,
    /// 7: no such user
    NoSuchUser = 7,
}

impl ErrorCode {
    /// Map a wire value to a known code. Unknown values collapse to `NotDefined`.
    pub fn from_u16(value: u16) -> Self {
        match value {
            1 => Self::FileNotFound,
            2 => Self::AccessViolation,
            3 => Self::DiskFull,
            4 => Self::IllegalOperation,
            5 => Self::UnknownTransferId,
            6 => Self::FileAlreadyExists,
            7 => Self::NoSuchUser,
            _ => Self::NotDefined,
        }
    }

    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Message used when the caller does not provide one
    pub fn default_message(self) -> &'static str {
        match self {
            Self::NotDefined => "Undefined error",
            Self::FileNotFound => "File not found",
            Self::AccessViolation => "Access violation",
            Self::DiskFull => "Disk full or allocation exceeded",
            Self::IllegalOperation => "Illegal TFTP operation",
            Self::UnknownTransferId => "Unknown transfer ID",
            Self::FileAlreadyExists => "File already exists",
            Self::NoSuchUser => "No such user",
        }
    }
}

impl From<ErrorCode> for u16 {
    fn from(code: ErrorCode) -> Self {
        code.as_u16()
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.default_message(), self.as_u16())
    }
}

/// Terminal failure of a single transfer.
#[derive(Debug, Clone)]
pub enum TransferError {
    /// Retry budget exhausted without hearing from the peer.
    Timeout,
    /// The peer sent an ERROR packet.
    PeerAbort { code: u16, message: String },
    /// The UDP socket failed.
    Transport(Arc<io::Error>),
    /// The handler closed its end of the bridge with an error.
    Handler { code: ErrorCode, message: String },
    /// The other end of the bridge went away without giving a reason.
    Closed,
}

impl TransferError {
    /// Handler failure reported to the peer as code 0.
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler {
            code: ErrorCode::NotDefined,
            message: message.into(),
        }
    }

    /// Handler failure reported to the peer with an explicit code.
    pub fn with_code(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Handler {
            code,
            message: message.into(),
        }
    }

    /// Code and message to put in the ERROR packet sent to the peer when a
    /// session fails because of this error.
    pub fn wire_error(&self) -> (ErrorCode, String) {
        match self {
            Self::Handler { code, message } => (*code, message.clone()),
            Self::Closed => (ErrorCode::NotDefined, "Transfer aborted by handler".to_string()),
            other => (ErrorCode::NotDefined, other.to_string()),
        }
    }

    /// True for failures that originate from the handler side of the bridge.
    pub fn is_handler_failure(&self) -> bool {
        matches!(self, Self::Handler { .. } | Self::Closed)
    }
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "transfer timed out"),
            Self::PeerAbort { code, message } => write!(f, "peer aborted transfer (code {code}): {message}"),
            Self::Transport(e) => write!(f, "socket I/O error: {e}"),
            Self::Handler { code, message } => write!(f, "handler failed (code {}): {message}", code.as_u16()),
            Self::Closed => write!(f, "stream closed by the other end"),
        }
    }
}

impl std::error::Error for TransferError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<io::Error> for TransferError {
    fn from(e: io::Error) -> Self {
        Self::Transport(Arc::new(e))
    }
}
