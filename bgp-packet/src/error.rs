use thiserror::Error;

use crate::notification::{NotifyCode, NotifySubCode};

/// A parse/validation failure, paired with the (code, subcode) that should
/// be sent back to the peer as a NOTIFICATION.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BgpParseError {
    #[error("connection not synchronized")]
    ConnectionNotSynchronized,

    #[error("bad message length: {0}")]
    BadMessageLength(u16),

    #[error("bad message type: {0}")]
    BadMessageType(u8),

    #[error("unsupported version number: {0}")]
    UnsupportedVersion(u8),

    #[error("bad peer AS: {0}")]
    BadPeerAs(u16),

    #[error("bad BGP identifier")]
    BadBgpIdentifier,

    #[error("unacceptable hold time: {0}")]
    UnacceptableHoldTime(u16),

    #[error("malformed attribute list")]
    MalformedAttributeList,

    #[error("invalid network field: prefix length {0} exceeds 32")]
    PrefixTooLong(u8),

    #[error("message incomplete, need {needed} more bytes")]
    Incomplete { needed: usize },

    #[error("nom parser error: {0}")]
    NomError(String),
}

impl BgpParseError {
    /// True when the failure means "not enough bytes yet" rather than a
    /// protocol violation — the reader loop should keep buffering instead of
    /// sending a NOTIFICATION.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, BgpParseError::Incomplete { .. })
    }

    /// The (code, subcode) pair this error maps to, per the RFC-4271-aligned
    /// taxonomy. Used to build the NOTIFICATION sent back to the peer.
    /// Callers must not invoke this for [`BgpParseError::Incomplete`].
    pub fn notify_code(&self) -> (NotifyCode, NotifySubCode) {
        use BgpParseError::*;
        match self {
            ConnectionNotSynchronized => (
                NotifyCode::MessageHeaderError,
                NotifySubCode::ConnectionNotSynchronized,
            ),
            BadMessageLength(_) => (
                NotifyCode::MessageHeaderError,
                NotifySubCode::BadMessageLength,
            ),
            BadMessageType(_) => (
                NotifyCode::MessageHeaderError,
                NotifySubCode::BadMessageType,
            ),
            UnsupportedVersion(_) => (NotifyCode::OpenMessageError, NotifySubCode::UnsupportedVersion),
            BadPeerAs(_) => (NotifyCode::OpenMessageError, NotifySubCode::BadPeerAs),
            BadBgpIdentifier => (NotifyCode::OpenMessageError, NotifySubCode::BadBgpIdentifier),
            UnacceptableHoldTime(_) => (
                NotifyCode::OpenMessageError,
                NotifySubCode::UnacceptableHoldTime,
            ),
            MalformedAttributeList => (
                NotifyCode::UpdateMessageError,
                NotifySubCode::MalformedAttributeList,
            ),
            PrefixTooLong(_) => (
                NotifyCode::UpdateMessageError,
                NotifySubCode::PrefixTooLong,
            ),
            Incomplete { .. } => {
                unreachable!("Incomplete is a buffering signal, never sent as a NOTIFICATION")
            }
            NomError(_) => (
                NotifyCode::MessageHeaderError,
                NotifySubCode::BadMessageType,
            ),
        }
    }
}

impl From<nom::Err<nom::error::Error<&[u8]>>> for BgpParseError {
    fn from(err: nom::Err<nom::error::Error<&[u8]>>) -> Self {
        match err {
            nom::Err::Incomplete(needed) => {
                let needed = match needed {
                    nom::Needed::Unknown => 0,
                    nom::Needed::Size(size) => size.get(),
                };
                BgpParseError::Incomplete { needed }
            }
            nom::Err::Error(e) | nom::Err::Failure(e) => {
                BgpParseError::NomError(format!("{:?}: {} byte(s) remaining", e.code, e.input.len()))
            }
        }
    }
}

impl<I> nom::error::ParseError<I> for BgpParseError {
    fn from_error_kind(_input: I, kind: nom::error::ErrorKind) -> Self {
        BgpParseError::NomError(format!("{:?}", kind))
    }

    fn append(_input: I, kind: nom::error::ErrorKind, other: Self) -> Self {
        match other {
            BgpParseError::NomError(msg) => BgpParseError::NomError(format!("{}, {:?}", msg, kind)),
            _ => other,
        }
    }
}
