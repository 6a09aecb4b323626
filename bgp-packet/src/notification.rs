use std::fmt;

use bytes::{BufMut, BytesMut};
use nom::bytes::complete::take;
use nom_derive::*;
use serde::Serialize;

use crate::{BgpHeader, BgpParseError, BgpType};

#[derive(Debug, Clone, PartialEq, NomBE)]
pub struct NotificationPacket {
    pub header: BgpHeader,
    pub code: NotifyCode,
    pub sub_code: u8,
    #[nom(Ignore)]
    pub data: Vec<u8>,
}

impl NotificationPacket {
    pub fn new(code: NotifyCode, sub_code: NotifySubCode) -> Self {
        Self {
            header: BgpHeader::new(BgpType::Notification, BgpType::Notification.min_length()),
            code,
            sub_code: sub_code.as_u8(),
            data: Vec::new(),
        }
    }

    pub fn from_error(err: &BgpParseError) -> Self {
        let (code, sub_code) = err.notify_code();
        Self::new(code, sub_code)
    }

    pub fn parse_packet(input: &[u8]) -> Result<(&[u8], NotificationPacket), BgpParseError> {
        let (input, packet) = NotificationPacket::parse_be(input)?;
        let trailer = packet.header.length.saturating_sub(BgpType::Notification.min_length());
        let (input, data) = take::<_, _, nom::error::Error<&[u8]>>(trailer as usize)(input)
            .map_err(BgpParseError::from)?;
        Ok((
            input,
            NotificationPacket {
                data: data.to_vec(),
                ..packet
            },
        ))
    }
}

impl From<NotificationPacket> for BytesMut {
    fn from(notification: NotificationPacket) -> Self {
        let mut buf = BytesMut::new();
        let header: BytesMut = notification.header.into();
        buf.put(&header[..]);
        buf.put_u8(notification.code as u8);
        buf.put_u8(notification.sub_code);
        buf.put(&notification.data[..]);

        const LENGTH_POS: std::ops::Range<usize> = 16..18;
        let length = buf.len() as u16;
        buf[LENGTH_POS].copy_from_slice(&length.to_be_bytes());
        buf
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, NomBE)]
#[serde(rename_all = "kebab-case")]
pub enum NotifyCode {
    MessageHeaderError = 1,
    OpenMessageError = 2,
    UpdateMessageError = 3,
    HoldTimerExpired = 4,
    FsmError = 5,
    Cease = 6,
}

impl fmt::Display for NotifyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use NotifyCode::*;
        match self {
            MessageHeaderError => write!(f, "Message Header Error"),
            OpenMessageError => write!(f, "OPEN Message Error"),
            UpdateMessageError => write!(f, "UPDATE Message Error"),
            HoldTimerExpired => write!(f, "Hold Timer Expired"),
            FsmError => write!(f, "Finite State Machine Error"),
            Cease => write!(f, "Cease"),
        }
    }
}

/// Subcode space, shared across the small set of (code, subcode) pairs this
/// simulator actually raises. `as_u8` recovers the wire value.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum NotifySubCode {
    ConnectionNotSynchronized,
    BadMessageLength,
    BadMessageType,
    UnsupportedVersion,
    BadPeerAs,
    BadBgpIdentifier,
    UnsupportedOptionalParameter,
    UnacceptableHoldTime,
    MalformedAttributeList,
    InvalidNetworkField,
    /// Simulator-private: prefix length exceeds 32 bits. Distinct from the
    /// RFC's `InvalidNetworkField`, which this simulator does not otherwise
    /// raise.
    PrefixTooLong,
    UnexpectedMessage,
}

impl NotifySubCode {
    pub fn as_u8(&self) -> u8 {
        use NotifySubCode::*;
        match self {
            ConnectionNotSynchronized => 1,
            BadMessageLength => 2,
            BadMessageType => 3,
            UnsupportedVersion => 1,
            BadPeerAs => 2,
            BadBgpIdentifier => 3,
            UnsupportedOptionalParameter => 4,
            UnacceptableHoldTime => 6,
            MalformedAttributeList => 1,
            InvalidNetworkField => 10,
            PrefixTooLong => 2,
            UnexpectedMessage => 1,
        }
    }
}

impl fmt::Display for NotifySubCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
