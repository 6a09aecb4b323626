use bytes::{BufMut, BytesMut};
use nom_derive::*;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::{
    KeepalivePacket, NotificationPacket, OpenPacket, TrustRatePacket, UpdatePacket, VotingPacket,
};

pub const BGP_HEADER_LEN: u16 = 19;
pub const BGP_MARKER: [u8; 16] = [0xff; 16];
pub const BGP_MAX_LEN: usize = 4096;

#[repr(u8)]
#[derive(Debug, Clone, Copy, Eq, PartialEq, NomBE, TryFromPrimitive, IntoPrimitive)]
pub enum BgpType {
    Open = 1,
    Update = 2,
    Notification = 3,
    Keepalive = 4,
    TrustRate = 5,
    Voting = 6,
}

impl BgpType {
    /// Minimum total message length (header included) for this type.
    pub fn min_length(&self) -> u16 {
        match self {
            BgpType::Open => 29,
            BgpType::Update => 23,
            BgpType::Notification => 21,
            BgpType::Keepalive => BGP_HEADER_LEN,
            BgpType::TrustRate => 23,
            BgpType::Voting => 29,
        }
    }

    /// True for types with no variable-length trailer, where `min_length`
    /// is also the only valid length. KEEPALIVE/TRUSTRATE/VOTING are fixed
    /// shape; OPEN carries optional parameters, UPDATE and NOTIFICATION
    /// carry variable trailers, so none of those three are fixed.
    pub fn is_fixed_length(&self) -> bool {
        matches!(self, BgpType::Keepalive | BgpType::TrustRate | BgpType::Voting)
    }
}

#[derive(Debug, Clone, PartialEq, NomBE)]
pub struct BgpHeader {
    pub marker: [u8; 16],
    pub length: u16,
    pub typ: BgpType,
}

impl BgpHeader {
    pub fn new(typ: BgpType, length: u16) -> Self {
        Self {
            marker: BGP_MARKER,
            length,
            typ,
        }
    }
}

impl From<BgpHeader> for BytesMut {
    fn from(header: BgpHeader) -> Self {
        let mut buf = BytesMut::new();
        buf.put(&header.marker[..]);
        buf.put_u16(header.length);
        buf.put_u8(header.typ as u8);
        buf
    }
}

/// A decoded message, tagged by its wire type. OPEN, UPDATE, TRUSTRATE and
/// VOTING each carry their sender's AS number as one of their own fields
/// (`asn`, leftmost `AS_PATH` hop, `as_num`, `origin_as`); KEEPALIVE and
/// NOTIFICATION carry none, so callers resolve the peer from the
/// connection the message arrived on instead.
#[derive(Debug)]
pub enum BgpPacket {
    Open(Box<OpenPacket>),
    Update(Box<UpdatePacket>),
    Notification(NotificationPacket),
    Keepalive(KeepalivePacket),
    TrustRate(TrustRatePacket),
    Voting(VotingPacket),
}

impl BgpPacket {
    pub fn typ(&self) -> BgpType {
        match self {
            BgpPacket::Open(_) => BgpType::Open,
            BgpPacket::Update(_) => BgpType::Update,
            BgpPacket::Notification(_) => BgpType::Notification,
            BgpPacket::Keepalive(_) => BgpType::Keepalive,
            BgpPacket::TrustRate(_) => BgpType::TrustRate,
            BgpPacket::Voting(_) => BgpType::Voting,
        }
    }
}
