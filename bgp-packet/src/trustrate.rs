use bytes::{BufMut, BytesMut};
use nom_derive::*;

use crate::{BgpHeader, BgpType};

/// Fixed-point scale used to carry a trust value (nominally in `[0,1]`, though
/// effective trust is not itself bounded — see the trust module) across the
/// wire as a `u16`.
pub const TRUST_SCALE: f64 = 10_000.0;

pub fn encode_trust(value: f64) -> u16 {
    (value * TRUST_SCALE).round().clamp(0.0, u16::MAX as f64) as u16
}

pub fn decode_trust(raw: u16) -> f64 {
    raw as f64 / TRUST_SCALE
}

/// Periodic peer-to-peer exchange of inherent trust, carried simulator-side
/// (not part of real BGP).
#[derive(Debug, Clone, PartialEq, NomBE)]
pub struct TrustRatePacket {
    pub header: BgpHeader,
    pub as_num: u16,
    pub trust_value: u16,
}

impl TrustRatePacket {
    pub fn new(as_num: u16, trust: f64) -> Self {
        Self {
            header: BgpHeader::new(BgpType::TrustRate, BgpType::TrustRate.min_length()),
            as_num,
            trust_value: encode_trust(trust),
        }
    }

    pub fn trust(&self) -> f64 {
        decode_trust(self.trust_value)
    }
}

impl From<TrustRatePacket> for BytesMut {
    fn from(packet: TrustRatePacket) -> Self {
        let mut buf = BytesMut::new();
        let header: BytesMut = packet.header.into();
        buf.put(&header[..]);
        buf.put_u16(packet.as_num);
        buf.put_u16(packet.trust_value);
        buf
    }
}
