use std::net::Ipv4Addr;

use bytes::{BufMut, BytesMut};
use nom_derive::*;

use crate::{BgpHeader, BgpParseError, BgpType, packet::BGP_HEADER_LEN};

pub const BGP_VERSION: u8 = 4;

#[derive(Debug, Clone, PartialEq, NomBE)]
pub struct OpenPacket {
    pub header: BgpHeader,
    pub version: u8,
    pub asn: u16,
    pub hold_time: u16,
    pub bgp_id: [u8; 4],
    pub opt_param_len: u8,
}

impl OpenPacket {
    pub fn new(asn: u16, hold_time: u16, router_id: Ipv4Addr) -> OpenPacket {
        OpenPacket {
            header: BgpHeader::new(BgpType::Open, BgpType::Open.min_length()),
            version: BGP_VERSION,
            asn,
            hold_time,
            bgp_id: router_id.octets(),
            opt_param_len: 0,
        }
    }

    pub fn bgp_id(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.bgp_id)
    }

    /// Validates the fields the header check can't see. See the OPEN
    /// Errors subcode table.
    pub fn verify(&self) -> Result<(), BgpParseError> {
        if self.version != BGP_VERSION {
            return Err(BgpParseError::UnsupportedVersion(self.version));
        }
        if self.asn == 0 {
            return Err(BgpParseError::BadPeerAs(self.asn));
        }
        let id = self.bgp_id();
        if id.is_unspecified() || id.is_multicast() || id.is_broadcast() {
            return Err(BgpParseError::BadBgpIdentifier);
        }
        if self.hold_time == 0 || self.hold_time > 100 {
            return Err(BgpParseError::UnacceptableHoldTime(self.hold_time));
        }
        Ok(())
    }

    pub fn parse_packet(input: &[u8]) -> Result<(&[u8], OpenPacket), BgpParseError> {
        let (input, packet) = OpenPacket::parse_be(input)?;
        packet.verify()?;
        // No optional parameters are ever emitted; any opt_param_len bytes
        // present are consumed and discarded.
        let (input, _opts) =
            nom::bytes::complete::take(packet.opt_param_len as usize)(input)
                .map_err(|e: nom::Err<nom::error::Error<&[u8]>>| BgpParseError::from(e))?;
        Ok((input, packet))
    }
}

impl From<OpenPacket> for BytesMut {
    fn from(open: OpenPacket) -> Self {
        let mut buf = BytesMut::new();
        let header: BytesMut = open.header.into();
        buf.put(&header[..]);
        buf.put_u8(open.version);
        buf.put_u16(open.asn);
        buf.put_u16(open.hold_time);
        buf.put(&open.bgp_id[..]);
        buf.put_u8(open.opt_param_len);

        const LENGTH_POS: std::ops::Range<usize> = 16..18;
        let length = buf.len() as u16;
        buf[LENGTH_POS].copy_from_slice(&length.to_be_bytes());
        buf
    }
}

#[derive(Debug, Clone, PartialEq, NomBE)]
pub struct KeepalivePacket {
    pub header: BgpHeader,
}

impl KeepalivePacket {
    pub fn new() -> Self {
        Self {
            header: BgpHeader::new(BgpType::Keepalive, BGP_HEADER_LEN),
        }
    }
}

impl Default for KeepalivePacket {
    fn default() -> Self {
        Self::new()
    }
}

impl From<KeepalivePacket> for BytesMut {
    fn from(keepalive: KeepalivePacket) -> Self {
        keepalive.header.into()
    }
}
