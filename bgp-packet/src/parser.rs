use nom::combinator::peek;
use nom_derive::*;

use crate::{
    BgpHeader, BgpPacket, BgpParseError, BgpType, KeepalivePacket, NotificationPacket, OpenPacket,
    TrustRatePacket, UpdatePacket, VotingPacket,
    packet::{BGP_MARKER, BGP_MAX_LEN},
};

/// Peeks the 2-byte length field (bytes 16..18) without consuming input.
/// Used by the reader loop to decide how many more bytes to buffer before
/// attempting a full parse.
pub fn peek_bgp_length(input: &[u8]) -> usize {
    input
        .get(16..18)
        .map(|len| u16::from_be_bytes([len[0], len[1]]) as usize)
        .unwrap_or(0)
}

/// Validates the fixed 19-byte header in isolation, independent of the
/// type-specific body. This is the `verify_header()` contract.
pub fn verify_header(header: &BgpHeader) -> Result<BgpType, BgpParseError> {
    if header.marker != BGP_MARKER {
        return Err(BgpParseError::ConnectionNotSynchronized);
    }
    if header.length as usize > BGP_MAX_LEN {
        return Err(BgpParseError::BadMessageLength(header.length));
    }
    let typ = header.typ;
    if header.length < typ.min_length() {
        return Err(BgpParseError::BadMessageLength(header.length));
    }
    if typ.is_fixed_length() && header.length != typ.min_length() {
        return Err(BgpParseError::BadMessageLength(header.length));
    }
    Ok(typ)
}

impl BgpPacket {
    pub fn parse_packet(input: &[u8]) -> Result<(&[u8], BgpPacket), BgpParseError> {
        // The type byte sits at offset 18. Check it against the known set
        // before handing the header to `BgpType`'s NomBE-derived parser,
        // which would otherwise surface an unknown type as a generic
        // `NomError` rather than the MessageHeaderError(BadMessageType)
        // NOTIFICATION callers need to send back.
        if let Some(&typ_byte) = input.get(18) {
            if BgpType::try_from(typ_byte).is_err() {
                return Err(BgpParseError::BadMessageType(typ_byte));
            }
        }
        let (_, header) = peek(BgpHeader::parse_be).parse(input)?;
        verify_header(&header)?;
        match header.typ {
            BgpType::Open => {
                let (input, packet) = OpenPacket::parse_packet(input)?;
                Ok((input, BgpPacket::Open(Box::new(packet))))
            }
            BgpType::Update => {
                let (input, packet) = UpdatePacket::parse_packet(input)?;
                Ok((input, BgpPacket::Update(Box::new(packet))))
            }
            BgpType::Notification => {
                let (input, packet) = NotificationPacket::parse_packet(input)?;
                Ok((input, BgpPacket::Notification(packet)))
            }
            BgpType::Keepalive => {
                let (input, header) = KeepalivePacket::parse_be(input)?;
                Ok((input, BgpPacket::Keepalive(header)))
            }
            BgpType::TrustRate => {
                let (input, packet) = TrustRatePacket::parse_be(input)?;
                Ok((input, BgpPacket::TrustRate(packet)))
            }
            BgpType::Voting => {
                let (input, packet) = VotingPacket::parse_be(input)?;
                Ok((input, BgpPacket::Voting(packet)))
            }
        }
    }
}
