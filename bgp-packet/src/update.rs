use bytes::{BufMut, BytesMut};
use ipnet::Ipv4Net;
use nom::IResult;
use nom::bytes::complete::take;
use nom::number::complete::{be_u8, be_u16, be_u32, be_u64};
use nom_derive::*;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::net::Ipv4Addr;

use crate::{BgpHeader, BgpParseError, BgpType};

#[repr(u8)]
#[derive(Debug, Clone, Copy, Eq, PartialEq, NomBE)]
pub enum Origin {
    Igp = 0,
    Egp = 1,
    Incomplete = 2,
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, Eq, PartialEq, TryFromPrimitive, IntoPrimitive)]
enum AttrType {
    Origin = 1,
    NextHop = 2,
    LocalPref = 3,
    Weight = 4,
    AsPath = 5,
    TrustRate = 6,
    Med = 7,
}

/// The UPDATE path-attribute set this simulator cares about. Unlike real
/// BGP, attributes are carried as a flat, fixed-shape bag rather than a
/// general TLV grammar with flags.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathAttrs {
    pub origin: Option<Origin>,
    pub next_hop: Option<Ipv4Addr>,
    pub local_pref: Option<u32>,
    pub weight: Option<u32>,
    pub as_path: Vec<u16>,
    pub trust_rate: Option<f64>,
    pub med: Option<u32>,
}

impl PathAttrs {
    fn encode(&self, buf: &mut BytesMut) {
        if let Some(origin) = self.origin {
            buf.put_u8(AttrType::Origin as u8);
            buf.put_u16(1);
            buf.put_u8(origin as u8);
        }
        if let Some(next_hop) = self.next_hop {
            buf.put_u8(AttrType::NextHop as u8);
            buf.put_u16(4);
            buf.put(&next_hop.octets()[..]);
        }
        if let Some(local_pref) = self.local_pref {
            buf.put_u8(AttrType::LocalPref as u8);
            buf.put_u16(4);
            buf.put_u32(local_pref);
        }
        if let Some(weight) = self.weight {
            buf.put_u8(AttrType::Weight as u8);
            buf.put_u16(4);
            buf.put_u32(weight);
        }
        if !self.as_path.is_empty() {
            buf.put_u8(AttrType::AsPath as u8);
            buf.put_u16(1 + 2 * self.as_path.len() as u16);
            buf.put_u8(self.as_path.len() as u8);
            for asn in &self.as_path {
                buf.put_u16(*asn);
            }
        }
        if let Some(trust_rate) = self.trust_rate {
            buf.put_u8(AttrType::TrustRate as u8);
            buf.put_u16(8);
            buf.put_u64(trust_rate.to_bits());
        }
        if let Some(med) = self.med {
            buf.put_u8(AttrType::Med as u8);
            buf.put_u16(4);
            buf.put_u32(med);
        }
    }

    fn encoded_len(&self) -> u16 {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf.len() as u16
    }

    fn parse(mut input: &[u8]) -> Result<PathAttrs, BgpParseError> {
        let mut attrs = PathAttrs::default();
        while !input.is_empty() {
            let (rest, (typ, len)) =
                attr_tlv_header(input).map_err(BgpParseError::from)?;
            let (rest, value) =
                take::<_, _, nom::error::Error<&[u8]>>(len as usize)(rest)
                    .map_err(BgpParseError::from)?;
            match AttrType::try_from(typ) {
                Ok(AttrType::Origin) => {
                    let (_, o) = Origin::parse_be(value).map_err(BgpParseError::from)?;
                    attrs.origin = Some(o);
                }
                Ok(AttrType::NextHop) => {
                    if value.len() == 4 {
                        attrs.next_hop = Some(Ipv4Addr::new(value[0], value[1], value[2], value[3]));
                    }
                }
                Ok(AttrType::LocalPref) => {
                    let (_, v) = be_u32::<_, nom::error::Error<&[u8]>>(value)
                        .map_err(BgpParseError::from)?;
                    attrs.local_pref = Some(v);
                }
                Ok(AttrType::Weight) => {
                    let (_, v) = be_u32::<_, nom::error::Error<&[u8]>>(value)
                        .map_err(BgpParseError::from)?;
                    attrs.weight = Some(v);
                }
                Ok(AttrType::AsPath) => {
                    let (mut rest, count) =
                        be_u8::<_, nom::error::Error<&[u8]>>(value).map_err(BgpParseError::from)?;
                    let mut path = Vec::with_capacity(count as usize);
                    for _ in 0..count {
                        let (next, asn) = be_u16::<_, nom::error::Error<&[u8]>>(rest)
                            .map_err(BgpParseError::from)?;
                        path.push(asn);
                        rest = next;
                    }
                    attrs.as_path = path;
                }
                Ok(AttrType::TrustRate) => {
                    let (_, raw) = be_u64::<_, nom::error::Error<&[u8]>>(value)
                        .map_err(BgpParseError::from)?;
                    attrs.trust_rate = Some(f64::from_bits(raw));
                }
                Ok(AttrType::Med) => {
                    let (_, v) = be_u32::<_, nom::error::Error<&[u8]>>(value)
                        .map_err(BgpParseError::from)?;
                    attrs.med = Some(v);
                }
                Err(_) => {}
            }
            input = rest;
        }
        Ok(attrs)
    }
}

fn attr_tlv_header(input: &[u8]) -> IResult<&[u8], (u8, u16)> {
    let (input, typ) = be_u8(input)?;
    let (input, len) = be_u16(input)?;
    Ok((input, (typ, len)))
}

fn parse_prefix_list(mut input: &[u8], mut remaining: usize) -> Result<(&[u8], Vec<Ipv4Net>), BgpParseError> {
    let mut prefixes = Vec::new();
    while remaining > 0 {
        let (rest, plen) = be_u8::<_, nom::error::Error<&[u8]>>(input).map_err(BgpParseError::from)?;
        if plen > 32 {
            return Err(BgpParseError::PrefixTooLong(plen));
        }
        let psize = (plen as usize).div_ceil(8);
        let (rest, octets) =
            take::<_, _, nom::error::Error<&[u8]>>(psize)(rest).map_err(BgpParseError::from)?;
        let mut addr = [0u8; 4];
        addr[..psize].copy_from_slice(octets);
        let net = Ipv4Net::new(Ipv4Addr::from(addr), plen)
            .map_err(|_| BgpParseError::PrefixTooLong(plen))?;
        prefixes.push(net);
        remaining = remaining.saturating_sub(1 + psize);
        input = rest;
    }
    Ok((input, prefixes))
}

fn encode_prefix_list(buf: &mut BytesMut, prefixes: &[Ipv4Net]) {
    for net in prefixes {
        let plen = net.prefix_len();
        buf.put_u8(plen);
        let psize = (plen as usize).div_ceil(8);
        buf.put(&net.network().octets()[..psize]);
    }
}

fn prefix_list_len(prefixes: &[Ipv4Net]) -> u16 {
    prefixes
        .iter()
        .map(|net| 1 + (net.prefix_len() as usize).div_ceil(8))
        .sum::<usize>() as u16
}

/// A route-advertisement/withdrawal message. See the RIB ingestion and
/// propagation rules for how `attrs`/`nlri` drive best-path selection.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdatePacket {
    pub header: BgpHeader,
    pub withdrawn: Vec<Ipv4Net>,
    pub attrs: PathAttrs,
    pub nlri: Vec<Ipv4Net>,
}

impl UpdatePacket {
    pub fn new(attrs: PathAttrs, nlri: Vec<Ipv4Net>) -> Self {
        Self {
            header: BgpHeader::new(BgpType::Update, 0),
            withdrawn: Vec::new(),
            attrs,
            nlri,
        }
    }

    pub fn withdraw(prefixes: Vec<Ipv4Net>) -> Self {
        Self {
            header: BgpHeader::new(BgpType::Update, 0),
            withdrawn: prefixes,
            attrs: PathAttrs::default(),
            nlri: Vec::new(),
        }
    }

    /// The sending peer's AS number, derived from the leftmost (most recent)
    /// hop of AS_PATH.
    pub fn sender_as(&self) -> Option<u16> {
        self.attrs.as_path.first().copied()
    }

    pub fn verify(&self) -> Result<(), BgpParseError> {
        let withdrawn_empty = self.withdrawn.is_empty();
        let attrs_empty = self.attrs == PathAttrs::default();
        let nlri_empty = self.nlri.is_empty();
        if withdrawn_empty && !(attrs_empty && nlri_empty) && self.attrs_and_nlri_inconsistent() {
            return Err(BgpParseError::MalformedAttributeList);
        }
        Ok(())
    }

    fn attrs_and_nlri_inconsistent(&self) -> bool {
        (self.attrs == PathAttrs::default()) != self.nlri.is_empty()
    }

    pub fn parse_packet(input: &[u8]) -> Result<(&[u8], UpdatePacket), BgpParseError> {
        let (input, header) = BgpHeader::parse_be(input).map_err(BgpParseError::from)?;
        let (input, withdrawn_len) =
            be_u16::<_, nom::error::Error<&[u8]>>(input).map_err(BgpParseError::from)?;
        let (input, withdrawn) = parse_prefix_list(input, withdrawn_len as usize)?;
        let (input, path_attr_len) =
            be_u16::<_, nom::error::Error<&[u8]>>(input).map_err(BgpParseError::from)?;
        let (input, attr_bytes) =
            take::<_, _, nom::error::Error<&[u8]>>(path_attr_len as usize)(input)
                .map_err(BgpParseError::from)?;
        let attrs = PathAttrs::parse(attr_bytes)?;
        let body_end = (header.length as usize)
            .checked_sub(crate::packet::BGP_HEADER_LEN as usize + 2 + 2)
            .and_then(|v| v.checked_sub(withdrawn_len as usize))
            .and_then(|v| v.checked_sub(path_attr_len as usize))
            .ok_or(BgpParseError::MalformedAttributeList)?;
        let (input, nlri_bytes) =
            take::<_, _, nom::error::Error<&[u8]>>(body_end)(input).map_err(BgpParseError::from)?;
        let (_, nlri) = parse_prefix_list(nlri_bytes, nlri_bytes.len())?;
        let packet = UpdatePacket {
            header,
            withdrawn,
            attrs,
            nlri,
        };
        packet.verify()?;
        Ok((input, packet))
    }
}

impl From<UpdatePacket> for BytesMut {
    fn from(update: UpdatePacket) -> Self {
        let mut buf = BytesMut::new();
        let header: BytesMut = update.header.into();
        buf.put(&header[..]);
        buf.put_u16(prefix_list_len(&update.withdrawn));
        encode_prefix_list(&mut buf, &update.withdrawn);
        buf.put_u16(update.attrs.encoded_len());
        update.attrs.encode(&mut buf);
        encode_prefix_list(&mut buf, &update.nlri);

        const LENGTH_POS: std::ops::Range<usize> = 16..18;
        let length = buf.len() as u16;
        buf[LENGTH_POS].copy_from_slice(&length.to_be_bytes());
        buf
    }
}
