use bytes::{BufMut, BytesMut};
use nom_derive::*;

use crate::{BgpHeader, BgpParseError, BgpType, trustrate::{decode_trust, encode_trust}};

/// query: a request for a second-hop opinion of `peer_in_question`.
/// answer: the opinion itself, carried back through the same relay.
#[repr(u8)]
#[derive(Debug, Clone, Copy, Eq, PartialEq, NomBE)]
pub enum VoteKind {
    Query = 0,
    Answer = 1,
}

/// The two-hop trust voting message. `ttl` only ever takes the values
/// `{2,1,0}` across the query/relay/answer lifecycle (see the voting
/// protocol walkthrough in the trust module).
#[derive(Debug, Clone, PartialEq, NomBE)]
pub struct VotingPacket {
    pub header: BgpHeader,
    pub ttl: u8,
    pub kind: VoteKind,
    pub num_of_2nd_neighbours: u16,
    pub origin_as: u16,
    pub peer_in_question: u16,
    pub vote_value: u16,
}

impl VotingPacket {
    pub fn query(origin_as: u16, peer_in_question: u16) -> Self {
        Self {
            header: BgpHeader::new(BgpType::Voting, BgpType::Voting.min_length()),
            ttl: 2,
            kind: VoteKind::Query,
            num_of_2nd_neighbours: 0,
            origin_as,
            peer_in_question,
            vote_value: 0,
        }
    }

    pub fn relay(&self, num_of_2nd_neighbours: u16) -> Self {
        Self {
            header: self.header.clone(),
            ttl: 1,
            kind: VoteKind::Query,
            num_of_2nd_neighbours,
            origin_as: self.origin_as,
            peer_in_question: self.peer_in_question,
            vote_value: 0,
        }
    }

    pub fn answer(&self, vote: f64) -> Self {
        Self {
            header: self.header.clone(),
            ttl: 0,
            kind: VoteKind::Answer,
            num_of_2nd_neighbours: self.num_of_2nd_neighbours,
            origin_as: self.origin_as,
            peer_in_question: self.peer_in_question,
            vote_value: encode_trust(vote),
        }
    }

    pub fn vote(&self) -> f64 {
        decode_trust(self.vote_value)
    }

    pub fn verify(&self) -> Result<(), BgpParseError> {
        if self.origin_as == 0 {
            return Err(BgpParseError::BadPeerAs(self.origin_as));
        }
        Ok(())
    }
}

impl From<VotingPacket> for BytesMut {
    fn from(packet: VotingPacket) -> Self {
        let mut buf = BytesMut::new();
        let header: BytesMut = packet.header.into();
        buf.put(&header[..]);
        buf.put_u8(packet.ttl);
        buf.put_u8(packet.kind as u8);
        buf.put_u16(packet.num_of_2nd_neighbours);
        buf.put_u16(packet.origin_as);
        buf.put_u16(packet.peer_in_question);
        buf.put_u16(packet.vote_value);
        buf
    }
}
