use std::net::Ipv4Addr;

use bgp_packet::{
    BgpPacket, BgpParseError, BgpType, KeepalivePacket, NotificationPacket, NotifyCode,
    NotifySubCode, Origin, OpenPacket, PathAttrs, TrustRatePacket, UpdatePacket, VotingPacket,
};
use bytes::BytesMut;
use hex_literal::hex;

fn roundtrip(buf: BytesMut) -> BgpPacket {
    let (rest, packet) = BgpPacket::parse_packet(&buf).expect("packet should decode");
    assert!(rest.is_empty(), "trailing bytes after decode");
    packet
}

#[test]
fn open_roundtrips() {
    let open = OpenPacket::new(65001, 90, Ipv4Addr::new(10, 0, 0, 1));
    let buf: BytesMut = open.clone().into();
    match roundtrip(buf) {
        BgpPacket::Open(decoded) => assert_eq!(*decoded, open),
        other => panic!("expected Open, got {other:?}"),
    }
}

#[test]
fn keepalive_roundtrips() {
    let buf: BytesMut = KeepalivePacket::new().into();
    assert!(matches!(roundtrip(buf), BgpPacket::Keepalive(_)));
}

#[test]
fn notification_roundtrips() {
    let notif = NotificationPacket::new(NotifyCode::FsmError, NotifySubCode::UnexpectedMessage);
    let buf: BytesMut = notif.clone().into();
    match roundtrip(buf) {
        BgpPacket::Notification(decoded) => assert_eq!(decoded, notif),
        other => panic!("expected Notification, got {other:?}"),
    }
}

#[test]
fn trustrate_roundtrips() {
    let packet = TrustRatePacket::new(65001, 0.731);
    let buf: BytesMut = packet.clone().into();
    match roundtrip(buf) {
        BgpPacket::TrustRate(decoded) => {
            assert_eq!(decoded.as_num, 65001);
            assert!((decoded.trust() - 0.731).abs() < 1e-4);
        }
        other => panic!("expected TrustRate, got {other:?}"),
    }
}

#[test]
fn voting_query_roundtrips() {
    let packet = VotingPacket::query(65001, 65002);
    let buf: BytesMut = packet.clone().into();
    match roundtrip(buf) {
        BgpPacket::Voting(decoded) => assert_eq!(decoded, packet),
        other => panic!("expected Voting, got {other:?}"),
    }
}

#[test]
fn update_with_attrs_and_nlri_roundtrips() {
    let attrs = PathAttrs {
        origin: Some(Origin::Igp),
        next_hop: Some(Ipv4Addr::new(10, 0, 0, 1)),
        local_pref: Some(100),
        weight: Some(32768),
        as_path: vec![65001],
        trust_rate: Some(0.9),
        med: Some(0),
    };
    let nlri = vec!["100.1.1.0/24".parse().unwrap()];
    let update = UpdatePacket::new(attrs, nlri);
    let buf: BytesMut = update.clone().into();
    match roundtrip(buf) {
        BgpPacket::Update(decoded) => assert_eq!(*decoded, update),
        other => panic!("expected Update, got {other:?}"),
    }
}

#[test]
fn update_withdraw_only_roundtrips() {
    let update = UpdatePacket::withdraw(vec!["100.1.1.0/24".parse().unwrap()]);
    let buf: BytesMut = update.clone().into();
    match roundtrip(buf) {
        BgpPacket::Update(decoded) => assert_eq!(*decoded, update),
        other => panic!("expected Update, got {other:?}"),
    }
}

#[test]
fn bad_marker_is_connection_not_synchronized() {
    let mut buf: BytesMut = KeepalivePacket::new().into();
    buf[0] = 0x00;
    let err = BgpPacket::parse_packet(&buf).unwrap_err();
    assert_eq!(err, BgpParseError::ConnectionNotSynchronized);
}

#[test]
fn unknown_type_is_bad_message_type() {
    let mut buf: BytesMut = KeepalivePacket::new().into();
    buf[18] = 42;
    let err = BgpPacket::parse_packet(&buf).unwrap_err();
    assert_eq!(err, BgpParseError::BadMessageType(42));
}

#[test]
fn keepalive_with_wrong_length_is_bad_message_length() {
    let mut buf: BytesMut = KeepalivePacket::new().into();
    buf.extend_from_slice(&[0u8]);
    buf[16..18].copy_from_slice(&20u16.to_be_bytes());
    let err = BgpPacket::parse_packet(&buf).unwrap_err();
    assert_eq!(err, BgpParseError::BadMessageLength(20));
    let (code, sub_code) = err.notify_code();
    assert_eq!(code, NotifyCode::MessageHeaderError);
    assert_eq!(sub_code, NotifySubCode::BadMessageLength);
}

#[test]
fn open_with_bad_version_is_unsupported_version() {
    let mut open = OpenPacket::new(65001, 90, Ipv4Addr::new(10, 0, 0, 1));
    open.version = 3;
    let buf: BytesMut = open.into();
    let err = BgpPacket::parse_packet(&buf).unwrap_err();
    assert_eq!(err, BgpParseError::UnsupportedVersion(3));
}

#[test]
fn open_with_zero_as_is_bad_peer_as() {
    let mut open = OpenPacket::new(65001, 90, Ipv4Addr::new(10, 0, 0, 1));
    open.asn = 0;
    let buf: BytesMut = open.into();
    let err = BgpPacket::parse_packet(&buf).unwrap_err();
    assert_eq!(err, BgpParseError::BadPeerAs(0));
}

#[test]
fn open_with_zero_hold_time_is_unacceptable() {
    let mut open = OpenPacket::new(65001, 90, Ipv4Addr::new(10, 0, 0, 1));
    open.hold_time = 0;
    let buf: BytesMut = open.into();
    let err = BgpPacket::parse_packet(&buf).unwrap_err();
    assert_eq!(err, BgpParseError::UnacceptableHoldTime(0));
}

#[test]
fn open_with_unspecified_bgp_id_is_bad_identifier() {
    let mut open = OpenPacket::new(65001, 90, Ipv4Addr::new(10, 0, 0, 1));
    open.bgp_id = Ipv4Addr::UNSPECIFIED.octets();
    let buf: BytesMut = open.into();
    let err = BgpPacket::parse_packet(&buf).unwrap_err();
    assert_eq!(err, BgpParseError::BadBgpIdentifier);
}

#[test]
fn open_with_hold_time_over_100_is_unacceptable() {
    let mut open = OpenPacket::new(65001, 101, Ipv4Addr::new(10, 0, 0, 1));
    open.hold_time = 101;
    let buf: BytesMut = open.into();
    let err = BgpPacket::parse_packet(&buf).unwrap_err();
    assert_eq!(err, BgpParseError::UnacceptableHoldTime(101));
}

#[test]
fn prefix_length_over_32_is_prefix_too_long() {
    // Marker, length=29, type=UPDATE, withdrawn len=0, attr len=0, then a
    // single NLRI entry claiming a /33 prefix (invalid: plen byte=33, one
    // octet short of what a /33 would even need).
    let buf = hex!(
        "
        ff ff ff ff ff ff ff ff ff ff ff ff ff ff ff ff
        00 1c 02 00 00 00 00 21 0a 00 00 01
        "
    );
    assert_eq!(buf.len(), 28);

    let err = BgpPacket::parse_packet(&buf).unwrap_err();
    assert_eq!(err, BgpParseError::PrefixTooLong(33));
    let (code, sub_code) = err.notify_code();
    assert_eq!(code, NotifyCode::UpdateMessageError);
    assert_eq!(sub_code, NotifySubCode::PrefixTooLong);
}

#[test]
fn truncated_message_is_incomplete_not_a_protocol_error() {
    let buf: BytesMut = KeepalivePacket::new().into();
    let err = BgpPacket::parse_packet(&buf[..10]).unwrap_err();
    assert!(err.is_incomplete());
}
