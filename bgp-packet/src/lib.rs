//! Wire codec for the BGP-4 message family used by the simulator, plus two
//! simulator-specific messages (TRUSTRATE, VOTING) layered on the same
//! header.

pub mod error;
pub mod notification;
pub mod open;
pub mod packet;
pub mod parser;
pub mod trustrate;
pub mod update;
pub mod voting;

pub use error::BgpParseError;
pub use notification::{NotificationPacket, NotifyCode, NotifySubCode};
pub use open::{KeepalivePacket, OpenPacket};
pub use packet::{BgpHeader, BgpPacket, BgpType, BGP_HEADER_LEN, BGP_MAX_LEN};
pub use parser::{peek_bgp_length, verify_header};
pub use trustrate::TrustRatePacket;
pub use update::{Origin, PathAttrs, UpdatePacket};
pub use voting::{VoteKind, VotingPacket};
