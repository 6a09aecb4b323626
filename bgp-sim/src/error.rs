use thiserror::Error;

use bgp_packet::BgpParseError;

/// Simulation-layer failures: everything above the wire codec. Codec
/// failures (`BgpParseError`) are folded in so a dispatcher can propagate
/// either with `?` and still recover the `(code, subcode)` pair for the
/// NOTIFICATION it sends back.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    #[error(transparent)]
    Codec(#[from] BgpParseError),

    #[error("unexpected message for peer {peer} in state {state}")]
    UnexpectedMessage { peer: u32, state: &'static str },

    #[error("no such peer AS{0}")]
    UnknownPeer(u32),

    #[error("invalid topology: {0}")]
    InvalidTopology(String),
}

impl SimError {
    /// True when the error should drive the peer's FSM into Idle and emit a
    /// NOTIFICATION, as opposed to a purely internal bookkeeping failure.
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, SimError::Codec(_) | SimError::UnexpectedMessage { .. })
    }
}
