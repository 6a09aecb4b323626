//! Core library for the BGP-4 peer-trust routing simulator: the per-peer
//! finite state machine, the trust/voting protocol, the routing
//! information base, and the per-router dispatcher that binds them
//! together over TCP.

#[macro_use]
mod macros;

pub mod config;
pub mod context;
pub mod error;
pub mod fsm;
pub mod peer;
pub mod rib;
pub mod router;
pub mod scheduler;
pub mod trust;

pub use config::{Args, SimulationConfig, Topology};
pub use error::SimError;
pub use rib::{Rib, RouteRow};
pub use router::Router;
pub use trust::{TrustEntry, TrustTable};
