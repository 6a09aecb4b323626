//! Topology configuration: the thin boundary between an out-of-scope
//! topology-generation CLI/prompt and the core simulator. A `Topology` is
//! what that collaborator would hand the core; this module also knows how
//! to read one from a JSON/YAML file or fall back to a built-in ring
//! generator.

use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::path::PathBuf;

use clap::Parser;
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

use crate::error::SimError;

/// Base port for AS1; every router's four well-known ports derive from
/// `base_port = 2000 + 4 * router_number`.
pub const DEFAULT_BASE_PORT: u16 = 2000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topology {
    pub as_number: u32,
    pub bgp_identifier: Ipv4Addr,
    pub base_port: u16,
    pub peers: BTreeSet<u32>,
    pub advertised: Vec<Ipv4Net>,
}

impl Topology {
    /// The four well-known ports for this router: (bgp listen, bgp speak,
    /// data listen, data speak).
    pub fn ports(&self) -> (u16, u16, u16, u16) {
        (
            self.base_port,
            self.base_port + 1,
            self.base_port + 2,
            self.base_port + 3,
        )
    }
}

/// A full simulation's worth of per-AS topologies, as read from
/// `--config`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub routers: Vec<Topology>,
}

impl SimulationConfig {
    pub fn load(path: &PathBuf) -> Result<Self, SimError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| SimError::InvalidTopology(format!("{}: {e}", path.display())))?;
        let parsed = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&text)
                .map_err(|e| SimError::InvalidTopology(e.to_string()))?,
            _ => serde_json::from_str(&text)
                .map_err(|e| SimError::InvalidTopology(e.to_string()))?,
        };
        Ok(parsed)
    }

    /// Builds a ring topology AS1..=ASn, each advertising its own /24 and
    /// peering with its immediate neighbours on the ring. A deliberately
    /// simplified stand-in for the out-of-scope interactive peering prompt,
    /// so the binary is runnable without a config file.
    pub fn ring(n: u32) -> Self {
        let routers = (1..=n)
            .map(|i| {
                let mut peers = BTreeSet::new();
                let prev = if i == 1 { n } else { i - 1 };
                let next = if i == n { 1 } else { i + 1 };
                if n > 1 {
                    peers.insert(prev);
                    if next != prev {
                        peers.insert(next);
                    }
                }
                Topology {
                    as_number: i,
                    bgp_identifier: Ipv4Addr::new(10, 0, 0, i as u8),
                    base_port: DEFAULT_BASE_PORT + 4 * i as u16,
                    peers,
                    advertised: vec![format!("100.{i}.{i}.0/24").parse().unwrap()],
                }
            })
            .collect();
        Self { routers }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "BGP-4 peer-trust routing simulator", long_about = None)]
pub struct Args {
    /// Number of routers to simulate when no --config is given.
    #[arg(long, default_value_t = 3)]
    pub as_number: u32,

    /// Path to a JSON or YAML topology file listing per-AS peerings and
    /// advertised prefixes. When omitted, a ring topology is generated.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Overrides the base port for AS1; later ASes derive theirs as
    /// `base_port + 4 * (as_number - 1)`. Ignored when `--config` supplies
    /// explicit `base_port`s.
    #[arg(long, default_value_t = DEFAULT_BASE_PORT)]
    pub base_port: u16,
}

impl Args {
    pub fn resolve(&self) -> Result<SimulationConfig, SimError> {
        match &self.config {
            Some(path) => SimulationConfig::load(path),
            None => Ok(SimulationConfig::ring(self.as_number)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_of_three_has_two_peers_each() {
        let cfg = SimulationConfig::ring(3);
        assert_eq!(cfg.routers.len(), 3);
        for router in &cfg.routers {
            assert_eq!(router.peers.len(), 2);
        }
    }

    #[test]
    fn ring_of_two_has_one_peer_each() {
        let cfg = SimulationConfig::ring(2);
        for router in &cfg.routers {
            assert_eq!(router.peers.len(), 1);
        }
    }

    #[test]
    fn base_ports_follow_router_number() {
        let cfg = SimulationConfig::ring(3);
        assert_eq!(cfg.routers[0].base_port, 2004);
        assert_eq!(cfg.routers[1].base_port, 2008);
    }
}
