//! Routing information base: ingestion of UPDATE attributes into rows,
//! loop suppression, idempotent re-ingestion, and best-path selection with
//! trust-aware tie-breaking.

use std::cmp::Ordering;
use std::fmt;
use std::net::Ipv4Addr;

use bgp_packet::{Origin, PathAttrs};
use ipnet::Ipv4Net;

use crate::trust::TrustTable;

/// One (prefix, AS_PATH) row in a router's routing information base.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteRow {
    pub network: Ipv4Net,
    pub next_hop: Ipv4Addr,
    pub med: u32,
    pub loc_pref: u32,
    pub weight: u32,
    pub trust_rate: f64,
    /// Leftmost = most recent hop, i.e. the peer this row arrived from.
    pub as_path: Vec<u32>,
    pub origin: Origin,
}

impl RouteRow {
    pub fn as_path_string(&self) -> String {
        self.as_path
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn hops(&self) -> usize {
        self.as_path.len()
    }

    /// The AS this row was learned from / should be forwarded towards.
    pub fn next_hop_as(&self) -> Option<u32> {
        self.as_path.first().copied()
    }

    /// Attributes to advertise this row onward, with NEXT_HOP rewritten to
    /// `own_ip` and AS_PATH prepended with `own_as`.
    pub fn propagate(&self, own_as: u32, own_ip: Ipv4Addr, trust_rate: f64) -> PathAttrs {
        let mut as_path = Vec::with_capacity(self.as_path.len() + 1);
        as_path.push(own_as as u16);
        as_path.extend(self.as_path.iter().map(|asn| *asn as u16));
        PathAttrs {
            origin: Some(self.origin),
            next_hop: Some(own_ip),
            local_pref: Some(self.loc_pref),
            weight: Some(self.weight),
            as_path,
            trust_rate: Some(trust_rate),
            med: Some(self.med),
        }
    }
}

/// The routing information base for one router: every ingested row, plus
/// the set of prefixes this router itself claims to originate.
#[derive(Debug, Default)]
pub struct Rib {
    rows: Vec<RouteRow>,
    advertised: Vec<Ipv4Net>,
}

/// Outcome of ingesting one UPDATE: which prefixes gained a genuinely new
/// row (and so must be re-advertised) and which AS_PATH was computed for
/// each, keyed in the same order as the NLRI list that produced them.
pub struct Ingested {
    pub new_rows: Vec<RouteRow>,
}

impl Rib {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_advertised(advertised: Vec<Ipv4Net>) -> Self {
        Self {
            rows: Vec::new(),
            advertised,
        }
    }

    pub fn advertised(&self) -> &[Ipv4Net] {
        &self.advertised
    }

    pub fn originate(&mut self, own_as: u32, own_ip: Ipv4Addr, prefix: Ipv4Net) -> RouteRow {
        let row = RouteRow {
            network: prefix,
            next_hop: own_ip,
            med: 0,
            loc_pref: 100,
            weight: 32768,
            trust_rate: 1.0,
            as_path: vec![own_as],
            origin: Origin::Igp,
        };
        self.rows.push(row.clone());
        row
    }

    pub fn rows(&self) -> &[RouteRow] {
        &self.rows
    }

    /// Ingests one UPDATE's attribute set against its NLRI, applying loop
    /// suppression (own AS anywhere in AS_PATH) and idempotence (an
    /// existing (prefix, AS_PATH) pair is never duplicated).
    pub fn ingest(
        &mut self,
        own_as: u32,
        peer_as: u32,
        pa: &PathAttrs,
        nlri: &[Ipv4Net],
        trust: &TrustTable,
    ) -> Ingested {
        let as_path: Vec<u32> = pa.as_path.iter().map(|asn| *asn as u32).collect();
        let mut new_rows = Vec::new();

        if as_path.contains(&own_as) {
            return Ingested { new_rows };
        }

        let trust_rate = if as_path.len() > 1 {
            pa.trust_rate.unwrap_or(0.0) + trust.t_eff(as_path[0])
        } else {
            trust.t_eff(peer_as)
        };

        for prefix in nlri {
            if self
                .rows
                .iter()
                .any(|r| r.network == *prefix && r.as_path == as_path)
            {
                continue;
            }
            let row = RouteRow {
                network: *prefix,
                next_hop: pa.next_hop.unwrap_or(Ipv4Addr::UNSPECIFIED),
                med: pa.med.unwrap_or(0),
                loc_pref: pa.local_pref.unwrap_or(0),
                weight: pa.weight.unwrap_or(0),
                trust_rate,
                as_path: as_path.clone(),
                origin: pa.origin.unwrap_or(Origin::Incomplete),
            };
            self.rows.push(row.clone());
            new_rows.push(row);
        }
        Ingested { new_rows }
    }

    pub fn withdraw(&mut self, peer_as: u32, prefixes: &[Ipv4Net]) {
        self.rows.retain(|r| {
            !(prefixes.contains(&r.network) && r.as_path.first() == Some(&peer_as))
        });
    }

    /// Removes every row learned from `peer_as`, e.g. when its session
    /// drops back to Idle.
    pub fn withdraw_peer(&mut self, peer_as: u32) {
        self.rows.retain(|r| r.as_path.first() != Some(&peer_as));
    }

    fn candidates_for(&self, network: Ipv4Net) -> impl Iterator<Item = &RouteRow> {
        self.rows.iter().filter(move |r| r.network == network)
    }

    /// Longest-prefix match against `dest` among all distinct NETWORK
    /// values in the RIB. Ties (which only arise for identical networks)
    /// are broken by minimising the XOR distance to the network address.
    fn longest_match(&self, dest: Ipv4Addr) -> Option<Ipv4Net> {
        let dest_bits = u32::from(dest);
        let mut best: Option<Ipv4Net> = None;
        for row in &self.rows {
            let net = row.network;
            if !net.contains(&dest) {
                continue;
            }
            best = Some(match best {
                None => net,
                Some(cur) => match net.prefix_len().cmp(&cur.prefix_len()) {
                    Ordering::Greater => net,
                    Ordering::Less => cur,
                    Ordering::Equal => {
                        let net_xor = dest_bits ^ u32::from(net.network());
                        let cur_xor = dest_bits ^ u32::from(cur.network());
                        if net_xor < cur_xor { net } else { cur }
                    }
                },
            });
        }
        best
    }

    /// Picks the best row for `network` per the ordered preference list:
    /// highest WEIGHT, highest LOC_PREF, lowest TRUST_RATE, shortest
    /// AS_PATH, lowest MED.
    fn best_row(&self, network: Ipv4Net) -> Option<&RouteRow> {
        self.candidates_for(network).min_by(|a, b| {
            b.weight
                .cmp(&a.weight)
                .then_with(|| b.loc_pref.cmp(&a.loc_pref))
                .then_with(|| {
                    a.trust_rate
                        .partial_cmp(&b.trust_rate)
                        .unwrap_or(Ordering::Equal)
                })
                .then_with(|| a.hops().cmp(&b.hops()))
                .then_with(|| a.med.cmp(&b.med))
        })
    }

    /// Best-path selection given a destination address: longest match,
    /// then the preference list, returning the leftmost AS of the chosen
    /// row (the next hop) together with the row itself.
    pub fn best_path(&self, dest: Ipv4Addr) -> Option<&RouteRow> {
        let network = self.longest_match(dest)?;
        self.best_row(network)
    }

    pub fn next_hop_as(&self, dest: Ipv4Addr) -> Option<u32> {
        self.best_path(dest).and_then(RouteRow::next_hop_as)
    }

    /// True if `dest` is delivered locally: it is the router's own address
    /// or falls inside the advertised-prefix set.
    pub fn is_local(&self, dest: Ipv4Addr, own_ip: Ipv4Addr) -> bool {
        dest == own_ip || self.advertised.iter().any(|net| net.contains(&dest))
    }
}

/// A plain-text routing table, the `Display`-impl equivalent of the
/// original draft's pandas-backed `print_routing_table` (kept here without
/// pulling in a dataframe dependency — that pretty-printer is one of the
/// out-of-scope collaborators).
impl fmt::Display for Rib {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<18}{:<15}{:>6}{:>9}{:>8}{:>10}  AS_PATH",
            "NETWORK", "NEXT_HOP", "MED", "LOC_PREF", "WEIGHT", "TRUST"
        )?;
        for row in &self.rows {
            writeln!(
                f,
                "{:<18}{:<15}{:>6}{:>9}{:>8}{:>10.3}  {}",
                row.network.to_string(),
                row.next_hop.to_string(),
                row.med,
                row.loc_pref,
                row.weight,
                row.trust_rate,
                row.as_path_string(),
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bgp_packet::PathAttrs;

    fn net(s: &str) -> Ipv4Net {
        s.parse().unwrap()
    }

    fn pa(as_path: Vec<u16>) -> PathAttrs {
        PathAttrs {
            origin: Some(Origin::Igp),
            next_hop: Some(Ipv4Addr::new(10, 0, 0, 1)),
            local_pref: Some(0),
            weight: Some(0),
            as_path,
            trust_rate: Some(0.0),
            med: Some(0),
        }
    }

    #[test]
    fn loop_suppression_drops_own_as() {
        let mut rib = Rib::new();
        let trust = TrustTable::new();
        let out = rib.ingest(1, 2, &pa(vec![2, 1]), &[net("100.1.1.0/24")], &trust);
        assert!(out.new_rows.is_empty());
        assert!(rib.rows().is_empty());
    }

    #[test]
    fn idempotent_reingest_no_duplicate() {
        let mut rib = Rib::new();
        let trust = TrustTable::new();
        let nlri = [net("100.1.1.0/24")];
        rib.ingest(1, 2, &pa(vec![2]), &nlri, &trust);
        rib.ingest(1, 2, &pa(vec![2]), &nlri, &trust);
        assert_eq!(rib.rows().len(), 1);
    }

    #[test]
    fn best_path_prefers_weight() {
        let mut rib = Rib::new();
        rib.rows.push(RouteRow {
            network: net("10.0.0.0/8"),
            next_hop: Ipv4Addr::UNSPECIFIED,
            med: 0,
            loc_pref: 50,
            weight: 100,
            trust_rate: 0.0,
            as_path: vec![65001],
            origin: Origin::Igp,
        });
        rib.rows.push(RouteRow {
            network: net("10.0.0.0/8"),
            next_hop: Ipv4Addr::UNSPECIFIED,
            med: 0,
            loc_pref: 10,
            weight: 200,
            trust_rate: 0.0,
            as_path: vec![65002],
            origin: Origin::Igp,
        });
        let best = rib.best_path(Ipv4Addr::new(10, 1, 2, 3)).unwrap();
        assert_eq!(best.weight, 200);
    }

    #[test]
    fn best_path_prefers_lower_trust_rate_on_tie() {
        let mut rib = Rib::new();
        rib.rows.push(RouteRow {
            network: net("10.0.0.0/8"),
            next_hop: Ipv4Addr::UNSPECIFIED,
            med: 0,
            loc_pref: 0,
            weight: 0,
            trust_rate: 0.8,
            as_path: vec![65001],
            origin: Origin::Igp,
        });
        rib.rows.push(RouteRow {
            network: net("10.0.0.0/8"),
            next_hop: Ipv4Addr::UNSPECIFIED,
            med: 0,
            loc_pref: 0,
            weight: 0,
            trust_rate: 1.2,
            as_path: vec![65002],
            origin: Origin::Igp,
        });
        let best = rib.best_path(Ipv4Addr::new(10, 1, 2, 3)).unwrap();
        assert_eq!(best.trust_rate, 0.8);
    }

    #[test]
    fn local_delivery_matches_advertised_set() {
        let rib = Rib::with_advertised(vec![net("100.1.1.0/24")]);
        assert!(rib.is_local(Ipv4Addr::new(100, 1, 1, 5), Ipv4Addr::new(9, 9, 9, 9)));
        assert!(!rib.is_local(Ipv4Addr::new(8, 8, 8, 8), Ipv4Addr::new(9, 9, 9, 9)));
    }
}
