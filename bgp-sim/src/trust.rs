//! Per-peer trust bookkeeping and the two-hop voting protocol's vote
//! accumulation. The query/relay/answer message choreography itself lives
//! in [`crate::router`], which owns the adjacency list needed to decide who
//! to relay to; this module only owns the data each peer's trust entry
//! carries and the `t_eff` formula used by best-path selection.

use std::collections::BTreeMap;

use rand::Rng;

/// Trust carried for one directly adjacent peer AS.
#[derive(Debug, Clone)]
pub struct TrustEntry {
    /// Directly observed reliability, in `[0,1]`, nudged up by TRUSTRATE
    /// exchanges and down by NOTIFICATIONs.
    pub t_inherent: f64,
    /// Vote values harvested from second-hop neighbours, in receipt order.
    pub votes: Vec<f64>,
    /// Set once `votes.len()` reaches the expected count (or immediately
    /// when the peer has no second neighbours at all).
    pub vote_complete: bool,
    /// `num_of_2nd_neighbours` from the query's relay, once known.
    pub expected_votes: Option<u16>,
    /// Count of TRUSTRATE messages received from this peer, used to drive
    /// the every-20th bump below.
    pub trustrate_rx: u32,
}

impl TrustEntry {
    /// Seeds `t_inherent` uniformly at random in `[0.45, 0.55]`.
    pub fn random() -> Self {
        let t_inherent = rand::rng().random_range(0.45..=0.55);
        Self {
            t_inherent,
            votes: Vec::new(),
            vote_complete: false,
            expected_votes: None,
            trustrate_rx: 0,
        }
    }

    /// The effective trust used in best-path selection.
    ///
    /// `1/(0.4·t_inherent) + 0.6·mean(votes)` when votes is non-empty, else
    /// `t_inherent`. This diverges as `t_inherent → 0` and is not itself
    /// bounded to `[0,1]`. Best-path selection only needs a total order
    /// over candidate rows, so the unboundedness is harmless there —
    /// callers that need a bounded score must clamp it themselves.
    pub fn t_eff(&self) -> f64 {
        if self.votes.is_empty() {
            self.t_inherent
        } else {
            let mean = self.votes.iter().sum::<f64>() / self.votes.len() as f64;
            1.0 / (0.4 * self.t_inherent) + 0.6 * mean
        }
    }

    /// NOTIFICATION from this peer lowers trust, floored at 0.
    pub fn on_notification(&mut self) {
        self.t_inherent = (self.t_inherent - 0.1).max(0.0);
    }

    /// Every 20th TRUSTRATE from this peer raises trust, capped at 1.
    /// Returns true the tick it fires, so the caller knows to bump.
    pub fn on_trustrate(&mut self) -> bool {
        self.trustrate_rx += 1;
        if self.trustrate_rx.is_multiple_of(20) {
            self.t_inherent = (self.t_inherent + 0.1).min(1.0);
            true
        } else {
            false
        }
    }

    /// Records the expected vote count from the query relay. Immediately
    /// completes voting when the peer has no second neighbours.
    pub fn set_expected(&mut self, expected: u16) {
        self.expected_votes = Some(expected);
        if expected == 0 {
            self.vote_complete = true;
        }
    }

    /// Appends a harvested vote and marks completion once the expected
    /// count is reached.
    pub fn record_vote(&mut self, vote: f64) {
        self.votes.push(vote);
        if let Some(expected) = self.expected_votes {
            if self.votes.len() >= expected as usize {
                self.vote_complete = true;
            }
        }
    }
}

/// All peer trust entries for one router, keyed by peer AS number.
#[derive(Debug, Default)]
pub struct TrustTable(BTreeMap<u32, TrustEntry>);

impl TrustTable {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Seeds a fresh random entry for a peer first seen, unless one already
    /// exists.
    pub fn seed(&mut self, peer_as: u32) -> &mut TrustEntry {
        self.0.entry(peer_as).or_insert_with(TrustEntry::random)
    }

    pub fn get(&self, peer_as: u32) -> Option<&TrustEntry> {
        self.0.get(&peer_as)
    }

    pub fn get_mut(&mut self, peer_as: u32) -> Option<&mut TrustEntry> {
        self.0.get_mut(&peer_as)
    }

    /// `t_eff` for a peer not yet in the table defaults to the midpoint of
    /// the random-seed range, matching a freshly-seeded but unvoted entry.
    pub fn t_eff(&self, peer_as: u32) -> f64 {
        self.0.get(&peer_as).map(|e| e.t_eff()).unwrap_or(0.5)
    }

    /// Directly observed reliability of `peer_as`, used by the voting
    /// protocol's answer phase (which reports `t_inherent`, not `t_eff`).
    /// Defaults to the midpoint of the random-seed range for a peer not yet
    /// in the table.
    pub fn t_inherent(&self, peer_as: u32) -> f64 {
        self.0.get(&peer_as).map(|e| e.t_inherent).unwrap_or(0.5)
    }

    /// True once every directly adjacent peer in the table has completed
    /// voting.
    pub fn all_complete(&self) -> bool {
        !self.0.is_empty() && self.0.values().all(|e| e.vote_complete)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&u32, &TrustEntry)> {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_seed_in_range() {
        for _ in 0..100 {
            let e = TrustEntry::random();
            assert!(e.t_inherent >= 0.45 && e.t_inherent <= 0.55);
        }
    }

    #[test]
    fn t_eff_falls_back_to_inherent_without_votes() {
        let e = TrustEntry::random();
        assert_eq!(e.t_eff(), e.t_inherent);
    }

    #[test]
    fn t_eff_uses_formula_with_votes() {
        let mut e = TrustEntry {
            t_inherent: 0.5,
            votes: vec![0.2, 0.4],
            vote_complete: false,
            expected_votes: None,
            trustrate_rx: 0,
        };
        e.record_vote(0.6);
        let expected = 1.0 / (0.4 * 0.5) + 0.6 * (0.2 + 0.4 + 0.6) / 3.0;
        assert!((e.t_eff() - expected).abs() < 1e-9);
    }

    #[test]
    fn notification_floors_at_zero() {
        let mut e = TrustEntry::random();
        e.t_inherent = 0.05;
        e.on_notification();
        assert_eq!(e.t_inherent, 0.0);
    }

    #[test]
    fn trustrate_caps_at_one() {
        let mut e = TrustEntry::random();
        e.t_inherent = 0.95;
        for i in 0..20 {
            let fired = e.on_trustrate();
            assert_eq!(fired, i == 19);
        }
        assert_eq!(e.t_inherent, 1.0);
    }

    #[test]
    fn zero_second_neighbours_completes_immediately() {
        let mut e = TrustEntry::random();
        e.set_expected(0);
        assert!(e.vote_complete);
    }

    #[test]
    fn vote_complete_once_count_reached() {
        let mut e = TrustEntry::random();
        e.set_expected(2);
        assert!(!e.vote_complete);
        e.record_vote(0.3);
        assert!(!e.vote_complete);
        e.record_vote(0.7);
        assert!(e.vote_complete);
    }
}
