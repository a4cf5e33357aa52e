//! Desync Detector: per-tick state-hash agreement check.
//!
//! Only meaningful when `enableStateHashing` is on; the Room decides whether
//! to consult it at all. Hashes are opaque strings reported by clients.

use std::collections::BTreeMap;

use crate::config::{DesyncAction, DesyncConfig};
use crate::player::PlayerId;

/// What the detector found after a hash was recorded.
pub enum DesyncOutcome {
    /// Not every currently-connected player has reported yet; nothing to do.
    Pending,
    /// Every connected player reported and they agreed.
    Agreement,
    /// Every connected player reported and they disagree, below grace.
    Disagreement { hashes: BTreeMap<PlayerId, String> },
    /// Disagreement has now met or exceeded `gracePeriodTicks`; carries the
    /// configured action to take.
    GraceExceeded {
        hashes: BTreeMap<PlayerId, String>,
        action: DesyncAction,
    },
}

/// Per-tick hash ledger plus the consecutive-disagreement counter.
#[derive(Debug, Default)]
pub struct DesyncDetector {
    hashes: BTreeMap<u64, BTreeMap<PlayerId, String>>,
    consecutive_desyncs: u32,
}

impl DesyncDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn consecutive_desyncs(&self) -> u32 {
        self.consecutive_desyncs
    }

    /// Record one client's hash for `tick`. `connected_players` is the set
    /// of playerIds currently connected to the Room, used to decide whether
    /// the tick is fully reported.
    pub fn record_hash(
        &mut self,
        tick: u64,
        player: PlayerId,
        hash: String,
        connected_players: &[PlayerId],
        config: &DesyncConfig,
    ) -> DesyncOutcome {
        let entry = self.hashes.entry(tick).or_default();
        entry.insert(player, hash);

        let all_reported = connected_players
            .iter()
            .all(|p| entry.contains_key(p));
        if !all_reported {
            return DesyncOutcome::Pending;
        }

        let mut distinct = entry.values();
        let first = distinct.next().cloned();
        let all_equal = distinct.all(|h| Some(h) == first.as_ref());

        let outcome = if all_equal {
            self.consecutive_desyncs = 0;
            DesyncOutcome::Agreement
        } else {
            self.consecutive_desyncs += 1;
            let hashes = entry.clone();
            if self.consecutive_desyncs >= config.grace_period_ticks {
                DesyncOutcome::GraceExceeded {
                    hashes,
                    action: config.action,
                }
            } else {
                DesyncOutcome::Disagreement { hashes }
            }
        };

        self.prune_before(tick.saturating_sub(10));
        outcome
    }

    fn prune_before(&mut self, floor: u64) {
        self.hashes = self.hashes.split_off(&floor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(grace: u32) -> DesyncConfig {
        DesyncConfig {
            action: DesyncAction::EndMatch,
            grace_period_ticks: grace,
        }
    }

    #[test]
    fn agreement_resets_counter() {
        let mut detector = DesyncDetector::new();
        let players = vec![PlayerId::new("a"), PlayerId::new("b")];
        detector.record_hash(1, PlayerId::new("a"), "h".into(), &players, &config(2));
        let outcome = detector.record_hash(1, PlayerId::new("b"), "h".into(), &players, &config(2));
        assert!(matches!(outcome, DesyncOutcome::Agreement));
        assert_eq!(detector.consecutive_desyncs(), 0);
    }

    #[test]
    fn disagreement_below_grace_does_not_escalate() {
        let mut detector = DesyncDetector::new();
        let players = vec![PlayerId::new("a"), PlayerId::new("b")];
        detector.record_hash(42, PlayerId::new("a"), "deadbeef".into(), &players, &config(2));
        let outcome =
            detector.record_hash(42, PlayerId::new("b"), "cafef00d".into(), &players, &config(2));
        assert!(matches!(outcome, DesyncOutcome::Disagreement { .. }));
        assert_eq!(detector.consecutive_desyncs(), 1);
    }

    #[test]
    fn consecutive_disagreement_exceeds_grace() {
        let mut detector = DesyncDetector::new();
        let players = vec![PlayerId::new("a"), PlayerId::new("b")];
        detector.record_hash(42, PlayerId::new("a"), "deadbeef".into(), &players, &config(2));
        detector.record_hash(42, PlayerId::new("b"), "cafef00d".into(), &players, &config(2));

        detector.record_hash(43, PlayerId::new("a"), "deadbeef".into(), &players, &config(2));
        let outcome =
            detector.record_hash(43, PlayerId::new("b"), "cafef00d".into(), &players, &config(2));
        assert!(matches!(outcome, DesyncOutcome::GraceExceeded { .. }));
        assert_eq!(detector.consecutive_desyncs(), 2);
    }

    #[test]
    fn pending_until_all_connected_players_report() {
        let mut detector = DesyncDetector::new();
        let players = vec![PlayerId::new("a"), PlayerId::new("b")];
        let outcome =
            detector.record_hash(1, PlayerId::new("a"), "h".into(), &players, &config(1));
        assert!(matches!(outcome, DesyncOutcome::Pending));
    }
}
