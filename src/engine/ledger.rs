//! Prediction Ledger — the owned aggregate for in-flight predictions.
//!
//! `pending` holds published (or publish-in-flight) predictions keyed
//! by target round; `queued` stages predictions awaiting the next
//! finalized results tick. The one-live-entry-per-target-round
//! invariant is enforced here, not at call sites.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::messages::MessageHandle;
use super::suit::Suit;

/// A tracked prediction. Depth 0 is the primary attempt; depths 1..=3
/// are transient catch-up entries tied back to `origin_round`.
#[derive(Debug, Clone)]
pub struct Prediction {
    pub target_round: u64,
    pub suit: Suit,
    pub base_round: u64,
    pub retry_depth: u8,
    pub origin_round: u64,
    pub handle: Option<MessageHandle>,
    /// Sequence number of the publish command this entry is waiting a
    /// handle for. `None` for silently armed catch-up entries.
    pub publish_seq: Option<u64>,
    pub created_at: DateTime<Utc>,
}

/// A staged prediction, not yet published.
#[derive(Debug, Clone)]
pub struct QueuedPrediction {
    pub target_round: u64,
    pub suit: Suit,
    pub base_round: u64,
    pub retry_depth: u8,
    pub origin_round: u64,
    pub queued_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct Ledger {
    pending: BTreeMap<u64, Prediction>,
    queued: BTreeMap<u64, QueuedPrediction>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a prediction for the next flush. Fails (returns false)
    /// when the target round is already staged, or already pending at
    /// depth 0 for a depth-0 request. A retry for a round holding a
    /// depth-0 pending entry is permitted.
    pub fn queue(&mut self, q: QueuedPrediction) -> bool {
        if self.queued.contains_key(&q.target_round) {
            return false;
        }
        if q.retry_depth == 0 && self.pending.contains_key(&q.target_round) {
            return false;
        }
        self.queued.insert(q.target_round, q);
        true
    }

    /// Drain every staged prediction in ascending target-round order.
    pub fn take_queued(&mut self) -> Vec<QueuedPrediction> {
        std::mem::take(&mut self.queued).into_values().collect()
    }

    /// Track a published (or publish-in-flight) prediction. Replaces
    /// any previous entry for the round.
    pub fn insert_pending(&mut self, p: Prediction) {
        self.pending.insert(p.target_round, p);
    }

    pub fn pending(&self, round: u64) -> Option<&Prediction> {
        self.pending.get(&round)
    }

    pub fn pending_mut(&mut self, round: u64) -> Option<&mut Prediction> {
        self.pending.get_mut(&round)
    }

    pub fn remove_pending(&mut self, round: u64) -> Option<Prediction> {
        self.pending.remove(&round)
    }

    pub fn pending_iter(&self) -> impl Iterator<Item = &Prediction> {
        self.pending.values()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn queued_len(&self) -> usize {
        self.queued.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.queued.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn staged(target: u64, depth: u8) -> QueuedPrediction {
        QueuedPrediction {
            target_round: target,
            suit: Suit::Diamonds,
            base_round: target.saturating_sub(1),
            retry_depth: depth,
            origin_round: target.saturating_sub(depth as u64),
            queued_at: now(),
        }
    }

    fn tracked(target: u64, depth: u8) -> Prediction {
        Prediction {
            target_round: target,
            suit: Suit::Diamonds,
            base_round: target.saturating_sub(1),
            retry_depth: depth,
            origin_round: target.saturating_sub(depth as u64),
            handle: None,
            publish_seq: None,
            created_at: now(),
        }
    }

    #[test]
    fn test_queue_rejects_duplicate_target() {
        let mut ledger = Ledger::new();
        assert!(ledger.queue(staged(101, 0)));
        assert!(!ledger.queue(staged(101, 0)));
        assert!(!ledger.queue(staged(101, 1)));
        assert_eq!(ledger.queued_len(), 1);
    }

    #[test]
    fn test_queue_rejects_depth0_over_pending() {
        let mut ledger = Ledger::new();
        ledger.insert_pending(tracked(101, 0));
        assert!(!ledger.queue(staged(101, 0)));
        // A retry targeting the same round is allowed.
        assert!(ledger.queue(staged(101, 1)));
    }

    #[test]
    fn test_take_queued_ascending() {
        let mut ledger = Ledger::new();
        ledger.queue(staged(105, 0));
        ledger.queue(staged(101, 0));
        ledger.queue(staged(103, 1));
        let targets: Vec<u64> = ledger.take_queued().iter().map(|q| q.target_round).collect();
        assert_eq!(targets, vec![101, 103, 105]);
        assert_eq!(ledger.queued_len(), 0);
    }

    #[test]
    fn test_clear_wipes_both_sets() {
        let mut ledger = Ledger::new();
        ledger.queue(staged(101, 0));
        ledger.insert_pending(tracked(102, 0));
        ledger.clear();
        assert_eq!(ledger.queued_len(), 0);
        assert_eq!(ledger.pending_len(), 0);
    }
}
