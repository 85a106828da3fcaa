//! Channel message types joining the transport, engine, announcer and
//! admin surfaces.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::suit::Suit;

// ─────────────────────────────────────────────────────────
// Inbound feed events (Transport → Engine)
// ─────────────────────────────────────────────────────────

/// Which logical upstream produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedSource {
    /// Results feed: finalized round outcomes.
    Results,
    /// Statistics feed: per-suit counts.
    Stats,
}

/// One raw text event. Edited messages re-enter the same path with
/// `is_edit = true`.
#[derive(Debug, Clone)]
pub struct FeedEvent {
    pub source: FeedSource,
    pub text: String,
    pub is_edit: bool,
}

// ─────────────────────────────────────────────────────────
// Control commands (Admin / reset timer → Engine)
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineCmd {
    /// Change the target-round offset for future depth-0 predictions.
    SetOffset(u64),
    /// Full cold reset: wipe ledger, cooldowns, dedup set, round state.
    Reset,
}

// ─────────────────────────────────────────────────────────
// Settlement outcomes
// ─────────────────────────────────────────────────────────

/// Final settlement verdict for a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Suit appeared at retry depth `0..=3`.
    Success(u8),
    /// Missed at every depth of the retry ladder.
    Fail,
}

impl Outcome {
    pub fn is_fail(&self) -> bool {
        matches!(self, Outcome::Fail)
    }

    /// Verdict glyph shown in the amended announcement.
    pub fn glyph(&self) -> &'static str {
        match self {
            Outcome::Success(0) => "✅0️⃣",
            Outcome::Success(1) => "✅1️⃣",
            Outcome::Success(2) => "✅2️⃣",
            Outcome::Success(_) => "✅3️⃣",
            Outcome::Fail => "❌",
        }
    }
}

// ─────────────────────────────────────────────────────────
// Announcement commands (Engine → Announcer) and results back
// ─────────────────────────────────────────────────────────

/// Opaque reference to a published announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MessageHandle(pub i64);

#[derive(Debug, Clone)]
pub enum AnnounceCmd {
    /// Publish a fresh prediction announcement. `seq` is the engine's
    /// publish sequence number, echoed back in the result so a handle
    /// can never attach to a later entry for the same round.
    Publish {
        seq: u64,
        target_round: u64,
        suit: Suit,
    },
    /// Amend a published announcement in place with the verdict.
    Amend {
        handle: MessageHandle,
        target_round: u64,
        suit: Suit,
        outcome: Outcome,
    },
}

/// Feedback from the Announcer. A `None` handle means publication was
/// unavailable or failed; the prediction is tracked all the same.
#[derive(Debug, Clone)]
pub enum AnnounceResult {
    Published {
        seq: u64,
        target_round: u64,
        handle: Option<MessageHandle>,
    },
}

// ─────────────────────────────────────────────────────────
// Status snapshot (Engine → watch → admin/health/transport)
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct CooldownStatus {
    pub suit: Suit,
    pub blocked_until: DateTime<Utc>,
    pub remaining_secs: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SuitCounter {
    pub suit: Suit,
    pub consecutive: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct PendingStatus {
    pub target_round: u64,
    pub suit: Suit,
    pub retry_depth: u8,
    /// Rounds until this prediction's target, from the current round.
    pub distance: i64,
}

/// Read-only snapshot broadcast after every engine tick.
#[derive(Debug, Clone, Serialize, Default)]
pub struct EngineStatus {
    pub current_round: u64,
    pub offset: u64,
    pub cooldowns: Vec<CooldownStatus>,
    pub counters: Vec<SuitCounter>,
    pub pending: Vec<PendingStatus>,
    pub queued: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    // The snapshot is served as JSON by the admin surface; every field
    // (timestamps included) must serialize.
    #[test]
    fn test_status_snapshot_serializes() {
        let status = EngineStatus {
            current_round: 120,
            offset: 1,
            cooldowns: vec![CooldownStatus {
                suit: Suit::Hearts,
                blocked_until: Utc.with_ymd_and_hms(2024, 5, 1, 12, 5, 0).unwrap(),
                remaining_secs: 300,
            }],
            counters: vec![SuitCounter {
                suit: Suit::Diamonds,
                consecutive: 2,
            }],
            pending: vec![PendingStatus {
                target_round: 121,
                suit: Suit::Diamonds,
                retry_depth: 0,
                distance: 1,
            }],
            queued: 0,
        };

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["current_round"], 120);
        assert_eq!(json["cooldowns"][0]["suit"], "Hearts");
        assert!(json["cooldowns"][0]["blocked_until"].is_string());
        assert_eq!(json["pending"][0]["target_round"], 121);
    }
}
