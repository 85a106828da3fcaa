//! Per-suit cooldown tracking.
//!
//! Each suit accumulates its last three settlement outcomes. Reaching
//! three triggers exactly one cooldown verdict and clears the history:
//! a failure anywhere in the window asks for an immediate re-raise
//! before blocking, three successes block outright.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::messages::Outcome;
use super::suit::Suit;

const HISTORY_CAP: usize = 3;

/// What the caller must do after recording a settlement outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownVerdict {
    /// Fewer than three outcomes so far; nothing to do.
    Continue,
    /// Three outcomes, at least one failure: re-raise the suit
    /// immediately, then block it.
    RelaunchAndBlock,
    /// Three straight successes: block the suit.
    Block,
}

#[derive(Debug, Default)]
pub struct CooldownTracker {
    history: HashMap<Suit, Vec<Outcome>>,
    blocked_until: HashMap<Suit, DateTime<Utc>>,
    consecutive: HashMap<Suit, u32>,
    last_predicted: Option<Suit>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a settlement outcome into the suit's history and evaluate
    /// the three-outcome rule. On a verdict the history is cleared.
    pub fn record(&mut self, suit: Suit, outcome: Outcome) -> CooldownVerdict {
        let history = self.history.entry(suit).or_default();
        history.push(outcome);
        if history.len() > HISTORY_CAP {
            history.remove(0);
        }
        if history.len() < HISTORY_CAP {
            return CooldownVerdict::Continue;
        }

        let any_fail = history.iter().any(Outcome::is_fail);
        history.clear();
        if any_fail {
            CooldownVerdict::RelaunchAndBlock
        } else {
            CooldownVerdict::Block
        }
    }

    /// Apply a cooldown window. Also zeroes the consecutive counter.
    pub fn block(&mut self, suit: Suit, until: DateTime<Utc>) {
        self.blocked_until.insert(suit, until);
        self.consecutive.insert(suit, 0);
    }

    pub fn is_blocked(&self, suit: Suit, now: DateTime<Utc>) -> bool {
        self.blocked_until
            .get(&suit)
            .map(|until| now < *until)
            .unwrap_or(false)
    }

    /// Clear a block whose window has elapsed, resetting the suit's
    /// counter and history. Returns whether anything was cleared.
    pub fn clear_expired(&mut self, suit: Suit, now: DateTime<Utc>) -> bool {
        match self.blocked_until.get(&suit) {
            Some(until) if now >= *until => {
                self.blocked_until.remove(&suit);
                self.consecutive.insert(suit, 0);
                self.history.entry(suit).or_default().clear();
                true
            }
            _ => false,
        }
    }

    /// Record a successfully staged depth-0 attempt.
    pub fn note_attempt(&mut self, suit: Suit) {
        *self.consecutive.entry(suit).or_insert(0) += 1;
        self.last_predicted = Some(suit);
    }

    pub fn last_predicted(&self) -> Option<Suit> {
        self.last_predicted
    }

    /// The three-outcome streak is per-suit and does not survive a
    /// change of target.
    pub fn reset_suit(&mut self, suit: Suit) {
        self.consecutive.insert(suit, 0);
        self.history.entry(suit).or_default().clear();
    }

    pub fn clear_all(&mut self) {
        self.history.clear();
        self.blocked_until.clear();
        self.consecutive.clear();
        self.last_predicted = None;
    }

    // ── Snapshot accessors ──

    pub fn active_blocks(&self, now: DateTime<Utc>) -> Vec<(Suit, DateTime<Utc>)> {
        let mut blocks: Vec<_> = self
            .blocked_until
            .iter()
            .filter(|(_, until)| now < **until)
            .map(|(s, u)| (*s, *u))
            .collect();
        blocks.sort_by_key(|(s, _)| *s);
        blocks
    }

    pub fn counters(&self) -> Vec<(Suit, u32)> {
        let mut counters: Vec<_> = self
            .consecutive
            .iter()
            .filter(|(_, c)| **c > 0)
            .map(|(s, c)| (*s, *c))
            .collect();
        counters.sort_by_key(|(s, _)| *s);
        counters
    }

    #[cfg(test)]
    pub fn history_len(&self, suit: Suit) -> usize {
        self.history.get(&suit).map(Vec::len).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_history_below_three_is_continue() {
        let mut cd = CooldownTracker::new();
        assert_eq!(cd.record(Suit::Spades, Outcome::Success(0)), CooldownVerdict::Continue);
        assert_eq!(cd.record(Suit::Spades, Outcome::Fail), CooldownVerdict::Continue);
        assert_eq!(cd.history_len(Suit::Spades), 2);
    }

    #[test]
    fn test_three_successes_block() {
        let mut cd = CooldownTracker::new();
        cd.record(Suit::Hearts, Outcome::Success(0));
        cd.record(Suit::Hearts, Outcome::Success(1));
        let verdict = cd.record(Suit::Hearts, Outcome::Success(0));
        assert_eq!(verdict, CooldownVerdict::Block);
        assert_eq!(cd.history_len(Suit::Hearts), 0);
    }

    #[test]
    fn test_failure_in_window_relaunches() {
        let mut cd = CooldownTracker::new();
        cd.record(Suit::Spades, Outcome::Fail);
        cd.record(Suit::Spades, Outcome::Success(0));
        let verdict = cd.record(Suit::Spades, Outcome::Success(2));
        assert_eq!(verdict, CooldownVerdict::RelaunchAndBlock);
        assert_eq!(cd.history_len(Suit::Spades), 0);
    }

    #[test]
    fn test_block_and_expiry() {
        let mut cd = CooldownTracker::new();
        let until = t0() + Duration::minutes(5);
        cd.block(Suit::Diamonds, until);
        assert!(cd.is_blocked(Suit::Diamonds, t0()));
        assert!(!cd.is_blocked(Suit::Diamonds, until));
        assert!(!cd.clear_expired(Suit::Diamonds, t0()));
        assert!(cd.clear_expired(Suit::Diamonds, until));
        assert!(!cd.is_blocked(Suit::Diamonds, t0()));
    }

    #[test]
    fn test_histories_are_per_suit() {
        let mut cd = CooldownTracker::new();
        cd.record(Suit::Spades, Outcome::Success(0));
        cd.record(Suit::Spades, Outcome::Success(0));
        cd.record(Suit::Hearts, Outcome::Fail);
        // Spades still one short of a verdict.
        assert_eq!(cd.record(Suit::Hearts, Outcome::Fail), CooldownVerdict::Continue);
        assert_eq!(cd.record(Suit::Spades, Outcome::Success(0)), CooldownVerdict::Block);
    }

    #[test]
    fn test_reset_suit_drops_streak() {
        let mut cd = CooldownTracker::new();
        cd.note_attempt(Suit::Clubs);
        cd.record(Suit::Clubs, Outcome::Success(0));
        cd.reset_suit(Suit::Clubs);
        assert_eq!(cd.history_len(Suit::Clubs), 0);
        assert!(cd.counters().is_empty());
    }
}
