//! Prediction Engine actor — scheduling and reconciliation.
//!
//! Single-owner serialization point for all engine state: feed events,
//! admin commands and the daily reset all arrive through this actor's
//! channels, one at a time, in arrival order. Publishing and amending
//! announcements go out through the Announcer channel and never block
//! settlement bookkeeping.

use std::collections::HashSet;

use chrono::Duration as ChronoDuration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::clock::Clock;
use super::cooldown::{CooldownTracker, CooldownVerdict};
use super::extract::{
    extract_groups, extract_round_number, is_finalized, message_prefix, parse_stats, suit_in_group,
};
use super::ledger::{Ledger, Prediction, QueuedPrediction};
use super::messages::*;
use super::suit::{Suit, PAIRINGS};

/// Minimum count gap between a pairing's suits before a signal fires.
const DIFF_THRESHOLD: i64 = 10;
/// Catch-up attempts after a depth-0 miss.
const MAX_RETRY_DEPTH: u8 = 3;

// ─────────────────────────────────────────────────────────
// Config
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Rounds ahead of the last observed round for depth-0 targets.
    pub offset: u64,
    /// Suit cooldown window after three settlement outcomes.
    pub cooldown_secs: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            offset: 1,
            cooldown_secs: 300,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(v) = std::env::var("SUITCAST_OFFSET") {
            if let Ok(n) = v.parse() {
                cfg.offset = n;
            }
        }
        if let Ok(v) = std::env::var("SUITCAST_COOLDOWN_SECS") {
            if let Ok(n) = v.parse() {
                cfg.cooldown_secs = n;
            }
        }
        cfg
    }
}

// ─────────────────────────────────────────────────────────
// Internal counters
// ─────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Counters {
    stats_ticks: u64,
    results_ticks: u64,
    scheduled: u64,
    published: u64,
    settled_success: u64,
    settled_fail: u64,
    retries_advanced: u64,
    relaunches: u64,
    dedup_skips: u64,
    resets: u64,
}

// ─────────────────────────────────────────────────────────
// Actor
// ─────────────────────────────────────────────────────────

pub struct PredictionEngine<C: Clock> {
    cfg: EngineConfig,
    clock: C,
    /// Admin-adjustable copy of `cfg.offset`.
    offset: u64,
    ledger: Ledger,
    cooldowns: CooldownTracker,
    processed: HashSet<(u64, String)>,
    current_round: u64,
    publish_seq: u64,
    counters: Counters,

    feed_rx: mpsc::Receiver<FeedEvent>,
    cmd_rx: mpsc::Receiver<EngineCmd>,
    publish_rx: mpsc::Receiver<AnnounceResult>,
    announce_tx: mpsc::Sender<AnnounceCmd>,
    status_tx: watch::Sender<EngineStatus>,
}

impl<C: Clock> PredictionEngine<C> {
    pub fn new(
        cfg: EngineConfig,
        clock: C,
        feed_rx: mpsc::Receiver<FeedEvent>,
        cmd_rx: mpsc::Receiver<EngineCmd>,
        publish_rx: mpsc::Receiver<AnnounceResult>,
        announce_tx: mpsc::Sender<AnnounceCmd>,
        status_tx: watch::Sender<EngineStatus>,
    ) -> Self {
        let offset = cfg.offset;
        Self {
            cfg,
            clock,
            offset,
            ledger: Ledger::new(),
            cooldowns: CooldownTracker::new(),
            processed: HashSet::new(),
            current_round: 0,
            publish_seq: 0,
            counters: Counters::default(),
            feed_rx,
            cmd_rx,
            publish_rx,
            announce_tx,
            status_tx,
        }
    }

    pub async fn run(mut self) {
        info!(
            "🎯 Prediction engine started | offset={} cooldown={}s threshold={}",
            self.offset, self.cfg.cooldown_secs, DIFF_THRESHOLD,
        );

        loop {
            tokio::select! {
                ev = self.feed_rx.recv() => {
                    match ev {
                        Some(ev) => self.on_feed(ev).await,
                        None => break, // Transport gone
                    }
                }
                cmd = self.cmd_rx.recv() => {
                    if let Some(cmd) = cmd {
                        self.on_cmd(cmd);
                    }
                }
                res = self.publish_rx.recv() => {
                    if let Some(res) = res {
                        self.on_announce_result(res);
                    }
                }
            }
            self.broadcast_status();
        }

        info!(
            "🎯 Engine shutdown | stats={} results={} scheduled={} published={} \
             settled(ok={} fail={}) retries={} relaunches={} dedup={} resets={}",
            self.counters.stats_ticks,
            self.counters.results_ticks,
            self.counters.scheduled,
            self.counters.published,
            self.counters.settled_success,
            self.counters.settled_fail,
            self.counters.retries_advanced,
            self.counters.relaunches,
            self.counters.dedup_skips,
            self.counters.resets,
        );
    }

    async fn on_feed(&mut self, ev: FeedEvent) {
        match ev.source {
            FeedSource::Stats => self.on_stats(&ev.text).await,
            FeedSource::Results => self.on_results(&ev.text).await,
        }
    }

    // ═════════════════════════════════════════════════
    // Scheduling (statistics feed)
    // ═════════════════════════════════════════════════

    async fn on_stats(&mut self, text: &str) {
        self.counters.stats_ticks += 1;

        let stats = parse_stats(text);
        if stats.is_empty() {
            warn!("❌ No stats extracted: {:?}…", message_prefix(text));
            return;
        }
        if stats.len() < 4 {
            warn!("⚠️ Incomplete stats: {:?}", stats);
        } else {
            info!("✅ Stats extracted: {:?}", stats);
        }

        for (x, y) in PAIRINGS {
            let (vx, vy) = match (stats.get(&x), stats.get(&y)) {
                (Some(a), Some(b)) => (*a as i64, *b as i64),
                _ => continue,
            };
            let diff = (vx - vy).abs();
            if diff < DIFF_THRESHOLD {
                continue;
            }
            let predicted = if vx < vy { x } else { y };
            info!(
                "🔎 Signal: {:?}({}) vs {:?}({}) diff={} → predict {:?}",
                x, vx, y, vy, diff, predicted,
            );

            let now = self.clock.now();
            if self.cooldowns.is_blocked(predicted, now) {
                info!("🔒 {:?} under cooldown, pairing skipped", predicted);
                continue;
            }
            if self.cooldowns.clear_expired(predicted, now) {
                info!("🔓 Cooldown elapsed for {:?}, history reset", predicted);
            }
            if let Some(prev) = self.cooldowns.last_predicted() {
                if prev != predicted {
                    self.cooldowns.reset_suit(prev);
                    info!("🔁 Target change {:?} → {:?}", prev, predicted);
                }
            }

            if self.current_round == 0 {
                warn!("⚠️ No results round observed yet — cannot schedule");
                return;
            }
            let target = self.current_round + self.offset;
            let staged = self.ledger.queue(QueuedPrediction {
                target_round: target,
                suit: predicted,
                base_round: self.current_round,
                retry_depth: 0,
                origin_round: target,
                queued_at: now,
            });
            if staged {
                self.cooldowns.note_attempt(predicted);
                self.counters.scheduled += 1;
                info!("📋 Prediction #{} staged for {:?}", target, predicted);
            } else {
                debug!("📋 #{} already staged or pending — skipped", target);
            }
            // Only the first qualifying pairing per tick is acted upon.
            return;
        }
    }

    // ═════════════════════════════════════════════════
    // Reconciliation (results feed)
    // ═════════════════════════════════════════════════

    async fn on_results(&mut self, text: &str) {
        if !is_finalized(text) {
            debug!("⏳ Round still in motion, ignored");
            return;
        }
        let round = match extract_round_number(text) {
            Some(r) => r,
            None => {
                debug!("No round token in finalized message, ignored");
                return;
            }
        };
        // The freshest observed round is recorded even for duplicates.
        self.current_round = round;
        self.counters.results_ticks += 1;

        let key = (round, message_prefix(text));
        if self.processed.contains(&key) {
            self.counters.dedup_skips += 1;
            debug!("♻️ Duplicate/edited message for #{} ignored", round);
            return;
        }
        self.processed.insert(key);

        let groups = extract_groups(text);
        if groups.len() < 2 {
            debug!("#{}: fewer than two groups, no usable verdict", round);
            return;
        }
        let second_group = groups[1].clone();

        self.reconcile(round, &second_group).await;
        self.flush_queued().await;
    }

    /// Steps A/B of reconciliation: settle or advance the ledger entry
    /// (at most one per round) matching this finalized round.
    async fn reconcile(&mut self, round: u64, second_group: &str) {
        let pred = match self.ledger.pending(round) {
            Some(p) => p.clone(),
            None => return,
        };
        let hit = suit_in_group(second_group, pred.suit);

        if pred.retry_depth == 0 {
            if hit {
                self.settle(round, Outcome::Success(0)).await;
            } else {
                let next = round + 1;
                let staged = self.ledger.queue(QueuedPrediction {
                    target_round: next,
                    suit: pred.suit,
                    base_round: pred.base_round,
                    retry_depth: 1,
                    origin_round: round,
                    queued_at: self.clock.now(),
                });
                if staged {
                    info!("🩹 Miss #{} — catch-up 1 staged for #{}", round, next);
                }
            }
            return;
        }

        // Catch-up entry: settle against the origin round's record only.
        let depth = pred.retry_depth;
        if hit {
            self.settle(pred.origin_round, Outcome::Success(depth)).await;
            if round != pred.origin_round {
                self.ledger.remove_pending(round);
            }
        } else if depth < MAX_RETRY_DEPTH {
            let next = round + 1;
            let staged = self.ledger.queue(QueuedPrediction {
                target_round: next,
                suit: pred.suit,
                base_round: pred.base_round,
                retry_depth: depth + 1,
                origin_round: pred.origin_round,
                queued_at: self.clock.now(),
            });
            if staged {
                self.counters.retries_advanced += 1;
                info!(
                    "🩹 Catch-up {} missed #{} — catch-up {} staged for #{}",
                    depth,
                    round,
                    depth + 1,
                    next,
                );
            }
            self.ledger.remove_pending(round);
        } else {
            info!(
                "❌ Final miss for origin #{} after {} catch-ups",
                pred.origin_round, MAX_RETRY_DEPTH,
            );
            self.settle(pred.origin_round, Outcome::Fail).await;
            if round != pred.origin_round {
                self.ledger.remove_pending(round);
            }
        }
    }

    /// Settle the prediction tracked at `round`: amend its public
    /// record, fold the outcome into the cooldown tracker and apply
    /// any cooldown verdict.
    async fn settle(&mut self, round: u64, outcome: Outcome) -> bool {
        let pred = match self.ledger.remove_pending(round) {
            Some(p) => p,
            None => return false,
        };

        match pred.handle {
            Some(handle) => {
                let _ = self
                    .announce_tx
                    .send(AnnounceCmd::Amend {
                        handle,
                        target_round: round,
                        suit: pred.suit,
                        outcome,
                    })
                    .await;
            }
            None => debug!("#{}: no publish handle, verdict not visible", round),
        }

        if outcome.is_fail() {
            self.counters.settled_fail += 1;
        } else {
            self.counters.settled_success += 1;
        }
        info!("⚖️ #{} settled {:?} {}", round, pred.suit, outcome.glyph());

        match self.cooldowns.record(pred.suit, outcome) {
            CooldownVerdict::Continue => {}
            CooldownVerdict::RelaunchAndBlock => {
                // A failure inside the window re-raises immediately,
                // bypassing both the queue and the cooldown check.
                if self.current_round > 0 {
                    let target = self.current_round + 1;
                    self.counters.relaunches += 1;
                    info!("🔄 Re-raising {:?} at #{} before blocking", pred.suit, target);
                    self.publish_now(target, pred.suit, self.current_round).await;
                }
                self.apply_block(pred.suit);
            }
            CooldownVerdict::Block => self.apply_block(pred.suit),
        }
        true
    }

    fn apply_block(&mut self, suit: Suit) {
        let until = self.clock.now() + ChronoDuration::seconds(self.cfg.cooldown_secs);
        self.cooldowns.block(suit, until);
        info!("🔒 {:?} blocked until {}", suit, until);
    }

    /// Monotonic per-publish id. Never reset, so a handle from before
    /// a reset can never match a fresh entry.
    fn next_publish_seq(&mut self) -> u64 {
        self.publish_seq += 1;
        self.publish_seq
    }

    /// Publish a depth-0 prediction immediately, without staging.
    async fn publish_now(&mut self, target: u64, suit: Suit, base: u64) {
        let seq = self.next_publish_seq();
        let _ = self
            .announce_tx
            .send(AnnounceCmd::Publish {
                seq,
                target_round: target,
                suit,
            })
            .await;
        self.counters.published += 1;
        self.ledger.insert_pending(Prediction {
            target_round: target,
            suit,
            base_round: base,
            retry_depth: 0,
            origin_round: target,
            handle: None,
            publish_seq: Some(seq),
            created_at: self.clock.now(),
        });
    }

    /// Step D: move every staged prediction into the pending ledger,
    /// ascending by target round. Depth-0 entries are published;
    /// catch-up entries are tracked silently.
    async fn flush_queued(&mut self) {
        for q in self.ledger.take_queued() {
            let seq = if q.retry_depth == 0 {
                let seq = self.next_publish_seq();
                let _ = self
                    .announce_tx
                    .send(AnnounceCmd::Publish {
                        seq,
                        target_round: q.target_round,
                        suit: q.suit,
                    })
                    .await;
                self.counters.published += 1;
                info!("📣 Prediction #{} published ({:?})", q.target_round, q.suit);
                Some(seq)
            } else {
                info!(
                    "🩹 Catch-up {} armed for #{} (origin #{})",
                    q.retry_depth, q.target_round, q.origin_round,
                );
                None
            };
            self.ledger.insert_pending(Prediction {
                target_round: q.target_round,
                suit: q.suit,
                base_round: q.base_round,
                retry_depth: q.retry_depth,
                origin_round: q.origin_round,
                handle: None,
                publish_seq: seq,
                created_at: q.queued_at,
            });
        }
    }

    // ═════════════════════════════════════════════════
    // Commands, publish feedback, status
    // ═════════════════════════════════════════════════

    fn on_cmd(&mut self, cmd: EngineCmd) {
        match cmd {
            EngineCmd::SetOffset(n) => {
                info!("🔧 Offset {} → {}", self.offset, n);
                self.offset = n;
            }
            EngineCmd::Reset => self.reset(),
        }
    }

    /// Full cold reset. State is deliberately volatile.
    fn reset(&mut self) {
        warn!("🚨 Cold reset — wiping all engine state");
        self.ledger.clear();
        self.cooldowns.clear_all();
        self.processed.clear();
        self.current_round = 0;
        self.counters.resets += 1;
    }

    fn on_announce_result(&mut self, res: AnnounceResult) {
        let AnnounceResult::Published {
            seq,
            target_round,
            handle,
        } = res;
        match self.ledger.pending_mut(target_round) {
            // The entry must still be the one this publish was issued
            // for; a handle for a replaced entry is dropped.
            Some(pred) if pred.publish_seq == Some(seq) && pred.handle.is_none() => {
                pred.handle = handle;
            }
            _ => debug!(
                "#{}: publish handle (seq {}) arrived for a gone or replaced entry",
                target_round, seq,
            ),
        }
    }

    fn broadcast_status(&self) {
        let now = self.clock.now();
        let status = EngineStatus {
            current_round: self.current_round,
            offset: self.offset,
            cooldowns: self
                .cooldowns
                .active_blocks(now)
                .into_iter()
                .map(|(suit, until)| CooldownStatus {
                    suit,
                    blocked_until: until,
                    remaining_secs: (until - now).num_seconds(),
                })
                .collect(),
            counters: self
                .cooldowns
                .counters()
                .into_iter()
                .map(|(suit, consecutive)| SuitCounter { suit, consecutive })
                .collect(),
            pending: self
                .ledger
                .pending_iter()
                .map(|p| PendingStatus {
                    target_round: p.target_round,
                    suit: p.suit,
                    retry_depth: p.retry_depth,
                    distance: p.target_round as i64 - self.current_round as i64,
                })
                .collect(),
            queued: self.ledger.queued_len(),
        };
        let _ = self.status_tx.send(status);
    }
}

// ─────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────
