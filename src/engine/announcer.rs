//! Announcer actor — publishes prediction announcements to a Telegram
//! channel and amends them in place at settlement.
//!
//! I/O failures are logged and never fatal: a publish that fails (or
//! runs in dry mode) reports a null handle and the engine tracks the
//! prediction all the same, it just never becomes visibly amended.

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::messages::{AnnounceCmd, AnnounceResult, MessageHandle};
use super::suit::Suit;

// ─────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AnnouncerConfig {
    pub bot_token: Option<String>,
    /// Destination channel. 0 disables publication.
    pub channel_id: i64,
    pub api_base: String,
    pub dry_run: bool,
}

impl Default for AnnouncerConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            channel_id: 0,
            api_base: "https://api.telegram.org".to_string(),
            dry_run: false,
        }
    }
}

impl AnnouncerConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.bot_token = std::env::var("SUITCAST_BOT_TOKEN").ok().filter(|t| !t.is_empty());
        if let Ok(v) = std::env::var("SUITCAST_PREDICTION_CHANNEL") {
            if let Ok(id) = v.parse() {
                cfg.channel_id = id;
            }
        }
        if let Ok(v) = std::env::var("SUITCAST_API_BASE") {
            cfg.api_base = v;
        }
        if let Ok(v) = std::env::var("SUITCAST_DRY_RUN") {
            cfg.dry_run = v != "0" && v.to_lowercase() != "false";
        }
        cfg
    }
}

/// Announcement body. Publishing shows `⏳`; amendment swaps in the
/// settlement verdict glyph.
pub fn announcement_text(target_round: u64, suit: Suit, verdict: &str) -> String {
    format!(
        "🎮 joueur №{}\n⚜️ Couleur de la carte:{}\n🎰 Poursuite deux jeux(🔰+3)\n🗯️ Résultats :{}",
        target_round,
        suit.display(),
        verdict,
    )
}

// ─────────────────────────────────────────────────────────
// Actor
// ─────────────────────────────────────────────────────────

pub struct Announcer {
    cfg: AnnouncerConfig,
    client: Option<reqwest::Client>,
    cmd_rx: mpsc::Receiver<AnnounceCmd>,
    result_tx: mpsc::Sender<AnnounceResult>,
}

impl Announcer {
    pub fn new(
        cfg: AnnouncerConfig,
        cmd_rx: mpsc::Receiver<AnnounceCmd>,
        result_tx: mpsc::Sender<AnnounceResult>,
    ) -> Self {
        let live = !cfg.dry_run && cfg.bot_token.is_some() && cfg.channel_id != 0;
        let client = live.then(reqwest::Client::new);
        Self {
            cfg,
            client,
            cmd_rx,
            result_tx,
        }
    }

    pub async fn run(mut self) {
        info!(
            "📣 Announcer started | channel={} live={} dry={}",
            self.cfg.channel_id,
            self.client.is_some(),
            self.cfg.dry_run,
        );

        while let Some(cmd) = self.cmd_rx.recv().await {
            match cmd {
                AnnounceCmd::Publish {
                    seq,
                    target_round,
                    suit,
                } => {
                    let text = announcement_text(target_round, suit, "⏳");
                    let handle = self.send_message(&text).await;
                    match handle {
                        Some(h) => info!("✅ Published #{} → message {}", target_round, h.0),
                        None => warn!("⚠️ Publish #{} yielded no handle", target_round),
                    }
                    let _ = self
                        .result_tx
                        .send(AnnounceResult::Published {
                            seq,
                            target_round,
                            handle,
                        })
                        .await;
                }
                AnnounceCmd::Amend {
                    handle,
                    target_round,
                    suit,
                    outcome,
                } => {
                    let text = announcement_text(target_round, suit, outcome.glyph());
                    if self.edit_message(handle, &text).await {
                        info!("✏️ Amended #{} → {}", target_round, outcome.glyph());
                    } else {
                        warn!("⚠️ Amendment for #{} not delivered", target_round);
                    }
                }
            }
        }

        info!("📣 Announcer shutting down");
    }

    async fn send_message(&self, text: &str) -> Option<MessageHandle> {
        let (client, token) = match (&self.client, &self.cfg.bot_token) {
            (Some(c), Some(t)) => (c, t),
            _ => {
                info!("📝 DRY publish:\n{}", text);
                return None;
            }
        };
        let url = format!("{}/bot{}/sendMessage", self.cfg.api_base, token);
        let body = json!({ "chat_id": self.cfg.channel_id, "text": text });

        match client.post(&url).json(&body).send().await {
            Ok(resp) => match resp.json::<Value>().await {
                Ok(v) if v["ok"].as_bool() == Some(true) => {
                    v["result"]["message_id"].as_i64().map(MessageHandle)
                }
                Ok(v) => {
                    warn!("❌ sendMessage rejected: {}", v["description"]);
                    None
                }
                Err(e) => {
                    warn!("❌ sendMessage bad response: {e:?}");
                    None
                }
            },
            Err(e) => {
                warn!("❌ sendMessage failed: {e:?}");
                None
            }
        }
    }

    async fn edit_message(&self, handle: MessageHandle, text: &str) -> bool {
        let (client, token) = match (&self.client, &self.cfg.bot_token) {
            (Some(c), Some(t)) => (c, t),
            _ => {
                info!("📝 DRY amend message {}:\n{}", handle.0, text);
                return false;
            }
        };
        let url = format!("{}/bot{}/editMessageText", self.cfg.api_base, token);
        let body = json!({
            "chat_id": self.cfg.channel_id,
            "message_id": handle.0,
            "text": text,
        });

        match client.post(&url).json(&body).send().await {
            Ok(resp) => match resp.json::<Value>().await {
                Ok(v) if v["ok"].as_bool() == Some(true) => true,
                Ok(v) => {
                    warn!("❌ editMessageText rejected: {}", v["description"]);
                    false
                }
                Err(e) => {
                    warn!("❌ editMessageText bad response: {e:?}");
                    false
                }
            },
            Err(e) => {
                warn!("❌ editMessageText failed: {e:?}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::messages::Outcome;

    #[test]
    fn test_announcement_text_shapes() {
        let published = announcement_text(101, Suit::Diamonds, "⏳");
        assert!(published.starts_with("🎮 joueur №101\n"));
        assert!(published.contains("♦️"));
        assert!(published.ends_with("Résultats :⏳"));

        let amended = announcement_text(101, Suit::Diamonds, Outcome::Success(2).glyph());
        assert!(amended.ends_with("Résultats :✅2️⃣"));
    }

    #[tokio::test]
    async fn test_dry_publish_reports_null_handle() {
        let cfg = AnnouncerConfig {
            dry_run: true,
            channel_id: 42,
            ..Default::default()
        };
        let (cmd_tx, cmd_rx) = mpsc::channel(4);
        let (result_tx, mut result_rx) = mpsc::channel(4);
        let handle = tokio::spawn(Announcer::new(cfg, cmd_rx, result_tx).run());

        cmd_tx
            .send(AnnounceCmd::Publish {
                seq: 9,
                target_round: 7,
                suit: Suit::Clubs,
            })
            .await
            .unwrap();

        match result_rx.recv().await {
            Some(AnnounceResult::Published {
                seq,
                target_round,
                handle,
            }) => {
                assert_eq!(seq, 9);
                assert_eq!(target_round, 7);
                assert!(handle.is_none());
            }
            other => panic!("unexpected result: {:?}", other),
        }

        drop(cmd_tx);
        let _ = handle.await;
    }
}
