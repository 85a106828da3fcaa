//! Telegram ingestion glue — thin I/O in front of the engine.
//!
//! Long-polls `getUpdates`, classifies channel posts into the two
//! logical feeds and forwards them as `FeedEvent`s. Direct messages
//! from the admin are parsed as commands. All network faults are
//! logged and retried; nothing here is fatal.

use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::engine::messages::{EngineCmd, EngineStatus, FeedEvent, FeedSource};

// ─────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub bot_token: Option<String>,
    pub results_channel: i64,
    pub stats_channel: i64,
    /// Telegram user allowed to issue commands. 0 allows nobody.
    pub admin_id: i64,
    pub api_base: String,
    pub poll_timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            results_channel: 0,
            stats_channel: 0,
            admin_id: 0,
            api_base: "https://api.telegram.org".to_string(),
            poll_timeout_secs: 30,
        }
    }
}

impl TransportConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.bot_token = std::env::var("SUITCAST_BOT_TOKEN").ok().filter(|t| !t.is_empty());
        if let Ok(v) = std::env::var("SUITCAST_RESULTS_CHANNEL") {
            if let Ok(id) = v.parse() {
                cfg.results_channel = id;
            }
        }
        if let Ok(v) = std::env::var("SUITCAST_STATS_CHANNEL") {
            if let Ok(id) = v.parse() {
                cfg.stats_channel = id;
            }
        }
        if let Ok(v) = std::env::var("SUITCAST_ADMIN_ID") {
            if let Ok(id) = v.parse() {
                cfg.admin_id = id;
            }
        }
        if let Ok(v) = std::env::var("SUITCAST_API_BASE") {
            cfg.api_base = v;
        }
        cfg
    }
}

/// Which logical feed a chat id belongs to.
pub fn classify_source(chat_id: i64, cfg: &TransportConfig) -> Option<FeedSource> {
    if chat_id == cfg.results_channel && chat_id != 0 {
        Some(FeedSource::Results)
    } else if chat_id == cfg.stats_channel && chat_id != 0 {
        Some(FeedSource::Stats)
    } else {
        None
    }
}

// ─────────────────────────────────────────────────────────
// Admin commands
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminCommand {
    SetOffset(u64),
    Status,
    Help,
    Start,
}

/// Parse an admin direct-message command. `/a` is a shortcut for
/// `/set_a`.
pub fn parse_admin_command(text: &str) -> Option<AdminCommand> {
    let text = text.trim();
    if let Some(rest) = text.strip_prefix("/set_a ").or_else(|| text.strip_prefix("/a ")) {
        return rest.trim().parse().ok().map(AdminCommand::SetOffset);
    }
    match text {
        "/status" => Some(AdminCommand::Status),
        "/help" => Some(AdminCommand::Help),
        "/start" => Some(AdminCommand::Start),
        _ => None,
    }
}

pub fn format_status(status: &EngineStatus) -> String {
    let mut out = String::from("📊 État du bot:\n\n");
    out.push_str(&format!("🎮 Jeu actuel: #{}\n", status.current_round));
    out.push_str(&format!("🔢 Décalage 'a': {}\n", status.offset));

    if !status.cooldowns.is_empty() {
        out.push_str("\n🔒 Blocages actifs:\n");
        for cd in &status.cooldowns {
            out.push_str(&format!(
                "• {:?}: {}min {}s\n",
                cd.suit,
                cd.remaining_secs / 60,
                cd.remaining_secs % 60,
            ));
        }
    }
    if !status.counters.is_empty() {
        out.push_str("\n📈 Compteurs:\n");
        for c in &status.counters {
            out.push_str(&format!("• {:?}: {}/3\n", c.suit, c.consecutive));
        }
    }
    if status.pending.is_empty() {
        out.push_str("\n🔮 Aucune prédiction active\n");
    } else {
        out.push_str(&format!("\n🔮 Actives ({}):\n", status.pending.len()));
        for p in &status.pending {
            let retry = if p.retry_depth > 0 {
                format!(" (R{})", p.retry_depth)
            } else {
                String::new()
            };
            out.push_str(&format!(
                "• #{}{}: {:?} (dans {})\n",
                p.target_round, retry, p.suit, p.distance,
            ));
        }
    }
    out
}

const HELP_TEXT: &str = "📖 Aide\n\n\
    Règles:\n\
    1. Surveille le canal de statistiques\n\
    2. Décalage ≥10 entre deux couleurs → prédit la plus faible\n\
    3. Cible: dernier numéro observé + a\n\
    4. Rattrapages: 3 jeux suivants si échec\n\
    5. Blocage 5min après 3 résultats\n\n\
    Commandes:\n\
    /status — état du bot\n\
    /set_a <n> — modifier 'a'\n\
    /help — cette aide";

// ─────────────────────────────────────────────────────────
// Long-poll loop
// ─────────────────────────────────────────────────────────

pub struct Transport {
    cfg: TransportConfig,
    client: reqwest::Client,
    feed_tx: mpsc::Sender<FeedEvent>,
    cmd_tx: mpsc::Sender<EngineCmd>,
    status_rx: watch::Receiver<EngineStatus>,
}

impl Transport {
    pub fn new(
        cfg: TransportConfig,
        feed_tx: mpsc::Sender<FeedEvent>,
        cmd_tx: mpsc::Sender<EngineCmd>,
        status_rx: watch::Receiver<EngineStatus>,
    ) -> Self {
        Self {
            cfg,
            client: reqwest::Client::new(),
            feed_tx,
            cmd_tx,
            status_rx,
        }
    }

    pub async fn run(self) {
        let token = match self.cfg.bot_token.clone() {
            Some(t) => t,
            None => {
                warn!("📡 No bot token — transport idle, engine only reachable via HTTP admin");
                return;
            }
        };
        info!(
            "📡 Transport started | results={} stats={} admin={}",
            self.cfg.results_channel, self.cfg.stats_channel, self.cfg.admin_id,
        );

        let mut next_offset: i64 = 0;
        loop {
            match self.poll_once(&token, next_offset).await {
                Ok(Some(new_offset)) => next_offset = new_offset,
                Ok(None) => {}
                Err(e) => {
                    warn!("📡 Poll failed: {e:?} — retrying in 2s");
                    sleep(Duration::from_secs(2)).await;
                }
            }
            if self.feed_tx.is_closed() {
                info!("📡 Engine gone — transport stopping");
                return;
            }
        }
    }

    /// One `getUpdates` long-poll cycle. Returns the next update
    /// offset when any updates were consumed.
    async fn poll_once(&self, token: &str, offset: i64) -> Result<Option<i64>> {
        let url = format!(
            "{}/bot{}/getUpdates?timeout={}&offset={}",
            self.cfg.api_base, token, self.cfg.poll_timeout_secs, offset,
        );
        let resp: Value = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(self.cfg.poll_timeout_secs + 10))
            .send()
            .await
            .context("getUpdates request")?
            .json()
            .await
            .context("getUpdates body")?;

        if resp["ok"].as_bool() != Some(true) {
            anyhow::bail!("getUpdates rejected: {}", resp["description"]);
        }

        let updates = match resp["result"].as_array() {
            Some(u) if !u.is_empty() => u.clone(),
            _ => return Ok(None),
        };

        let mut max_id = offset;
        for update in &updates {
            if let Some(id) = update["update_id"].as_i64() {
                max_id = max_id.max(id + 1);
            }
            self.dispatch_update(token, update).await;
        }
        Ok(Some(max_id))
    }

    async fn dispatch_update(&self, token: &str, update: &Value) {
        let (post, is_edit) = if update["channel_post"].is_object() {
            (&update["channel_post"], false)
        } else if update["edited_channel_post"].is_object() {
            (&update["edited_channel_post"], true)
        } else if update["message"].is_object() {
            self.handle_private_message(token, &update["message"]).await;
            return;
        } else {
            return;
        };

        let chat_id = post["chat"]["id"].as_i64().unwrap_or(0);
        let text = match post["text"].as_str() {
            Some(t) => t,
            None => return,
        };
        let source = match classify_source(chat_id, &self.cfg) {
            Some(s) => s,
            None => {
                debug!("📡 Post from unwatched chat {} ignored", chat_id);
                return;
            }
        };
        let _ = self
            .feed_tx
            .send(FeedEvent {
                source,
                text: text.to_string(),
                is_edit,
            })
            .await;
    }

    async fn handle_private_message(&self, token: &str, message: &Value) {
        let from_id = message["from"]["id"].as_i64().unwrap_or(0);
        let chat_id = message["chat"]["id"].as_i64().unwrap_or(0);
        let text = match message["text"].as_str() {
            Some(t) => t,
            None => return,
        };
        if !text.starts_with('/') {
            return;
        }
        if self.cfg.admin_id == 0 || from_id != self.cfg.admin_id {
            debug!("📡 Command from non-admin {} ignored", from_id);
            return;
        }

        let reply = match parse_admin_command(text) {
            Some(AdminCommand::SetOffset(n)) => {
                let _ = self.cmd_tx.send(EngineCmd::SetOffset(n)).await;
                format!("✅ Décalage 'a' mis à jour : {}", n)
            }
            Some(AdminCommand::Status) => format_status(&self.status_rx.borrow().clone()),
            Some(AdminCommand::Help) => HELP_TEXT.to_string(),
            Some(AdminCommand::Start) => {
                "🤖 Bot de prédiction en ligne.\nCommandes: /status, /set_a, /help".to_string()
            }
            None => format!("❓ Commande inconnue: {}", text),
        };
        self.send_reply(token, chat_id, &reply).await;
    }

    async fn send_reply(&self, token: &str, chat_id: i64, text: &str) {
        let url = format!("{}/bot{}/sendMessage", self.cfg.api_base, token);
        let body = serde_json::json!({ "chat_id": chat_id, "text": text });
        if let Err(e) = self.client.post(&url).json(&body).send().await {
            warn!("📡 Reply failed: {e:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::suit::Suit;

    fn cfg() -> TransportConfig {
        TransportConfig {
            results_channel: -100111,
            stats_channel: -100222,
            admin_id: 42,
            ..Default::default()
        }
    }

    #[test]
    fn test_classify_source() {
        let cfg = cfg();
        assert_eq!(classify_source(-100111, &cfg), Some(FeedSource::Results));
        assert_eq!(classify_source(-100222, &cfg), Some(FeedSource::Stats));
        assert_eq!(classify_source(-100333, &cfg), None);
        // Unset channels never match.
        assert_eq!(classify_source(0, &TransportConfig::default()), None);
    }

    #[test]
    fn test_parse_admin_command() {
        assert_eq!(parse_admin_command("/set_a 3"), Some(AdminCommand::SetOffset(3)));
        assert_eq!(parse_admin_command("/a 2"), Some(AdminCommand::SetOffset(2)));
        assert_eq!(parse_admin_command("/status"), Some(AdminCommand::Status));
        assert_eq!(parse_admin_command("/help"), Some(AdminCommand::Help));
        assert_eq!(parse_admin_command("/start"), Some(AdminCommand::Start));
        assert_eq!(parse_admin_command("/set_a trois"), None);
        assert_eq!(parse_admin_command("bonjour"), None);
    }

    #[test]
    fn test_format_status_shapes() {
        let mut status = EngineStatus::default();
        status.current_round = 120;
        status.offset = 1;
        let text = format_status(&status);
        assert!(text.contains("#120"));
        assert!(text.contains("Aucune prédiction active"));

        status.pending.push(crate::engine::messages::PendingStatus {
            target_round: 121,
            suit: Suit::Diamonds,
            retry_depth: 2,
            distance: 1,
        });
        let text = format_status(&status);
        assert!(text.contains("#121"));
        assert!(text.contains("(R2)"));
    }
}
