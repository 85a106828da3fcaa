//! Daily reset timer. Fires once per day at a configured local
//! wall-clock time and tells the engine to cold-reset its state,
//! matching the upstream game's nightly round-counter restart.

use chrono::{DateTime, Datelike, Duration as ChronoDuration, FixedOffset, TimeZone, Utc};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::engine::messages::EngineCmd;

#[derive(Debug, Clone, Copy)]
pub struct ResetConfig {
    pub hour: u32,
    pub minute: u32,
    /// Offset of the reset wall clock from UTC, in hours.
    pub utc_offset_hours: i32,
}

impl Default for ResetConfig {
    fn default() -> Self {
        Self {
            hour: 0,
            minute: 59,
            utc_offset_hours: 1,
        }
    }
}

impl ResetConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(v) = std::env::var("SUITCAST_RESET_TIME") {
            if let Some((h, m)) = v.split_once(':') {
                if let (Ok(h), Ok(m)) = (h.parse(), m.parse()) {
                    if h < 24 && m < 60 {
                        cfg.hour = h;
                        cfg.minute = m;
                    }
                }
            }
        }
        if let Ok(v) = std::env::var("SUITCAST_RESET_UTC_OFFSET") {
            if let Ok(off) = v.parse::<i32>() {
                if (-12..=14).contains(&off) {
                    cfg.utc_offset_hours = off;
                }
            }
        }
        cfg
    }
}

/// Time until the next occurrence of the configured wall-clock time.
pub fn next_reset_delay(now: DateTime<Utc>, cfg: &ResetConfig) -> std::time::Duration {
    let tz = FixedOffset::east_opt(cfg.utc_offset_hours * 3600)
        .unwrap_or_else(|| FixedOffset::east_opt(0).unwrap());
    let local = now.with_timezone(&tz);
    let today = tz
        .with_ymd_and_hms(local.year(), local.month(), local.day(), cfg.hour, cfg.minute, 0)
        .single();

    let mut target = match today {
        Some(t) => t,
        None => return std::time::Duration::from_secs(24 * 3600),
    };
    if target <= local {
        target += ChronoDuration::days(1);
    }
    (target - local)
        .to_std()
        .unwrap_or(std::time::Duration::from_secs(60))
}

pub async fn run_reset_timer(cfg: ResetConfig, cmd_tx: mpsc::Sender<EngineCmd>) {
    info!(
        "⏰ Reset timer armed | {:02}:{:02} UTC{:+}",
        cfg.hour, cfg.minute, cfg.utc_offset_hours,
    );
    loop {
        let delay = next_reset_delay(Utc::now(), &cfg);
        info!("⏰ Next reset in {}s", delay.as_secs());
        sleep(delay).await;

        if cmd_tx.send(EngineCmd::Reset).await.is_err() {
            warn!("⏰ Engine gone — reset timer stopping");
            return;
        }
        info!("🔄 Daily reset dispatched");
        // Skip past the firing minute before rescheduling.
        sleep(std::time::Duration::from_secs(61)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, h, m, s).unwrap()
    }

    #[test]
    fn test_delay_same_day() {
        // 00:59 UTC+1 is 23:59 UTC the previous day, so from 20:00 UTC
        // the next firing is 3h59m away.
        let cfg = ResetConfig::default();
        let delay = next_reset_delay(at(20, 0, 0), &cfg);
        assert_eq!(delay.as_secs(), 3 * 3600 + 59 * 60);
    }

    #[test]
    fn test_delay_rolls_to_next_day() {
        let cfg = ResetConfig::default();
        // One second past the firing instant: full day minus a second.
        let delay = next_reset_delay(at(23, 59, 1), &cfg);
        assert_eq!(delay.as_secs(), 24 * 3600 - 1);
    }

    #[test]
    fn test_delay_respects_offset() {
        let cfg = ResetConfig {
            hour: 12,
            minute: 0,
            utc_offset_hours: 0,
        };
        let delay = next_reset_delay(at(11, 30, 0), &cfg);
        assert_eq!(delay.as_secs(), 30 * 60);
    }
}
