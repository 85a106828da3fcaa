// ─── Prediction Scheduling & Reconciliation Actor Architecture ───
pub mod announcer;
pub mod clock;
pub mod cooldown;
pub mod core;
pub mod extract;
pub mod ledger;
pub mod messages;

// ─── Shared domain types ───
pub mod suit;
