use metrics::{counter, gauge, histogram};
use std::time::Duration;

// ── Metric names ────────────────────────────────────────────────────────

/// Auctions by result (success, no_bid, timeout)
pub const AUCTIONS_TOTAL: &str = "bidplay_auctions_total";
/// Time from bid request to auction result, in seconds
pub const AUCTION_DURATION: &str = "bidplay_auction_duration_seconds";
/// Finished playback sessions by outcome
pub const SESSIONS_TOTAL: &str = "bidplay_sessions_total";
/// 1 while a playback session is in flight
pub const ACTIVE_SESSION: &str = "bidplay_active_session";
/// Ad errors by source (container, loader, init, manager)
pub const AD_ERRORS: &str = "bidplay_ad_errors_total";
/// Play actions rejected because a session was in flight
pub const PLAY_REJECTED: &str = "bidplay_play_rejected_total";

// ── Recording helpers ───────────────────────────────────────────────────

/// Record an auction result and how long it took
pub fn record_auction(result: &str, elapsed: Duration) {
    counter!(AUCTIONS_TOTAL, "result" => result.to_string()).increment(1);
    histogram!(AUCTION_DURATION).record(elapsed.as_secs_f64());
}

/// Record a finished session
pub fn record_session(outcome: &str) {
    counter!(SESSIONS_TOTAL, "outcome" => outcome.to_string()).increment(1);
}

pub fn set_active_session(active: bool) {
    gauge!(ACTIVE_SESSION).set(if active { 1.0 } else { 0.0 });
}

/// Record an ad error
pub fn record_ad_error(source: &str) {
    counter!(AD_ERRORS, "source" => source.to_string()).increment(1);
}

pub fn record_play_rejected() {
    counter!(PLAY_REJECTED).increment(1);
}
