//! Exponential backoff for hosts that keep refusing connections.

use crate::config::RetryCfg;
use rand::Rng;
use std::time::Duration;

/// Delay before retrying a host that failed `failures` times in a row.
///
/// Doubles from `base_delay_ms`, caps at `max_delay_ms`, then spreads the
/// result by `±jitter_ratio` so a fleet rebooting together does not redial in
/// lockstep.
pub fn backoff_delay(cfg: &RetryCfg, failures: u32) -> Duration {
    if failures == 0 {
        return Duration::ZERO;
    }

    let exponent = (failures - 1).min(31);
    let raw = cfg.base_delay_ms.saturating_mul(1u64 << exponent);
    let capped = raw.min(cfg.max_delay_ms) as f64;

    let ratio = cfg.jitter_ratio.clamp(0.0, 1.0);
    let jittered = if ratio > 0.0 {
        let spread = rand::thread_rng().gen_range(-ratio..=ratio);
        capped * (1.0 + spread)
    } else {
        capped
    };

    Duration::from_millis(jittered.max(0.0).round() as u64)
}
