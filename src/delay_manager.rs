use std::thread;
use std::time::Duration;

use log::info;
use rand::Rng;

/// Randomized pause between places to reduce throttling. The range comes
/// from batch configuration, never hardcoded at call sites.
pub fn pause_between_places(range: (u64, u64)) {
    let (min, max) = range;
    if max == 0 {
        return;
    }
    let mut rng = rand::thread_rng();
    let delay_secs = rng.gen_range(min..=max.max(min));
    info!("Waiting for {} seconds before the next place...", delay_secs);
    thread::sleep(Duration::from_secs(delay_secs));
}

/// Linear backoff before retrying a transient failure.
pub fn retry_backoff(attempt: u32, base_secs: u64) {
    let delay_secs = base_secs.saturating_mul(u64::from(attempt));
    if delay_secs == 0 {
        return;
    }
    info!("Backing off for {} seconds (attempt {})...", delay_secs, attempt);
    thread::sleep(Duration::from_secs(delay_secs));
}
