/// Exponential backoff with jitter for retry scheduling.
use rand::Rng;
use std::time::Duration;

/// Delay before the next delivery of a job that has already made `attempt`
/// attempts: `base * 2^(attempt-1)`, capped, plus up to 10% random jitter so
/// competing workers do not retry in lockstep.
///
/// `attempt` is 1-based; 0 is treated as 1.
pub fn delay_for_attempt(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let raw = base.saturating_mul(1u32 << exponent);
    let capped = raw.min(cap);

    let jitter_ceiling_ms = capped.as_millis() as u64 / 10;
    if jitter_ceiling_ms == 0 {
        return capped;
    }
    let jitter = rand::thread_rng().gen_range(0..=jitter_ceiling_ms);
    (capped + Duration::from_millis(jitter)).min(cap.saturating_mul(2))
}
