//! Randomized exponential backoff for reconnection.

use std::time::Duration;

use rand::Rng;

/// Exponent cap; keeps `2^attempt` finite for runaway counters.
const MAX_EXPONENT: u32 = 32;

/// Delay before reconnection attempt number `attempt`.
///
/// `floor(random() * 2^attempt * base)` in milliseconds, so the result lies in
/// `[0, 2^attempt * base)`.
pub fn backoff_delay(attempt: u32, base: Duration) -> Duration {
	backoff_delay_with(&mut rand::rng(), attempt, base)
}

/// [`backoff_delay`] with an explicit random source.
pub fn backoff_delay_with<R: Rng + ?Sized>(rng: &mut R, attempt: u32, base: Duration) -> Duration {
	let window = 2f64.powi(attempt.min(MAX_EXPONENT) as i32) * base.as_millis() as f64;
	let millis = (rng.random::<f64>() * window).floor();
	Duration::from_millis(millis as u64)
}
