use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

/// Return a random fraction of `base`, at most `variation_percent` percent of it.
///
/// Used to spread repeated multicast queries from different clients apart.
/// The result is uniformly drawn from `[0, base * variation_percent / 100]`
/// and never exceeds `base`.
///
/// Args:
///   base: The nominal interval.
///   variation_percent: Maximum share of `base` to return, clamped to 100.
pub fn jittered_duration(base: Duration, variation_percent: u32) -> Duration {
	jittered_duration_with(&mut rand::thread_rng(), base, variation_percent)
}

/// Same as [`jittered_duration`] with a caller-supplied random source.
pub fn jittered_duration_with<R: Rng>(
	rng: &mut R,
	base: Duration,
	variation_percent: u32,
) -> Duration {
	let variation = u128::from(variation_percent.min(100));
	let base_nanos = u64::try_from(base.as_nanos()).unwrap_or(u64::MAX);
	if variation == 0 || base_nanos == 0 {
		return Duration::ZERO;
	}
	let drawn = rng.gen_range(0..=base_nanos);
	let scaled = u128::from(drawn) * variation / 100;
	Duration::from_nanos(scaled as u64)
}

/// Return the later of two optional deadlines.
///
/// An unset deadline loses to a set one; both unset yields unset.
pub fn latest_of(t1: Option<Instant>, t2: Option<Instant>) -> Option<Instant> {
	match (t1, t2) {
		(Some(a), Some(b)) => Some(a.max(b)),
		(a, None) => a,
		(None, b) => b,
	}
}

/// Return the earlier of two optional deadlines, ignoring unset ones.
pub fn earliest_of(t1: Option<Instant>, t2: Option<Instant>) -> Option<Instant> {
	match (t1, t2) {
		(Some(a), Some(b)) => Some(a.min(b)),
		(a, None) => a,
		(None, b) => b,
	}
}

/// Double a re-query interval, capped at `max`.
pub fn next_interval(current: Duration, max: Duration) -> Duration {
	current.saturating_mul(2).min(max)
}
