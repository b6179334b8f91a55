//! Wall-clock time as the framework's wire format expects it: seconds since
//! the Unix epoch, as a float.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current time in seconds since epoch, matching the `time: f64` field every
/// event carries on the wire.
pub fn unix_time_secs() -> f64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.unwrap_or_default()
		.as_secs_f64()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn returns_a_plausible_unix_time() {
		let t = unix_time_secs();
		assert!(t > 1_700_000_000.0);
	}
}
