#![forbid(unsafe_code)]

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the unix epoch; clocks before 1970 read as zero.
pub fn unix_ms(at: SystemTime) -> i64 {
	at.duration_since(UNIX_EPOCH)
		.map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
		.unwrap_or(0)
}

pub fn unix_ms_now() -> i64 {
	unix_ms(SystemTime::now())
}
