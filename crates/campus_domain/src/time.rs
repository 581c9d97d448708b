#![forbid(unsafe_code)]

use std::time::{Duration as StdDuration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};

/// Current Unix time in milliseconds.
#[inline]
pub fn unix_ms_now() -> i64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.unwrap_or(StdDuration::from_secs(0))
		.as_millis() as i64
}

/// Week-of-year bucket: `(iso_year, ceil(day_of_year / 7))`.
///
/// Week 1 covers ordinal days 1..=7, week 2 covers 8..=14, and so on; the
/// final week of a year may be short.
pub fn week_bucket(at: DateTime<Utc>) -> (i32, u32) {
	(at.year(), at.ordinal().div_ceil(7))
}

/// UTC window `[start, end)` covered by a week bucket.
pub fn week_window(year: i32, week: u32) -> (DateTime<Utc>, DateTime<Utc>) {
	let first = Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).single().unwrap_or_default();
	let start = first + Duration::days(((week.max(1) - 1) * 7) as i64);
	let next_year = Utc
		.with_ymd_and_hms(year + 1, 1, 1, 0, 0, 0)
		.single()
		.unwrap_or_default();
	let end = (start + Duration::days(7)).min(next_year);
	(start, end)
}

/// Calendar day (`YYYY-MM-DD`) at a fixed offset from UTC.
///
/// The like-ranking cutover is not UTC midnight; the offset is a config
/// parameter (minutes east of UTC, default +540).
pub fn offset_day(at: DateTime<Utc>, offset_minutes: i32) -> NaiveDate {
	(at + Duration::minutes(offset_minutes as i64)).date_naive()
}

/// UTC window `[start, end)` covered by an offset day.
pub fn offset_day_window(day: NaiveDate, offset_minutes: i32) -> (DateTime<Utc>, DateTime<Utc>) {
	let midnight = day.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
	let start = midnight - Duration::minutes(offset_minutes as i64);
	(start, start + Duration::days(1))
}

/// Plain UTC day string used for hashtag rollups.
pub fn utc_day(at: DateTime<Utc>) -> String {
	at.date_naive().format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn at(s: &str) -> DateTime<Utc> {
		s.parse().expect("valid rfc3339 timestamp")
	}

	#[test]
	fn week_bucket_ceil_boundaries() {
		assert_eq!(week_bucket(at("2025-01-01T00:00:00Z")), (2025, 1));
		assert_eq!(week_bucket(at("2025-01-07T23:59:59Z")), (2025, 1));
		assert_eq!(week_bucket(at("2025-01-08T00:00:00Z")), (2025, 2));
		assert_eq!(week_bucket(at("2025-12-31T12:00:00Z")), (2025, 53));
	}

	#[test]
	fn week_window_covers_its_bucket() {
		let (start, end) = week_window(2025, 2);
		assert_eq!(start, at("2025-01-08T00:00:00Z"));
		assert_eq!(end, at("2025-01-15T00:00:00Z"));

		let probe = at("2025-01-10T09:30:00Z");
		assert_eq!(week_bucket(probe), (2025, 2));
		assert!(probe >= start && probe < end);
	}

	#[test]
	fn final_week_window_is_clamped_to_year_end() {
		let (_, end) = week_window(2025, 53);
		assert_eq!(end, at("2026-01-01T00:00:00Z"));
	}

	#[test]
	fn offset_day_cutover_is_not_utc_midnight() {
		// +540 minutes: the day flips at 15:00 UTC.
		assert_eq!(
			offset_day(at("2025-03-10T14:59:59Z"), 540).to_string(),
			"2025-03-10"
		);
		assert_eq!(offset_day(at("2025-03-10T15:00:00Z"), 540).to_string(), "2025-03-11");

		// Zero offset degenerates to the UTC calendar day.
		assert_eq!(offset_day(at("2025-03-10T23:59:59Z"), 0).to_string(), "2025-03-10");
	}

	#[test]
	fn offset_day_window_roundtrip() {
		let t = at("2025-03-10T16:20:00Z");
		let day = offset_day(t, 540);
		let (start, end) = offset_day_window(day, 540);
		assert!(t >= start && t < end);
		assert_eq!(end - start, Duration::days(1));
	}

	#[test]
	fn utc_day_format() {
		assert_eq!(utc_day(at("2025-06-05T01:02:03Z")), "2025-06-05");
	}
}
