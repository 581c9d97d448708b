#![forbid(unsafe_code)]

use std::sync::LazyLock;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::Serialize;
use tracing::warn;

use campus_domain::time::utc_day;
use campus_domain::{HASHTAG_MAX_CHARS, Post, Result};
use campus_store::Store;

/// `#` followed by up to ten word characters, including Japanese scripts.
static HASHTAG_RE: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"#([\w\p{Hiragana}\p{Katakana}\p{Han}ー]{1,10})").expect("valid hashtag pattern")
});

/// Lowercased, deduplicated tags found in a post body.
pub fn extract_hashtags(text: &str) -> Vec<String> {
	let mut tags = Vec::new();
	for capture in HASHTAG_RE.captures_iter(text) {
		let tag = capture[1].to_lowercase();
		if tag.chars().count() <= HASHTAG_MAX_CHARS && !tags.contains(&tag) {
			tags.push(tag);
		}
	}
	tags
}

#[derive(Debug, Clone, Serialize)]
pub struct TrendingTag {
	pub rank: u32,
	pub tag: String,
	pub count: i64,
}

/// Day-bucketed tag counters and the trending read path.
#[derive(Clone)]
pub struct HashtagService {
	store: Store,
}

impl HashtagService {
	pub fn new(store: Store) -> Self {
		Self { store }
	}

	/// Count every tag in a new post's body for today's bucket. Per-tag
	/// failures are logged and skipped; tag counting never fails a post.
	pub async fn record_post_tags(&self, text: &str, at: DateTime<Utc>) {
		let day = utc_day(at);
		for tag in extract_hashtags(text) {
			if let Err(e) = self.store.bump_hashtag(&tag, &day).await {
				warn!(tag, error = %e, "failed to bump hashtag counter");
			}
		}
	}

	/// Top tags today; when today is empty, a trailing-7-day rollup.
	pub async fn trending(&self, now: DateTime<Utc>) -> Result<Vec<TrendingTag>> {
		let today = utc_day(now);
		let mut counts = self.store.trending_for_day(&today, 10).await?;

		if counts.is_empty() {
			let week_ago = utc_day(now - Duration::days(7));
			counts = self.store.trending_since(&week_ago, 10).await?;
		}

		Ok(counts
			.into_iter()
			.enumerate()
			.map(|(i, c)| TrendingTag {
				rank: (i + 1) as u32,
				tag: c.tag,
				count: c.count,
			})
			.collect())
	}

	/// Posts whose body mentions `#tag`.
	pub async fn posts_for_tag(&self, tag: &str) -> Result<Vec<Post>> {
		let needle = format!("#{}", tag.to_lowercase());
		Ok(self.store.search_posts(&needle, 50).await?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn extracts_lowercased_unique_tags() {
		let tags = extract_hashtags("Studying #Math and #math with #friends!");
		assert_eq!(tags, vec!["math".to_string(), "friends".to_string()]);
	}

	#[test]
	fn supports_japanese_tags() {
		let tags = extract_hashtags("今日は #数学 と #べんきょう");
		assert_eq!(tags, vec!["数学".to_string(), "べんきょう".to_string()]);
	}

	#[test]
	fn ignores_overlong_and_missing_tags() {
		assert!(extract_hashtags("no tags here").is_empty());
		// Caps at ten characters per tag: the match stops there.
		let tags = extract_hashtags("#abcdefghijk");
		assert_eq!(tags, vec!["abcdefghij".to_string()]);
	}
}
