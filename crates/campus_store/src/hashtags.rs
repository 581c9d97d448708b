#![forbid(unsafe_code)]

use anyhow::Context as _;

use campus_domain::HashtagCount;

use crate::Store;

impl Store {
	/// Upsert on the `(tag, day)` unique pair.
	pub async fn bump_hashtag(&self, tag: &str, day: &str) -> anyhow::Result<()> {
		sqlx::query(
			"INSERT INTO hashtags (tag, day, count) VALUES (?, ?, 1) \
			ON CONFLICT(tag, day) DO UPDATE SET count = count + 1",
		)
		.bind(tag)
		.bind(day)
		.execute(&self.pool)
		.await
		.context("bump hashtag")?;
		Ok(())
	}

	/// Top tags for one day, count descending.
	pub async fn trending_for_day(&self, day: &str, limit: i64) -> anyhow::Result<Vec<HashtagCount>> {
		let rows: Vec<(String, i64)> =
			sqlx::query_as("SELECT tag, count FROM hashtags WHERE day = ? ORDER BY count DESC, tag LIMIT ?")
				.bind(day)
				.bind(limit)
				.fetch_all(&self.pool)
				.await
				.context("select trending for day")?;
		Ok(rows
			.into_iter()
			.map(|(tag, count)| HashtagCount {
				tag,
				day: day.to_string(),
				count,
			})
			.collect())
	}

	/// Rollup across days since `from_day` (inclusive), summed per tag.
	pub async fn trending_since(&self, from_day: &str, limit: i64) -> anyhow::Result<Vec<HashtagCount>> {
		let rows: Vec<(String, i64)> = sqlx::query_as(
			"SELECT tag, SUM(count) AS total FROM hashtags WHERE day >= ? \
			GROUP BY tag ORDER BY total DESC, tag LIMIT ?",
		)
		.bind(from_day)
		.bind(limit)
		.fetch_all(&self.pool)
		.await
		.context("select trending since")?;
		Ok(rows
			.into_iter()
			.map(|(tag, count)| HashtagCount {
				tag,
				day: from_day.to_string(),
				count,
			})
			.collect())
	}
}
