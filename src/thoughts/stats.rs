use rusqlite::Connection;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::StorageError;
use crate::thoughts::types::Sentiment;

/// Aggregate view of the journal.
#[derive(Debug, Serialize, PartialEq)]
pub struct StatsResponse {
    pub total: u64,
    /// Count per label, plus `unanalyzed` for placeholder records.
    pub sentiment_distribution: BTreeMap<String, u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newest: Option<String>,
}

/// Label used in the distribution for records stored without a sentiment.
pub const UNANALYZED: &str = "unanalyzed";

/// Compute journal statistics.
pub fn thought_stats(conn: &Connection) -> Result<StatsResponse, StorageError> {
    let total: i64 = conn.query_row("SELECT COUNT(*) FROM thoughts", [], |row| row.get(0))?;
    let sentiment_distribution = count_by_sentiment(conn)?;
    let (oldest, newest) = thought_time_range(conn)?;

    Ok(StatsResponse {
        total: total as u64,
        sentiment_distribution,
        oldest,
        newest,
    })
}

fn count_by_sentiment(conn: &Connection) -> Result<BTreeMap<String, u64>, StorageError> {
    let mut map = BTreeMap::new();
    for s in Sentiment::ALL {
        map.insert(s.as_str().to_string(), 0);
    }
    map.insert(UNANALYZED.to_string(), 0);

    let mut stmt = conn.prepare("SELECT sentiment, COUNT(*) FROM thoughts GROUP BY sentiment")?;
    let rows: Vec<(Option<String>, i64)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    for (label, count) in rows {
        let key = label.unwrap_or_else(|| UNANALYZED.to_string());
        map.insert(key, count as u64);
    }
    Ok(map)
}

fn thought_time_range(conn: &Connection) -> Result<(Option<String>, Option<String>), StorageError> {
    let range = conn.query_row(
        "SELECT MIN(created_at), MAX(created_at) FROM thoughts",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    Ok(range)
}
