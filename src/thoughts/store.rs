//! Read and write paths for the `thoughts` table.
//!
//! Records are write-once: [`insert_thought`] is the only mutation. Listing is
//! newest-first with `id` breaking ties between identical timestamps.

use chrono::SecondsFormat;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::StorageError;
use crate::thoughts::types::{Sentiment, SentimentScore, Thought};

const THOUGHT_COLUMNS: &str =
    "id, raw_text, summary, sentiment, confidence, created_at, updated_at";

/// Pagination and filter parameters for [`list_thoughts`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListQuery {
    pub limit: usize,
    pub offset: usize,
    pub sentiment: Option<Sentiment>,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            limit: 100,
            offset: 0,
            sentiment: None,
        }
    }
}

/// Current time in the stored timestamp format (RFC 3339, microseconds, `Z`).
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Insert a new thought and return the stored row.
///
/// The id comes from SQLite's AUTOINCREMENT, so concurrent inserts never share
/// or skip values and deleted ids are never handed out again.
pub fn insert_thought(
    conn: &Connection,
    raw_text: &str,
    summary: Option<&str>,
    score: Option<SentimentScore>,
) -> Result<Thought, StorageError> {
    let now = now_timestamp();
    let (sentiment, confidence) = match score {
        Some(s) => (Some(s.label.as_str()), Some(s.confidence)),
        None => (None, None),
    };

    let thought = conn.query_row(
        &format!(
            "INSERT INTO thoughts (raw_text, summary, sentiment, confidence, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?5) RETURNING {THOUGHT_COLUMNS}"
        ),
        params![raw_text, summary, sentiment, confidence, now],
        row_to_thought,
    )?;

    Ok(thought)
}

/// Fetch a single thought by id.
pub fn get_thought(conn: &Connection, id: i64) -> Result<Option<Thought>, StorageError> {
    let thought = conn
        .query_row(
            &format!("SELECT {THOUGHT_COLUMNS} FROM thoughts WHERE id = ?1"),
            params![id],
            row_to_thought,
        )
        .optional()?;
    Ok(thought)
}

/// Fetch the given ids in request order. Unknown ids are skipped; duplicates are kept once.
pub fn get_thoughts(conn: &Connection, ids: &[i64]) -> Result<Vec<Thought>, StorageError> {
    let mut stmt = conn.prepare_cached(&format!("SELECT {THOUGHT_COLUMNS} FROM thoughts WHERE id = ?1"))?;
    let mut seen = std::collections::HashSet::new();
    let mut thoughts = Vec::with_capacity(ids.len());
    for &id in ids {
        if !seen.insert(id) {
            continue;
        }
        if let Some(thought) = stmt.query_row(params![id], row_to_thought).optional()? {
            thoughts.push(thought);
        }
    }
    Ok(thoughts)
}

/// List thoughts newest-first. An empty page is not an error.
pub fn list_thoughts(conn: &Connection, query: &ListQuery) -> Result<Vec<Thought>, StorageError> {
    let limit = query.limit as i64;
    let offset = query.offset as i64;

    let thoughts = match query.sentiment {
        Some(label) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {THOUGHT_COLUMNS} FROM thoughts WHERE sentiment = ?1 \
                 ORDER BY created_at DESC, id DESC LIMIT ?2 OFFSET ?3"
            ))?;
            let rows = stmt
                .query_map(params![label.as_str(), limit, offset], row_to_thought)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
        None => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {THOUGHT_COLUMNS} FROM thoughts \
                 ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2"
            ))?;
            let rows = stmt
                .query_map(params![limit, offset], row_to_thought)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
    };

    Ok(thoughts)
}

/// One page plus the filtered total, read from a single snapshot.
pub fn list_page(conn: &Connection, query: &ListQuery) -> Result<(u64, Vec<Thought>), StorageError> {
    let tx = conn.unchecked_transaction()?;
    let total = count_thoughts(&tx, query.sentiment)?;
    let thoughts = list_thoughts(&tx, query)?;
    tx.commit()?;
    Ok((total, thoughts))
}

/// Count thoughts, optionally restricted to one sentiment label.
pub fn count_thoughts(conn: &Connection, sentiment: Option<Sentiment>) -> Result<u64, StorageError> {
    let count: i64 = match sentiment {
        Some(label) => conn.query_row(
            "SELECT COUNT(*) FROM thoughts WHERE sentiment = ?1",
            params![label.as_str()],
            |row| row.get(0),
        )?,
        None => conn.query_row("SELECT COUNT(*) FROM thoughts", [], |row| row.get(0))?,
    };
    Ok(count as u64)
}

fn row_to_thought(row: &Row<'_>) -> rusqlite::Result<Thought> {
    let sentiment: Option<String> = row.get(3)?;
    let sentiment = sentiment
        .map(|s| {
            s.parse::<Sentiment>()
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, e.into()))
        })
        .transpose()?;

    Ok(Thought {
        id: row.get(0)?,
        raw_text: row.get(1)?,
        summary: row.get(2)?,
        sentiment,
        confidence: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}
