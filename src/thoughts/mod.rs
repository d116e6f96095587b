//! Record Store: durable, write-once persistence of analyzed thoughts.
//!
//! The free functions in [`store`] and [`stats`] operate on a borrowed
//! [`rusqlite::Connection`]. [`ThoughtStore`] is the shared async handle used by
//! request handlers; it runs each call on the blocking pool.

pub mod stats;
pub mod store;
pub mod types;

use rusqlite::Connection;
use std::sync::{Arc, Mutex};

use crate::error::StorageError;
use stats::StatsResponse;
use store::ListQuery;
use types::{SentimentScore, Thought};

/// Cloneable handle over the single journal connection.
///
/// There is no cache in front of SQLite: every call reads what is committed.
#[derive(Clone)]
pub struct ThoughtStore {
    conn: Arc<Mutex<Connection>>,
}

impl ThoughtStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    pub async fn insert(
        &self,
        raw_text: String,
        summary: Option<String>,
        score: Option<SentimentScore>,
    ) -> Result<Thought, StorageError> {
        self.with_conn(move |conn| {
            store::insert_thought(conn, &raw_text, summary.as_deref(), score)
        })
        .await
    }

    pub async fn get(&self, id: i64) -> Result<Option<Thought>, StorageError> {
        self.with_conn(move |conn| store::get_thought(conn, id)).await
    }

    pub async fn get_many(&self, ids: Vec<i64>) -> Result<Vec<Thought>, StorageError> {
        self.with_conn(move |conn| store::get_thoughts(conn, &ids))
            .await
    }

    pub async fn list(&self, query: ListQuery) -> Result<Vec<Thought>, StorageError> {
        self.with_conn(move |conn| store::list_thoughts(conn, &query))
            .await
    }

    /// Filtered total and one page, taken under one lock and one read transaction.
    pub async fn page(&self, query: ListQuery) -> Result<(u64, Vec<Thought>), StorageError> {
        self.with_conn(move |conn| store::list_page(conn, &query))
            .await
    }

    pub async fn count(
        &self,
        sentiment: Option<types::Sentiment>,
    ) -> Result<u64, StorageError> {
        self.with_conn(move |conn| store::count_thoughts(conn, sentiment))
            .await
    }

    pub async fn stats(&self) -> Result<StatsResponse, StorageError> {
        self.with_conn(stats::thought_stats).await
    }

    /// Run `f` against the connection on the blocking pool (sync DB ops → spawn_blocking).
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StorageError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|e| StorageError::Poisoned(e.to_string()))?;
            f(&conn)
        })
        .await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use types::Sentiment;

    fn test_store() -> ThoughtStore {
        ThoughtStore::new(db::open_memory_database().unwrap())
    }

    #[tokio::test]
    async fn concurrent_inserts_get_distinct_ids() {
        let store = test_store();
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.insert(format!("thought {i}"), None, None).await.unwrap().id
            }));
        }

        let mut ids = Vec::new();
        for h in handles {
            ids.push(h.await.unwrap());
        }
        ids.sort_unstable();
        let expected: Vec<i64> = (ids[0]..ids[0] + 16).collect();
        assert_eq!(ids, expected, "no duplicate or skipped ids");
        assert_eq!(store.count(None).await.unwrap(), 16);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn page_total_agrees_with_entries_under_concurrent_inserts() {
        let store = test_store();
        let writer = {
            let store = store.clone();
            tokio::spawn(async move {
                for i in 0..50 {
                    store.insert(format!("entry {i}"), None, None).await.unwrap();
                }
            })
        };

        for _ in 0..50 {
            let (total, entries) = store.page(ListQuery { limit: 1000, ..ListQuery::default() }).await.unwrap();
            assert_eq!(total as usize, entries.len());
        }
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn handle_reflects_committed_writes() {
        let store = test_store();
        let score = SentimentScore {
            label: Sentiment::Neutral,
            confidence: 0.5,
        };
        let t = store
            .insert("it was fine".into(), Some("Fine.".into()), Some(score))
            .await
            .unwrap();

        let listed = store.list(ListQuery::default()).await.unwrap();
        assert_eq!(listed, vec![t.clone()]);
        assert_eq!(store.get(t.id).await.unwrap(), Some(t));
        assert_eq!(store.stats().await.unwrap().total, 1);
    }
}
