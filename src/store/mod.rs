//! Storage abstraction for project records.
//!
//! The [`Store`] trait is the document store the service runs against. It
//! keeps whole [`ProjectRecord`]s keyed by id and evaluates
//! [`CompositeQuery`]s over them. Two backends exist: [`SqliteStore`] for
//! the CLI and server, and [`InMemoryStore`] for tests.
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`find_all`](Store::find_all) | Every record, in insertion order |
//! | [`find_by_id`](Store::find_by_id) | One record by id |
//! | [`exists_by_id`](Store::exists_by_id) | Presence check |
//! | [`save`](Store::save) | Insert or replace one record |
//! | [`insert`](Store::insert) | Insert a record under an unused id |
//! | [`save_all`](Store::save_all) | Bulk insert or replace |
//! | [`delete_by_id`](Store::delete_by_id) | Remove one record |
//! | [`delete_all`](Store::delete_all) | Remove every record |
//! | [`execute_query`](Store::execute_query) | Ranked fuzzy search |

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{ProjectRecord, SearchHit};
use crate::query::CompositeQuery;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

#[async_trait]
pub trait Store: Send + Sync {
    async fn find_all(&self) -> Result<Vec<ProjectRecord>>;

    async fn find_by_id(&self, id: &str) -> Result<Option<ProjectRecord>>;

    async fn exists_by_id(&self, id: &str) -> Result<bool> {
        Ok(self.find_by_id(id).await?.is_some())
    }

    /// Inserts the record, replacing any record with the same id.
    async fn save(&self, record: &ProjectRecord) -> Result<()>;

    /// Inserts the record only if its id is unused. Returns `false` and
    /// writes nothing when the id is taken. The check and the write are
    /// one atomic step.
    async fn insert(&self, record: &ProjectRecord) -> Result<bool>;

    async fn save_all(&self, records: &[ProjectRecord]) -> Result<()>;

    /// Returns `false` when no record had this id.
    async fn delete_by_id(&self, id: &str) -> Result<bool>;

    async fn delete_all(&self) -> Result<()>;

    /// Matching records with their scores, best first.
    async fn execute_query(&self, query: &CompositeQuery) -> Result<Vec<SearchHit>> {
        Ok(query.rank(self.find_all().await?))
    }
}

/// Replaces the whole collection with `records`.
///
/// Not atomic: readers running concurrently may briefly see an empty store.
pub async fn replace_all(store: &dyn Store, records: &[ProjectRecord]) -> Result<()> {
    store.delete_all().await?;
    store.save_all(records).await
}

/// Next sequential id: one past the largest numeric id.
///
/// Ids that are not integers count as 0, so an empty or entirely
/// non-numeric collection yields `"1"`.
pub fn next_id<'a>(ids: impl IntoIterator<Item = &'a str>) -> String {
    let max = ids
        .into_iter()
        .map(|id| id.parse::<i64>().unwrap_or(0))
        .fold(0, i64::max);
    max.saturating_add(1).to_string()
}

/// [`next_id`] over the ids currently in `store`.
pub async fn generate_next_id(store: &dyn Store) -> Result<String> {
    let records = store.find_all().await?;
    Ok(next_id(records.iter().map(|r| r.id.as_str())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_id_skips_non_numeric() {
        assert_eq!(next_id(["3", "7", "foo", "2"]), "8");
    }

    #[test]
    fn test_next_id_empty() {
        assert_eq!(next_id(std::iter::empty()), "1");
        assert_eq!(next_id(["A-1", "B"]), "1");
    }

    #[tokio::test]
    async fn test_generate_next_id_and_replace_all() {
        let store = InMemoryStore::new();
        assert_eq!(generate_next_id(&store).await.unwrap(), "1");

        let records: Vec<ProjectRecord> = ["4", "10"]
            .iter()
            .map(|id| ProjectRecord {
                id: id.to_string(),
                ..Default::default()
            })
            .collect();
        store.save_all(&records).await.unwrap();
        assert_eq!(generate_next_id(&store).await.unwrap(), "11");

        let fresh = vec![ProjectRecord {
            id: "2".to_string(),
            ..Default::default()
        }];
        replace_all(&store, &fresh).await.unwrap();
        let all = store.find_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, "2");
    }
}
