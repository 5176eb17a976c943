//! SQLite-backed [`Store`] implementation.
//!
//! One row per record in the `projects` table. Dates are stored as ISO
//! `YYYY-MM-DD` text and nested collections as JSON.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::models::ProjectRecord;

use super::Store;

const DATE_FORMAT: &str = "%Y-%m-%d";

const SELECT_COLUMNS: &str = "SELECT id, title, address, start_date, end_date, status, \
     indicators_json, persons_json, links_json FROM projects";

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens the configured database and makes sure the schema exists.
    pub async fn connect(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;
        Ok(Self::new(pool))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn date_to_text(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format(DATE_FORMAT).to_string())
}

fn text_to_date(text: Option<String>) -> Option<NaiveDate> {
    text.and_then(|t| NaiveDate::parse_from_str(&t, DATE_FORMAT).ok())
}

fn row_to_record(row: &SqliteRow) -> Result<ProjectRecord> {
    let id: String = row.get("id");
    let indicators: String = row.get("indicators_json");
    let persons: String = row.get("persons_json");
    let links: String = row.get("links_json");

    Ok(ProjectRecord {
        title: row.get("title"),
        address: row.get("address"),
        start_date: text_to_date(row.get("start_date")),
        end_date: text_to_date(row.get("end_date")),
        status: row.get("status"),
        indicators: serde_json::from_str(&indicators)
            .with_context(|| format!("corrupt indicators for project {}", id))?,
        responsible_persons: serde_json::from_str(&persons)
            .with_context(|| format!("corrupt responsible persons for project {}", id))?,
        document_links: serde_json::from_str(&links)
            .with_context(|| format!("corrupt document links for project {}", id))?,
        id,
    })
}

const UPSERT: &str = "ON CONFLICT(id) DO UPDATE SET
    title = excluded.title,
    address = excluded.address,
    start_date = excluded.start_date,
    end_date = excluded.end_date,
    status = excluded.status,
    indicators_json = excluded.indicators_json,
    persons_json = excluded.persons_json,
    links_json = excluded.links_json";

const INSERT_NEW: &str = "ON CONFLICT(id) DO NOTHING";

/// Writes one row; `on_conflict` decides what happens to an existing id.
/// Returns the number of rows written.
async fn write_record<'e, E>(executor: E, record: &ProjectRecord, on_conflict: &str) -> Result<u64>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        "INSERT INTO projects (id, title, address, start_date, end_date, status,
                               indicators_json, persons_json, links_json)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
         {}",
        on_conflict
    );
    let result = sqlx::query(&sql)
        .bind(&record.id)
        .bind(&record.title)
        .bind(&record.address)
        .bind(date_to_text(record.start_date))
        .bind(date_to_text(record.end_date))
        .bind(&record.status)
        .bind(serde_json::to_string(&record.indicators)?)
        .bind(serde_json::to_string(&record.responsible_persons)?)
        .bind(serde_json::to_string(&record.document_links)?)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}

#[async_trait]
impl Store for SqliteStore {
    async fn find_all(&self) -> Result<Vec<ProjectRecord>> {
        let rows = sqlx::query(&format!("{} ORDER BY rowid", SELECT_COLUMNS))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_record).collect()
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<ProjectRecord>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_record).transpose()
    }

    async fn exists_by_id(&self, id: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM projects WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn save(&self, record: &ProjectRecord) -> Result<()> {
        write_record(&self.pool, record, UPSERT).await?;
        Ok(())
    }

    async fn insert(&self, record: &ProjectRecord) -> Result<bool> {
        Ok(write_record(&self.pool, record, INSERT_NEW).await? == 1)
    }

    async fn save_all(&self, records: &[ProjectRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for record in records {
            write_record(&mut *tx, record, UPSERT).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete_by_id(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM projects WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_all(&self) -> Result<()> {
        sqlx::query("DELETE FROM projects")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DbConfig, ServerConfig};
    use crate::models::{DocumentLink, ResponsiblePerson};
    use std::collections::BTreeMap;

    fn test_config(dir: &tempfile::TempDir) -> Config {
        Config {
            db: DbConfig {
                path: dir.path().join("data").join("projects.sqlite"),
            },
            spreadsheet: None,
            server: ServerConfig {
                bind: "127.0.0.1:0".to_string(),
            },
            notify: Default::default(),
            retrieval: Default::default(),
        }
    }

    fn sample() -> ProjectRecord {
        let mut area = BTreeMap::new();
        area.insert("S1".to_string(), "10".to_string());
        area.insert("total".to_string(), "10".to_string());
        let mut indicators = BTreeMap::new();
        indicators.insert("Area".to_string(), area);

        ProjectRecord {
            id: "17".to_string(),
            title: "ZhK Znak".to_string(),
            address: "Lenina 1".to_string(),
            start_date: NaiveDate::from_ymd_opt(2024, 1, 15),
            end_date: None,
            status: "Construction".to_string(),
            indicators,
            responsible_persons: vec![ResponsiblePerson {
                fio: "Ivanov".to_string(),
                position: "Engineer".to_string(),
                phone: "555".to_string(),
                email: "a@b.com".to_string(),
                description: String::new(),
            }],
            document_links: vec![DocumentLink {
                document_type: "PVOR".to_string(),
                url: "https://docs.example/pvor".to_string(),
            }],
        }
    }

    #[tokio::test]
    async fn test_record_survives_storage() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = SqliteStore::connect(&test_config(&dir)).await.unwrap();

        store.save(&sample()).await.unwrap();
        let loaded = store.find_by_id("17").await.unwrap().unwrap();
        assert_eq!(loaded, sample());
        assert!(store.find_by_id("18").await.unwrap().is_none());
        assert!(store.exists_by_id("17").await.unwrap());
    }

    #[tokio::test]
    async fn test_save_all_keeps_order_and_upserts() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = SqliteStore::connect(&test_config(&dir)).await.unwrap();

        let mut b = sample();
        b.id = "2".to_string();
        let mut a = sample();
        a.id = "1".to_string();
        store.save_all(&[b.clone(), a.clone()]).await.unwrap();

        a.title = "renamed".to_string();
        store.save(&a).await.unwrap();

        let all = store.find_all().await.unwrap();
        let ids: Vec<&str> = all.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "1"]);
        assert_eq!(all[1].title, "renamed");
    }

    #[tokio::test]
    async fn test_delete_by_id_and_all() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = SqliteStore::connect(&test_config(&dir)).await.unwrap();
        store.save(&sample()).await.unwrap();

        assert!(store.delete_by_id("17").await.unwrap());
        assert!(!store.delete_by_id("17").await.unwrap());

        store.save(&sample()).await.unwrap();
        store.delete_all().await.unwrap();
        assert!(store.find_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_execute_query_over_sqlite() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = SqliteStore::connect(&test_config(&dir)).await.unwrap();
        store.save(&sample()).await.unwrap();

        let hits = store
            .execute_query(&crate::query::build("ivanov"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.id, "17");
    }

    #[tokio::test]
    async fn test_insert_keeps_existing_record() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = SqliteStore::connect(&test_config(&dir)).await.unwrap();
        assert!(store.insert(&sample()).await.unwrap());

        let mut other = sample();
        other.title = "intruder".to_string();
        assert!(!store.insert(&other).await.unwrap());

        let all = store.find_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].title, "ZhK Znak");
    }
}
