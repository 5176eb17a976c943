//! Ingestion pipeline.
//!
//! Fetches the configured workbook, reads its first worksheet, normalizes
//! every data row into a [`ProjectRecord`] and replaces the stored
//! collection with the result.
//!
//! The first two rows of the sheet are headers and never read as data.
//! Header tokens repeated further down are filtered by
//! [`normalize`](crate::normalize::normalize).
//!
//! An unreachable or unreadable source aborts the cycle without touching
//! the store, and so does a source with no data rows.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{bail, Result};
use tracing::{error, info, warn};

use crate::config::{Config, SpreadsheetConfig};
use crate::models::ProjectRecord;
use crate::normalize::normalize;
use crate::store::{replace_all, SqliteStore, Store};
use crate::xlsx::{self, SheetError, SheetRow};

/// Rows at the top of the sheet that hold column headers.
const HEADER_ROWS: u32 = 2;

/// The spreadsheet source could not be used.
#[derive(Debug)]
pub enum IngestError {
    /// Fetching the workbook failed (network, HTTP status, file system).
    Transfer { url: String, message: String },
    /// The fetched bytes are not a readable workbook.
    Workbook { url: String, source: SheetError },
}

impl std::fmt::Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestError::Transfer { url, message } => {
                write!(f, "spreadsheet source unavailable ({}): {}", url, message)
            }
            IngestError::Workbook { url, source } => {
                write!(f, "spreadsheet source unreadable ({}): {}", url, source)
            }
        }
    }
}

impl std::error::Error for IngestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IngestError::Workbook { source, .. } => Some(source),
            IngestError::Transfer { .. } => None,
        }
    }
}

/// Counts reported after a completed cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub records: usize,
    pub persons: usize,
    pub links: usize,
}

impl SyncSummary {
    fn of(records: &[ProjectRecord]) -> Self {
        Self {
            records: records.len(),
            persons: records.iter().map(|r| r.responsible_persons.len()).sum(),
            links: records.iter().map(|r| r.document_links.len()).sum(),
        }
    }
}

/// Downloads the workbook bytes. `file://` URLs are read from disk.
pub async fn fetch_source(sheet: &SpreadsheetConfig) -> Result<Vec<u8>, IngestError> {
    let transfer = |message: String| IngestError::Transfer {
        url: sheet.url.clone(),
        message,
    };

    if let Some(path) = sheet.url.strip_prefix("file://") {
        return tokio::fs::read(path)
            .await
            .map_err(|e| transfer(e.to_string()));
    }

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(sheet.timeout_secs))
        .build()
        .map_err(|e| transfer(e.to_string()))?;

    let response = client
        .get(&sheet.url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| transfer(e.to_string()))?;

    let bytes = response
        .bytes()
        .await
        .map_err(|e| transfer(e.to_string()))?;
    Ok(bytes.to_vec())
}

/// Normalizes worksheet rows, skipping the header rows.
///
/// Row positions between the first and last row that have no `<row>`
/// element are treated as absent rows and skipped.
pub fn rows_to_records(rows: &[SheetRow]) -> Vec<ProjectRecord> {
    let (Some(first), Some(last)) = (rows.first(), rows.last()) else {
        return Vec::new();
    };
    let by_index: HashMap<u32, &SheetRow> = rows.iter().map(|r| (r.index, r)).collect();

    (first.index.saturating_add(HEADER_ROWS)..=last.index)
        .filter_map(|index| normalize(by_index.get(&index).copied()))
        .collect()
}

/// Fetches and parses the configured workbook into records.
pub async fn ingest(sheet: &SpreadsheetConfig) -> Result<Vec<ProjectRecord>, IngestError> {
    let bytes = fetch_source(sheet).await?;
    let rows = xlsx::read_first_sheet(&bytes).map_err(|source| IngestError::Workbook {
        url: sheet.url.clone(),
        source,
    })?;
    let records = rows_to_records(&rows);
    info!(
        url = %sheet.url,
        rows = rows.len(),
        records = records.len(),
        "ingested spreadsheet"
    );
    Ok(records)
}

/// Runs one ingestion cycle against `store`.
///
/// Returns `None` when the source produced no records; the store is left
/// as it was in that case.
pub async fn refresh(
    store: &dyn Store,
    sheet: &SpreadsheetConfig,
) -> Result<Option<SyncSummary>> {
    let records = ingest(sheet).await?;
    if records.is_empty() {
        warn!(url = %sheet.url, "spreadsheet produced no records, keeping stored data");
        return Ok(None);
    }
    replace_all(store, &records).await?;
    Ok(Some(SyncSummary::of(&records)))
}

/// Startup ingestion for the server. Failures are logged, never raised.
pub async fn refresh_on_startup(store: &dyn Store, sheet: &SpreadsheetConfig) {
    match refresh(store, sheet).await {
        Ok(Some(summary)) => info!(
            records = summary.records,
            persons = summary.persons,
            links = summary.links,
            "startup ingestion complete"
        ),
        Ok(None) => {}
        Err(e) => error!(error = %e, "startup ingestion failed"),
    }
}

/// `pcards sync`: one ingestion cycle from the command line.
pub async fn run_sync(config: &Config, dry_run: bool) -> Result<()> {
    let Some(sheet) = &config.spreadsheet else {
        bail!("No spreadsheet source configured. Add a [spreadsheet] section with a url.");
    };

    if dry_run {
        let records = ingest(sheet).await?;
        let summary = SyncSummary::of(&records);
        println!("sync spreadsheet (dry-run)");
        println!("  records found: {}", summary.records);
        println!("  responsible persons: {}", summary.persons);
        println!("  document links: {}", summary.links);
        return Ok(());
    }

    let store = SqliteStore::connect(config).await?;
    let outcome = refresh(&store, sheet).await;
    store.close().await;

    println!("sync spreadsheet");
    match outcome? {
        Some(summary) => {
            println!("  records stored: {}", summary.records);
            println!("  responsible persons: {}", summary.persons);
            println!("  document links: {}", summary.links);
        }
        None => println!("  no records found, stored data kept"),
    }
    println!("ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use crate::xlsx::tests::{workbook, STYLES};

    fn header_rows() -> Vec<Vec<(&'static str, &'static str)>> {
        vec![
            vec![("t=\"inlineStr\"", "<is><t>Project cards</t></is>")],
            vec![
                ("t=\"inlineStr\"", "<is><t>id</t></is>"),
                ("t=\"inlineStr\"", "<is><t>title</t></is>"),
            ],
        ]
    }

    fn write_book(dir: &tempfile::TempDir, rows: &[Vec<(&str, &str)>]) -> SpreadsheetConfig {
        let path = dir.path().join("book.xlsx");
        std::fs::write(&path, workbook(rows, &["ЖК Знак"], STYLES)).unwrap();
        SpreadsheetConfig {
            url: format!("file://{}", path.display()),
            timeout_secs: 5,
        }
    }

    #[test]
    fn test_rows_to_records_skips_two_header_rows() {
        let bytes = workbook(
            &[
                vec![("", "<v>100</v>")],
                vec![("", "<v>200</v>")],
                vec![("", "<v>1</v>"), ("t=\"s\"", "<v>0</v>")],
            ],
            &["ЖК Знак"],
            STYLES,
        );
        let rows = xlsx::read_first_sheet(&bytes).unwrap();
        let records = rows_to_records(&rows);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "1");
        assert_eq!(records[0].title, "ЖК Знак");
    }

    #[test]
    fn test_rows_to_records_empty_sheet() {
        assert!(rows_to_records(&[]).is_empty());
    }

    #[tokio::test]
    async fn test_ingest_end_to_end() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut rows = header_rows();
        rows.push(vec![
            ("", "<v>7</v>"),
            ("t=\"s\"", "<v>0</v>"),
            ("t=\"inlineStr\"", "<is><t>Lenina 1</t></is>"),
            ("s=\"1\"", "<v>45306</v>"),
            ("t=\"inlineStr\"", "<is><t>2025-06-30</t></is>"),
            ("t=\"inlineStr\"", "<is><t>Construction</t></is>"),
            (
                "t=\"inlineStr\"",
                "<is><t>Ivanov | Engineer | 555 | a@b.com</t></is>",
            ),
            ("t=\"inlineStr\"", "<is><t>PVOR | https://docs.example/p</t></is>"),
            (
                "t=\"inlineStr\"",
                "<is><t>{\"Area\":{\"S1\":\"10\",\"total\":\"10\"}}</t></is>",
            ),
        ]);
        rows.push(vec![("t=\"inlineStr\"", "<is><t>title</t></is>")]);
        let sheet = write_book(&dir, &rows);

        let records = ingest(&sheet).await.unwrap();
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.id, "7");
        assert_eq!(r.title, "ЖК Знак");
        assert_eq!(r.start_date, chrono::NaiveDate::from_ymd_opt(2024, 1, 15));
        assert_eq!(r.end_date, chrono::NaiveDate::from_ymd_opt(2025, 6, 30));
        assert_eq!(r.responsible_persons[0].email, "a@b.com");
        assert_eq!(r.document_links[0].document_type, "PVOR");
        assert_eq!(r.indicators["Area"]["S1"], "10");
    }

    #[tokio::test]
    async fn test_refresh_replaces_store() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut rows = header_rows();
        rows.push(vec![("", "<v>1</v>"), ("t=\"s\"", "<v>0</v>")]);
        rows.push(vec![("", "<v>2</v>"), ("t=\"s\"", "<v>0</v>")]);
        let sheet = write_book(&dir, &rows);

        let store = InMemoryStore::new();
        store
            .save(&ProjectRecord {
                id: "stale".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let summary = refresh(&store, &sheet).await.unwrap().unwrap();
        assert_eq!(summary.records, 2);
        let ids: Vec<String> = store
            .find_all()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn test_refresh_with_no_records_keeps_store() {
        let dir = tempfile::TempDir::new().unwrap();
        let sheet = write_book(&dir, &header_rows());

        let store = InMemoryStore::new();
        store
            .save(&ProjectRecord {
                id: "kept".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(refresh(&store, &sheet).await.unwrap().is_none());
        assert!(store.exists_by_id("kept").await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_source_is_unavailable() {
        let sheet = SpreadsheetConfig {
            url: "file:///nonexistent/pcards/book.xlsx".to_string(),
            timeout_secs: 5,
        };
        let err = ingest(&sheet).await.unwrap_err();
        assert!(matches!(err, IngestError::Transfer { .. }));

        let store = InMemoryStore::new();
        store
            .save(&ProjectRecord {
                id: "kept".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        refresh_on_startup(&store, &sheet).await;
        assert!(store.exists_by_id("kept").await.unwrap());
    }

    #[tokio::test]
    async fn test_garbage_source_is_unreadable() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("book.xlsx");
        std::fs::write(&path, b"not a workbook").unwrap();
        let sheet = SpreadsheetConfig {
            url: format!("file://{}", path.display()),
            timeout_secs: 5,
        };
        let err = ingest(&sheet).await.unwrap_err();
        assert!(matches!(err, IngestError::Workbook { .. }));
    }
}
