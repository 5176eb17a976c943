//! Search entry points shared by the CLI and the HTTP server.

use anyhow::Result;

use crate::config::Config;
use crate::models::SearchHit;
use crate::query;
use crate::store::{SqliteStore, Store};

/// Runs a fuzzy search over `store`.
///
/// Blank text matches nothing and no query is built for it.
pub async fn search_projects(store: &dyn Store, text: &str) -> Result<Vec<SearchHit>> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    store.execute_query(&query::build(text)).await
}

/// `pcards search`: prints ranked matches.
pub async fn run_search(
    config: &Config,
    text: &str,
    limit: Option<usize>,
    explain: bool,
) -> Result<()> {
    if explain && !text.trim().is_empty() {
        println!("{}", serde_json::to_string_pretty(&query::build(text).to_json())?);
        println!();
    }

    let store = SqliteStore::connect(config).await?;
    let mut hits = search_projects(&store, text).await?;
    store.close().await;

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    hits.truncate(limit.unwrap_or(config.retrieval.final_limit));

    for (i, hit) in hits.iter().enumerate() {
        let record = &hit.record;
        let title = if record.title.is_empty() {
            "(untitled)"
        } else {
            record.title.as_str()
        };
        println!("{}. [{:.2}] {}", i + 1, hit.score, title);
        if !record.address.is_empty() {
            println!("    address: {}", record.address);
        }
        if !record.status.is_empty() {
            println!("    status: {}", record.status);
        }
        for person in &record.responsible_persons {
            println!("    person: {} ({})", person.fio, person.position);
        }
        println!("    id: {}", record.id);
        println!();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProjectRecord, ResponsiblePerson};
    use crate::store::InMemoryStore;

    async fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        store
            .save_all(&[
                ProjectRecord {
                    id: "1".to_string(),
                    title: "ЖК Знак".to_string(),
                    ..Default::default()
                },
                ProjectRecord {
                    id: "2".to_string(),
                    title: "Warehouse".to_string(),
                    responsible_persons: vec![ResponsiblePerson {
                        fio: "Sidorov".to_string(),
                        phone: "+7 900 123".to_string(),
                        ..Default::default()
                    }],
                    ..Default::default()
                },
            ])
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_blank_query_returns_nothing() {
        let store = seeded().await;
        assert!(search_projects(&store, "").await.unwrap().is_empty());
        assert!(search_projects(&store, "   ").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_across_fields() {
        let store = seeded().await;

        let hits = search_projects(&store, "знак").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.id, "1");

        let hits = search_projects(&store, "sidorof").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.id, "2");

        let hits = search_projects(&store, "900 123").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.id, "2");

        assert!(search_projects(&store, "nothing here").await.unwrap().is_empty());
    }
}
