//! Record commands: `get`, `list` and `delete`.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::models::ProjectRecord;
use crate::store::{SqliteStore, Store};

pub async fn run_get(config: &Config, id: &str) -> Result<()> {
    let store = SqliteStore::connect(config).await?;
    let record = store.find_by_id(id).await;
    store.close().await;

    let Some(record) = record? else {
        bail!("project not found: {}", id);
    };
    print_record(&record);
    Ok(())
}

pub async fn run_list(config: &Config) -> Result<()> {
    let store = SqliteStore::connect(config).await?;
    let records = store.find_all().await;
    store.close().await;
    let records = records?;

    if records.is_empty() {
        println!("No projects.");
        return Ok(());
    }

    println!("{:<10} {:<16} TITLE", "ID", "STATUS");
    for record in &records {
        println!("{:<10} {:<16} {}", record.id, record.status, record.title);
    }
    println!();
    println!("{} projects", records.len());
    Ok(())
}

pub async fn run_delete(config: &Config, id: &str) -> Result<()> {
    let store = SqliteStore::connect(config).await?;
    let deleted = store.delete_by_id(id).await;
    store.close().await;

    if !deleted? {
        bail!("project not found: {}", id);
    }
    println!("deleted {}", id);
    Ok(())
}

fn print_record(record: &ProjectRecord) {
    let date = |d: Option<chrono::NaiveDate>| {
        d.map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "-".to_string())
    };

    println!("--- Project ---");
    println!("id:         {}", record.id);
    println!("title:      {}", record.title);
    println!("address:    {}", record.address);
    println!("status:     {}", record.status);
    println!("start_date: {}", date(record.start_date));
    println!("end_date:   {}", date(record.end_date));
    println!();

    println!("--- Responsible persons ({}) ---", record.responsible_persons.len());
    for p in &record.responsible_persons {
        println!("{} | {} | {} | {}", p.fio, p.position, p.phone, p.email);
    }
    println!();

    println!("--- Document links ({}) ---", record.document_links.len());
    for l in &record.document_links {
        println!("{}: {}", l.document_type, l.url);
    }
    println!();

    println!("--- Indicators ({}) ---", record.indicators.len());
    for (name, sections) in &record.indicators {
        let cells: Vec<String> = sections
            .iter()
            .map(|(section, amount)| format!("{}={}", section, amount))
            .collect();
        println!("{}: {}", name, cells.join(", "));
    }
}
