//! Row notifications for newly created projects.
//!
//! After a project is created through the API, a flattened copy of it is
//! posted to a webhook (typically a spreadsheet append script) so the source
//! sheet can pick it up. Delivery is best effort: the outcome is reported to
//! the caller but never fails the creation.
//!
//! Without a configured webhook the payload is only logged.

use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::NotifyConfig;
use crate::models::ProjectRecord;
use crate::subrecord::{format_links, format_persons};

/// One spreadsheet row in the shape the webhook expects.
///
/// Dates are ISO `YYYY-MM-DD` or empty; persons and links use the same
/// delimited text as the source sheet; indicators are a JSON string, empty
/// when there are none.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowPayload {
    pub id: String,
    pub title: String,
    pub address: String,
    pub start_date: String,
    pub end_date: String,
    pub status: String,
    pub responsible_persons: String,
    pub document_links: String,
    pub indicators: String,
}

impl RowPayload {
    pub fn from_record(record: &ProjectRecord) -> Result<Self> {
        let indicators = if record.indicators.is_empty() {
            String::new()
        } else {
            serde_json::to_string(&record.indicators)?
        };
        let date = |d: Option<chrono::NaiveDate>| {
            d.map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default()
        };
        Ok(Self {
            id: record.id.clone(),
            title: record.title.clone(),
            address: record.address.clone(),
            start_date: date(record.start_date),
            end_date: date(record.end_date),
            status: record.status.clone(),
            responsible_persons: format_persons(&record.responsible_persons),
            document_links: format_links(&record.document_links),
            indicators,
        })
    }
}

/// How a notification ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    Delivered,
    /// No webhook configured; the payload was logged instead.
    Logged,
    Failed(String),
}

impl NotifyOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, NotifyOutcome::Failed(_))
    }
}

pub struct Notifier {
    webhook_url: Option<String>,
    client: reqwest::Client,
}

impl Notifier {
    pub fn new(config: &NotifyConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            webhook_url: config.webhook_url.clone(),
            client,
        })
    }

    /// Sends the created record to the webhook. Any 2xx status is success.
    pub async fn project_created(&self, record: &ProjectRecord) -> NotifyOutcome {
        let payload = match RowPayload::from_record(record) {
            Ok(p) => p,
            Err(e) => return NotifyOutcome::Failed(e.to_string()),
        };

        let Some(url) = &self.webhook_url else {
            info!(?payload, "no webhook configured, row notification logged only");
            return NotifyOutcome::Logged;
        };

        let result = self.client.post(url).json(&payload).send().await;
        match result {
            Ok(resp) if resp.status().is_success() => NotifyOutcome::Delivered,
            Ok(resp) => {
                let message = format!("webhook returned {}", resp.status());
                warn!(id = %record.id, %message, "row notification rejected");
                NotifyOutcome::Failed(message)
            }
            Err(e) => {
                warn!(id = %record.id, error = %e, "row notification failed");
                NotifyOutcome::Failed(e.to_string())
            }
        }
    }
}
