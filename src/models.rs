//! Core data models used throughout Project Cards.
//!
//! These types represent the project records, and the sub-records they own,
//! that flow through the ingestion pipeline into the store and back out of
//! the search and serving layers.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Indicator table: indicator name → section label (or `"total"`) → amount.
pub type Indicators = BTreeMap<String, BTreeMap<String, String>>;

/// Inner key used for an indicator's overall amount.
pub const TOTAL_KEY: &str = "total";

/// A construction project card.
///
/// Records are fully replaced on each ingestion cycle and deleted
/// individually by ID. The nested collections are never absent: an empty or
/// unparsable source cell yields an empty list or map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectRecord {
    pub id: String,
    pub title: String,
    pub address: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: String,
    pub indicators: Indicators,
    pub responsible_persons: Vec<ResponsiblePerson>,
    pub document_links: Vec<DocumentLink>,
}

/// A person responsible for some part of a project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponsiblePerson {
    /// Full name.
    pub fio: String,
    pub position: String,
    pub phone: String,
    pub email: String,
    /// Free text; always empty for records produced by ingestion.
    pub description: String,
}

/// A typed link to a project document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DocumentLink {
    pub document_type: String,
    pub url: String,
}

/// A ranked match returned from a composite query.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub score: f64,
    pub record: ProjectRecord,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_json_uses_camel_case() {
        let record = ProjectRecord {
            id: "1".to_string(),
            start_date: NaiveDate::from_ymd_opt(2024, 1, 15),
            document_links: vec![DocumentLink {
                document_type: "Brand list".to_string(),
                url: "https://example.com/a".to_string(),
            }],
            ..Default::default()
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["startDate"], "2024-01-15");
        assert!(json["endDate"].is_null());
        assert_eq!(json["documentLinks"][0]["documentType"], "Brand list");
        assert!(json["responsiblePersons"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_partial_json_fills_empty_collections() {
        let record: ProjectRecord =
            serde_json::from_str(r#"{"title": "Block 35", "status": "planned"}"#).unwrap();
        assert_eq!(record.id, "");
        assert_eq!(record.title, "Block 35");
        assert!(record.indicators.is_empty());
        assert!(record.responsible_persons.is_empty());
        assert!(record.document_links.is_empty());
    }
}
