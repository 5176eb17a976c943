//! Federated fuzzy search query.
//!
//! A search request is turned into one [`CompositeQuery`] with three
//! `should` clauses; a record matches when any clause matches and its score
//! is the sum of the matching clause scores:
//!
//! 1. fuzzy match on `title`, `address` and `status`;
//! 2. fuzzy match on each responsible person's `fio` and `position`;
//! 3. exact phrase match on each responsible person's `phone` and `email`.
//!
//! Clauses 2 and 3 are nested: every query term has to be found inside the
//! same person entry for that entry to count.
//!
//! Text is analyzed into lowercase alphanumeric terms. Fuzzy matching
//! tolerates an edit distance scaled to the term length (0 edits up to two
//! characters, 1 up to five, 2 beyond).

use serde::Serialize;
use serde_json::{json, Value};

use crate::models::{ProjectRecord, ResponsiblePerson, SearchHit};

/// Top-level record fields reachable from a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RecordField {
    Title,
    Address,
    Status,
}

impl RecordField {
    fn value(self, record: &ProjectRecord) -> &str {
        match self {
            RecordField::Title => &record.title,
            RecordField::Address => &record.address,
            RecordField::Status => &record.status,
        }
    }

    fn path(self) -> &'static str {
        match self {
            RecordField::Title => "title",
            RecordField::Address => "address",
            RecordField::Status => "status",
        }
    }
}

/// Responsible-person fields reachable from a nested clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PersonField {
    Fio,
    Position,
    Phone,
    Email,
}

impl PersonField {
    fn value(self, person: &ResponsiblePerson) -> &str {
        match self {
            PersonField::Fio => &person.fio,
            PersonField::Position => &person.position,
            PersonField::Phone => &person.phone,
            PersonField::Email => &person.email,
        }
    }

    fn path(self) -> &'static str {
        match self {
            PersonField::Fio => "responsiblePersons.fio",
            PersonField::Position => "responsiblePersons.position",
            PersonField::Phone => "responsiblePersons.phone",
            PersonField::Email => "responsiblePersons.email",
        }
    }
}

/// How query terms are compared with field terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Any term may match, with edit distance scaled to term length.
    Fuzzy,
    /// All terms must appear contiguously and in order, without edits.
    Phrase,
}

/// One `should` clause of a [`CompositeQuery`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Clause {
    /// Best-field match over top-level fields.
    Record {
        fields: Vec<RecordField>,
        mode: MatchMode,
    },
    /// Best-field match evaluated per responsible person.
    ResponsiblePersons {
        fields: Vec<PersonField>,
        mode: MatchMode,
    },
}

/// A ranked disjunctive query over project records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositeQuery {
    pub text: String,
    #[serde(skip)]
    terms: Vec<String>,
    pub should: Vec<Clause>,
}

/// Builds the composite search query for a free-text request.
///
/// Callers short-circuit blank text to an empty result and never call this
/// with it.
pub fn build(query_text: &str) -> CompositeQuery {
    CompositeQuery {
        text: query_text.to_string(),
        terms: analyze(query_text),
        should: vec![
            Clause::Record {
                fields: vec![RecordField::Title, RecordField::Address, RecordField::Status],
                mode: MatchMode::Fuzzy,
            },
            Clause::ResponsiblePersons {
                fields: vec![PersonField::Fio, PersonField::Position],
                mode: MatchMode::Fuzzy,
            },
            Clause::ResponsiblePersons {
                fields: vec![PersonField::Phone, PersonField::Email],
                mode: MatchMode::Phrase,
            },
        ],
    }
}

impl CompositeQuery {
    /// Relevance of a record, or `None` when no clause matches.
    pub fn score(&self, record: &ProjectRecord) -> Option<f64> {
        let total: f64 = self
            .should
            .iter()
            .map(|clause| self.clause_score(clause, record))
            .sum();
        (total > 0.0).then_some(total)
    }

    /// Matching records, best first. Ties keep the order of `records`.
    pub fn rank(&self, records: impl IntoIterator<Item = ProjectRecord>) -> Vec<SearchHit> {
        let mut hits: Vec<SearchHit> = records
            .into_iter()
            .filter_map(|record| self.score(&record).map(|score| SearchHit { score, record }))
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits
    }

    /// The query in search-engine JSON form, for inspection.
    pub fn to_json(&self) -> Value {
        let should: Vec<Value> = self
            .should
            .iter()
            .map(|clause| match clause {
                Clause::Record { fields, mode } => {
                    multi_match_json(&self.text, fields.iter().map(|f| f.path()), *mode)
                }
                Clause::ResponsiblePersons { fields, mode } => json!({
                    "nested": {
                        "path": "responsiblePersons",
                        "query": multi_match_json(&self.text, fields.iter().map(|f| f.path()), *mode),
                    }
                }),
            })
            .collect();
        json!({ "bool": { "should": should } })
    }

    fn clause_score(&self, clause: &Clause, record: &ProjectRecord) -> f64 {
        match clause {
            Clause::Record { fields, mode } => best_field_score(
                &self.terms,
                fields.iter().map(|f| f.value(record)),
                *mode,
            ),
            Clause::ResponsiblePersons { fields, mode } => {
                // Average over the matching entries.
                let scores: Vec<f64> = record
                    .responsible_persons
                    .iter()
                    .map(|person| {
                        best_field_score(&self.terms, fields.iter().map(|f| f.value(person)), *mode)
                    })
                    .filter(|s| *s > 0.0)
                    .collect();
                if scores.is_empty() {
                    0.0
                } else {
                    scores.iter().sum::<f64>() / scores.len() as f64
                }
            }
        }
    }
}

fn multi_match_json<'a>(text: &str, fields: impl Iterator<Item = &'a str>, mode: MatchMode) -> Value {
    let fields: Vec<&str> = fields.collect();
    match mode {
        MatchMode::Fuzzy => json!({
            "multi_match": { "query": text, "fields": fields, "fuzziness": "AUTO" }
        }),
        MatchMode::Phrase => json!({
            "multi_match": { "query": text, "fields": fields, "type": "phrase" }
        }),
    }
}

/// Splits text into lowercase alphanumeric terms.
pub fn analyze(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Edits allowed for a query term of the given length.
fn auto_fuzziness(term: &str) -> usize {
    match term.chars().count() {
        0..=2 => 0,
        3..=5 => 1,
        _ => 2,
    }
}

fn best_field_score<'a>(
    terms: &[String],
    values: impl Iterator<Item = &'a str>,
    mode: MatchMode,
) -> f64 {
    values
        .map(|value| {
            let field_terms = analyze(value);
            match mode {
                MatchMode::Fuzzy => fuzzy_score(terms, &field_terms),
                MatchMode::Phrase => phrase_score(terms, &field_terms),
            }
        })
        .fold(0.0, f64::max)
}

/// Sum over query terms of the best similarity to any field term.
fn fuzzy_score(terms: &[String], field_terms: &[String]) -> f64 {
    terms
        .iter()
        .map(|term| {
            field_terms
                .iter()
                .map(|candidate| term_similarity(term, candidate))
                .fold(0.0, f64::max)
        })
        .sum()
}

fn term_similarity(term: &str, candidate: &str) -> f64 {
    if term == candidate {
        return 1.0;
    }
    let distance = strsim::levenshtein(term, candidate);
    if distance > auto_fuzziness(term) {
        return 0.0;
    }
    let longest = term.chars().count().max(candidate.chars().count());
    1.0 - distance as f64 / longest as f64
}

fn phrase_score(terms: &[String], field_terms: &[String]) -> f64 {
    if terms.is_empty() || terms.len() > field_terms.len() {
        return 0.0;
    }
    if field_terms.windows(terms.len()).any(|w| w == terms) {
        terms.len() as f64
    } else {
        0.0
    }
}
