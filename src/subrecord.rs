//! Delimited sub-record cells.
//!
//! A single cell can hold several nested records. Records are separated by
//! `;` or a newline and fields within a record by `|`, with whitespace
//! around either delimiter ignored:
//!
//! ```text
//! Ivanov | Engineer | 555-1 | a@b.com; Petrov | Manager | 555-2 | c@d.com
//! ```
//!
//! Records with too few fields are dropped one at a time; their siblings in
//! the same cell still parse.

use crate::models::{DocumentLink, ResponsiblePerson};

const PERSON_FIELDS: usize = 4;
const LINK_FIELDS: usize = 2;

/// Separator used when writing sub-records back to their cell form.
const RECORD_SEPARATOR: &str = "; ";
const FIELD_SEPARATOR: &str = " | ";

/// Parses `fio | position | phone | email` records. Extra fields are
/// ignored and the description is left empty.
pub fn parse_persons(text: &str) -> Vec<ResponsiblePerson> {
    split_records(text)
        .filter(|fields| fields.len() >= PERSON_FIELDS)
        .map(|fields| ResponsiblePerson {
            fio: fields[0].to_string(),
            position: fields[1].to_string(),
            phone: fields[2].to_string(),
            email: fields[3].to_string(),
            description: String::new(),
        })
        .collect()
}

/// Parses `type | url` records.
pub fn parse_links(text: &str) -> Vec<DocumentLink> {
    split_records(text)
        .filter(|fields| fields.len() >= LINK_FIELDS)
        .map(|fields| DocumentLink {
            document_type: fields[0].to_string(),
            url: fields[1].to_string(),
        })
        .collect()
}

/// Renders persons in the cell format accepted by [`parse_persons`].
pub fn format_persons(persons: &[ResponsiblePerson]) -> String {
    persons
        .iter()
        .map(|p| {
            [
                p.fio.as_str(),
                p.position.as_str(),
                p.phone.as_str(),
                p.email.as_str(),
            ]
            .join(FIELD_SEPARATOR)
        })
        .collect::<Vec<_>>()
        .join(RECORD_SEPARATOR)
}

/// Renders links in the cell format accepted by [`parse_links`].
pub fn format_links(links: &[DocumentLink]) -> String {
    links
        .iter()
        .map(|l| [l.document_type.as_str(), l.url.as_str()].join(FIELD_SEPARATOR))
        .collect::<Vec<_>>()
        .join(RECORD_SEPARATOR)
}

/// Splits a cell into records of trimmed fields.
///
/// Trailing empty fields do not count towards a record's width, so
/// `"a|b|c|"` has three fields.
fn split_records(text: &str) -> impl Iterator<Item = Vec<&str>> {
    text.split([';', '\n'])
        .map(str::trim)
        .filter(|record| !record.is_empty())
        .map(|record| {
            let mut fields: Vec<&str> = record.split('|').map(str::trim).collect();
            while fields.last().is_some_and(|f| f.is_empty()) {
                fields.pop();
            }
            fields
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_persons_in_order() {
        let persons =
            parse_persons("Ivanov|Engineer|555-1|a@b.com; Petrov|Manager|555-2|c@d.com");
        assert_eq!(persons.len(), 2);
        assert_eq!(persons[0].fio, "Ivanov");
        assert_eq!(persons[0].position, "Engineer");
        assert_eq!(persons[0].phone, "555-1");
        assert_eq!(persons[0].email, "a@b.com");
        assert_eq!(persons[1].fio, "Petrov");
        assert_eq!(persons[1].email, "c@d.com");
        assert!(persons.iter().all(|p| p.description.is_empty()));
    }

    #[test]
    fn test_person_below_minimum_is_dropped() {
        assert!(parse_persons("OnlyTwo|Fields").is_empty());
        assert!(parse_persons("a|b|c|").is_empty());
    }

    #[test]
    fn test_short_record_does_not_drop_siblings() {
        let persons = parse_persons("Broken|Row\nSidorov | Foreman | 555-3 | e@f.com | extra");
        assert_eq!(persons.len(), 1);
        assert_eq!(persons[0].fio, "Sidorov");
        assert_eq!(persons[0].email, "e@f.com");
    }

    #[test]
    fn test_newline_and_semicolon_separators() {
        let links = parse_links("PVOR | https://a.example/1\r\n Brand list|https://a.example/2 ;");
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].document_type, "PVOR");
        assert_eq!(links[0].url, "https://a.example/1");
        assert_eq!(links[1].document_type, "Brand list");
    }

    #[test]
    fn test_link_below_minimum_is_dropped() {
        assert!(parse_links("just-a-label").is_empty());
    }

    #[test]
    fn test_blank_input_is_empty() {
        assert!(parse_persons("").is_empty());
        assert!(parse_persons("   \n ").is_empty());
        assert!(parse_links("").is_empty());
    }

    #[test]
    fn test_format_matches_parse_grammar() {
        let persons =
            parse_persons("Ivanov|Engineer|555-1|a@b.com; Petrov|Manager|555-2|c@d.com");
        assert_eq!(
            format_persons(&persons),
            "Ivanov | Engineer | 555-1 | a@b.com; Petrov | Manager | 555-2 | c@d.com"
        );
        assert_eq!(format_links(&[]), "");
    }
}
