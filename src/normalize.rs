//! Row normalization.
//!
//! Maps one worksheet row onto a [`ProjectRecord`] using the fixed column
//! layout below. Rows without an identity, and repeated header rows, are
//! skipped rather than reported.
//!
//! | Column | Field |
//! |--------|-------|
//! | 0 | id |
//! | 1 | title |
//! | 2 | address |
//! | 3 | start date |
//! | 4 | end date |
//! | 5 | status |
//! | 6 | responsible persons (delimited) |
//! | 7 | document links (delimited) |
//! | 8 | indicators (JSON) |

use tracing::debug;

use crate::cell::{date_value, string_value};
use crate::indicators;
use crate::models::ProjectRecord;
use crate::subrecord::{parse_links, parse_persons};
use crate::xlsx::SheetRow;

const COL_ID: usize = 0;
const COL_TITLE: usize = 1;
const COL_ADDRESS: usize = 2;
const COL_START_DATE: usize = 3;
const COL_END_DATE: usize = 4;
const COL_STATUS: usize = 5;
const COL_PERSONS: usize = 6;
const COL_LINKS: usize = 7;
const COL_INDICATORS: usize = 8;

/// Lowercased column names; an id cell holding one of these marks a header row.
const HEADER_TOKENS: [&str; 9] = [
    "id",
    "title",
    "address",
    "startdate",
    "enddate",
    "status",
    "responsiblepersons",
    "documentlinks",
    "indicators",
];

/// Builds a record from a row, or `None` when the row must be skipped.
pub fn normalize(row: Option<&SheetRow>) -> Option<ProjectRecord> {
    let row = row?;

    let id = string_value(row.cell(COL_ID));
    if id.trim().is_empty() {
        return None;
    }
    let token = id.trim().to_lowercase();
    if HEADER_TOKENS.contains(&token.as_str()) {
        debug!(row = row.index, token = %token, "skipping header row");
        return None;
    }

    Some(ProjectRecord {
        id,
        title: string_value(row.cell(COL_TITLE)),
        address: string_value(row.cell(COL_ADDRESS)),
        start_date: date_value(row.cell(COL_START_DATE)),
        end_date: date_value(row.cell(COL_END_DATE)),
        status: string_value(row.cell(COL_STATUS)),
        responsible_persons: parse_persons(&string_value(row.cell(COL_PERSONS))),
        document_links: parse_links(&string_value(row.cell(COL_LINKS))),
        indicators: indicators::parse(&string_value(row.cell(COL_INDICATORS))),
    })
}
