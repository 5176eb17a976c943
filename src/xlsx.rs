//! OOXML workbook (`.xlsx`) reader.
//!
//! Decodes the first worksheet of a workbook into rows of typed [`Cell`]s.
//! Only what the ingestion layout needs is read: shared strings, inline
//! strings, numbers, booleans, formula results, and enough of the style
//! table to tell date-formatted numbers from plain ones.

use std::collections::HashMap;
use std::io::Read;

use quick_xml::events::{BytesStart, Event};

use crate::cell::Cell;

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;
/// Maximum cells to decode from the worksheet.
const MAX_CELLS: usize = 1_000_000;
/// Rows and columns in a worksheet (`XFD1048576` is the last cell).
const MAX_ROWS: u32 = 1_048_576;
const MAX_COLUMNS: usize = 16_384;
/// Days between the 1900 and 1904 date system epochs.
const DATE_1904_OFFSET: f64 = 1462.0;

/// Workbook decoding error.
#[derive(Debug)]
pub enum SheetError {
    /// Not a ZIP container, or a required entry is unreadable.
    Container(String),
    /// A workbook part is not well-formed XML.
    Xml(String),
    /// The container holds no worksheet.
    NoWorksheet,
    /// The worksheet holds more cells than the reader accepts.
    TooLarge { limit: usize },
}

impl std::fmt::Display for SheetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SheetError::Container(e) => write!(f, "invalid spreadsheet container: {}", e),
            SheetError::Xml(e) => write!(f, "malformed spreadsheet XML: {}", e),
            SheetError::NoWorksheet => write!(f, "spreadsheet contains no worksheet"),
            SheetError::TooLarge { limit } => {
                write!(f, "worksheet has more than {} cells", limit)
            }
        }
    }
}

impl std::error::Error for SheetError {}

/// One worksheet row. Missing cells are [`Cell::Empty`].
#[derive(Debug, Clone, PartialEq)]
pub struct SheetRow {
    /// Zero-based row number within the sheet.
    pub index: u32,
    pub cells: Vec<Cell>,
}

impl SheetRow {
    /// Cell at a zero-based column, [`Cell::Empty`] when past the row's end.
    pub fn cell(&self, column: usize) -> &Cell {
        self.cells.get(column).unwrap_or(&Cell::Empty)
    }
}

type Archive<'a> = zip::ZipArchive<std::io::Cursor<&'a [u8]>>;

/// Reads the first worksheet of an `.xlsx` workbook.
///
/// Rows are returned in sheet order. Rows absent from the sheet XML are
/// absent from the result, so consecutive entries may skip indices.
pub fn read_first_sheet(bytes: &[u8]) -> Result<Vec<SheetRow>, SheetError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| SheetError::Container(e.to_string()))?;

    let shared_strings = match read_optional_entry(&mut archive, "xl/sharedStrings.xml")? {
        Some(xml) => parse_shared_strings(&xml)?,
        None => Vec::new(),
    };
    let date_styles = match read_optional_entry(&mut archive, "xl/styles.xml")? {
        Some(xml) => parse_date_styles(&xml)?,
        None => Vec::new(),
    };
    let workbook = match read_optional_entry(&mut archive, "xl/workbook.xml")? {
        Some(xml) => parse_workbook(&xml)?,
        None => WorkbookInfo::default(),
    };
    let declared_sheet = match (
        &workbook.first_sheet_rel,
        read_optional_entry(&mut archive, "xl/_rels/workbook.xml.rels")?,
    ) {
        (Some(rel_id), Some(rels)) => relationship_target(&rels, rel_id)?
            .filter(|name| archive.index_for_name(name).is_some()),
        _ => None,
    };

    let sheet_name = declared_sheet
        .or_else(|| lowest_numbered_worksheet(&archive))
        .ok_or(SheetError::NoWorksheet)?;
    let sheet_xml = read_zip_entry_bounded(&mut archive, &sheet_name)?;

    let context = SheetContext {
        shared_strings: &shared_strings,
        date_styles: &date_styles,
        date_1904: workbook.date_1904,
        max_cells: MAX_CELLS,
    };
    parse_sheet_rows(&sheet_xml, &context)
}

fn read_zip_entry_bounded(archive: &mut Archive<'_>, name: &str) -> Result<Vec<u8>, SheetError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| SheetError::Container(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| SheetError::Container(e.to_string()))?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(SheetError::Container(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, MAX_XML_ENTRY_BYTES
        )));
    }
    Ok(out)
}

fn read_optional_entry(
    archive: &mut Archive<'_>,
    name: &str,
) -> Result<Option<Vec<u8>>, SheetError> {
    if archive.index_for_name(name).is_none() {
        return Ok(None);
    }
    read_zip_entry_bounded(archive, name).map(Some)
}

/// Lowest-numbered `xl/worksheets/sheetN.xml` entry, for workbooks
/// without a usable sheet list.
fn lowest_numbered_worksheet(archive: &Archive<'_>) -> Option<String> {
    archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
        .min_by_key(|name| {
            name.trim_start_matches("xl/worksheets/sheet")
                .trim_end_matches(".xml")
                .parse::<u32>()
                .unwrap_or(u32::MAX)
        })
        .map(|s| s.to_string())
}

fn attr(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == key)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn xml_err(e: quick_xml::Error) -> SheetError {
    SheetError::Xml(e.to_string())
}

/// Shared string table. Rich-text runs of one entry are concatenated;
/// phonetic hints (`rPh`) are skipped.
fn parse_shared_strings(xml: &[u8]) -> Result<Vec<String>, SheetError> {
    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut current: Option<String> = None;
    let mut in_t = false;
    let mut in_phonetic = false;
    loop {
        match reader.read_event_into(&mut buf).map_err(xml_err)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"rPh" => in_phonetic = true,
                b"t" if !in_phonetic => in_t = true,
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Event::Text(te) if in_t => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&te.unescape().map_err(|e| SheetError::Xml(e.to_string()))?);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"si" => strings.push(current.take().unwrap_or_default()),
                b"rPh" => in_phonetic = false,
                b"t" => in_t = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// For each cell style (`cellXfs` entry), whether its number format is a date.
fn parse_date_styles(xml: &[u8]) -> Result<Vec<bool>, SheetError> {
    let mut custom_formats: HashMap<u32, String> = HashMap::new();
    let mut style_formats: Vec<u32> = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_cell_xfs = false;
    loop {
        let event = reader.read_event_into(&mut buf).map_err(xml_err)?;
        let opens = matches!(event, Event::Start(_));
        match event {
            Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                b"numFmt" => {
                    if let (Some(id), Some(code)) = (attr(&e, b"numFmtId"), attr(&e, b"formatCode"))
                    {
                        if let Ok(id) = id.parse() {
                            custom_formats.insert(id, code);
                        }
                    }
                }
                // An empty <cellXfs/> has no children to collect.
                b"cellXfs" => in_cell_xfs = opens,
                b"xf" if in_cell_xfs => {
                    let id = attr(&e, b"numFmtId")
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(0);
                    style_formats.push(id);
                }
                _ => {}
            },
            Event::End(e) if e.local_name().as_ref() == b"cellXfs" => in_cell_xfs = false,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(style_formats
        .into_iter()
        .map(|id| match custom_formats.get(&id) {
            Some(code) => is_date_format_code(code),
            None => is_builtin_date_format(id),
        })
        .collect())
}

fn is_builtin_date_format(id: u32) -> bool {
    matches!(id, 14..=22 | 45..=47)
}

/// Whether a custom number format code renders a date or time.
///
/// Quoted literals, escaped characters and bracketed sections such as
/// `[Red]` or `[$-409]` are ignored; any remaining `y m d h s` makes it a date.
fn is_date_format_code(code: &str) -> bool {
    let mut chars = code.chars();
    let mut in_quote = false;
    let mut in_bracket = false;
    while let Some(c) = chars.next() {
        match c {
            '"' => in_quote = !in_quote,
            _ if in_quote => {}
            '\\' => {
                chars.next();
            }
            '[' => in_bracket = true,
            ']' => in_bracket = false,
            _ if in_bracket => {}
            'y' | 'Y' | 'm' | 'M' | 'd' | 'D' | 'h' | 'H' | 's' | 'S' => return true,
            _ => {}
        }
    }
    false
}

/// What the reader needs from `xl/workbook.xml`.
#[derive(Debug, Default)]
struct WorkbookInfo {
    date_1904: bool,
    /// Relationship id of the first `<sheet>` in tab order.
    first_sheet_rel: Option<String>,
}

fn parse_workbook(xml: &[u8]) -> Result<WorkbookInfo, SheetError> {
    let mut info = WorkbookInfo::default();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf).map_err(xml_err)? {
            Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                b"workbookPr" => {
                    info.date_1904 =
                        matches!(attr(&e, b"date1904").as_deref(), Some("1") | Some("true"));
                }
                b"sheet" if info.first_sheet_rel.is_none() => {
                    info.first_sheet_rel = attr(&e, b"id");
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(info)
}

/// Archive path of the relationship `rel_id` in `xl/_rels/workbook.xml.rels`.
///
/// Targets are relative to `xl/` unless they start with `/`.
fn relationship_target(xml: &[u8], rel_id: &str) -> Result<Option<String>, SheetError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf).map_err(xml_err)? {
            Event::Start(e) | Event::Empty(e)
                if e.local_name().as_ref() == b"Relationship"
                    && attr(&e, b"Id").as_deref() == Some(rel_id) =>
            {
                return Ok(attr(&e, b"Target").map(|target| match target.strip_prefix('/') {
                    Some(absolute) => absolute.to_string(),
                    None => format!("xl/{}", target),
                }));
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
        buf.clear();
    }
}

struct SheetContext<'a> {
    shared_strings: &'a [String],
    date_styles: &'a [bool],
    date_1904: bool,
    max_cells: usize,
}

/// Attributes and raw value of the `<c>` element being read.
struct PendingCell {
    column: usize,
    cell_type: Option<String>,
    style: Option<usize>,
    value: String,
}

impl PendingCell {
    fn decode(self, ctx: &SheetContext<'_>) -> Cell {
        let date_styled = self.is_date_styled(ctx);
        let raw = self.value;
        match self.cell_type.as_deref() {
            Some("s") => raw
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(|i| ctx.shared_strings.get(i))
                .map(|s| Cell::Text(s.clone()))
                .unwrap_or(Cell::Empty),
            Some("b") => {
                let flag = if raw.trim() == "1" { "TRUE" } else { "FALSE" };
                Cell::Text(flag.to_string())
            }
            Some("inlineStr") | Some("str") | Some("e") => {
                if raw.is_empty() {
                    Cell::Empty
                } else {
                    Cell::Text(raw)
                }
            }
            _ => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    return Cell::Empty;
                }
                match trimmed.parse::<f64>() {
                    Ok(n) if date_styled => {
                        Cell::Date(if ctx.date_1904 { n + DATE_1904_OFFSET } else { n })
                    }
                    Ok(n) => Cell::Number(n),
                    Err(_) => Cell::Text(raw),
                }
            }
        }
    }

    fn is_date_styled(&self, ctx: &SheetContext<'_>) -> bool {
        self.style
            .and_then(|s| ctx.date_styles.get(s))
            .copied()
            .unwrap_or(false)
    }
}

/// Zero-based column of an `A1`-style reference (`"C5"` → 2), or `None`
/// when the reference has no column letters.
fn column_index(reference: &str) -> Result<Option<usize>, SheetError> {
    let mut column = 0usize;
    let mut letters = 0;
    for c in reference.chars().take_while(char::is_ascii_alphabetic) {
        letters += 1;
        column = column * 26 + (c.to_ascii_uppercase() as usize - 'A' as usize + 1);
        if column > MAX_COLUMNS {
            return Err(SheetError::Xml(format!(
                "cell reference {} is beyond column XFD",
                reference
            )));
        }
    }
    Ok((letters > 0).then(|| column - 1))
}

/// Column of a `<c>` element: its `r` reference, else the position after
/// the previous cell.
fn cell_column(e: &BytesStart<'_>, next_column: usize) -> Result<usize, SheetError> {
    let column = match attr(e, b"r") {
        Some(reference) => column_index(&reference)?.unwrap_or(next_column),
        None => next_column,
    };
    if column >= MAX_COLUMNS {
        return Err(SheetError::Xml(format!(
            "cell column {} is beyond column XFD",
            column + 1
        )));
    }
    Ok(column)
}

/// Zero-based index of a `<row>` element: its `r` number, else the row
/// after the previous one.
fn row_index(e: &BytesStart<'_>, next_row_index: u32) -> Result<u32, SheetError> {
    let index = attr(e, b"r")
        .and_then(|r| r.parse::<u32>().ok())
        .map(|r| r.saturating_sub(1))
        .unwrap_or(next_row_index);
    if index >= MAX_ROWS {
        return Err(SheetError::Xml(format!(
            "row {} is beyond the last worksheet row",
            u64::from(index) + 1
        )));
    }
    Ok(index)
}

fn parse_sheet_rows(xml: &[u8], ctx: &SheetContext<'_>) -> Result<Vec<SheetRow>, SheetError> {
    let mut rows: Vec<SheetRow> = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();

    let mut current_row: Option<SheetRow> = None;
    let mut next_row_index: u32 = 0;
    let mut next_column: usize = 0;
    let mut pending: Option<PendingCell> = None;
    let mut in_value = false;
    let mut cell_count = 0usize;

    loop {
        match reader.read_event_into(&mut buf).map_err(xml_err)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"row" => {
                    let index = row_index(&e, next_row_index)?;
                    next_row_index = index + 1;
                    next_column = 0;
                    current_row = Some(SheetRow {
                        index,
                        cells: Vec::new(),
                    });
                }
                b"c" => {
                    let column = cell_column(&e, next_column)?;
                    next_column = column + 1;
                    pending = Some(PendingCell {
                        column,
                        cell_type: attr(&e, b"t"),
                        style: attr(&e, b"s").and_then(|s| s.parse().ok()),
                        value: String::new(),
                    });
                }
                // `<v>` holds the value; `<t>` the text of an inline string.
                b"v" | b"t" if pending.is_some() => in_value = true,
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"row" => next_row_index = row_index(&e, next_row_index)? + 1,
                b"c" => next_column = cell_column(&e, next_column)? + 1,
                _ => {}
            },
            Event::Text(te) if in_value => {
                if let Some(cell) = pending.as_mut() {
                    cell.value
                        .push_str(&te.unescape().map_err(|e| SheetError::Xml(e.to_string()))?);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => {
                    if let (Some(cell), Some(row)) = (pending.take(), current_row.as_mut()) {
                        cell_count += 1;
                        if cell_count > ctx.max_cells {
                            return Err(SheetError::TooLarge {
                                limit: ctx.max_cells,
                            });
                        }
                        let column = cell.column;
                        let decoded = cell.decode(ctx);
                        if row.cells.len() <= column {
                            row.cells.resize(column + 1, Cell::Empty);
                        }
                        row.cells[column] = decoded;
                    }
                }
                b"row" => {
                    if let Some(row) = current_row.take() {
                        rows.push(row);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if let Some(row) = current_row.take() {
        rows.push(row);
    }
    Ok(rows)
}
