//! Cell values and their conversion to record fields.
//!
//! The workbook reader ([`crate::xlsx`]) decodes every cell into a [`Cell`]
//! variant. The extraction functions here are pure and never fail: a cell
//! that cannot be read as the requested type degrades to an empty string or
//! `None`, so a single odd cell never aborts row processing.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

/// One decoded spreadsheet cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// No cell, or a cell without a value.
    Empty,
    /// Shared, inline, formula-string, boolean or error text.
    Text(String),
    /// Plain number.
    Number(f64),
    /// Number whose cell style is a date format. Holds the serial in the
    /// 1900 date system.
    Date(f64),
}

/// Text date layouts, tried in order; the first that yields a date wins.
///
/// Month and day accept any number of digits in the slash layouts, so
/// `M/d/yyyy` also covers `MM/dd/yyyy` and `d/M/yyyy` covers `dd/MM/yyyy`.
/// Years need at least four digits. The ISO layout is strict `yyyy-MM-dd`.
#[derive(Debug, Clone, Copy)]
enum TextLayout {
    MonthFirst,
    DayFirst,
    Iso,
}

const TEXT_DATE_LAYOUTS: [TextLayout; 3] =
    [TextLayout::MonthFirst, TextLayout::DayFirst, TextLayout::Iso];

impl TextLayout {
    fn parse(self, text: &str) -> Option<NaiveDate> {
        let (year, month, day) = match self {
            TextLayout::MonthFirst => {
                let [m, d, y] = split3(text, '/')?;
                (year_digits(y)?, digits(m, 1, 9)?, digits(d, 1, 9)?)
            }
            TextLayout::DayFirst => {
                let [d, m, y] = split3(text, '/')?;
                (year_digits(y)?, digits(m, 1, 9)?, digits(d, 1, 9)?)
            }
            TextLayout::Iso => {
                let [y, m, d] = split3(text, '-')?;
                (year_digits(y)?, digits(m, 2, 2)?, digits(d, 2, 2)?)
            }
        };
        resolve_date(year, month, day)
    }
}

fn split3(text: &str, separator: char) -> Option<[&str; 3]> {
    let mut parts = text.split(separator);
    let fields = [parts.next()?, parts.next()?, parts.next()?];
    parts.next().is_none().then_some(fields)
}

fn digits(field: &str, min_width: usize, max_width: usize) -> Option<u32> {
    let width = field.len();
    if width < min_width || width > max_width || !field.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    field.parse().ok()
}

fn year_digits(field: &str) -> Option<i32> {
    digits(field, 4, 6).and_then(|y| i32::try_from(y).ok())
}

/// Builds a date, clamping a day past the month's end to its last day
/// (`2/30/2024` is 2024-02-29). Months outside 1-12, days outside 1-31
/// and year 0 are rejected.
fn resolve_date(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    if year < 1 || !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }
    let last_day = (28..=31)
        .rev()
        .find(|d| NaiveDate::from_ymd_opt(year, month, *d).is_some())?;
    NaiveDate::from_ymd_opt(year, month, day.min(last_day))
}

/// Serial of 9999-12-31 plus one day; the last representable spreadsheet date.
const MAX_DATE_SERIAL: f64 = 2_958_466.0;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Canonical string form of a cell.
///
/// Integral numbers render without a decimal point (`42.0` → `"42"`); date
/// cells render as `YYYY-MM-DD`, with a time suffix only when the serial
/// carries one.
pub fn string_value(cell: &Cell) -> String {
    match cell {
        Cell::Empty => String::new(),
        Cell::Text(text) => text.clone(),
        Cell::Number(value) => format_number(*value),
        Cell::Date(serial) => match serial_to_datetime(*serial) {
            Some(dt) if dt.time() == NaiveTime::MIN => dt.format("%Y-%m-%d").to_string(),
            Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => format_number(*serial),
        },
    }
}

/// Best-effort calendar date of a cell.
///
/// Date-styled numbers convert directly. Plain positive numbers are still
/// read as date serials, which recovers date columns that lost their number
/// format. Text is tried against each [`TextLayout`] in turn.
pub fn date_value(cell: &Cell) -> Option<NaiveDate> {
    match cell {
        Cell::Empty => None,
        Cell::Date(serial) => serial_to_datetime(*serial).map(|dt| dt.date()),
        Cell::Number(value) if *value > 0.0 => serial_to_datetime(*value).map(|dt| dt.date()),
        Cell::Number(_) => None,
        Cell::Text(text) => parse_text_date(text),
    }
}

fn parse_text_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    TEXT_DATE_LAYOUTS
        .iter()
        .find_map(|layout| layout.parse(text))
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        // Covers -0.0 as well.
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Converts a 1900-system serial into a wall-clock date and time.
///
/// Serial 1 is 1900-01-01. Serials up to 60 are offset by one day to absorb
/// the phantom 1900-02-29 that spreadsheet applications still count. The
/// result is a naive local date: the workbook stores no zone, so the
/// calendar date is the same in every local time zone.
pub fn serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || !(0.0..MAX_DATE_SERIAL).contains(&serial) {
        return None;
    }

    let whole_days = serial.trunc() as i64;
    let mut seconds = ((serial - serial.trunc()) * SECONDS_PER_DAY).round() as i64;
    let mut days = whole_days;
    if seconds >= SECONDS_PER_DAY as i64 {
        days += 1;
        seconds = 0;
    }

    let epoch = if whole_days < 61 {
        NaiveDate::from_ymd_opt(1899, 12, 31)?
    } else {
        NaiveDate::from_ymd_opt(1899, 12, 30)?
    };

    let date = epoch.checked_add_signed(Duration::days(days))?;
    date.and_time(NaiveTime::MIN)
        .checked_add_signed(Duration::seconds(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_string_value_empty_and_text() {
        assert_eq!(string_value(&Cell::Empty), "");
        assert_eq!(string_value(&Cell::Text("  ЖК Знак ".into())), "  ЖК Знак ");
    }

    #[test]
    fn test_string_value_integral_number_has_no_decimal_point() {
        assert_eq!(string_value(&Cell::Number(42.0)), "42");
        assert_eq!(string_value(&Cell::Number(-7.0)), "-7");
        assert_eq!(string_value(&Cell::Number(0.0)), "0");
    }

    #[test]
    fn test_string_value_fractional_number() {
        assert_eq!(string_value(&Cell::Number(42.5)), "42.5");
        assert_eq!(string_value(&Cell::Number(0.125)), "0.125");
    }

    #[test]
    fn test_string_value_date_cell() {
        assert_eq!(string_value(&Cell::Date(45306.0)), "2024-01-15");
        assert_eq!(string_value(&Cell::Date(45306.5)), "2024-01-15 12:00:00");
    }

    #[test]
    fn test_serial_epoch_and_leap_bug() {
        assert_eq!(serial_to_datetime(1.0).unwrap().date(), ymd(1900, 1, 1));
        assert_eq!(serial_to_datetime(59.0).unwrap().date(), ymd(1900, 2, 28));
        assert_eq!(serial_to_datetime(61.0).unwrap().date(), ymd(1900, 3, 1));
        assert_eq!(serial_to_datetime(45306.0).unwrap().date(), ymd(2024, 1, 15));
    }

    #[test]
    fn test_serial_out_of_range() {
        assert!(serial_to_datetime(-1.0).is_none());
        assert!(serial_to_datetime(f64::NAN).is_none());
        assert!(serial_to_datetime(3_000_000.0).is_none());
    }

    #[test]
    fn test_date_value_from_date_cell() {
        assert_eq!(date_value(&Cell::Date(45306.0)), Some(ymd(2024, 1, 15)));
    }

    #[test]
    fn test_date_value_recovers_unformatted_serial() {
        assert_eq!(date_value(&Cell::Number(45306.0)), Some(ymd(2024, 1, 15)));
        assert_eq!(date_value(&Cell::Number(0.0)), None);
        assert_eq!(date_value(&Cell::Number(-3.0)), None);
    }

    #[test]
    fn test_date_value_text_formats() {
        assert_eq!(date_value(&Cell::Text("2024-01-15".into())), Some(ymd(2024, 1, 15)));
        assert_eq!(date_value(&Cell::Text("1/15/2024".into())), Some(ymd(2024, 1, 15)));
        assert_eq!(date_value(&Cell::Text(" 03/04/2024 ".into())), Some(ymd(2024, 3, 4)));
        // Month 15 is impossible, so the day-first layout wins.
        assert_eq!(date_value(&Cell::Text("15/01/2024".into())), Some(ymd(2024, 1, 15)));
    }

    #[test]
    fn test_date_value_requires_four_digit_year() {
        assert_eq!(date_value(&Cell::Text("1/15/24".into())), None);
        assert_eq!(date_value(&Cell::Text("15/1/24".into())), None);
        assert_eq!(date_value(&Cell::Text("24-01-15".into())), None);
        assert_eq!(date_value(&Cell::Text("0000-01-15".into())), None);
    }

    #[test]
    fn test_date_value_clamps_day_to_month_end() {
        assert_eq!(date_value(&Cell::Text("2/30/2024".into())), Some(ymd(2024, 2, 29)));
        assert_eq!(date_value(&Cell::Text("2/31/2023".into())), Some(ymd(2023, 2, 28)));
        assert_eq!(date_value(&Cell::Text("4/31/2024".into())), Some(ymd(2024, 4, 30)));
        assert_eq!(date_value(&Cell::Text("2024-02-30".into())), Some(ymd(2024, 2, 29)));
        // Day 32 and month 13 are never clamped.
        assert_eq!(date_value(&Cell::Text("1/32/2024".into())), None);
        assert_eq!(date_value(&Cell::Text("13/13/2024".into())), None);
    }

    #[test]
    fn test_date_value_iso_needs_padded_fields() {
        assert_eq!(date_value(&Cell::Text("2024-1-5".into())), None);
        assert_eq!(date_value(&Cell::Text("2024-01-05".into())), Some(ymd(2024, 1, 5)));
    }

    #[test]
    fn test_date_value_unparsable_text_is_none() {
        assert_eq!(date_value(&Cell::Text("not a date".into())), None);
        assert_eq!(date_value(&Cell::Text("   ".into())), None);
        assert_eq!(date_value(&Cell::Empty), None);
    }
}
