use chrono::{Duration, NaiveDate, NaiveTime, Timelike};
use regex::Regex;
use std::sync::OnceLock;

use crate::workbook::trim_cell;

/// Identifier width of the upstream card system. Exported ids lose their
/// leading zeros (and sometimes grow a fractional tail) when the sheet stores
/// them as numbers; formatting restores the canonical 13-digit form.
pub const CARD_DIGITS_WIDTH: usize = 13;

const BUDDHIST_ERA_OFFSET: i32 = 543;

/// Thai month names as they appear in monthly rollup filenames, full form
/// before the abbreviation so regex alternation prefers the longer match.
const THAI_MONTHS: &[(&str, u32)] = &[
    ("มกราคม", 1),
    ("กุมภาพันธ์", 2),
    ("มีนาคม", 3),
    ("เมษายน", 4),
    ("พฤษภาคม", 5),
    ("มิถุนายน", 6),
    ("กรกฎาคม", 7),
    ("สิงหาคม", 8),
    ("กันยายน", 9),
    ("ตุลาคม", 10),
    ("พฤศจิกายน", 11),
    ("ธันวาคม", 12),
    ("ม.ค.", 1),
    ("ก.พ.", 2),
    ("มี.ค.", 3),
    ("เม.ย.", 4),
    ("พ.ค.", 5),
    ("มิ.ย.", 6),
    ("ก.ค.", 7),
    ("ส.ค.", 8),
    ("ก.ย.", 9),
    ("ต.ค.", 10),
    ("พ.ย.", 11),
    ("ธ.ค.", 12),
];

fn filename_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\d{1,2})[-_.](\d{1,2})[-_.](\d{4})").expect("invalid filename date regex")
    })
}

fn filename_compact_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // Contiguous ddmmyyyy runs are only trusted with a Buddhist century,
        // otherwise any 8-digit id in the filename would parse as a date.
        Regex::new(r"(?:^|\D)(\d{2})(\d{2})(25\d{2})(?:\D|$)")
            .expect("invalid compact filename date regex")
    })
}

fn thai_month_year_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let names = THAI_MONTHS
            .iter()
            .map(|(name, _)| regex::escape(name))
            .collect::<Vec<_>>()
            .join("|");
        Regex::new(&format!(r"({names})\s*[._-]?\s*(\d{{4}})"))
            .expect("invalid thai month regex")
    })
}

pub(crate) fn non_empty(text: String) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

pub(crate) fn iso_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Restores a fixed-width digit identifier that went through generic numeric
/// coercion: strips any fractional part (including exponent-format floats),
/// then left-pads with '0' up to 13 characters. Blank input yields None and
/// an already-canonical string comes back unchanged.
pub fn format_card_digits(raw: &str) -> Option<String> {
    let mut text = trim_cell(raw);
    if text.is_empty() {
        return None;
    }
    if text.contains(['e', 'E']) {
        let value = text.parse::<f64>().ok()?;
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        text = format!("{value:.0}");
    }
    let head = text.split('.').next().unwrap_or("");
    let digits = head
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect::<String>();
    if digits.is_empty() {
        return None;
    }
    if digits.len() >= CARD_DIGITS_WIDTH {
        return Some(digits);
    }
    Some(format!("{digits:0>width$}", width = CARD_DIGITS_WIDTH))
}

/// Buddhist-calendar years come through as 25xx; anything at or below 2500 is
/// already Gregorian.
pub fn buddhist_year_to_gregorian(year: i32) -> i32 {
    if year > 2500 {
        year - BUDDHIST_ERA_OFFSET
    } else {
        year
    }
}

fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial <= 0.0 || serial > 200_000.0 {
        return None;
    }
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    base.checked_add_signed(Duration::days(serial.floor() as i64))
}

fn parse_date_candidate(raw: &str) -> Option<NaiveDate> {
    let text = trim_cell(raw);
    if text.is_empty() {
        return None;
    }

    let first_token = text
        .split([' ', 'T'])
        .find(|t| !t.is_empty())
        .map(trim_cell)
        .unwrap_or_default();
    let normalized = first_token.replace(['/', '.'], "-");
    let parts = normalized.split('-').collect::<Vec<_>>();
    if parts.len() == 3 {
        let date = if parts[0].len() == 4 {
            let year = parts[0].parse::<i32>().ok()?;
            let month = parts[1].parse::<u32>().ok()?;
            let day = parts[2].parse::<u32>().ok()?;
            NaiveDate::from_ymd_opt(year, month, day)
        } else {
            let day = parts[0].parse::<u32>().ok()?;
            let month = parts[1].parse::<u32>().ok()?;
            let year = parts[2].parse::<i32>().ok()?;
            NaiveDate::from_ymd_opt(year, month, day)
        };
        return date;
    }

    let number = text.parse::<f64>().ok()?;
    excel_serial_to_date(number)
}

/// Certain upstream rows write dates with day and month transposed. When the
/// parsed month disagrees with the report month but the day slot holds the
/// report month number and the swap is a valid calendar date, swap exactly
/// once.
fn correct_transposed_period(date: NaiveDate, expected_month: u32) -> NaiveDate {
    use chrono::Datelike;
    if date.month() == expected_month || date.day() != expected_month {
        return date;
    }
    NaiveDate::from_ymd_opt(date.year(), date.day(), date.month()).unwrap_or(date)
}

/// Parses a raw date cell (string formats or Excel serial number) and applies
/// the day/month transposition correction against the batch's report month.
/// Anything unparseable becomes None, never an error.
pub fn parse_report_date(raw: &str, expected_month: u32) -> Option<NaiveDate> {
    let date = parse_date_candidate(raw)?;
    Some(correct_transposed_period(date, expected_month))
}

/// Resolves the report period from the filename: a digit day-month-year
/// pattern (Buddhist year), or a Thai month name plus Buddhist year (first of
/// month). None when neither pattern matches; the coordinator falls back to
/// the current date.
pub fn report_period_from_filename(filename: &str) -> Option<NaiveDate> {
    if let Some(caps) = filename_date_re().captures(filename) {
        let day = caps[1].parse::<u32>().ok()?;
        let month = caps[2].parse::<u32>().ok()?;
        let year = buddhist_year_to_gregorian(caps[3].parse::<i32>().ok()?);
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
            return Some(date);
        }
    }
    if let Some(caps) = filename_compact_date_re().captures(filename) {
        let day = caps[1].parse::<u32>().ok()?;
        let month = caps[2].parse::<u32>().ok()?;
        let year = buddhist_year_to_gregorian(caps[3].parse::<i32>().ok()?);
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
            return Some(date);
        }
    }
    if let Some(caps) = thai_month_year_re().captures(filename) {
        let name = caps.get(1)?.as_str();
        let month = THAI_MONTHS
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, m)| *m)?;
        let year = buddhist_year_to_gregorian(caps[2].parse::<i32>().ok()?);
        return NaiveDate::from_ymd_opt(year, month, 1);
    }
    None
}

/// Plain non-negative integer cell (counts), tolerating thousands separators
/// and a spurious fractional tail.
pub fn parse_count(raw: &str) -> Option<i64> {
    let text = trim_cell(raw).replace(',', "");
    if text.is_empty() {
        return None;
    }
    let head = text.split('.').next().unwrap_or("");
    if head.is_empty() || !head.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    head.parse::<i64>().ok()
}

pub fn parse_minutes(raw: &str) -> Option<f64> {
    let text = trim_cell(raw).replace(',', "");
    if text.is_empty() {
        return None;
    }
    text.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_clock_time(raw: &str) -> Option<NaiveTime> {
    let text = trim_cell(raw);
    if text.is_empty() {
        return None;
    }
    let token = text.split([' ', 'T']).filter(|t| !t.is_empty()).last()?;
    if let Ok(time) = NaiveTime::parse_from_str(token, "%H:%M:%S") {
        return Some(time);
    }
    if let Ok(time) = NaiveTime::parse_from_str(token, "%H:%M") {
        return Some(time);
    }
    // Excel stores times as day fractions, possibly riding on a date serial.
    let number = text.parse::<f64>().ok()?;
    if !number.is_finite() || number < 0.0 {
        return None;
    }
    let seconds = (number.fract() * 86_400.0).round() as u32;
    NaiveTime::from_num_seconds_from_midnight_opt(seconds.min(86_399), 0)
}

/// Minutes from a start to a stop clock time; a stop before the start is
/// taken as crossing midnight.
pub fn minutes_between(start_raw: &str, stop_raw: &str) -> Option<f64> {
    let start = parse_clock_time(start_raw)?;
    let stop = parse_clock_time(stop_raw)?;
    let mut delta = stop.num_seconds_from_midnight() as i64 - start.num_seconds_from_midnight() as i64;
    if delta < 0 {
        delta += 86_400;
    }
    Some(delta as f64 / 60.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_is_idempotent_on_canonical_ids() {
        let id = "0000000000123";
        assert_eq!(format_card_digits(id).as_deref(), Some(id));
    }

    #[test]
    fn format_zero_pads_truncated_ids() {
        assert_eq!(format_card_digits("123").as_deref(), Some("0000000000123"));
    }

    #[test]
    fn format_strips_spurious_fraction() {
        assert_eq!(
            format_card_digits("1234567890123.0").as_deref(),
            Some("1234567890123")
        );
        assert_eq!(format_card_digits("123.0").as_deref(), Some("0000000000123"));
    }

    #[test]
    fn format_handles_exponent_coercion() {
        assert_eq!(
            format_card_digits("1.234567890123E12").as_deref(),
            Some("1234567890123")
        );
    }

    #[test]
    fn format_blank_yields_none() {
        assert_eq!(format_card_digits(""), None);
        assert_eq!(format_card_digits("   "), None);
        assert_eq!(format_card_digits("n/a"), None);
    }

    #[test]
    fn date_with_matching_month_is_unchanged() {
        assert_eq!(
            parse_report_date("2025-11-15", 11),
            NaiveDate::from_ymd_opt(2025, 11, 15)
        );
        assert_eq!(
            parse_report_date("15/11/2025", 11),
            NaiveDate::from_ymd_opt(2025, 11, 15)
        );
    }

    #[test]
    fn transposed_day_month_is_swapped_once() {
        // day=11, month=3 with report month 11 is the known upstream defect
        assert_eq!(
            parse_report_date("2025-03-11", 11),
            NaiveDate::from_ymd_opt(2025, 11, 3)
        );
    }

    #[test]
    fn swap_requires_day_equal_to_expected_month() {
        // month differs but day slot does not hold the report month: keep it
        assert_eq!(
            parse_report_date("2025-03-12", 11),
            NaiveDate::from_ymd_opt(2025, 3, 12)
        );
    }

    #[test]
    fn swap_applies_in_either_direction() {
        assert_eq!(
            parse_report_date("2025-01-03", 3),
            NaiveDate::from_ymd_opt(2025, 3, 1)
        );
    }

    #[test]
    fn excel_serial_dates_parse() {
        // 2025-11-15 is serial 45976 from the 1899-12-30 base
        assert_eq!(
            parse_report_date("45976", 11),
            NaiveDate::from_ymd_opt(2025, 11, 15)
        );
        assert_eq!(
            parse_report_date("45976.5", 11),
            NaiveDate::from_ymd_opt(2025, 11, 15)
        );
    }

    #[test]
    fn unparseable_date_is_none() {
        assert_eq!(parse_report_date("pending", 11), None);
        assert_eq!(parse_report_date("", 11), None);
    }

    #[test]
    fn buddhist_years_convert() {
        assert_eq!(buddhist_year_to_gregorian(2568), 2025);
        assert_eq!(buddhist_year_to_gregorian(2025), 2025);
    }

    #[test]
    fn filename_digit_pattern_resolves_period() {
        assert_eq!(
            report_period_from_filename("card_report_15-11-2568.xlsx"),
            NaiveDate::from_ymd_opt(2025, 11, 15)
        );
        assert_eq!(
            report_period_from_filename("card_report_15112568.xlsx"),
            NaiveDate::from_ymd_opt(2025, 11, 15)
        );
    }

    #[test]
    fn filename_thai_month_pattern_resolves_period() {
        assert_eq!(
            report_period_from_filename("สรุปผลการพิมพ์บัตร พฤศจิกายน 2568.xlsx"),
            NaiveDate::from_ymd_opt(2025, 11, 1)
        );
        assert_eq!(
            report_period_from_filename("รายงาน ม.ค. 2569.xlsx"),
            NaiveDate::from_ymd_opt(2026, 1, 1)
        );
    }

    #[test]
    fn filename_without_period_pattern_is_none() {
        assert_eq!(report_period_from_filename("card_report_final.xlsx"), None);
    }

    #[test]
    fn counts_tolerate_separators_and_fractions() {
        assert_eq!(parse_count("1,234"), Some(1234));
        assert_eq!(parse_count("400.0"), Some(400));
        assert_eq!(parse_count("-"), None);
        assert_eq!(parse_count(""), None);
    }

    #[test]
    fn minutes_between_clock_times() {
        assert_eq!(minutes_between("10:00:00", "10:09:30"), Some(9.5));
        assert_eq!(minutes_between("10:30", "10:45"), Some(15.0));
        // crossing midnight
        assert_eq!(minutes_between("23:50:00", "00:10:00"), Some(20.0));
        assert_eq!(minutes_between("", "10:00"), None);
    }
}
