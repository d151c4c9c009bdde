use crate::card_source::CardSource;
use crate::models::{BatchTotals, CardRecord, CardStatus};
use crate::normalize::parse_count;
use crate::workbook::normalize_key;

/// Caption substrings of the textual summary sheet. Good/bad are checked
/// before the bare total captions so "Total Good" lands in the good slot.
const GOOD_CAPTIONS: &[&str] = &["จำนวนบัตรดี", "บัตรดี", "good cards", "total good", "good"];
const BAD_CAPTIONS: &[&str] = &["จำนวนบัตรเสีย", "บัตรเสีย", "bad cards", "total bad", "bad"];
const TOTAL_CAPTIONS: &[&str] = &["รวมทั้งหมด", "ทั้งหมด", "รวม", "grand total", "total"];

fn matches_any(key: &str, captions: &[&str]) -> bool {
    captions.iter().any(|c| key.contains(&normalize_key(c)))
}

/// Scans the summary sheet's label cells and reads the nearest numeric cell
/// to the right of each. The layer only counts when it yields a nonzero
/// result; summary sheets are not guaranteed across report versions.
pub fn summary_sheet_totals(grid: &[Vec<String>]) -> Option<BatchTotals> {
    let mut good: Option<i64> = None;
    let mut bad: Option<i64> = None;
    let mut total: Option<i64> = None;

    for row in grid {
        for (idx, cell) in row.iter().enumerate() {
            let key = normalize_key(cell);
            if key.is_empty() {
                continue;
            }
            let slot = if matches_any(&key, GOOD_CAPTIONS) {
                &mut good
            } else if matches_any(&key, BAD_CAPTIONS) {
                &mut bad
            } else if matches_any(&key, TOTAL_CAPTIONS) {
                &mut total
            } else {
                continue;
            };
            if slot.is_some() {
                continue;
            }
            if let Some(value) = row[idx + 1..].iter().find_map(|c| parse_count(c)) {
                *slot = Some(value);
            }
        }
    }

    let good = good.unwrap_or(0);
    let bad = bad.unwrap_or(0);
    let total = match total {
        Some(t) if t > 0 => t,
        _ => good + bad,
    };
    if total == 0 {
        return None;
    }
    Some(BatchTotals {
        total_good: good,
        total_bad: bad,
        total_records: total,
    })
}

fn count_status(cards: &[CardRecord], status: CardStatus) -> i64 {
    cards.iter().filter(|c| c.status == Some(status)).count() as i64
}

/// Layered precedence: explicit summary sheet, else the detail status
/// column, else the aggregate pair plus delivery-channel good records.
pub fn resolve_batch_totals(
    summary_grid: &[Vec<String>],
    source: CardSource,
    cards: &[CardRecord],
    delivery_good: i64,
) -> BatchTotals {
    if let Some(totals) = summary_sheet_totals(summary_grid) {
        return totals;
    }

    let good = count_status(cards, CardStatus::Good);
    let bad = count_status(cards, CardStatus::Bad);
    match source {
        CardSource::Detail => BatchTotals {
            total_good: good,
            total_bad: bad,
            total_records: cards.len() as i64,
        },
        CardSource::AggregatePair => BatchTotals {
            total_good: good + delivery_good,
            total_bad: bad,
            total_records: good + delivery_good + bad,
        },
    }
}
