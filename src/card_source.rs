use std::collections::HashMap;
use tracing::warn;

use crate::columns::CategoryRows;
use crate::models::{CardRecord, CardStatus};
use crate::normalize::{
    format_card_digits, iso_date, minutes_between, non_empty, parse_minutes, parse_report_date,
};
use crate::workbook::normalize_key;

/// A detail sheet holding at least 80% as many rows as the good/bad pair is
/// the signature of a daily export (complete per-card listing); below that it
/// only carries the anomaly subset of a monthly rollup.
pub const DETAIL_RATIO_THRESHOLD: f64 = 0.8;

pub const SLA_OVER_MINUTES: f64 = 12.0;
pub const WAIT_OVER_MINUTES: f64 = 60.0;

/// Which structure the card records of one import were built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardSource {
    Detail,
    AggregatePair,
}

impl CardSource {
    pub fn description(&self) -> &'static str {
        match self {
            CardSource::Detail => "detail sheet (complete per-card daily export)",
            CardSource::AggregatePair => {
                "good/bad aggregate pair enriched from detail (monthly rollup)"
            }
        }
    }
}

/// Relative-completeness heuristic; the filename alone cannot distinguish the
/// two export cadences.
pub fn select_card_source(n_detail: usize, n_aggregate: usize) -> CardSource {
    if n_aggregate == 0 {
        return CardSource::Detail;
    }
    let ratio = n_detail as f64 / n_aggregate as f64;
    if ratio >= DETAIL_RATIO_THRESHOLD {
        CardSource::Detail
    } else {
        CardSource::AggregatePair
    }
}

/// Fields that exist only on the detail sheet, joined onto aggregate-sourced
/// records by serial number.
#[derive(Debug, Clone, Default)]
struct DetailSupplement {
    appointment_id: Option<String>,
    appointment_date: Option<String>,
    appointment_center: Option<String>,
    queue_no: Option<String>,
    queue_called_at: Option<String>,
    wait_minutes: Option<f64>,
    sla_start: Option<String>,
    sla_stop: Option<String>,
    sla_minutes: Option<f64>,
}

#[derive(Debug)]
pub struct AggregateBuild {
    pub records: Vec<CardRecord>,
    pub enriched: usize,
    pub duplicate_detail_serials: usize,
}

fn derive_flags(record: &mut CardRecord) {
    record.sla_over_12min = record
        .sla_minutes
        .map(|m| m > SLA_OVER_MINUTES)
        .unwrap_or(false) as i64;
    record.wait_over_1hour = record
        .wait_minutes
        .map(|m| m > WAIT_OVER_MINUTES)
        .unwrap_or(false) as i64;
    record.wrong_date = match (&record.appointment_date, &record.print_date) {
        (Some(appointment), Some(print)) => (appointment != print) as i64,
        _ => 0,
    };
    record.wrong_center = match (&record.appointment_center, &record.center) {
        (Some(appointment), Some(actual)) => {
            (normalize_key(appointment) != normalize_key(actual)) as i64
        }
        _ => 0,
    };
}

fn sla_minutes_for_row(rows: &CategoryRows, row: &[String]) -> Option<f64> {
    parse_minutes(&rows.field(row, "sla_minutes")).or_else(|| {
        minutes_between(&rows.field(row, "sla_start"), &rows.field(row, "sla_stop"))
    })
}

fn card_from_detail_row(rows: &CategoryRows, row: &[String], expected_month: u32) -> CardRecord {
    let mut record = CardRecord {
        appointment_id: format_card_digits(&rows.field(row, "appointment_id")),
        card_id: format_card_digits(&rows.field(row, "card_id")),
        serial_number: format_card_digits(&rows.field(row, "serial_number")),
        work_permit_no: format_card_digits(&rows.field(row, "work_permit_no")),
        status: CardStatus::parse(&rows.field(row, "status")),
        operator: non_empty(rows.field(row, "operator")),
        center: non_empty(rows.field(row, "center")),
        print_date: parse_report_date(&rows.field(row, "print_date"), expected_month)
            .map(iso_date),
        appointment_date: parse_report_date(&rows.field(row, "appointment_date"), expected_month)
            .map(iso_date),
        appointment_center: non_empty(rows.field(row, "appointment_center")),
        queue_no: non_empty(rows.field(row, "queue_no")),
        queue_called_at: non_empty(rows.field(row, "queue_called_at")),
        wait_minutes: parse_minutes(&rows.field(row, "wait_minutes")),
        sla_start: non_empty(rows.field(row, "sla_start")),
        sla_stop: non_empty(rows.field(row, "sla_stop")),
        sla_minutes: sla_minutes_for_row(rows, row),
        ..CardRecord::default()
    };
    derive_flags(&mut record);
    record
}

/// Daily export path: one card record per detail row, all fields present on
/// the sheet itself.
pub fn build_detail_card_records(detail: &CategoryRows, expected_month: u32) -> Vec<CardRecord> {
    detail
        .rows
        .iter()
        .map(|row| card_from_detail_row(detail, row, expected_month))
        .collect()
}

fn build_supplement_lookup(
    detail: &CategoryRows,
    expected_month: u32,
) -> (HashMap<String, DetailSupplement>, usize) {
    let mut lookup: HashMap<String, DetailSupplement> = HashMap::new();
    let mut duplicates = 0usize;
    for row in &detail.rows {
        let Some(serial) = format_card_digits(&detail.field(row, "serial_number")) else {
            continue;
        };
        let supplement = DetailSupplement {
            appointment_id: format_card_digits(&detail.field(row, "appointment_id")),
            appointment_date: parse_report_date(
                &detail.field(row, "appointment_date"),
                expected_month,
            )
            .map(iso_date),
            appointment_center: non_empty(detail.field(row, "appointment_center")),
            queue_no: non_empty(detail.field(row, "queue_no")),
            queue_called_at: non_empty(detail.field(row, "queue_called_at")),
            wait_minutes: parse_minutes(&detail.field(row, "wait_minutes")),
            sla_start: non_empty(detail.field(row, "sla_start")),
            sla_stop: non_empty(detail.field(row, "sla_stop")),
            sla_minutes: sla_minutes_for_row(detail, row),
        };
        if lookup.insert(serial, supplement).is_some() {
            duplicates += 1;
        }
    }
    (lookup, duplicates)
}

fn card_from_aggregate_row(
    rows: &CategoryRows,
    row: &[String],
    status: CardStatus,
    expected_month: u32,
) -> CardRecord {
    CardRecord {
        card_id: format_card_digits(&rows.field(row, "card_id")),
        serial_number: format_card_digits(&rows.field(row, "serial_number")),
        work_permit_no: format_card_digits(&rows.field(row, "work_permit_no")),
        status: Some(status),
        operator: non_empty(rows.field(row, "operator")),
        center: non_empty(rows.field(row, "center")),
        print_date: parse_report_date(&rows.field(row, "print_date"), expected_month)
            .map(iso_date),
        ..CardRecord::default()
    }
}

fn apply_supplement(record: &mut CardRecord, supplement: &DetailSupplement) {
    record.appointment_id = supplement.appointment_id.clone();
    record.appointment_date = supplement.appointment_date.clone();
    record.appointment_center = supplement.appointment_center.clone();
    record.queue_no = supplement.queue_no.clone();
    record.queue_called_at = supplement.queue_called_at.clone();
    record.wait_minutes = supplement.wait_minutes;
    record.sla_start = supplement.sla_start.clone();
    record.sla_stop = supplement.sla_stop.clone();
    record.sla_minutes = supplement.sla_minutes;
}

/// Monthly rollup path: one card record per good/bad list row, enriched with
/// detail-only fields where a matching serial number exists. Rows without a
/// detail match keep null supplements; duplicate detail serials resolve
/// last-write-wins.
pub fn build_aggregate_card_records(
    good: Option<&CategoryRows>,
    bad: Option<&CategoryRows>,
    detail: Option<&CategoryRows>,
    expected_month: u32,
) -> AggregateBuild {
    let (lookup, duplicate_detail_serials) = detail
        .map(|rows| build_supplement_lookup(rows, expected_month))
        .unwrap_or_default();
    if duplicate_detail_serials > 0 {
        warn!(
            duplicates = duplicate_detail_serials,
            "duplicate serial numbers on detail sheet; keeping the last occurrence"
        );
    }

    let mut records = Vec::new();
    let mut enriched = 0usize;
    let sources = [(good, CardStatus::Good), (bad, CardStatus::Bad)];
    for (rows, status) in sources {
        let Some(rows) = rows else { continue };
        for row in &rows.rows {
            let mut record = card_from_aggregate_row(rows, row, status, expected_month);
            if let Some(supplement) = record
                .serial_number
                .as_ref()
                .and_then(|serial| lookup.get(serial))
            {
                apply_supplement(&mut record, supplement);
                enriched += 1;
            }
            derive_flags(&mut record);
            records.push(record);
        }
    }

    AggregateBuild {
        records,
        enriched,
        duplicate_detail_serials,
    }
}
