use chrono::{Datelike, SecondsFormat, Utc};
use rusqlite::params;
use serde::Serialize;
use serde_json::{json, Value};
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::card_source::{
    build_aggregate_card_records, build_detail_card_records, select_card_source, CardSource,
};
use crate::columns::{
    extract_category, CategoryOutcome, CategoryRows, ANOMALY_SLA_SPEC, BAD_LIST_SPEC,
    BY_CENTER_SPEC, COMPLETE_DIFF_SPEC, DELIVERY_SPEC, DETAIL_SPEC, GOOD_LIST_SPEC,
    WRONG_CENTER_SPEC,
};
use crate::models::{
    AnomalySlaRecord, BadCardRecord, BatchTotals, CardRecord, CardStatus, CenterStatRecord,
    CompleteDiffRecord, DeliveryCardRecord, WrongCenterRecord,
};
use crate::normalize::{
    format_card_digits, iso_date, non_empty, parse_count, parse_minutes, parse_report_date,
    report_period_from_filename,
};
use crate::report_db::{ensure_schema_ready, open_report_connection};
use crate::summary::resolve_batch_totals;
use crate::workbook::{read_report_workbook, ReportWorkbook, SheetCategory};

/// Terminal import failures. Everything else degrades to a zero-record
/// category and a note in the report.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("unreadable report workbook: {0}")]
    Unreadable(String),
    #[error("storage failure: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CategoryCounts {
    pub card_records: i64,
    pub bad_cards: i64,
    pub center_stats: i64,
    pub anomaly_sla: i64,
    pub wrong_center: i64,
    pub complete_diff: i64,
    pub delivery_cards: i64,
}

/// Returned to the caller for confirmation; not itself persisted.
#[derive(Debug, Serialize)]
pub struct ImportReport {
    pub filename: String,
    pub report_period: String,
    pub source_used: String,
    pub batch_id: String,
    pub import_job_id: String,
    pub replaced_existing: bool,
    pub counts: CategoryCounts,
    pub total_good: i64,
    pub total_bad: i64,
    pub total_records: i64,
    pub notes: Vec<String>,
}

#[derive(Debug)]
struct ParsedReport {
    report_period: String,
    source: CardSource,
    cards: Vec<CardRecord>,
    bad_cards: Vec<BadCardRecord>,
    center_stats: Vec<CenterStatRecord>,
    anomaly_sla: Vec<AnomalySlaRecord>,
    wrong_center: Vec<WrongCenterRecord>,
    complete_diff: Vec<CompleteDiffRecord>,
    deliveries: Vec<DeliveryCardRecord>,
    totals: BatchTotals,
    notes: Vec<String>,
}

impl ParsedReport {
    fn counts(&self) -> CategoryCounts {
        CategoryCounts {
            card_records: self.cards.len() as i64,
            bad_cards: self.bad_cards.len() as i64,
            center_stats: self.center_stats.len() as i64,
            anomaly_sla: self.anomaly_sla.len() as i64,
            wrong_center: self.wrong_center.len() as i64,
            complete_diff: self.complete_diff.len() as i64,
            delivery_cards: self.deliveries.len() as i64,
        }
    }

    fn inserted_rows(&self) -> i64 {
        let counts = self.counts();
        counts.card_records
            + counts.bad_cards
            + counts.center_stats
            + counts.anomaly_sla
            + counts.wrong_center
            + counts.complete_diff
            + counts.delivery_cards
    }
}

fn note_category(notes: &mut Vec<String>, label: &str, outcome: &CategoryOutcome) {
    if let CategoryOutcome::Malformed(reason) = outcome {
        warn!(category = label, reason = reason.as_str(), "category skipped");
        notes.push(format!("{label} sheet skipped: {reason}"));
    }
}

fn build_bad_card_records(rows: &CategoryRows, expected_month: u32) -> Vec<BadCardRecord> {
    rows.rows
        .iter()
        .map(|row| BadCardRecord {
            serial_number: format_card_digits(&rows.field(row, "serial_number")),
            card_id: format_card_digits(&rows.field(row, "card_id")),
            work_permit_no: format_card_digits(&rows.field(row, "work_permit_no")),
            reason: non_empty(rows.field(row, "reason")),
            operator: non_empty(rows.field(row, "operator")),
            center: non_empty(rows.field(row, "center")),
            print_date: parse_report_date(&rows.field(row, "print_date"), expected_month)
                .map(iso_date),
        })
        .collect()
}

fn build_center_stat_records(rows: &CategoryRows) -> Vec<CenterStatRecord> {
    rows.rows
        .iter()
        .filter_map(|row| {
            let center = non_empty(rows.field(row, "center"))?;
            let good_count = parse_count(&rows.field(row, "good_count")).unwrap_or(0);
            let bad_count = parse_count(&rows.field(row, "bad_count")).unwrap_or(0);
            let total_count =
                parse_count(&rows.field(row, "total_count")).unwrap_or(good_count + bad_count);
            Some(CenterStatRecord {
                center,
                good_count,
                bad_count,
                total_count,
            })
        })
        .collect()
}

fn build_anomaly_sla_records(rows: &CategoryRows, expected_month: u32) -> Vec<AnomalySlaRecord> {
    rows.rows
        .iter()
        .map(|row| AnomalySlaRecord {
            serial_number: format_card_digits(&rows.field(row, "serial_number")),
            work_permit_no: format_card_digits(&rows.field(row, "work_permit_no")),
            operator: non_empty(rows.field(row, "operator")),
            center: non_empty(rows.field(row, "center")),
            print_date: parse_report_date(&rows.field(row, "print_date"), expected_month)
                .map(iso_date),
            sla_minutes: parse_minutes(&rows.field(row, "sla_minutes")),
        })
        .collect()
}

fn build_wrong_center_records(rows: &CategoryRows, expected_month: u32) -> Vec<WrongCenterRecord> {
    rows.rows
        .iter()
        .map(|row| WrongCenterRecord {
            work_permit_no: format_card_digits(&rows.field(row, "work_permit_no")),
            appointment_center: non_empty(rows.field(row, "appointment_center")),
            actual_center: non_empty(rows.field(row, "actual_center")),
            print_date: parse_report_date(&rows.field(row, "print_date"), expected_month)
                .map(iso_date),
        })
        .collect()
}

fn build_complete_diff_records(
    rows: &CategoryRows,
    expected_month: u32,
) -> Vec<CompleteDiffRecord> {
    rows.rows
        .iter()
        .map(|row| CompleteDiffRecord {
            appointment_id: format_card_digits(&rows.field(row, "appointment_id")),
            serial_number: format_card_digits(&rows.field(row, "serial_number")),
            card_count: parse_count(&rows.field(row, "card_count")).unwrap_or(0),
            print_date: parse_report_date(&rows.field(row, "print_date"), expected_month)
                .map(iso_date),
        })
        .collect()
}

fn build_delivery_card_records(
    rows: &CategoryRows,
    expected_month: u32,
) -> Vec<DeliveryCardRecord> {
    rows.rows
        .iter()
        .map(|row| DeliveryCardRecord {
            serial_number: format_card_digits(&rows.field(row, "serial_number")),
            work_permit_no: format_card_digits(&rows.field(row, "work_permit_no")),
            status: CardStatus::parse(&rows.field(row, "status")),
            channel: non_empty(rows.field(row, "channel")),
            delivered_date: parse_report_date(&rows.field(row, "delivered_date"), expected_month)
                .map(iso_date),
        })
        .collect()
}

fn parse_report_workbook(workbook: &ReportWorkbook) -> ParsedReport {
    let report_period = report_period_from_filename(&workbook.filename)
        .unwrap_or_else(|| Utc::now().date_naive());
    let expected_month = report_period.month();

    let detail = extract_category(workbook.sheet(SheetCategory::Detail), &DETAIL_SPEC);
    let good = extract_category(workbook.sheet(SheetCategory::GoodList), &GOOD_LIST_SPEC);
    let bad = extract_category(workbook.sheet(SheetCategory::BadList), &BAD_LIST_SPEC);
    let by_center = extract_category(workbook.sheet(SheetCategory::ByCenter), &BY_CENTER_SPEC);
    let anomaly = extract_category(
        workbook.sheet(SheetCategory::SlaOverThreshold),
        &ANOMALY_SLA_SPEC,
    );
    let wrong = extract_category(
        workbook.sheet(SheetCategory::WrongCenter),
        &WRONG_CENTER_SPEC,
    );
    let diff = extract_category(
        workbook.sheet(SheetCategory::CompleteDiff),
        &COMPLETE_DIFF_SPEC,
    );
    let delivery = extract_category(workbook.sheet(SheetCategory::Delivery), &DELIVERY_SPEC);

    let mut notes = Vec::new();
    note_category(&mut notes, "detail", &detail);
    note_category(&mut notes, "good-list", &good);
    note_category(&mut notes, "bad-list", &bad);
    note_category(&mut notes, "by-center", &by_center);
    note_category(&mut notes, "sla-over-threshold", &anomaly);
    note_category(&mut notes, "wrong-center", &wrong);
    note_category(&mut notes, "complete-diff", &diff);
    note_category(&mut notes, "delivery", &delivery);

    let n_detail = detail.row_count();
    let n_aggregate = good.row_count() + bad.row_count();
    let source = select_card_source(n_detail, n_aggregate);

    let cards = match source {
        CardSource::Detail => detail
            .as_rows()
            .map(|rows| build_detail_card_records(rows, expected_month))
            .unwrap_or_default(),
        CardSource::AggregatePair => {
            let build = build_aggregate_card_records(
                good.as_rows(),
                bad.as_rows(),
                detail.as_rows(),
                expected_month,
            );
            if build.duplicate_detail_serials > 0 {
                notes.push(format!(
                    "{} duplicate detail serial numbers resolved last-write-wins during enrichment",
                    build.duplicate_detail_serials
                ));
            }
            build.records
        }
    };

    let bad_cards = bad
        .as_rows()
        .map(|rows| build_bad_card_records(rows, expected_month))
        .unwrap_or_default();
    let center_stats = by_center
        .as_rows()
        .map(build_center_stat_records)
        .unwrap_or_default();
    let anomaly_sla = anomaly
        .as_rows()
        .map(|rows| build_anomaly_sla_records(rows, expected_month))
        .unwrap_or_default();
    let wrong_center = wrong
        .as_rows()
        .map(|rows| build_wrong_center_records(rows, expected_month))
        .unwrap_or_default();
    let complete_diff = diff
        .as_rows()
        .map(|rows| build_complete_diff_records(rows, expected_month))
        .unwrap_or_default();
    let deliveries = delivery
        .as_rows()
        .map(|rows| build_delivery_card_records(rows, expected_month))
        .unwrap_or_default();

    let delivery_good = deliveries
        .iter()
        .filter(|d| d.status == Some(CardStatus::Good))
        .count() as i64;
    let totals = resolve_batch_totals(
        workbook.sheet(SheetCategory::Summary),
        source,
        &cards,
        delivery_good,
    );

    ParsedReport {
        report_period: iso_date(report_period),
        source,
        cards,
        bad_cards,
        center_stats,
        anomaly_sla,
        wrong_center,
        complete_diff,
        deliveries,
        totals,
        notes,
    }
}

fn record_id(batch_id: &str, table: &str, idx: usize) -> String {
    Uuid::new_v5(
        &Uuid::NAMESPACE_URL,
        format!("cardops:{batch_id}:{table}:{idx}").as_bytes(),
    )
    .to_string()
}

fn persist_parsed_report(
    db_path: &Path,
    filename: &str,
    parsed: &ParsedReport,
) -> Result<ImportReport, String> {
    let mut conn = open_report_connection(db_path)?;
    ensure_schema_ready(&conn)?;

    let batch_id = Uuid::new_v4().to_string();
    let job_id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);

    let tx = conn
        .transaction()
        .map_err(|e| format!("failed to begin import transaction: {e}"))?;

    let replaced = tx
        .execute("DELETE FROM report_batches WHERE filename = ?1", [filename])
        .map_err(|e| format!("failed to replace existing batch: {e}"))?;

    tx.execute(
        r#"
        INSERT INTO report_batches(
            id, filename, report_period, total_good, total_bad, total_records,
            source_used, uploaded_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
        params![
            batch_id,
            filename,
            parsed.report_period,
            parsed.totals.total_good,
            parsed.totals.total_bad,
            parsed.totals.total_records,
            parsed.source.description(),
            now,
        ],
    )
    .map_err(|e| format!("failed to insert report batch: {e}"))?;

    {
        let mut stmt = tx
            .prepare(
                r#"
                INSERT INTO card_records(
                    id, batch_id, appointment_id, card_id, serial_number, work_permit_no,
                    status, operator, center, print_date, appointment_date,
                    appointment_center, queue_no, queue_called_at, wait_minutes,
                    wait_over_1hour, sla_start, sla_stop, sla_minutes, sla_over_12min,
                    wrong_date, wrong_center
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                        ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22)
                "#,
            )
            .map_err(|e| format!("failed to prepare card insert: {e}"))?;
        for (idx, card) in parsed.cards.iter().enumerate() {
            stmt.execute(params![
                record_id(&batch_id, "card_records", idx),
                batch_id,
                card.appointment_id,
                card.card_id,
                card.serial_number,
                card.work_permit_no,
                card.status.map(|s| s.as_str()),
                card.operator,
                card.center,
                card.print_date,
                card.appointment_date,
                card.appointment_center,
                card.queue_no,
                card.queue_called_at,
                card.wait_minutes,
                card.wait_over_1hour,
                card.sla_start,
                card.sla_stop,
                card.sla_minutes,
                card.sla_over_12min,
                card.wrong_date,
                card.wrong_center,
            ])
            .map_err(|e| format!("failed to insert card record: {e}"))?;
        }
    }

    {
        let mut stmt = tx
            .prepare(
                r#"
                INSERT INTO bad_card_records(
                    id, batch_id, serial_number, card_id, work_permit_no, reason,
                    operator, center, print_date
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )
            .map_err(|e| format!("failed to prepare bad-card insert: {e}"))?;
        for (idx, record) in parsed.bad_cards.iter().enumerate() {
            stmt.execute(params![
                record_id(&batch_id, "bad_card_records", idx),
                batch_id,
                record.serial_number,
                record.card_id,
                record.work_permit_no,
                record.reason,
                record.operator,
                record.center,
                record.print_date,
            ])
            .map_err(|e| format!("failed to insert bad-card record: {e}"))?;
        }
    }

    {
        let mut stmt = tx
            .prepare(
                r#"
                INSERT INTO center_stat_records(
                    id, batch_id, center, good_count, bad_count, total_count
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .map_err(|e| format!("failed to prepare center-stat insert: {e}"))?;
        for (idx, record) in parsed.center_stats.iter().enumerate() {
            stmt.execute(params![
                record_id(&batch_id, "center_stat_records", idx),
                batch_id,
                record.center,
                record.good_count,
                record.bad_count,
                record.total_count,
            ])
            .map_err(|e| format!("failed to insert center-stat record: {e}"))?;
        }
    }

    {
        let mut stmt = tx
            .prepare(
                r#"
                INSERT INTO anomaly_sla_records(
                    id, batch_id, serial_number, work_permit_no, operator, center,
                    print_date, sla_minutes
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )
            .map_err(|e| format!("failed to prepare anomaly insert: {e}"))?;
        for (idx, record) in parsed.anomaly_sla.iter().enumerate() {
            stmt.execute(params![
                record_id(&batch_id, "anomaly_sla_records", idx),
                batch_id,
                record.serial_number,
                record.work_permit_no,
                record.operator,
                record.center,
                record.print_date,
                record.sla_minutes,
            ])
            .map_err(|e| format!("failed to insert anomaly record: {e}"))?;
        }
    }

    {
        let mut stmt = tx
            .prepare(
                r#"
                INSERT INTO wrong_center_records(
                    id, batch_id, work_permit_no, appointment_center, actual_center,
                    print_date
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .map_err(|e| format!("failed to prepare wrong-center insert: {e}"))?;
        for (idx, record) in parsed.wrong_center.iter().enumerate() {
            stmt.execute(params![
                record_id(&batch_id, "wrong_center_records", idx),
                batch_id,
                record.work_permit_no,
                record.appointment_center,
                record.actual_center,
                record.print_date,
            ])
            .map_err(|e| format!("failed to insert wrong-center record: {e}"))?;
        }
    }

    {
        let mut stmt = tx
            .prepare(
                r#"
                INSERT INTO complete_diff_records(
                    id, batch_id, appointment_id, serial_number, card_count, print_date
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .map_err(|e| format!("failed to prepare complete-diff insert: {e}"))?;
        for (idx, record) in parsed.complete_diff.iter().enumerate() {
            stmt.execute(params![
                record_id(&batch_id, "complete_diff_records", idx),
                batch_id,
                record.appointment_id,
                record.serial_number,
                record.card_count,
                record.print_date,
            ])
            .map_err(|e| format!("failed to insert complete-diff record: {e}"))?;
        }
    }

    {
        let mut stmt = tx
            .prepare(
                r#"
                INSERT INTO delivery_card_records(
                    id, batch_id, serial_number, work_permit_no, status, channel,
                    delivered_date
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .map_err(|e| format!("failed to prepare delivery insert: {e}"))?;
        for (idx, record) in parsed.deliveries.iter().enumerate() {
            stmt.execute(params![
                record_id(&batch_id, "delivery_card_records", idx),
                batch_id,
                record.serial_number,
                record.work_permit_no,
                record.status.map(|s| s.as_str()),
                record.channel,
                record.delivered_date,
            ])
            .map_err(|e| format!("failed to insert delivery record: {e}"))?;
        }
    }

    let inserted = parsed.inserted_rows();
    let metadata_json = serde_json::to_string(&json!({
        "filename": filename,
        "source_used": parsed.source.description(),
        "report_period": parsed.report_period,
        "notes": parsed.notes,
    }))
    .map_err(|e| format!("failed to serialize import metadata: {e}"))?;
    let error_message = if parsed.notes.is_empty() {
        None
    } else {
        Some(parsed.notes.join("\n"))
    };

    tx.execute(
        r#"
        INSERT INTO import_jobs(
            id, source_file, status, started_at, finished_at, total_count,
            imported_count, error_count, error_message, metadata_json
        )
        VALUES (?1, ?2, 'success', ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
        params![
            job_id,
            filename,
            now,
            now,
            inserted,
            inserted,
            parsed.notes.len() as i64,
            error_message,
            metadata_json,
        ],
    )
    .map_err(|e| format!("failed to record import job: {e}"))?;

    tx.commit()
        .map_err(|e| format!("failed to commit import transaction: {e}"))?;

    Ok(ImportReport {
        filename: filename.to_string(),
        report_period: parsed.report_period.clone(),
        source_used: parsed.source.description().to_string(),
        batch_id,
        import_job_id: job_id,
        replaced_existing: replaced > 0,
        counts: parsed.counts(),
        total_good: parsed.totals.total_good,
        total_bad: parsed.totals.total_bad,
        total_records: parsed.totals.total_records,
        notes: parsed.notes.clone(),
    })
}

/// Imports one already-loaded workbook. Parsing happens up front; the
/// delete-then-insert replace runs inside a single transaction so a storage
/// failure leaves any prior same-named batch untouched.
pub fn import_workbook_at_db_path(
    db_path: &Path,
    workbook: &ReportWorkbook,
) -> Result<ImportReport, ImportError> {
    let parsed = parse_report_workbook(workbook);
    info!(
        filename = workbook.filename.as_str(),
        source = parsed.source.description(),
        cards = parsed.cards.len(),
        "importing report workbook"
    );
    persist_parsed_report(db_path, &workbook.filename, &parsed).map_err(ImportError::Storage)
}

/// Full import path: open the workbook file, normalize and replace the batch.
pub fn import_report_file_at_db_path(
    db_path: &Path,
    file_path: &Path,
) -> Result<ImportReport, ImportError> {
    let workbook = read_report_workbook(file_path).map_err(ImportError::Unreadable)?;
    import_workbook_at_db_path(db_path, &workbook)
}

/// Parses a workbook without touching storage and returns diagnostics plus a
/// small sample of the card rows that an import would produce.
pub fn preview_workbook(workbook: &ReportWorkbook) -> Value {
    let parsed = parse_report_workbook(workbook);
    let preview_rows = parsed
        .cards
        .iter()
        .take(10)
        .map(|card| {
            json!({
                "serial_number": card.serial_number,
                "work_permit_no": card.work_permit_no,
                "status": card.status.map(|s| s.as_str()),
                "center": card.center,
                "print_date": card.print_date,
                "sla_minutes": card.sla_minutes,
            })
        })
        .collect::<Vec<_>>();

    json!({
        "filename": workbook.filename,
        "report_period": parsed.report_period,
        "source_used": parsed.source.description(),
        "sheets": workbook.sheet_labels(),
        "counts": serde_json::to_value(parsed.counts()).unwrap_or(Value::Null),
        "total_good": parsed.totals.total_good,
        "total_bad": parsed.totals.total_bad,
        "total_records": parsed.totals.total_records,
        "notes": parsed.notes,
        "preview_rows": preview_rows,
    })
}

pub fn preview_report_file(file_path: &Path) -> Result<Value, ImportError> {
    let workbook = read_report_workbook(file_path).map_err(ImportError::Unreadable)?;
    Ok(preview_workbook(&workbook))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report_db::apply_embedded_migrations;
    use rusqlite::Connection;
    use std::fs;
    use std::path::PathBuf;

    fn create_temp_path(prefix: &str, ext: &str) -> PathBuf {
        let unique = format!("{prefix}_{}_{}.{}", std::process::id(), Uuid::new_v4(), ext);
        std::env::temp_dir().join(unique)
    }

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    fn detail_grid(good: usize, bad: usize) -> Vec<Vec<String>> {
        let mut grid = vec![row(&[
            "No.",
            "Serial Number",
            "Status",
            "Queue No",
            "Print Date",
        ])];
        let mut n = 0usize;
        for _ in 0..good {
            n += 1;
            grid.push(vec![
                n.to_string(),
                n.to_string(),
                "Good".to_string(),
                format!("Q{n}"),
                "2025-11-15".to_string(),
            ]);
        }
        for _ in 0..bad {
            n += 1;
            grid.push(vec![
                n.to_string(),
                n.to_string(),
                "Bad".to_string(),
                format!("Q{n}"),
                "2025-11-15".to_string(),
            ]);
        }
        grid
    }

    fn list_grid(first_serial: usize, count: usize) -> Vec<Vec<String>> {
        let mut grid = vec![row(&["No.", "Serial Number", "Print Date"])];
        for i in 0..count {
            grid.push(vec![
                (i + 1).to_string(),
                (first_serial + i).to_string(),
                "2025-11-02".to_string(),
            ]);
        }
        grid
    }

    fn workbook_with(
        filename: &str,
        sheets: Vec<(SheetCategory, Vec<Vec<String>>)>,
    ) -> ReportWorkbook {
        let mut workbook = ReportWorkbook::new(filename);
        for (category, grid) in sheets {
            workbook.insert_sheet(category, grid);
        }
        workbook
    }

    fn count(conn: &Connection, sql: &str) -> i64 {
        conn.query_row(sql, [], |r| r.get(0)).expect("count query")
    }

    #[test]
    fn scenario_daily_export_selects_detail() {
        let db_path = create_temp_path("cardops_import_daily", "db");
        apply_embedded_migrations(&db_path).expect("migrate");

        let workbook = workbook_with(
            "card_report_15-11-2568.xlsx",
            vec![
                (SheetCategory::Detail, detail_grid(400, 100)),
                // aggregate pair present but empty: headers only
                (SheetCategory::GoodList, list_grid(1, 0)),
                (SheetCategory::BadList, list_grid(1, 0)),
            ],
        );
        let report = import_workbook_at_db_path(&db_path, &workbook).expect("import");

        assert_eq!(report.report_period, "2025-11-15");
        assert!(report.source_used.contains("detail"));
        assert_eq!(report.counts.card_records, 500);
        assert_eq!(report.total_good, 400);
        assert_eq!(report.total_bad, 100);
        assert_eq!(report.total_records, 500);
        assert!(!report.replaced_existing);

        let conn = Connection::open(&db_path).expect("open db");
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM report_batches"), 1);
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM card_records"), 500);
        assert_eq!(
            count(
                &conn,
                "SELECT COUNT(*) FROM card_records WHERE status='good'"
            ),
            400
        );
        assert_eq!(
            count(
                &conn,
                "SELECT COUNT(*) FROM import_jobs WHERE status='success'"
            ),
            1
        );

        let _ = fs::remove_file(&db_path);
    }

    #[test]
    fn scenario_monthly_rollup_enriches_from_detail() {
        let db_path = create_temp_path("cardops_import_monthly", "db");
        apply_embedded_migrations(&db_path).expect("migrate");

        let workbook = workbook_with(
            "card_report_30-11-2568.xlsx",
            vec![
                // anomaly subset only: 50 of the 1000 cards
                (SheetCategory::Detail, detail_grid(50, 0)),
                (SheetCategory::GoodList, list_grid(1, 600)),
                (SheetCategory::BadList, list_grid(601, 400)),
            ],
        );
        let report = import_workbook_at_db_path(&db_path, &workbook).expect("import");

        assert!(report.source_used.contains("aggregate"));
        assert_eq!(report.counts.card_records, 1000);
        assert_eq!(report.total_good, 600);
        assert_eq!(report.total_bad, 400);

        let conn = Connection::open(&db_path).expect("open db");
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM card_records"), 1000);
        // exactly the detail subset carries queue supplements
        assert_eq!(
            count(
                &conn,
                "SELECT COUNT(*) FROM card_records WHERE queue_no IS NOT NULL"
            ),
            50
        );
        assert_eq!(
            count(
                &conn,
                "SELECT COUNT(*) FROM card_records WHERE status='bad' AND queue_no IS NOT NULL"
            ),
            0
        );

        let _ = fs::remove_file(&db_path);
    }

    #[test]
    fn reimport_replaces_batch_wholesale() {
        let db_path = create_temp_path("cardops_import_replace", "db");
        apply_embedded_migrations(&db_path).expect("migrate");

        let first = workbook_with(
            "card_report_15-11-2568.xlsx",
            vec![(SheetCategory::Detail, detail_grid(3, 0))],
        );
        let second = workbook_with(
            "card_report_15-11-2568.xlsx",
            vec![(SheetCategory::Detail, detail_grid(2, 0))],
        );
        let report1 = import_workbook_at_db_path(&db_path, &first).expect("first import");
        let report2 = import_workbook_at_db_path(&db_path, &second).expect("second import");
        assert!(!report1.replaced_existing);
        assert!(report2.replaced_existing);

        let conn = Connection::open(&db_path).expect("open db");
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM report_batches"), 1);
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM card_records"), 2);
        let total_records: i64 = conn
            .query_row(
                "SELECT total_records FROM report_batches WHERE filename='card_report_15-11-2568.xlsx'",
                [],
                |r| r.get(0),
            )
            .expect("batch totals");
        assert_eq!(total_records, 2);

        let _ = fs::remove_file(&db_path);
    }

    #[test]
    fn missing_delivery_sheet_does_not_block_other_categories() {
        let db_path = create_temp_path("cardops_import_independence", "db");
        apply_embedded_migrations(&db_path).expect("migrate");

        let workbook = workbook_with(
            "card_report_15-11-2568.xlsx",
            vec![
                (SheetCategory::Detail, detail_grid(5, 1)),
                (
                    SheetCategory::BadList,
                    vec![
                        row(&["No.", "Serial Number", "Reason"]),
                        row(&["1", "6", "chip error"]),
                    ],
                ),
                (
                    SheetCategory::ByCenter,
                    vec![
                        row(&["No.", "Center", "Good", "Bad", "Total"]),
                        row(&["1", "Bangkok", "5", "1", "6"]),
                    ],
                ),
                (
                    SheetCategory::SlaOverThreshold,
                    vec![
                        row(&["No.", "Serial Number", "SLA Minutes"]),
                        row(&["1", "3", "25"]),
                    ],
                ),
                (
                    SheetCategory::WrongCenter,
                    vec![
                        row(&["No.", "Work Permit No", "Appointment Center", "Actual Center"]),
                        row(&["1", "777", "Bangkok", "Chiang Mai"]),
                    ],
                ),
                (
                    SheetCategory::CompleteDiff,
                    vec![
                        row(&["No.", "Appointment No", "Serial Number", "Card Count"]),
                        row(&["1", "888", "999", "2"]),
                    ],
                ),
            ],
        );
        let report = import_workbook_at_db_path(&db_path, &workbook).expect("import");

        assert_eq!(report.counts.delivery_cards, 0);
        assert_eq!(report.counts.bad_cards, 1);
        assert_eq!(report.counts.center_stats, 1);
        assert_eq!(report.counts.anomaly_sla, 1);
        assert_eq!(report.counts.wrong_center, 1);
        assert_eq!(report.counts.complete_diff, 1);
        assert_eq!(report.counts.card_records, 6);
        assert!(report.notes.is_empty());

        let conn = Connection::open(&db_path).expect("open db");
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM delivery_card_records"), 0);
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM wrong_center_records"), 1);

        let _ = fs::remove_file(&db_path);
    }

    #[test]
    fn malformed_detail_degrades_to_aggregate_with_note() {
        let db_path = create_temp_path("cardops_import_malformed", "db");
        apply_embedded_migrations(&db_path).expect("migrate");

        let workbook = workbook_with(
            "card_report_15-11-2568.xlsx",
            vec![
                // detail header lacks the required status column
                (
                    SheetCategory::Detail,
                    vec![row(&["No.", "Operator"]), row(&["1", "somchai"])],
                ),
                (SheetCategory::GoodList, list_grid(1, 4)),
                (SheetCategory::BadList, list_grid(5, 2)),
            ],
        );
        let report = import_workbook_at_db_path(&db_path, &workbook).expect("import");

        assert!(report.source_used.contains("aggregate"));
        assert_eq!(report.counts.card_records, 6);
        assert!(report
            .notes
            .iter()
            .any(|n| n.starts_with("detail sheet skipped")));

        let _ = fs::remove_file(&db_path);
    }

    #[test]
    fn summary_sheet_overrides_counted_totals() {
        let db_path = create_temp_path("cardops_import_summary", "db");
        apply_embedded_migrations(&db_path).expect("migrate");

        let workbook = workbook_with(
            "card_report_15-11-2568.xlsx",
            vec![
                (SheetCategory::Detail, detail_grid(3, 1)),
                (
                    SheetCategory::Summary,
                    vec![
                        row(&["จำนวนบัตรดี", "450"]),
                        row(&["จำนวนบัตรเสีย", "50"]),
                        row(&["รวมทั้งหมด", "500"]),
                    ],
                ),
            ],
        );
        let report = import_workbook_at_db_path(&db_path, &workbook).expect("import");

        assert_eq!(report.total_good, 450);
        assert_eq!(report.total_bad, 50);
        assert_eq!(report.total_records, 500);
        // record counts still reflect the actual rows
        assert_eq!(report.counts.card_records, 4);

        let _ = fs::remove_file(&db_path);
    }

    #[test]
    fn unreadable_file_is_fatal_without_writes() {
        let db_path = create_temp_path("cardops_import_unreadable", "db");
        apply_embedded_migrations(&db_path).expect("migrate");

        let bogus_path = create_temp_path("cardops_not_a_workbook", "xlsx");
        fs::write(&bogus_path, b"this is not a spreadsheet").expect("write bogus file");

        let result = import_report_file_at_db_path(&db_path, &bogus_path);
        assert!(matches!(result, Err(ImportError::Unreadable(_))));

        let conn = Connection::open(&db_path).expect("open db");
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM report_batches"), 0);
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM import_jobs"), 0);

        let _ = fs::remove_file(&bogus_path);
        let _ = fs::remove_file(&db_path);
    }

    #[test]
    fn preview_reports_without_writing() {
        let workbook = workbook_with(
            "card_report_15-11-2568.xlsx",
            vec![(SheetCategory::Detail, detail_grid(2, 1))],
        );
        let preview = preview_workbook(&workbook);
        assert_eq!(
            preview.get("report_period").and_then(Value::as_str),
            Some("2025-11-15")
        );
        assert_eq!(
            preview
                .get("counts")
                .and_then(|c| c.get("card_records"))
                .and_then(Value::as_i64),
            Some(3)
        );
        assert_eq!(
            preview
                .get("preview_rows")
                .and_then(Value::as_array)
                .map(Vec::len),
            Some(3)
        );
    }
}
