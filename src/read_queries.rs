use rusqlite::{params_from_iter, types::Value as SqlValue, Connection};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
pub struct CardRecordsQueryRequest {
    pub filename: Option<String>,
    pub batch_id: Option<String>,
    pub status: Option<String>,
    pub center: Option<String>,
    pub limit: Option<u32>,
}

fn parse_limit(raw: Option<u32>, default_limit: u32, max_limit: u32) -> u32 {
    raw.unwrap_or(default_limit).clamp(1, max_limit)
}

fn parse_optional_text(raw: Option<String>) -> String {
    raw.unwrap_or_default().trim().to_string()
}

/// Recent batches with per-category child counts, newest upload first.
pub fn query_report_batches_at_db_path(
    db_path: &Path,
    limit: Option<u32>,
) -> Result<Value, String> {
    let limit = parse_limit(limit, 20, 200);
    let conn = Connection::open(db_path).map_err(|e| format!("failed to open database: {e}"))?;

    let mut stmt = conn
        .prepare(
            r#"
            SELECT
                b.id,
                b.filename,
                b.report_period,
                b.total_good,
                b.total_bad,
                b.total_records,
                b.source_used,
                b.uploaded_at,
                (SELECT COUNT(*) FROM card_records c WHERE c.batch_id = b.id),
                (SELECT COUNT(*) FROM bad_card_records r WHERE r.batch_id = b.id),
                (SELECT COUNT(*) FROM center_stat_records r WHERE r.batch_id = b.id),
                (SELECT COUNT(*) FROM anomaly_sla_records r WHERE r.batch_id = b.id),
                (SELECT COUNT(*) FROM wrong_center_records r WHERE r.batch_id = b.id),
                (SELECT COUNT(*) FROM complete_diff_records r WHERE r.batch_id = b.id),
                (SELECT COUNT(*) FROM delivery_card_records r WHERE r.batch_id = b.id)
            FROM report_batches b
            ORDER BY b.uploaded_at DESC, b.filename
            LIMIT ?1
            "#,
        )
        .map_err(|e| format!("failed to query report batches: {e}"))?;
    let iter = stmt
        .query_map([limit], |row| {
            Ok(json!({
                "batch_id": row.get::<_, String>(0)?,
                "filename": row.get::<_, String>(1)?,
                "report_period": row.get::<_, String>(2)?,
                "total_good": row.get::<_, i64>(3)?,
                "total_bad": row.get::<_, i64>(4)?,
                "total_records": row.get::<_, i64>(5)?,
                "source_used": row.get::<_, String>(6)?,
                "uploaded_at": row.get::<_, String>(7)?,
                "counts": {
                    "card_records": row.get::<_, i64>(8)?,
                    "bad_cards": row.get::<_, i64>(9)?,
                    "center_stats": row.get::<_, i64>(10)?,
                    "anomaly_sla": row.get::<_, i64>(11)?,
                    "wrong_center": row.get::<_, i64>(12)?,
                    "complete_diff": row.get::<_, i64>(13)?,
                    "delivery_cards": row.get::<_, i64>(14)?,
                },
            }))
        })
        .map_err(|e| format!("failed to query report batches: {e}"))?;

    let mut items = Vec::<Value>::new();
    for row in iter {
        items.push(row.map_err(|e| format!("failed to read report batch: {e}"))?);
    }

    Ok(json!({
        "count": items.len(),
        "batches": items,
    }))
}

/// Card records filtered by batch, status or center, bounded by a limit.
pub fn query_card_records_at_db_path(
    db_path: &Path,
    req: CardRecordsQueryRequest,
) -> Result<Value, String> {
    let limit = parse_limit(req.limit, 100, 1000);
    let filename = parse_optional_text(req.filename);
    let batch_id = parse_optional_text(req.batch_id);
    let status = parse_optional_text(req.status).to_lowercase();
    let center = parse_optional_text(req.center);
    if !status.is_empty() && !["good", "bad"].contains(&status.as_str()) {
        return Err("status filter must be good or bad".to_string());
    }

    let mut conditions = Vec::<String>::new();
    let mut params = Vec::<SqlValue>::new();
    if !filename.is_empty() {
        params.push(SqlValue::Text(filename));
        conditions.push(format!("b.filename = ?{}", params.len()));
    }
    if !batch_id.is_empty() {
        params.push(SqlValue::Text(batch_id));
        conditions.push(format!("c.batch_id = ?{}", params.len()));
    }
    if !status.is_empty() {
        params.push(SqlValue::Text(status));
        conditions.push(format!("c.status = ?{}", params.len()));
    }
    if !center.is_empty() {
        params.push(SqlValue::Text(center));
        conditions.push(format!("c.center = ?{}", params.len()));
    }
    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };
    params.push(SqlValue::Integer(limit as i64));
    let limit_slot = params.len();

    let sql = format!(
        r#"
        SELECT
            c.serial_number,
            c.work_permit_no,
            c.card_id,
            c.status,
            c.operator,
            c.center,
            c.print_date,
            c.queue_no,
            c.wait_minutes,
            c.sla_minutes,
            c.sla_over_12min,
            c.wait_over_1hour,
            c.wrong_date,
            c.wrong_center,
            b.filename
        FROM card_records c
        JOIN report_batches b ON b.id = c.batch_id
        {where_clause}
        ORDER BY c.serial_number
        LIMIT ?{limit_slot}
        "#
    );

    let conn = Connection::open(db_path).map_err(|e| format!("failed to open database: {e}"))?;
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| format!("failed to query card records: {e}"))?;
    let iter = stmt
        .query_map(params_from_iter(params), |row| {
            Ok(json!({
                "serial_number": row.get::<_, Option<String>>(0)?,
                "work_permit_no": row.get::<_, Option<String>>(1)?,
                "card_id": row.get::<_, Option<String>>(2)?,
                "status": row.get::<_, Option<String>>(3)?,
                "operator": row.get::<_, Option<String>>(4)?,
                "center": row.get::<_, Option<String>>(5)?,
                "print_date": row.get::<_, Option<String>>(6)?,
                "queue_no": row.get::<_, Option<String>>(7)?,
                "wait_minutes": row.get::<_, Option<f64>>(8)?,
                "sla_minutes": row.get::<_, Option<f64>>(9)?,
                "sla_over_12min": row.get::<_, i64>(10)?,
                "wait_over_1hour": row.get::<_, i64>(11)?,
                "wrong_date": row.get::<_, i64>(12)?,
                "wrong_center": row.get::<_, i64>(13)?,
                "filename": row.get::<_, String>(14)?,
            }))
        })
        .map_err(|e| format!("failed to query card records: {e}"))?;

    let mut items = Vec::<Value>::new();
    for row in iter {
        items.push(row.map_err(|e| format!("failed to read card record: {e}"))?);
    }

    Ok(json!({
        "count": items.len(),
        "records": items,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::import_workbook_at_db_path;
    use crate::report_db::apply_embedded_migrations;
    use crate::workbook::{ReportWorkbook, SheetCategory};
    use std::fs;
    use std::path::PathBuf;
    use uuid::Uuid;

    fn create_temp_path(prefix: &str, ext: &str) -> PathBuf {
        let unique = format!("{prefix}_{}_{}.{}", std::process::id(), Uuid::new_v4(), ext);
        std::env::temp_dir().join(unique)
    }

    fn seeded_db() -> PathBuf {
        let db_path = create_temp_path("cardops_read_queries", "db");
        apply_embedded_migrations(&db_path).expect("migrate");

        let mut workbook = ReportWorkbook::new("card_report_15-11-2568.xlsx");
        workbook.insert_sheet(
            SheetCategory::Detail,
            vec![
                ["No.", "Serial Number", "Status", "Center"]
                    .iter()
                    .map(|c| c.to_string())
                    .collect(),
                ["1", "101", "Good", "Bangkok"]
                    .iter()
                    .map(|c| c.to_string())
                    .collect(),
                ["2", "102", "Bad", "Chiang Mai"]
                    .iter()
                    .map(|c| c.to_string())
                    .collect(),
            ],
        );
        import_workbook_at_db_path(&db_path, &workbook).expect("import");
        db_path
    }

    #[test]
    fn batches_listing_carries_child_counts() {
        let db_path = seeded_db();
        let result = query_report_batches_at_db_path(&db_path, None).expect("query batches");
        assert_eq!(result.get("count").and_then(Value::as_i64), Some(1));
        let batch = &result["batches"][0];
        assert_eq!(
            batch.get("filename").and_then(Value::as_str),
            Some("card_report_15-11-2568.xlsx")
        );
        assert_eq!(
            batch["counts"].get("card_records").and_then(Value::as_i64),
            Some(2)
        );
        assert_eq!(
            batch["counts"]
                .get("delivery_cards")
                .and_then(Value::as_i64),
            Some(0)
        );
        let _ = fs::remove_file(&db_path);
    }

    #[test]
    fn card_records_filter_by_status() {
        let db_path = seeded_db();
        let result = query_card_records_at_db_path(
            &db_path,
            CardRecordsQueryRequest {
                status: Some("bad".to_string()),
                ..CardRecordsQueryRequest::default()
            },
        )
        .expect("query records");
        assert_eq!(result.get("count").and_then(Value::as_i64), Some(1));
        assert_eq!(
            result["records"][0]
                .get("serial_number")
                .and_then(Value::as_str),
            Some("0000000000102")
        );
        let _ = fs::remove_file(&db_path);
    }

    #[test]
    fn invalid_status_filter_is_rejected() {
        let db_path = seeded_db();
        let err = query_card_records_at_db_path(
            &db_path,
            CardRecordsQueryRequest {
                status: Some("pending".to_string()),
                ..CardRecordsQueryRequest::default()
            },
        )
        .expect_err("status must be rejected");
        assert!(err.contains("good or bad"));
        let _ = fs::remove_file(&db_path);
    }
}
