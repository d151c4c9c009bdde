use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;

const MIGRATIONS: &[(&str, &str)] = &[(
    "0001_init.sql",
    include_str!("../db/migrations/0001_init.sql"),
)];

/// Tables holding imported report data, in child-before-parent order.
const REPORT_DATA_TABLES: &[&str] = &[
    "card_records",
    "bad_card_records",
    "center_stat_records",
    "anomaly_sla_records",
    "wrong_center_records",
    "complete_diff_records",
    "delivery_card_records",
    "import_jobs",
    "report_batches",
];

const CHILD_RECORD_TABLES: &[&str] = &[
    "card_records",
    "bad_card_records",
    "center_stat_records",
    "anomaly_sla_records",
    "wrong_center_records",
    "complete_diff_records",
    "delivery_card_records",
];

#[derive(Debug, Serialize)]
pub struct ReportDbStatus {
    pub db_path: String,
    pub exists: bool,
    pub migration_files: Vec<String>,
    pub applied_versions: Vec<String>,
    pub pending_versions: Vec<String>,
    pub schema_migrations_table_exists: bool,
    pub ready: bool,
}

#[derive(Debug, Serialize)]
pub struct ReportDbMigrateResult {
    pub db_path: String,
    pub created: bool,
    pub applied_now: Vec<String>,
    pub skipped: Vec<String>,
    pub applied_total: usize,
    pub pending_total: usize,
}

#[derive(Debug, Serialize)]
pub struct ReportDbTableCountRow {
    pub table: String,
    pub row_count: i64,
}

#[derive(Debug, Serialize)]
pub struct ReportDbStatsResult {
    pub db_path: String,
    pub table_count: usize,
    pub total_rows: i64,
    pub rows: Vec<ReportDbTableCountRow>,
}

#[derive(Debug, Serialize)]
pub struct DeleteReportBatchResult {
    pub db_path: String,
    pub filename: String,
    pub deleted: bool,
    pub child_rows_deleted: i64,
}

pub(crate) fn open_report_connection(db_path: &Path) -> Result<Connection, String> {
    let conn = Connection::open(db_path).map_err(|e| format!("failed to open database: {e}"))?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(|e| format!("failed to enable foreign_keys: {e}"))?;
    Ok(conn)
}

fn ensure_schema_migrations_table(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        "#,
    )
}

fn has_schema_migrations_table(conn: &Connection) -> rusqlite::Result<bool> {
    let exists = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_migrations')",
            [],
            |row| row.get::<_, i64>(0),
        )
        .map(|v| v != 0)?;
    Ok(exists)
}

fn load_applied_versions(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT version FROM schema_migrations ORDER BY version ASC")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    let mut versions = Vec::new();
    for row in rows {
        versions.push(row?);
    }
    Ok(versions)
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn list_non_system_tables(conn: &Connection) -> Result<HashSet<String>, String> {
    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'")
        .map_err(|e| format!("failed to read sqlite_master: {e}"))?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(|e| format!("failed to query sqlite_master: {e}"))?;
    let mut names = HashSet::new();
    for row in rows {
        names.insert(row.map_err(|e| format!("failed to read table name: {e}"))?);
    }
    Ok(names)
}

/// Fails with a migration hint when the report tables are missing, so an
/// import against a fresh file does not die halfway through its inserts.
pub(crate) fn ensure_schema_ready(conn: &Connection) -> Result<(), String> {
    let existing = list_non_system_tables(conn)?;
    let missing = REPORT_DATA_TABLES
        .iter()
        .filter(|t| !existing.contains(**t))
        .copied()
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        return Err(format!(
            "database is missing required tables: {}. Run migrations first.",
            missing.join(", ")
        ));
    }
    Ok(())
}

pub fn inspect_status_at_path(db_path: &Path) -> Result<ReportDbStatus, String> {
    let migration_files = MIGRATIONS
        .iter()
        .map(|(v, _)| (*v).to_string())
        .collect::<Vec<_>>();
    let exists = db_path.exists();
    if !exists {
        return Ok(ReportDbStatus {
            db_path: db_path.to_string_lossy().to_string(),
            exists: false,
            migration_files: migration_files.clone(),
            applied_versions: Vec::new(),
            pending_versions: migration_files,
            schema_migrations_table_exists: false,
            ready: false,
        });
    }

    let conn = Connection::open(db_path).map_err(|e| format!("failed to open database: {e}"))?;
    let schema_table_exists = has_schema_migrations_table(&conn)
        .map_err(|e| format!("failed to check schema_migrations: {e}"))?;

    let applied_versions = if schema_table_exists {
        load_applied_versions(&conn).map_err(|e| format!("failed to read schema_migrations: {e}"))?
    } else {
        Vec::new()
    };
    let applied_set = applied_versions.iter().cloned().collect::<HashSet<_>>();
    let pending_versions = migration_files
        .iter()
        .filter(|v| !applied_set.contains(*v))
        .cloned()
        .collect::<Vec<_>>();

    Ok(ReportDbStatus {
        db_path: db_path.to_string_lossy().to_string(),
        exists: true,
        migration_files,
        applied_versions,
        pending_versions: pending_versions.clone(),
        schema_migrations_table_exists: schema_table_exists,
        ready: pending_versions.is_empty(),
    })
}

pub fn apply_embedded_migrations(db_path: &Path) -> Result<ReportDbMigrateResult, String> {
    let created = !db_path.exists();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("failed to create database directory: {e}"))?;
    }

    let mut conn = open_report_connection(db_path)?;
    ensure_schema_migrations_table(&conn)
        .map_err(|e| format!("failed to init schema_migrations: {e}"))?;

    let already = load_applied_versions(&conn)
        .map_err(|e| format!("failed to read applied migrations: {e}"))?
        .into_iter()
        .collect::<HashSet<_>>();

    let mut applied_now = Vec::new();
    let mut skipped = Vec::new();

    for (version, sql) in MIGRATIONS {
        if already.contains(*version) {
            skipped.push((*version).to_string());
            continue;
        }
        let tx = conn
            .transaction()
            .map_err(|e| format!("failed to begin migration transaction ({version}): {e}"))?;
        tx.execute_batch(sql)
            .map_err(|e| format!("failed to apply migration ({version}): {e}"))?;
        tx.execute(
            "INSERT INTO schema_migrations(version) VALUES (?1)",
            [*version],
        )
        .map_err(|e| format!("failed to record migration ({version}): {e}"))?;
        tx.commit()
            .map_err(|e| format!("failed to commit migration ({version}): {e}"))?;
        applied_now.push((*version).to_string());
    }

    let applied_total = load_applied_versions(&conn)
        .map_err(|e| format!("failed to read migration result: {e}"))?
        .len();
    let pending_total = MIGRATIONS.len().saturating_sub(applied_total);

    Ok(ReportDbMigrateResult {
        db_path: db_path.to_string_lossy().to_string(),
        created,
        applied_now,
        skipped,
        applied_total,
        pending_total,
    })
}

pub fn query_db_stats_at_path(db_path: &Path) -> Result<ReportDbStatsResult, String> {
    if !db_path.exists() {
        return Err(format!("database not found: {}", db_path.to_string_lossy()));
    }

    let conn = Connection::open(db_path).map_err(|e| format!("failed to open database: {e}"))?;
    let existing = list_non_system_tables(&conn)?;

    let mut rows = Vec::new();
    let mut total_rows = 0_i64;
    for table in REPORT_DATA_TABLES {
        if !existing.contains(*table) {
            continue;
        }
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
        let row_count = conn
            .query_row(&sql, [], |row| row.get::<_, i64>(0))
            .map_err(|e| format!("failed to count rows of {table}: {e}"))?;
        total_rows += row_count;
        rows.push(ReportDbTableCountRow {
            table: (*table).to_string(),
            row_count,
        });
    }

    Ok(ReportDbStatsResult {
        db_path: db_path.to_string_lossy().to_string(),
        table_count: rows.len(),
        total_rows,
        rows,
    })
}

/// Explicitly removes one batch and, through the cascade, all of its child
/// records.
pub fn delete_report_batch_at_db_path(
    db_path: &Path,
    filename: &str,
) -> Result<DeleteReportBatchResult, String> {
    let filename = filename.trim();
    if filename.is_empty() {
        return Err("filename is required".to_string());
    }
    if !db_path.exists() {
        return Err(format!("database not found: {}", db_path.to_string_lossy()));
    }

    let mut conn = open_report_connection(db_path)?;
    ensure_schema_ready(&conn)?;

    let batch_id: Option<String> = conn
        .query_row(
            "SELECT id FROM report_batches WHERE filename = ?1",
            [filename],
            |row| row.get(0),
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(format!("failed to look up batch: {other}")),
        })?;

    let Some(batch_id) = batch_id else {
        return Ok(DeleteReportBatchResult {
            db_path: db_path.to_string_lossy().to_string(),
            filename: filename.to_string(),
            deleted: false,
            child_rows_deleted: 0,
        });
    };

    let mut child_rows = 0_i64;
    for table in CHILD_RECORD_TABLES {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE batch_id = ?1",
            quote_ident(table)
        );
        child_rows += conn
            .query_row(&sql, [batch_id.as_str()], |row| row.get::<_, i64>(0))
            .map_err(|e| format!("failed to count rows of {table}: {e}"))?;
    }

    let tx = conn
        .transaction()
        .map_err(|e| format!("failed to begin delete transaction: {e}"))?;
    tx.execute("DELETE FROM report_batches WHERE id = ?1", [batch_id.as_str()])
        .map_err(|e| format!("failed to delete batch: {e}"))?;
    tx.commit()
        .map_err(|e| format!("failed to commit delete transaction: {e}"))?;

    Ok(DeleteReportBatchResult {
        db_path: db_path.to_string_lossy().to_string(),
        filename: filename.to_string(),
        deleted: true,
        child_rows_deleted: child_rows,
    })
}
