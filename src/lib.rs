//! Ingestion pipeline for card-issuance operations report workbooks.
//!
//! The upstream system exports multi-sheet spreadsheets in two cadences: a
//! daily snapshot with a complete per-card detail sheet, and a monthly rollup
//! where the detail sheet only holds anomalies and the good/bad list pair is
//! authoritative. This crate locates headers across both naming conventions,
//! repairs known upstream defects (zero-stripped identifiers, transposed
//! day/month dates, Buddhist-calendar years), picks the richer source per
//! import and replaces the batch in SQLite atomically.

pub mod card_source;
pub mod columns;
pub mod import;
pub mod models;
pub mod normalize;
pub mod read_queries;
pub mod report_db;
pub mod summary;
pub mod workbook;

pub use import::{
    import_report_file_at_db_path, import_workbook_at_db_path, preview_report_file,
    preview_workbook, CategoryCounts, ImportError, ImportReport,
};
pub use read_queries::{
    query_card_records_at_db_path, query_report_batches_at_db_path, CardRecordsQueryRequest,
};
pub use report_db::{
    apply_embedded_migrations, delete_report_batch_at_db_path, inspect_status_at_path,
    query_db_stats_at_path,
};
pub use workbook::{read_report_workbook, ReportWorkbook, SheetCategory};
