use cardops_ingest::{
    apply_embedded_migrations, delete_report_batch_at_db_path, import_report_file_at_db_path,
    inspect_status_at_path, preview_report_file, query_card_records_at_db_path,
    query_db_stats_at_path, query_report_batches_at_db_path, CardRecordsQueryRequest, ImportError,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io::{self, Read};
use std::path::Path;
use tracing_subscriber::EnvFilter;

const SUPPORTED_SCHEMA_VERSION: u64 = 1;

#[derive(Debug, Deserialize)]
struct AdapterRequest {
    schema_version: u64,
    action: String,
    db_path: Option<String>,
    file_path: Option<String>,
    filename: Option<String>,
    limit: Option<u32>,
    query: Option<Value>,
}

#[derive(Debug, Serialize)]
struct AdapterErrorBody {
    category: String,
    message: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status")]
enum AdapterResponse {
    #[serde(rename = "success")]
    Success { payload: Value },
    #[serde(rename = "error")]
    Error { error: AdapterErrorBody },
}

fn validation_error(message: impl Into<String>) -> (String, String) {
    ("VALIDATION_ERROR".to_string(), message.into())
}

fn import_error(err: ImportError) -> (String, String) {
    let category = match &err {
        ImportError::Unreadable(_) => "UNREADABLE_ERROR",
        ImportError::Storage(_) => "STORAGE_ERROR",
    };
    (category.to_string(), err.to_string())
}

fn to_payload<T: Serialize>(value: &T) -> Result<Value, (String, String)> {
    serde_json::to_value(value)
        .map_err(|e| ("INTERNAL_ERROR".to_string(), format!("serialize payload: {e}")))
}

fn require_db_path(req: &AdapterRequest) -> Result<&Path, (String, String)> {
    req.db_path
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(Path::new)
        .ok_or_else(|| validation_error("db_path is required"))
}

fn require_file_path(req: &AdapterRequest) -> Result<&Path, (String, String)> {
    req.file_path
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(Path::new)
        .ok_or_else(|| validation_error("file_path is required"))
}

fn run_request(req: &AdapterRequest) -> Result<Value, (String, String)> {
    if req.schema_version != SUPPORTED_SCHEMA_VERSION {
        return Err(validation_error(format!(
            "unsupported schema_version {} (expected {SUPPORTED_SCHEMA_VERSION})",
            req.schema_version
        )));
    }

    match req.action.as_str() {
        "import" => {
            let db_path = require_db_path(req)?;
            let file_path = require_file_path(req)?;
            let report =
                import_report_file_at_db_path(db_path, file_path).map_err(import_error)?;
            to_payload(&report)
        }
        "preview" => {
            let file_path = require_file_path(req)?;
            preview_report_file(file_path).map_err(import_error)
        }
        "migrate" => {
            let db_path = require_db_path(req)?;
            let result = apply_embedded_migrations(db_path)
                .map_err(|e| ("STORAGE_ERROR".to_string(), e))?;
            to_payload(&result)
        }
        "status" => {
            let db_path = require_db_path(req)?;
            let status =
                inspect_status_at_path(db_path).map_err(|e| ("STORAGE_ERROR".to_string(), e))?;
            to_payload(&status)
        }
        "stats" => {
            let db_path = require_db_path(req)?;
            let stats =
                query_db_stats_at_path(db_path).map_err(|e| ("STORAGE_ERROR".to_string(), e))?;
            to_payload(&stats)
        }
        "batches" => {
            let db_path = require_db_path(req)?;
            query_report_batches_at_db_path(db_path, req.limit)
                .map_err(|e| ("STORAGE_ERROR".to_string(), e))
        }
        "records" => {
            let db_path = require_db_path(req)?;
            let query = match &req.query {
                Some(value) => serde_json::from_value::<CardRecordsQueryRequest>(value.clone())
                    .map_err(|e| validation_error(format!("invalid records query: {e}")))?,
                None => CardRecordsQueryRequest::default(),
            };
            query_card_records_at_db_path(db_path, query)
                .map_err(|e| validation_error(e))
        }
        "delete_batch" => {
            let db_path = require_db_path(req)?;
            let filename = req
                .filename
                .as_deref()
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .ok_or_else(|| validation_error("filename is required"))?;
            let result = delete_report_batch_at_db_path(db_path, filename)
                .map_err(|e| ("STORAGE_ERROR".to_string(), e))?;
            to_payload(&result)
        }
        other => Err(validation_error(format!("unknown action: {other}"))),
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let mut input = String::new();
    if let Err(err) = io::stdin().read_to_string(&mut input) {
        let response = AdapterResponse::Error {
            error: AdapterErrorBody {
                category: "IO_ERROR".to_string(),
                message: format!("failed to read stdin: {err}"),
            },
        };
        println!("{}", json!(response));
        std::process::exit(1);
    }

    let response = match serde_json::from_str::<AdapterRequest>(&input) {
        Ok(req) => match run_request(&req) {
            Ok(payload) => AdapterResponse::Success { payload },
            Err((category, message)) => AdapterResponse::Error {
                error: AdapterErrorBody { category, message },
            },
        },
        Err(err) => AdapterResponse::Error {
            error: AdapterErrorBody {
                category: "VALIDATION_ERROR".to_string(),
                message: format!("invalid request JSON: {err}"),
            },
        },
    };

    let exit_code = matches!(response, AdapterResponse::Error { .. }) as i32;
    match serde_json::to_string(&response) {
        Ok(text) => println!("{text}"),
        Err(err) => {
            eprintln!("failed to serialize response: {err}");
            std::process::exit(1);
        }
    }
    std::process::exit(exit_code);
}
