use crate::bundle;
use crate::error::ClassifyError;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request, StoredReport};
use crate::marks::{Category, ClassifyOptions};
use crate::report::{self, Download, GeneratedReports};
use anyhow::Context;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::json;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const SUCCESS_MESSAGE: &str = "Excel files have been generated successfully!";

struct HandlerErr {
    code: &'static str,
    message: String,
    details: Option<serde_json::Value>,
}

impl HandlerErr {
    fn new(code: &'static str, message: impl Into<String>) -> Self {
        HandlerErr {
            code,
            message: message.into(),
            details: None,
        }
    }

    fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<ClassifyError> for HandlerErr {
    fn from(e: ClassifyError) -> Self {
        let details = match &e {
            ClassifyError::MissingColumn {
                expected,
                available,
            } => Some(json!({
                "expected": expected,
                "availableColumns": available,
            })),
            _ => None,
        };
        HandlerErr {
            code: e.code(),
            message: e.to_string(),
            details,
        }
    }
}

fn str_param<'a>(req: &'a Request, key: &str) -> Result<&'a str, HandlerErr> {
    match req.params.get(key).and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => Ok(v.trim()),
        _ => Err(HandlerErr::new("bad_params", format!("missing {key}"))),
    }
}

fn is_xlsx_path(p: &Path) -> bool {
    p.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("xlsx"))
        .unwrap_or(false)
}

/// Upload bytes come either from a file the UI picked or inline as base64.
fn read_upload(req: &Request) -> Result<Vec<u8>, HandlerErr> {
    if let Some(path) = req.params.get("path").and_then(|v| v.as_str()) {
        let p = PathBuf::from(path.trim());
        if !is_xlsx_path(&p) {
            return Err(HandlerErr::new(
                "bad_params",
                "only .xlsx uploads are accepted",
            ));
        }
        return std::fs::read(&p).map_err(|e| HandlerErr {
            code: "dataset_load_failed",
            message: format!("Error reading the Excel file: {e}"),
            details: Some(json!({ "path": path })),
        });
    }
    if let Some(data) = req.params.get("dataBase64").and_then(|v| v.as_str()) {
        return STANDARD
            .decode(data.trim())
            .map_err(|e| HandlerErr::new("bad_params", format!("dataBase64 is not valid base64: {e}")));
    }
    Err(HandlerErr::new("bad_params", "missing path or dataBase64"))
}

fn parse_options(req: &Request) -> Result<ClassifyOptions, HandlerErr> {
    match req.params.get("options") {
        None | Some(serde_json::Value::Null) => Ok(ClassifyOptions::default()),
        Some(v) => serde_json::from_value(v.clone())
            .map_err(|e| HandlerErr::new("bad_params", format!("invalid options: {e}"))),
    }
}

fn lookup<'a>(state: &'a AppState, req: &Request) -> Result<&'a GeneratedReports, HandlerErr> {
    let report_id = str_param(req, "reportId")?;
    state
        .current
        .as_ref()
        .filter(|stored| stored.id == report_id)
        .map(|stored| &stored.generated)
        .ok_or_else(|| HandlerErr {
            code: "unknown_report",
            message: format!("no report with id {report_id}"),
            details: None,
        })
}

fn lookup_download<'a>(state: &'a AppState, req: &Request) -> Result<&'a Download, HandlerErr> {
    let generated = lookup(state, req)?;
    let raw = str_param(req, "category")?;
    let category = Category::parse(raw)
        .ok_or_else(|| HandlerErr::new("bad_params", format!("unknown category: {raw}")))?;
    generated.download(category).ok_or_else(|| HandlerErr {
        code: "not_offered",
        message: format!("no {} download was offered for this report", category.key()),
        details: None,
    })
}

fn download_json(d: &Download) -> serde_json::Value {
    json!({
        "category": d.category,
        "fileName": d.file_name(),
        "mimeType": d.mime_type(),
        "rows": d.rows,
        "bytes": d.bytes.len(),
        "sha256": d.sha256,
    })
}

fn generate(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let bytes = read_upload(req)?;
    let opts = parse_options(req)?;
    let generated = report::generate_reports(&bytes, &opts)?;
    let r = &generated.report;
    let report_id = Uuid::new_v4().to_string();

    let mut warnings = Vec::new();
    if !r.unclassified.is_empty() {
        warnings.push(json!({
            "code": "unclassified_rows",
            "message": format!(
                "{} rows have a {} value that is neither a number nor a sentinel",
                r.unclassified.len(),
                opts.marks_column.trim()
            ),
            "rows": r.unclassified,
        }));
    }

    let result = json!({
        "reportId": report_id,
        "message": SUCCESS_MESSAGE,
        "columns": r.columns,
        "rowCount": r.row_count,
        "counts": {
            "pass": r.pass.len(),
            "fail": r.fail.len(),
            "absent": r.absent.len(),
            "detained": r.detained.len(),
        },
        "unclassifiedRows": r.unclassified,
        "downloads": generated.downloads.iter().map(download_json).collect::<Vec<_>>(),
        "warnings": warnings,
    });

    let previous = state.current.replace(StoredReport {
        id: report_id,
        generated,
    });
    if let Some(prev) = previous {
        log::debug!("replaced report {}", prev.id);
    }
    Ok(result)
}

fn handle_generate(state: &mut AppState, req: &Request) -> serde_json::Value {
    match generate(state, req) {
        Ok(v) => ok(&req.id, v),
        Err(e) => {
            log::error!("reports.generate failed: {}", e.message);
            e.response(&req.id)
        }
    }
}

fn handle_download(state: &mut AppState, req: &Request) -> serde_json::Value {
    match lookup_download(state, req) {
        Ok(d) => ok(
            &req.id,
            json!({
                "fileName": d.file_name(),
                "mimeType": d.mime_type(),
                "dataBase64": STANDARD.encode(&d.bytes),
            }),
        ),
        Err(e) => e.response(&req.id),
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    std::fs::write(path, bytes)
        .with_context(|| format!("failed to write {}", path.to_string_lossy()))
}

fn handle_save(state: &mut AppState, req: &Request) -> serde_json::Value {
    let d = match lookup_download(state, req) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let out_path = match str_param(req, "outPath") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    if let Err(e) = write_file(Path::new(out_path), &d.bytes) {
        return err(
            &req.id,
            "io_failed",
            format!("{e:#}"),
            Some(json!({ "path": out_path })),
        );
    }
    ok(
        &req.id,
        json!({
            "path": out_path,
            "bytes": d.bytes.len()
        }),
    )
}

fn handle_export_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let generated = match lookup(state, req) {
        Ok(g) => g,
        Err(e) => return e.response(&req.id),
    };
    let out_path = match str_param(req, "outPath") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let export = match bundle::export_report_bundle(&generated.downloads, Path::new(out_path)) {
        Ok(v) => v,
        Err(e) => {
            return err(
                &req.id,
                "io_failed",
                format!("{e:#}"),
                Some(json!({ "path": out_path })),
            )
        }
    };

    ok(
        &req.id,
        json!({
            "path": out_path,
            "bundleFormat": export.bundle_format,
            "entryCount": export.entry_count
        }),
    )
}

fn handle_verify_bundle(_state: &mut AppState, req: &Request) -> serde_json::Value {
    let path = match str_param(req, "path") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match bundle::verify_report_bundle(Path::new(path)) {
        Ok(manifest) => ok(
            &req.id,
            json!({
                "path": path,
                "bundleFormat": manifest.format,
                "appVersion": manifest.app_version,
                "exportedAt": manifest.exported_at,
                "files": manifest.files,
            }),
        ),
        Err(e) => err(
            &req.id,
            "bundle_invalid",
            format!("{e:#}"),
            Some(json!({ "path": path })),
        ),
    }
}

fn handle_discard(state: &mut AppState, req: &Request) -> serde_json::Value {
    let report_id = match str_param(req, "reportId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let discarded = state
        .current
        .as_ref()
        .map(|stored| stored.id == report_id)
        .unwrap_or(false);
    if discarded {
        state.current = None;
    }
    ok(&req.id, json!({ "discarded": discarded }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.generate" => Some(handle_generate(state, req)),
        "reports.download" => Some(handle_download(state, req)),
        "reports.save" => Some(handle_save(state, req)),
        "reports.exportBundle" => Some(handle_export_bundle(state, req)),
        "reports.verifyBundle" => Some(handle_verify_bundle(state, req)),
        "reports.discard" => Some(handle_discard(state, req)),
        _ => None,
    }
}
