use serde::Deserialize;

use crate::report::GeneratedReports;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct StoredReport {
    pub id: String,
    pub generated: GeneratedReports,
}

/// Holds at most the latest upload's report; a new `reports.generate`
/// replaces it. Nothing here outlives the process.
#[derive(Default)]
pub struct AppState {
    pub current: Option<StoredReport>,
}
