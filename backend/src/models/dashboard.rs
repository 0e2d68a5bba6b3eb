//! Response payloads for the roster endpoints.

use serde::Serialize;

use super::{Role, Student};

/// The dashboard listing: who is signed in and the current roster.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardView {
    pub username: String,
    pub role: Role,
    pub students: Vec<Student>,
    /// True when the spreadsheet mirror could not be brought up to date
    pub mirror_stale: bool,
}

/// Result of a bulk spreadsheet import.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSummary {
    pub imported: usize,
    pub students: Vec<Student>,
    pub mirror_synced: bool,
}

/// Result of an admin delete.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOutcome {
    pub id: i64,
    pub student_id: String,
    pub mirror_synced: bool,
}
