//! Roster endpoints: listing, add, bulk upload, delete, and the mirror download.
//!
//! Every roster mutation takes the mirror lock before touching the store and
//! keeps it until the mirror has been written, so mirror read-modify-write
//! cycles never interleave.

use axum::{
    extract::{multipart::MultipartRejection, Multipart, Path, State},
    http::{header, HeaderMap, HeaderName},
    response::{Html, IntoResponse, Response},
    Form,
};

use super::pages::DASHBOARD_PAGE;
use super::{error, success, ApiResult};
use crate::auth::CurrentUser;
use crate::errors::AppError;
use crate::models::{AddStudentForm, DashboardView, DeleteOutcome, UploadSummary};
use crate::spreadsheet::{parse_roster_upload, MirrorGuard};
use crate::AppState;

const MIRROR_STALE_HEADER: HeaderName = HeaderName::from_static("x-mirror-stale");

const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// GET /dashboard - The roster page for browsers, the JSON listing otherwise.
pub async fn show_dashboard(
    State(state): State<AppState>,
    user: CurrentUser,
    headers: HeaderMap,
) -> Response {
    if wants_html(&headers) {
        return Html(DASHBOARD_PAGE).into_response();
    }
    list_students(&state, user).await.into_response()
}

async fn list_students(state: &AppState, user: CurrentUser) -> ApiResult<DashboardView> {
    // Read the revision only once the lock is held
    let (revision_id, mirror_synced) = {
        let mut mirror = state.mirror.lock().await;
        let revision_id = match state.repo.get_revision_id().await {
            Ok(revision_id) => revision_id,
            Err(e) => return error(e, 0),
        };
        (revision_id, sync_mirror(state, &mut mirror, revision_id).await)
    };

    match state.repo.list_students().await {
        Ok(students) => success(
            DashboardView {
                username: user.username,
                role: user.role,
                students,
                mirror_stale: !mirror_synced,
            },
            revision_id,
        ),
        Err(e) => error(e, revision_id),
    }
}

/// POST /dashboard - Add one student, then return the updated listing.
pub async fn add_student(
    State(state): State<AppState>,
    user: CurrentUser,
    Form(form): Form<AddStudentForm>,
) -> ApiResult<DashboardView> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let new_student = match form.validate() {
        Ok(student) => student,
        Err(e) => return error(e, revision_id),
    };

    let mut mirror = state.mirror.lock().await;

    let committed = match state.repo.add_student(&new_student).await {
        Ok(committed) => committed,
        Err(e) => return error(e, revision_id),
    };
    tracing::info!(
        account_id = user.account_id,
        "{} added student {} (record {})",
        user.username,
        committed.value.student_id,
        committed.value.id
    );

    let mirror_synced = sync_mirror(&state, &mut mirror, committed.revision_id).await;
    drop(mirror);

    match state.repo.list_students().await {
        Ok(students) => success(
            DashboardView {
                username: user.username,
                role: user.role,
                students,
                mirror_stale: !mirror_synced,
            },
            committed.revision_id,
        ),
        Err(e) => error(e, committed.revision_id),
    }
}

/// POST /upload - Import students from an Excel file, all or nothing.
pub async fn upload_students(
    State(state): State<AppState>,
    user: CurrentUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<UploadSummary> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let bytes = match multipart {
        Ok(mut multipart) => read_upload(&mut multipart).await,
        Err(_) => Err(AppError::BadRequest("No file part".to_string())),
    };
    let bytes = match bytes {
        Ok(bytes) => bytes,
        Err(e) => return error(e, revision_id),
    };

    // Parse fully before taking the lock; a bad file changes nothing
    let students = match parse_roster_upload(&bytes) {
        Ok(students) => students,
        Err(e) => return error(e, revision_id),
    };

    let mut mirror = state.mirror.lock().await;

    let committed = match state.repo.add_students(&students).await {
        Ok(committed) => committed,
        Err(e) => return error(e, revision_id),
    };
    tracing::info!(
        account_id = user.account_id,
        "{} uploaded {} students",
        user.username,
        committed.value.len()
    );

    let mirror_synced = sync_mirror(&state, &mut mirror, committed.revision_id).await;

    success(
        UploadSummary {
            imported: committed.value.len(),
            students: committed.value,
            mirror_synced,
        },
        committed.revision_id,
    )
}

/// POST /delete/{id} - Admin only. Remove the record and mark its mirror row Deleted.
pub async fn delete_student(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<DeleteOutcome> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = user.require_admin() {
        return error(e, revision_id);
    }

    let mut mirror = state.mirror.lock().await;

    let committed = match state.repo.delete_student(id, &user.username).await {
        Ok(committed) => committed,
        Err(e) => return error(e, revision_id),
    };
    let student = committed.value;
    tracing::info!(
        account_id = user.account_id,
        "{} deleted student {} (record {})",
        user.username,
        student.student_id,
        student.id
    );

    let mirror_synced = match mirror
        .mark_deleted(&student.student_id, committed.revision_id)
        .await
    {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Patching mirror failed, rebuilding from store: {}", e);
            sync_mirror(&state, &mut mirror, committed.revision_id).await
        }
    };

    success(
        DeleteOutcome {
            id: student.id,
            student_id: student.student_id,
            mirror_synced,
        },
        committed.revision_id,
    )
}

/// GET /mirror - Download the Excel mirror, brought up to date first.
pub async fn download_mirror(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> Result<Response, AppError> {
    let mut mirror = state.mirror.lock().await;
    let revision_id = state.repo.get_revision_id().await?;
    let synced = sync_mirror(&state, &mut mirror, revision_id).await;
    let bytes = state.mirror.read_bytes().await?;
    drop(mirror);

    Ok((
        [
            (header::CONTENT_TYPE, XLSX_CONTENT_TYPE),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"students_record.xlsx\"",
            ),
            (MIRROR_STALE_HEADER, if synced { "false" } else { "true" }),
        ],
        bytes,
    )
        .into_response())
}

/// Rebuild the mirror from the store unless it already reflects `revision_id`.
///
/// Failures are logged and leave the mirror marked stale, to be retried on the
/// next read or mutation. Returns whether the mirror is in sync.
pub async fn sync_mirror(state: &AppState, mirror: &mut MirrorGuard<'_>, revision_id: i64) -> bool {
    if !mirror.is_stale(revision_id) {
        return true;
    }

    let result = match state.repo.mirror_rows().await {
        Ok(rows) => mirror.rebuild(&rows, revision_id).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => true,
        Err(e) => {
            mirror.mark_stale();
            tracing::warn!("Mirror is stale at revision {}: {}", revision_id, e);
            false
        }
    }
}

/// Whether the client asked for a page rather than data.
fn wants_html(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|accept| accept.contains("text/html"))
        .unwrap_or(false)
}

/// Pull the `file` field out of a multipart upload.
async fn read_upload(multipart: &mut Multipart) -> Result<Vec<u8>, AppError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }

        let has_name = field
            .file_name()
            .map(|name| !name.trim().is_empty())
            .unwrap_or(false);
        if !has_name {
            return Err(AppError::BadRequest("No selected file".to_string()));
        }

        let data = field.bytes().await?;
        return Ok(data.to_vec());
    }

    Err(AppError::BadRequest("No file part".to_string()))
}
