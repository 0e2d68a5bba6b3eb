//! On-disk Excel mirror of the roster.
//!
//! The mirror is a derived read model: its content can always be regenerated
//! from the store. All writes go through [`MirrorGuard`], so a request holds the
//! mirror lock across its store mutation and the matching mirror write.

use std::path::{Path, PathBuf};

use calamine::Data;
use rust_xlsxwriter::Workbook;
use tokio::sync::{Mutex, MutexGuard};

use super::{cell_text, cell_whole_number, normalize_header, read_first_sheet};
use crate::errors::AppError;
use crate::models::{MirrorRow, MirrorStatus};

/// Fixed header row of the mirror.
pub const MIRROR_HEADER: [&str; 4] = ["Student ID", "Name", "Age", "Status"];

#[derive(Debug, Default)]
struct MirrorState {
    /// Store revision the file on disk reflects; `None` when unknown or stale
    synced_revision: Option<i64>,
}

/// Excel mirror of the student roster.
pub struct StudentMirror {
    path: PathBuf,
    state: Mutex<MirrorState>,
}

impl StudentMirror {
    /// Open the mirror at `path`, creating a header-only workbook if none exists.
    pub async fn open(path: &Path) -> Result<Self, AppError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mirror = Self {
            path: path.to_path_buf(),
            state: Mutex::new(MirrorState::default()),
        };

        if !tokio::fs::try_exists(path).await? {
            write_atomically(path, &render_workbook(&[])?).await?;
            tracing::info!("Created empty roster mirror at {:?}", path);
        }

        Ok(mirror)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Acquire exclusive access to the mirror.
    pub async fn lock(&self) -> MirrorGuard<'_> {
        MirrorGuard {
            mirror: self,
            state: self.state.lock().await,
        }
    }

    /// Raw workbook bytes, for download.
    pub async fn read_bytes(&self) -> Result<Vec<u8>, AppError> {
        Ok(tokio::fs::read(&self.path).await?)
    }

    /// Parse the mirror file back into rows.
    pub async fn read_rows(&self) -> Result<Vec<MirrorRow>, AppError> {
        let bytes = self.read_bytes().await?;
        parse_mirror(&bytes)
    }
}

/// Exclusive handle on the mirror.
pub struct MirrorGuard<'a> {
    mirror: &'a StudentMirror,
    state: MutexGuard<'a, MirrorState>,
}

impl MirrorGuard<'_> {
    /// Whether the file on disk lags behind `revision_id`.
    pub fn is_stale(&self, revision_id: i64) -> bool {
        self.state.synced_revision != Some(revision_id)
    }

    pub fn mark_stale(&mut self) {
        self.state.synced_revision = None;
    }

    /// Rewrite the whole mirror from `rows`.
    pub async fn rebuild(&mut self, rows: &[MirrorRow], revision_id: i64) -> Result<(), AppError> {
        let result = match render_workbook(rows) {
            Ok(bytes) => write_atomically(&self.mirror.path, &bytes).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                self.state.synced_revision = Some(revision_id);
                tracing::debug!("Mirror rebuilt with {} rows at revision {}", rows.len(), revision_id);
                Ok(())
            }
            Err(e) => {
                self.mark_stale();
                Err(e)
            }
        }
    }

    /// Patch the status of `student_id` to Deleted in place.
    ///
    /// Only valid when the file reflected the revision right before
    /// `revision_id`; otherwise the caller must rebuild.
    pub async fn mark_deleted(&mut self, student_id: &str, revision_id: i64) -> Result<(), AppError> {
        if self.is_stale(revision_id - 1) {
            self.mark_stale();
            return Err(AppError::Mirror(
                "Mirror is stale; cannot patch in place".to_string(),
            ));
        }

        let mut rows = match self.mirror.read_rows().await {
            Ok(rows) => rows,
            Err(e) => {
                self.mark_stale();
                return Err(e);
            }
        };

        let mut matched = 0;
        for row in rows.iter_mut().filter(|r| r.student_id == student_id) {
            row.status = MirrorStatus::Deleted;
            matched += 1;
        }

        if matched == 0 {
            self.mark_stale();
            return Err(AppError::Mirror(format!(
                "Student ID {} is not present in the mirror",
                student_id
            )));
        }

        self.rebuild(&rows, revision_id).await
    }
}

fn render_workbook(rows: &[MirrorRow]) -> Result<Vec<u8>, AppError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();

    for (col, title) in (0u16..).zip(MIRROR_HEADER) {
        worksheet.write_string(0, col, title)?;
    }

    for (row_num, row) in (1u32..).zip(rows) {
        worksheet.write_string(row_num, 0, &row.student_id)?;
        worksheet.write_string(row_num, 1, &row.name)?;
        worksheet.write_number(row_num, 2, f64::from(row.age))?;
        worksheet.write_string(row_num, 3, row.status.as_str())?;
    }

    Ok(workbook.save_to_buffer()?)
}

fn parse_mirror(bytes: &[u8]) -> Result<Vec<MirrorRow>, AppError> {
    let rows = read_first_sheet(bytes)?;
    let Some((header, body)) = rows.split_first() else {
        return Ok(Vec::new());
    };

    let headers: Vec<String> = header.iter().map(normalize_header).collect();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h == &name.to_lowercase())
            .ok_or_else(|| AppError::Mirror(format!("Mirror is missing the '{}' column", name)))
    };
    let [id_col, name_col, age_col, status_col] = [
        column(MIRROR_HEADER[0])?,
        column(MIRROR_HEADER[1])?,
        column(MIRROR_HEADER[2])?,
        column(MIRROR_HEADER[3])?,
    ];

    body.iter()
        .enumerate()
        .map(|(index, cells)| {
            let cell = |col: usize| cells.get(col).cloned().unwrap_or(Data::Empty);
            let invalid = |what: &str| {
                AppError::Mirror(format!("Mirror row {} has an invalid {}", index + 2, what))
            };

            let age = cell_whole_number(&cell(age_col))
                .and_then(|a| u32::try_from(a).ok())
                .ok_or_else(|| invalid("age"))?;
            let status =
                MirrorStatus::parse(&cell_text(&cell(status_col))).ok_or_else(|| invalid("status"))?;

            Ok(MirrorRow {
                student_id: cell_text(&cell(id_col)),
                name: cell_text(&cell(name_col)),
                age,
                status,
            })
        })
        .collect()
}

async fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), AppError> {
    let tmp = path.with_extension("xlsx.tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn row(student_id: &str, name: &str, age: u32, status: MirrorStatus) -> MirrorRow {
        MirrorRow {
            student_id: student_id.to_string(),
            name: name.to_string(),
            age,
            status,
        }
    }

    #[tokio::test]
    async fn test_open_creates_header_only_mirror() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("students.xlsx");

        let mirror = StudentMirror::open(&path).await.unwrap();
        assert!(path.exists());
        assert!(mirror.read_rows().await.unwrap().is_empty());

        let sheet = read_first_sheet(&mirror.read_bytes().await.unwrap()).unwrap();
        let header: Vec<String> = sheet[0].iter().map(cell_text).collect();
        assert_eq!(header, MIRROR_HEADER);
    }

    #[tokio::test]
    async fn test_rebuild_then_patch_keeps_row_count() {
        let temp_dir = TempDir::new().unwrap();
        let mirror = StudentMirror::open(&temp_dir.path().join("m.xlsx"))
            .await
            .unwrap();

        let rows = vec![
            row("S100", "Alice", 20, MirrorStatus::Active),
            row("S101", "Bob", 21, MirrorStatus::Active),
        ];
        {
            let mut guard = mirror.lock().await;
            guard.rebuild(&rows, 1).await.unwrap();
            assert!(!guard.is_stale(1));
            guard.mark_deleted("S100", 2).await.unwrap();
            assert!(!guard.is_stale(2));
        }

        let on_disk = mirror.read_rows().await.unwrap();
        assert_eq!(on_disk.len(), 2);
        assert_eq!(on_disk[0], row("S100", "Alice", 20, MirrorStatus::Deleted));
        assert_eq!(on_disk[1], row("S101", "Bob", 21, MirrorStatus::Active));
    }

    #[tokio::test]
    async fn test_patch_unknown_student_marks_stale() {
        let temp_dir = TempDir::new().unwrap();
        let mirror = StudentMirror::open(&temp_dir.path().join("m.xlsx"))
            .await
            .unwrap();

        let mut guard = mirror.lock().await;
        guard
            .rebuild(&[row("S1", "Ann", 18, MirrorStatus::Active)], 1)
            .await
            .unwrap();

        let err = guard.mark_deleted("S999", 2).await.unwrap_err();
        assert!(matches!(err, AppError::Mirror(_)));
        assert!(guard.is_stale(1));
        assert!(guard.is_stale(2));
    }

    #[tokio::test]
    async fn test_patch_refused_when_mirror_lags() {
        let temp_dir = TempDir::new().unwrap();
        let mirror = StudentMirror::open(&temp_dir.path().join("m.xlsx"))
            .await
            .unwrap();

        let mut guard = mirror.lock().await;
        guard
            .rebuild(&[row("S1", "Ann", 18, MirrorStatus::Active)], 1)
            .await
            .unwrap();

        // Revision 2 was never written, so revision 3 cannot be a patch
        assert!(guard.mark_deleted("S1", 3).await.is_err());
    }

    #[tokio::test]
    async fn test_failed_write_marks_stale() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("m.xlsx");
        let mirror = StudentMirror::open(&path).await.unwrap();

        let mut guard = mirror.lock().await;
        guard.rebuild(&[], 1).await.unwrap();

        // Occupy the temp path with a directory so the write fails
        std::fs::create_dir(path.with_extension("xlsx.tmp")).unwrap();
        assert!(guard.rebuild(&[], 2).await.is_err());
        assert!(guard.is_stale(1));
        assert!(guard.is_stale(2));
    }
}
