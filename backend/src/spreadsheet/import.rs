//! Bulk roster import from an uploaded Excel file.

use std::collections::{HashMap, HashSet};

use calamine::Data;

use super::{cell_text, cell_whole_number, is_blank, normalize_header, read_first_sheet};
use crate::errors::AppError;
use crate::models::NewStudent;

/// Columns an upload must contain, after header normalization.
pub const REQUIRED_COLUMNS: [&str; 3] = ["student id", "name", "age"];

static EMPTY_CELL: Data = Data::Empty;

pub const INVALID_FORMAT_MESSAGE: &str =
    "Invalid Excel format. Ensure columns: \"Student ID\", \"Name\", \"Age\".";

/// Parse an uploaded roster into validated students.
///
/// Any bad header, bad row, or duplicate Student ID rejects the whole file, so
/// the caller can commit the result as a single all-or-nothing batch.
pub fn parse_roster_upload(bytes: &[u8]) -> Result<Vec<NewStudent>, AppError> {
    let rows = read_first_sheet(bytes).map_err(|e| {
        AppError::Validation(format!("Error reading Excel file: {}", e.message()))
    })?;

    // Sheet row numbers are 1-based and count the header
    let mut rows = rows
        .iter()
        .enumerate()
        .map(|(index, cells)| (index + 1, cells))
        .filter(|(_, cells)| !cells.iter().all(is_blank));

    let Some((_, header)) = rows.next() else {
        return Err(AppError::Validation(INVALID_FORMAT_MESSAGE.to_string()));
    };

    let columns: HashMap<String, usize> = header
        .iter()
        .enumerate()
        .map(|(index, cell)| (normalize_header(cell), index))
        .rev() // first occurrence wins on duplicate headers
        .collect();

    let mut positions = [0usize; 3];
    for (slot, name) in positions.iter_mut().zip(REQUIRED_COLUMNS) {
        *slot = *columns
            .get(name)
            .ok_or_else(|| AppError::Validation(INVALID_FORMAT_MESSAGE.to_string()))?;
    }
    let [id_col, name_col, age_col] = positions;

    let mut seen = HashSet::new();
    let mut students = Vec::new();
    for (row_num, cells) in rows {
        let cell = |col: usize| cells.get(col).unwrap_or(&EMPTY_CELL);

        let student_id = cell_whole_number(cell(id_col))
            .map(|id| id.to_string())
            .ok_or_else(|| {
                AppError::Validation(format!(
                    "Row {}: Student ID must be a whole number, got '{}'",
                    row_num,
                    cell_text(cell(id_col))
                ))
            })?;

        let name = cell_text(cell(name_col));
        if name.is_empty() {
            return Err(AppError::Validation(format!(
                "Row {}: Name is required",
                row_num
            )));
        }

        let age = cell_whole_number(cell(age_col))
            .and_then(|age| u32::try_from(age).ok())
            .filter(|age| *age > 0)
            .ok_or_else(|| {
                AppError::Validation(format!(
                    "Row {}: Age must be a positive whole number, got '{}'",
                    row_num,
                    cell_text(cell(age_col))
                ))
            })?;

        if !seen.insert(student_id.clone()) {
            return Err(AppError::Conflict(format!(
                "Student ID {} appears more than once in the upload",
                student_id
            )));
        }

        students.push(NewStudent {
            student_id,
            name,
            age,
        });
    }

    if students.is_empty() {
        return Err(AppError::Validation(
            "The spreadsheet contains no student rows".to_string(),
        ));
    }

    Ok(students)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::Workbook;

    /// Build an xlsx in memory. Numeric-looking cells are written as numbers,
    /// empty strings are left blank.
    fn workbook_bytes(rows: &[&[&str]]) -> Vec<u8> {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        for (r, row) in (0u32..).zip(rows) {
            for (c, value) in (0u16..).zip(row.iter()) {
                if value.is_empty() {
                    continue;
                }
                match value.parse::<f64>() {
                    Ok(n) => worksheet.write_number(r, c, n).unwrap(),
                    Err(_) => worksheet.write_string(r, c, *value).unwrap(),
                };
            }
        }
        workbook.save_to_buffer().unwrap()
    }

    #[test]
    fn test_parses_rows_with_normalized_headers() {
        let bytes = workbook_bytes(&[
            &[" Student ID ", "NAME", "Age", "Notes"],
            &["100", "  Alice ", "20", "x"],
            &["101", "Bob", "21", ""],
        ]);

        let students = parse_roster_upload(&bytes).unwrap();
        assert_eq!(
            students,
            vec![
                NewStudent {
                    student_id: "100".into(),
                    name: "Alice".into(),
                    age: 20
                },
                NewStudent {
                    student_id: "101".into(),
                    name: "Bob".into(),
                    age: 21
                },
            ]
        );
    }

    #[test]
    fn test_drops_fully_empty_rows() {
        let bytes = workbook_bytes(&[
            &["Student ID", "Name", "Age"],
            &["1", "Ann", "18"],
            &["", "", ""],
            &["", "   ", ""],
            &["2", "Ben", "19"],
        ]);

        assert_eq!(parse_roster_upload(&bytes).unwrap().len(), 2);
    }

    #[test]
    fn test_missing_columns_rejected() {
        let bytes = workbook_bytes(&[&["Roll", "Name"], &["1", "Ann"]]);
        let err = parse_roster_upload(&bytes).unwrap_err();
        assert_eq!(err.message(), INVALID_FORMAT_MESSAGE);
    }

    #[test]
    fn test_non_numeric_age_names_row() {
        let bytes = workbook_bytes(&[
            &["Student ID", "Name", "Age"],
            &["1", "Ann", "18"],
            &["2", "Ben", "old"],
        ]);

        let err = parse_roster_upload(&bytes).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(err.message().starts_with("Row 3:"), "{}", err.message());
    }

    #[test]
    fn test_non_numeric_student_id_rejected() {
        let bytes = workbook_bytes(&[&["Student ID", "Name", "Age"], &["S100", "Ann", "18"]]);
        let err = parse_roster_upload(&bytes).unwrap_err();
        assert!(err.message().contains("Student ID must be a whole number"));
    }

    #[test]
    fn test_duplicate_ids_within_upload_conflict() {
        let bytes = workbook_bytes(&[
            &["Student ID", "Name", "Age"],
            &["5", "Ann", "18"],
            &["5", "Ann Again", "18"],
        ]);
        assert!(matches!(
            parse_roster_upload(&bytes).unwrap_err(),
            AppError::Conflict(_)
        ));
    }

    #[test]
    fn test_header_only_is_rejected() {
        let bytes = workbook_bytes(&[&["Student ID", "Name", "Age"]]);
        assert!(parse_roster_upload(&bytes).is_err());
    }

    #[test]
    fn test_unreadable_file_is_validation_error() {
        let err = parse_roster_upload(b"not an xlsx").unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
