//! Excel I/O shared by the roster mirror and bulk import.
//!
//! Reading goes through calamine, writing through rust_xlsxwriter.

mod import;
mod mirror;

pub use import::*;
pub use mirror::*;

use std::io::Cursor;

use calamine::{open_workbook_from_rs, Data, Reader, Xlsx};

use crate::errors::AppError;

/// Load every row of the first worksheet. The first row is the header.
pub fn read_first_sheet(bytes: &[u8]) -> Result<Vec<Vec<Data>>, AppError> {
    let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| AppError::Validation("Workbook contains no worksheets".to_string()))??;

    Ok(range.rows().map(|row| row.to_vec()).collect())
}

/// Normalize a header cell: trimmed, lowercase.
pub fn normalize_header(cell: &Data) -> String {
    cell_text(cell).to_lowercase()
}

/// Trimmed display text of a cell. Integral floats render without a fraction.
pub fn cell_text(cell: &Data) -> String {
    cell.to_string().trim().to_string()
}

/// Whether a cell holds nothing but whitespace.
pub fn is_blank(cell: &Data) -> bool {
    match cell {
        Data::Empty => true,
        Data::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Read a cell as a whole number, accepting integral floats and numeric text.
pub fn cell_whole_number(cell: &Data) -> Option<i64> {
    // Beyond 2^53 floats no longer represent every integer
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0;

    match cell {
        Data::Int(i) => Some(*i),
        Data::Float(f) if f.is_finite() && f.fract() == 0.0 && f.abs() <= MAX_EXACT => {
            Some(*f as i64)
        }
        Data::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_whole_number() {
        assert_eq!(cell_whole_number(&Data::Float(20.0)), Some(20));
        assert_eq!(cell_whole_number(&Data::Int(7)), Some(7));
        assert_eq!(cell_whole_number(&Data::String(" 12 ".into())), Some(12));
        assert_eq!(cell_whole_number(&Data::Float(20.5)), None);
        assert_eq!(cell_whole_number(&Data::String("S100".into())), None);
        assert_eq!(cell_whole_number(&Data::Empty), None);
    }

    #[test]
    fn test_header_normalization() {
        assert_eq!(
            normalize_header(&Data::String("  Student ID ".into())),
            "student id"
        );
    }

    #[test]
    fn test_blank_cells() {
        assert!(is_blank(&Data::Empty));
        assert!(is_blank(&Data::String("   ".into())));
        assert!(!is_blank(&Data::Float(0.0)));
    }

    #[test]
    fn test_garbage_bytes_rejected() {
        let err = read_first_sheet(b"definitely not a workbook").unwrap_err();
        assert!(matches!(err, AppError::Mirror(_)));
    }
}
