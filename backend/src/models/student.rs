//! Student roster records and their spreadsheet mirror rows.

use serde::{Deserialize, Serialize};

use super::account::required_trimmed;
use crate::errors::AppError;

/// A student record in the authoritative store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: i64,
    pub student_id: String,
    pub name: String,
    pub age: u32,
}

/// A validated student ready to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStudent {
    pub student_id: String,
    pub name: String,
    pub age: u32,
}

/// Raw "add student" form fields from the dashboard.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AddStudentForm {
    #[serde(default)]
    pub student_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub age: Option<String>,
}

impl AddStudentForm {
    pub fn validate(self) -> Result<NewStudent, AppError> {
        let student_id = required_trimmed(self.student_id, "Student ID")?;
        let name = required_trimmed(self.name, "Name")?;
        let age = required_trimmed(self.age, "Age")?;

        Ok(NewStudent {
            student_id,
            name,
            age: parse_age(&age)?,
        })
    }
}

/// Parse a positive whole-number age.
pub fn parse_age(raw: &str) -> Result<u32, AppError> {
    match raw.trim().parse::<u32>() {
        Ok(age) if age > 0 => Ok(age),
        _ => Err(AppError::Validation(format!(
            "Age must be a positive whole number, got '{}'",
            raw.trim()
        ))),
    }
}

/// Status column of the spreadsheet mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorStatus {
    Active,
    Deleted,
}

impl MirrorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MirrorStatus::Active => "Active",
            MirrorStatus::Deleted => "Deleted",
        }
    }

    pub fn parse(s: &str) -> Option<MirrorStatus> {
        match s.trim() {
            "Active" => Some(MirrorStatus::Active),
            "Deleted" => Some(MirrorStatus::Deleted),
            _ => None,
        }
    }
}

/// One row of the spreadsheet mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorRow {
    pub student_id: String,
    pub name: String,
    pub age: u32,
    pub status: MirrorStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_student_form_trims_and_parses() {
        let student = AddStudentForm {
            student_id: Some(" S100 ".into()),
            name: Some("Alice ".into()),
            age: Some(" 20".into()),
        }
        .validate()
        .unwrap();
        assert_eq!(
            student,
            NewStudent {
                student_id: "S100".into(),
                name: "Alice".into(),
                age: 20
            }
        );
    }

    #[test]
    fn test_non_numeric_age_is_validation_error() {
        let err = AddStudentForm {
            student_id: Some("S1".into()),
            name: Some("Bob".into()),
            age: Some("twenty".into()),
        }
        .validate()
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_age_must_be_positive() {
        assert!(parse_age("0").is_err());
        assert!(parse_age("-3").is_err());
        assert!(parse_age("4.5").is_err());
        assert_eq!(parse_age("17").unwrap(), 17);
    }

    #[test]
    fn test_missing_name_rejected() {
        let err = AddStudentForm {
            student_id: Some("S1".into()),
            name: Some("   ".into()),
            age: Some("18".into()),
        }
        .validate()
        .unwrap_err();
        assert_eq!(err.message(), "Name is required");
    }
}
