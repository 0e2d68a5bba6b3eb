//! Data models for the admissions application.
//!
//! Form payloads arrive as loosely typed fields and are validated into the
//! typed requests defined here before any store interaction.

mod account;
mod dashboard;
mod student;

pub use account::*;
pub use dashboard::*;
pub use student::*;
