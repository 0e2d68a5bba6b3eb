//! Account model and the registration/login forms.

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// Role attached to an account; gates destructive roster operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }

    /// Parse a role name, case-insensitively.
    pub fn parse(s: &str) -> Option<Role> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "user" => Some(Role::User),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered account.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub role: Role,
}

/// Raw registration form fields.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// Validated registration request.
#[derive(Debug, Clone)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub role: Role,
}

impl RegisterForm {
    pub fn validate(self) -> Result<RegisterRequest, AppError> {
        let username = required_trimmed(self.username, "Username")?;
        let password = required_raw(self.password, "Password")?;

        let role = match self.role.as_deref().map(str::trim) {
            None | Some("") => Role::User,
            Some(raw) => Role::parse(raw).ok_or_else(|| {
                AppError::Validation(format!("Role must be 'admin' or 'user', got '{}'", raw))
            })?,
        };

        Ok(RegisterRequest {
            username,
            password,
            role,
        })
    }
}

/// Raw login form fields.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Validated login request.
#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl LoginForm {
    pub fn validate(self) -> Result<LoginRequest, AppError> {
        Ok(LoginRequest {
            username: required_trimmed(self.username, "Username")?,
            password: required_raw(self.password, "Password")?,
        })
    }
}

pub(crate) fn required_trimmed(value: Option<String>, label: &str) -> Result<String, AppError> {
    let trimmed = value.as_deref().map(str::trim).unwrap_or_default();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{} is required", label)));
    }
    Ok(trimmed.to_string())
}

// Passwords are kept byte-for-byte; surrounding whitespace is significant.
fn required_raw(value: Option<String>, label: &str) -> Result<String, AppError> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(AppError::Validation(format!("{} is required", label))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_defaults_to_user_role() {
        let req = RegisterForm {
            username: Some("  alice ".into()),
            password: Some("pw".into()),
            role: None,
        }
        .validate()
        .unwrap();
        assert_eq!(req.username, "alice");
        assert_eq!(req.role, Role::User);
    }

    #[test]
    fn test_register_accepts_admin_case_insensitive() {
        let req = RegisterForm {
            username: Some("root".into()),
            password: Some("pw".into()),
            role: Some("Admin".into()),
        }
        .validate()
        .unwrap();
        assert_eq!(req.role, Role::Admin);
    }

    #[test]
    fn test_register_rejects_unknown_role() {
        let err = RegisterForm {
            username: Some("bob".into()),
            password: Some("pw".into()),
            role: Some("superuser".into()),
        }
        .validate()
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_login_requires_fields() {
        assert!(LoginForm::default().validate().is_err());
        assert!(LoginForm {
            username: Some("alice".into()),
            password: Some(String::new()),
        }
        .validate()
        .is_err());
    }

    #[test]
    fn test_role_serializes_lowercase() {
        assert_eq!(serde_json::to_value(Role::Admin).unwrap(), "admin");
        assert_eq!(serde_json::to_value(Role::User).unwrap(), "user");
    }
}
