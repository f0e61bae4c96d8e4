//! Schema validation for submitted credentials.

use serde::Deserialize;

/// Login form fields as submitted
#[derive(Debug, Clone, Deserialize)]
pub struct LoginValues {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    Required(&'static str),
    /// Missing fields, wrong types or wrong content type
    #[error("Invalid login form")]
    Malformed,
}

/// Trim both fields and require them to be non-empty.
pub fn parse_login(values: LoginValues) -> Result<LoginValues, ValidationError> {
    let username = values.username.trim();
    let password = values.password.trim();

    if username.is_empty() {
        return Err(ValidationError::Required("Username"));
    }
    if password.is_empty() {
        return Err(ValidationError::Required("Password"));
    }

    Ok(LoginValues {
        username: username.to_string(),
        password: password.to_string(),
    })
}
