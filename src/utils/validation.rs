//! Input validation helpers

use crate::error::{AppError, AppResult};

/// Returns the trimmed value, or a validation error naming the field
pub fn validate_not_empty<'a>(value: &'a str, field_name: &str) -> AppResult<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{} must not be empty", field_name)));
    }
    Ok(trimmed)
}
