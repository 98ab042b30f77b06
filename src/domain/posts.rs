//! Rules for post and comment bodies.

use super::error::DomainError;

/// Length limit used when the configuration does not set one.
pub const DEFAULT_MAX_BODY_CHARS: usize = 280;

/// A body is blank when it holds nothing but whitespace.
pub fn is_blank(body: &str) -> bool {
    body.trim().is_empty()
}

/// Check `body` against the length limit, counted in characters.
pub fn validate_length(body: &str, max_chars: usize) -> Result<(), DomainError> {
    let length = body.chars().count();
    if length > max_chars {
        return Err(DomainError::validation(format!(
            "body has {length} characters, limit is {max_chars}"
        )));
    }
    Ok(())
}
