//! Category tree constants and input validation.
//!
//! Covers the business metadata the ordering engine does not own: tree and
//! node name rules, tree type codes, and the bounds on a caller-supplied
//! layer limit.

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum allowed length for a tree or node name.
pub const MAX_NAME_LENGTH: usize = 128;

/// Maximum allowed length for a tree description.
pub const MAX_DESCRIPTION_LENGTH: usize = 255;

/// Layer limit used when neither the request nor the environment sets one.
pub const DEFAULT_MAX_LAYER: i64 = 20;

/// Upper bound accepted for any caller-supplied layer limit.
pub const MAX_LAYER_LIMIT: i64 = 64;

/// Tree type: built-in tree shipped with the platform.
pub const CATEGORY_TYPE_SYSTEM: i16 = 1;

/// Tree type: tree created by an administrator.
pub const CATEGORY_TYPE_CUSTOM: i16 = 2;

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a tree or node name: non-empty, trimmed, and within
/// [`MAX_NAME_LENGTH`] characters.
pub fn validate_name(kind: &str, name: &str) -> Result<(), CoreError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation(format!("{kind} name must not be empty")));
    }
    if trimmed.len() != name.len() {
        return Err(CoreError::Validation(format!(
            "{kind} name must not have leading or trailing whitespace"
        )));
    }
    let len = name.chars().count();
    if len > MAX_NAME_LENGTH {
        return Err(CoreError::Validation(format!(
            "{kind} name must not exceed {MAX_NAME_LENGTH} characters, got {len}"
        )));
    }
    Ok(())
}

/// Validate an optional tree description against [`MAX_DESCRIPTION_LENGTH`].
pub fn validate_description(description: Option<&str>) -> Result<(), CoreError> {
    if let Some(text) = description {
        let len = text.chars().count();
        if len > MAX_DESCRIPTION_LENGTH {
            return Err(CoreError::Validation(format!(
                "Description must not exceed {MAX_DESCRIPTION_LENGTH} characters, got {len}"
            )));
        }
    }
    Ok(())
}

/// Validate a tree type code.
pub fn validate_category_type(category_type: i16) -> Result<(), CoreError> {
    match category_type {
        CATEGORY_TYPE_SYSTEM | CATEGORY_TYPE_CUSTOM => Ok(()),
        other => Err(CoreError::Validation(format!(
            "Unknown category type {other}"
        ))),
    }
}

/// Validate a layer limit: at least one layer, at most [`MAX_LAYER_LIMIT`].
pub fn validate_max_layer(max_layer: i64) -> Result<(), CoreError> {
    if !(1..=MAX_LAYER_LIMIT).contains(&max_layer) {
        return Err(CoreError::Validation(format!(
            "max_layer must be between 1 and {MAX_LAYER_LIMIT}, got {max_layer}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
