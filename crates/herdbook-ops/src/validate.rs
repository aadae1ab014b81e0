//! Input checks shared by the managers. All of them run before a unit of
//! work is opened.

use std::collections::HashSet;

use herdbook_core::error::{HerdError, HerdResult};
use uuid::Uuid;

/// Trimmed value of a required text field.
pub(crate) fn required(field: &str, value: &str) -> HerdResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(HerdError::validation(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

/// Trimmed value of an optional text field; blank becomes `None`.
pub(crate) fn optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// A batch of animal ids: non-empty, no duplicates, at most `max` long.
pub(crate) fn animal_batch(ids: &[Uuid], max: usize) -> HerdResult<()> {
    if ids.is_empty() {
        return Err(HerdError::validation("animal_ids must not be empty"));
    }
    if ids.len() > max {
        return Err(HerdError::validation(format!(
            "at most {max} animals per call, got {}",
            ids.len()
        )));
    }
    let mut seen = HashSet::with_capacity(ids.len());
    if let Some(dup) = ids.iter().find(|id| !seen.insert(**id)) {
        return Err(HerdError::validation(format!(
            "animal {dup} is listed more than once"
        )));
    }
    Ok(())
}
