/*
 * nodata.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Process-wide placeholder printed for missing values.
//!
//! The placeholder is shared by every template collection in the process.
//! Executions read it once when they start (see [`crate::exec`]), so a
//! concurrent [`set_no_value`] affects only executions that begin after it.

use once_cell::sync::Lazy;
use std::sync::{PoisonError, RwLock};

/// The placeholder printed when no other has been configured.
pub const NO_VALUE_DEFAULT: &str = "<no value>";

static NO_VALUE: Lazy<RwLock<String>> = Lazy::new(|| RwLock::new(NO_VALUE_DEFAULT.to_string()));

/// Replace the placeholder for all subsequent executions.
///
/// Any string is accepted, including the empty string.
pub fn set_no_value(placeholder: impl Into<String>) {
    let placeholder = placeholder.into();
    tracing::debug!(placeholder = %placeholder, "setting missing-value placeholder");
    // A poisoned lock still holds a valid String.
    let mut guard = NO_VALUE.write().unwrap_or_else(PoisonError::into_inner);
    *guard = placeholder;
}

/// The current placeholder.
pub fn no_value() -> String {
    NO_VALUE
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Restore [`NO_VALUE_DEFAULT`].
pub fn reset_no_value() {
    set_no_value(NO_VALUE_DEFAULT);
}
