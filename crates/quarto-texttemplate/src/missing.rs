/*
 * missing.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Missing-value handling: lookup-miss policy, per-template placeholder
//! overrides and notification hooks.

use crate::lexer::Pos;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// What a field lookup on a map does when the key is absent.
///
/// Set with `Template::option("missingkey=...")`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingKey {
    /// Produce a missing value, printed as the placeholder.
    #[default]
    Default,
    /// Same as `Default`.
    Invalid,
    /// Produce `nil`.
    Zero,
    /// Stop execution with an error.
    Error,
}

impl FromStr for MissingKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(MissingKey::Default),
            "invalid" => Ok(MissingKey::Invalid),
            "zero" => Ok(MissingKey::Zero),
            "error" => Ok(MissingKey::Error),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for MissingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MissingKey::Default => "default",
            MissingKey::Invalid => "invalid",
            MissingKey::Zero => "zero",
            MissingKey::Error => "error",
        };
        f.write_str(name)
    }
}

/// A missing value that was substituted with a placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingValue<'a> {
    /// Text written in place of the value.
    pub placeholder: &'a str,
    /// Position of the action in its source.
    pub pos: Pos,
    /// Template whose body contained the action.
    pub template: &'a str,
    /// `name:line:col` of the action.
    pub location: &'a str,
}

/// Observer for missing-value substitutions. It cannot alter the output.
pub type MissingValueHook = Arc<dyn Fn(&MissingValue<'_>) + Send + Sync>;

/// Per-template missing-value settings.
#[derive(Clone, Default)]
pub(crate) struct MissingSettings {
    pub placeholder: Option<String>,
    pub hook: Option<MissingValueHook>,
}

impl fmt::Debug for MissingSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MissingSettings")
            .field("placeholder", &self.placeholder)
            .field("hook", &self.hook.as_ref().map(|_| "<fn>"))
            .finish()
    }
}
