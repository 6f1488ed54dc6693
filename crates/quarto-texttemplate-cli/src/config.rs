//! TOML configuration for `qtt`.
//!
//! ```toml
//! no_value = "N/A"
//! missing_key = "error"
//! max_depth = 100
//! left_delim = "[["
//! right_delim = "]]"
//! ```
//!
//! Command-line flags override values from the file.

use anyhow::{Context, Result};
use quarto_texttemplate::{DEFAULT_MAX_DEPTH, ExecOptions, MissingKey};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub no_value: Option<String>,
    pub missing_key: Option<MissingKey>,
    pub max_depth: Option<usize>,
    pub left_delim: Option<String>,
    pub right_delim: Option<String>,
}

impl Config {
    /// Load the file at `path`, or the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Apply command-line overrides.
    pub fn merge_flags(&mut self, no_value: Option<String>, missing_key: Option<String>) -> Result<()> {
        if no_value.is_some() {
            self.no_value = no_value;
        }
        if let Some(policy) = missing_key {
            let policy = policy
                .parse::<MissingKey>()
                .map_err(|bad| anyhow::anyhow!("Unknown missing key policy: {}", bad))?;
            self.missing_key = Some(policy);
        }
        Ok(())
    }

    pub fn exec_options(&self) -> ExecOptions {
        ExecOptions {
            no_value: self.no_value.clone(),
            max_depth: self.max_depth.unwrap_or(DEFAULT_MAX_DEPTH),
        }
    }
}
