//! `qtt list`: print the fully parsed templates of a collection.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;

use super::load_collection;
use crate::config::Config;

/// Arguments for the list command
#[derive(Debug)]
pub struct ListArgs {
    pub templates: Vec<PathBuf>,
    pub config: Option<PathBuf>,
}

/// Execute the list command
pub fn execute(args: ListArgs) -> Result<()> {
    let config = Config::load(args.config.as_deref())?;
    let collection = load_collection(&args.templates, &config)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for name in collection.available_templates() {
        writeln!(out, "{}", name)?;
    }
    out.flush()?;
    Ok(())
}
