//! Command implementations for qtt

pub mod list;
pub mod render;

use crate::config::Config;
use anyhow::{Context, Result};
use quarto_texttemplate::Template;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name a template file is registered under: its file stem.
fn template_name(path: &Path) -> Result<String> {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .with_context(|| format!("Template path has no file name: {}", path.display()))
}

fn parse_file(template: &mut Template, path: &Path) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read template: {}", path.display()))?;
    template
        .parse(&text)
        .with_context(|| format!("Failed to parse template: {}", path.display()))?;
    debug!("Parsed {} as {:?}", path.display(), template.name());
    Ok(())
}

/// Parse every file into one collection named after the first file.
pub fn load_collection(paths: &[PathBuf], config: &Config) -> Result<Template> {
    let Some((first, rest)) = paths.split_first() else {
        anyhow::bail!("No template files given");
    };

    let mut root = Template::new(template_name(first)?);
    root.delims(
        config.left_delim.as_deref().unwrap_or_default(),
        config.right_delim.as_deref().unwrap_or_default(),
    );
    if let Some(policy) = config.missing_key {
        root.option(&format!("missingkey={}", policy))?;
    }

    parse_file(&mut root, first)?;
    for path in rest {
        let mut template = root.new_template(template_name(path)?);
        parse_file(&mut template, path)?;
    }
    Ok(root)
}
