//! `qtt render`: execute a template collection against JSON data.

use std::io::{Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use quarto_texttemplate::{Template, Value};
use tracing::{debug, warn};

use super::load_collection;
use crate::config::Config;

/// Arguments for the render command
#[derive(Debug)]
pub struct RenderArgs {
    /// Template files, parsed in order into one collection
    pub templates: Vec<PathBuf>,
    /// JSON data file, `-` for stdin
    pub data: Option<String>,
    /// Template to execute
    pub name: Option<String>,
    pub no_value: Option<String>,
    pub missing_key: Option<String>,
    pub config: Option<PathBuf>,
    /// Log missing values as warnings
    pub notify: bool,
}

/// Execute the render command
pub fn execute(args: RenderArgs) -> Result<()> {
    let mut config = Config::load(args.config.as_deref())?;
    config.merge_flags(args.no_value, args.missing_key)?;

    let collection = load_collection(&args.templates, &config)?;
    if args.notify {
        install_notifier(&collection);
    }

    let data = read_data(args.data.as_deref())?;
    let name = args
        .name
        .unwrap_or_else(|| collection.name().to_string());
    debug!("Rendering template {:?}", name);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    collection
        .execute_template_with_options(&mut out, &name, &data, &config.exec_options())
        .with_context(|| format!("Failed to render template: {}", name))?;
    out.flush()?;
    Ok(())
}

/// Warn about every missing value in every template of the collection.
fn install_notifier(collection: &Template) {
    for name in collection.available_templates() {
        if let Some(mut template) = collection.lookup(&name) {
            template.on_missing_value(|missing| {
                warn!(
                    template = missing.template,
                    location = missing.location,
                    "Missing value replaced with {:?}",
                    missing.placeholder
                );
            });
        }
    }
}

/// Read JSON template data. No source means `null`.
fn read_data(source: Option<&str>) -> Result<Value> {
    let text = match source {
        None => return Ok(Value::Nil),
        Some("-") => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read data from stdin")?;
            text
        }
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read data file: {}", path))?,
    };
    let json: serde_json::Value =
        serde_json::from_str(&text).context("Template data is not valid JSON")?;
    Ok(Value::from(json))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_data_defaults_to_nil() {
        assert_eq!(read_data(None).unwrap(), Value::Nil);
    }

    #[test]
    fn test_read_data_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, r#"{"name": "Ada"}"#).unwrap();

        let data = read_data(path.to_str()).unwrap();
        assert_eq!(data.get("name"), Some(&Value::from("Ada")));
    }

    #[test]
    fn test_read_data_rejects_invalid_json() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = read_data(path.to_str()).unwrap_err();
        assert_eq!(err.to_string(), "Template data is not valid JSON");
    }
}
