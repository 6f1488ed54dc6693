/*
 * lib.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Go `text/template`-compatible template engine for Quarto.
//!
//! This crate parses and executes templates written in the syntax of Go's
//! [`text/template`](https://pkg.go.dev/text/template) package:
//!
//! - Actions: `{{.Field}}`, `{{$var}}`, `{{printf "%d" .Count}}`
//! - Pipelines: `{{.Name | html}}`
//! - Control structures: `{{if}}`, `{{range}}`, `{{with}}`, `{{break}}`, `{{continue}}`
//! - Named templates: `{{define "x"}}`, `{{template "x" .}}`, `{{block "x" .}}`
//! - Trim markers `{{-` / `-}}` and comments `{{/* ... */}}`
//!
//! It adds two helpers on top of the standard behavior:
//!
//! - [`Template::available_templates`] lists the templates of a collection
//!   that have been fully parsed.
//! - The missing-value placeholder (`<no value>` by default) is configurable
//!   process-wide with [`set_no_value`], per execution with
//!   [`ExecOptions::no_value`], and per template with
//!   [`Template::set_missing_value`]. [`Template::on_missing_value`] observes
//!   each substitution.
//!
//! # Example
//!
//! ```
//! use quarto_texttemplate::{Template, Value};
//!
//! let mut t = Template::new("page");
//! t.parse(r#"{{define "row"}}- {{.}}
//! {{end}}{{range .items}}{{template "row" .}}{{end}}{{.footer}}"#)
//!     .unwrap();
//!
//! assert_eq!(t.available_templates(), vec!["page", "row"]);
//!
//! let data = Value::map([("items", Value::from(vec!["a", "b"]))]);
//! let out = t.render(&data).unwrap();
//! assert_eq!(out, "- a\n- b\n<no value>");
//! ```

pub mod ast;
pub mod error;
pub mod exec;
pub mod funcs;
pub mod lexer;
pub mod missing;
pub mod nodata;
mod parser;
pub mod template;
pub mod value;

// Re-export main types at crate root
pub use error::{ExecError, FuncError, ParseError, TemplateError, TemplateResult};
pub use exec::{DEFAULT_MAX_DEPTH, ExecOptions};
pub use funcs::{Func, FuncMap};
pub use missing::{MissingKey, MissingValue, MissingValueHook};
pub use nodata::{NO_VALUE_DEFAULT, no_value, reset_no_value, set_no_value};
pub use template::{Template, TemplateEntry};
pub use value::Value;
