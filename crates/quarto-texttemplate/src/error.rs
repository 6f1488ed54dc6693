/*
 * error.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Error types for template parsing and execution.

use thiserror::Error;

/// An error raised while lexing or parsing template source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("template: {name}:{line}: {message}")]
pub struct ParseError {
    /// Name of the template being parsed.
    pub name: String,
    /// 1-based line of the offending token.
    pub line: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(name: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            line,
            message: message.into(),
        }
    }
}

/// An error raised while executing a parsed template.
#[derive(Debug, Error)]
pub enum ExecError {
    /// Evaluation failed at a specific node.
    #[error("template: {location}: executing \"{name}\" at <{context}>: {message}")]
    Exec {
        /// Template whose body was executing.
        name: String,
        /// `name:line:col` of the failing node.
        location: String,
        /// Source text of the failing node.
        context: String,
        message: String,
    },

    /// No template with this name exists in the collection.
    #[error("template: no template {name:?} associated with template {root:?}")]
    NoSuchTemplate { name: String, root: String },

    /// The template was declared but never given a body.
    #[error("template: {name:?} is an incomplete or empty template")]
    Incomplete { name: String },

    /// Writing output failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure reported by a template function.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct FuncError(pub String);

impl FuncError {
    pub fn new(message: impl Into<String>) -> Self {
        FuncError(message.into())
    }
}

/// Errors from operations on a template collection.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Exec(#[from] ExecError),

    /// Unrecognized argument to [`crate::Template::option`].
    #[error("template: unrecognized option: {0}")]
    UnknownOption(String),
}

/// Result type for template operations.
pub type TemplateResult<T> = Result<T, TemplateError>;
