/*
 * template.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Named template collections.
//!
//! A [`Template`] is a handle onto a shared collection of named templates.
//! Handles created through [`Template::new_template`] or [`Template::lookup`]
//! share the collection with the handle they came from, so a template can
//! invoke any other template of the same collection by name.

use crate::ast::Tree;
use crate::error::{FuncError, TemplateError, TemplateResult};
use crate::funcs::{self, Func, FuncMap};
use crate::lexer::{DEFAULT_LEFT_DELIM, DEFAULT_RIGHT_DELIM};
use crate::missing::{MissingKey, MissingSettings, MissingValue, MissingValueHook};
use crate::parser;
use crate::value::Value;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// One named slot in a collection.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateEntry {
    /// Declared (by name or by a `{{template}}` reference) but never parsed.
    Unresolved,
    /// Fully parsed body.
    Resolved(Arc<Tree>),
}

impl TemplateEntry {
    pub fn tree(&self) -> Option<&Arc<Tree>> {
        match self {
            TemplateEntry::Unresolved => None,
            TemplateEntry::Resolved(tree) => Some(tree),
        }
    }
}

/// State shared by every handle onto one collection.
#[derive(Default)]
pub(crate) struct Common {
    /// Entries in insertion order.
    pub entries: IndexMap<String, TemplateEntry>,
    pub funcs: FuncMap,
    pub missing_key: MissingKey,
    /// Missing-value settings keyed by template name.
    pub missing: HashMap<String, MissingSettings>,
}

impl Common {
    /// Store a freshly parsed tree. An empty body never replaces a resolved one.
    fn associate(&mut self, tree: Tree) {
        if tree.is_empty()
            && matches!(self.entries.get(&tree.name), Some(TemplateEntry::Resolved(_)))
        {
            return;
        }
        self.entries
            .insert(tree.name.clone(), TemplateEntry::Resolved(Arc::new(tree)));
    }

    fn is_func(&self, name: &str) -> bool {
        self.funcs.contains_key(name) || funcs::builtin(name).is_some()
    }
}

/// A handle onto a named template within a collection.
///
/// Cloning a handle is cheap; clones share the collection.
///
/// # Example
///
/// ```
/// use quarto_texttemplate::{Template, Value};
///
/// let mut t = Template::new("greeting");
/// t.parse("Hello, {{.name}}!").unwrap();
/// let out = t.render(&Value::map([("name", "World")])).unwrap();
/// assert_eq!(out, "Hello, World!");
/// ```
#[derive(Clone)]
pub struct Template {
    name: String,
    /// `None` until the collection is first used.
    common: Option<Arc<RwLock<Common>>>,
    left_delim: String,
    right_delim: String,
}

impl std::fmt::Debug for Template {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Template")
            .field("name", &self.name)
            .field("initialized", &self.common.is_some())
            .finish()
    }
}

impl Template {
    /// Create a handle named `name` on a new, uninitialized collection.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            common: None,
            left_delim: String::new(),
            right_delim: String::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the collection has been initialized.
    pub fn is_initialized(&self) -> bool {
        self.common.is_some()
    }

    fn init(&mut self) -> &Arc<RwLock<Common>> {
        self.common.get_or_insert_with(Default::default)
    }

    fn write(&mut self) -> RwLockWriteGuard<'_, Common> {
        // Lock holders never leave Common half-updated, so poisoning is ignored.
        self.init().write().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn read(&self) -> Option<RwLockReadGuard<'_, Common>> {
        self.common
            .as_ref()
            .map(|common| common.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Names of every fully parsed template in the collection, in the order
    /// they were first added.
    ///
    /// Returns an empty vector for an uninitialized collection. Names that
    /// were only declared or referenced, never parsed, are skipped.
    pub fn available_templates(&self) -> Vec<String> {
        let Some(common) = self.read() else {
            return Vec::new();
        };
        common
            .entries
            .iter()
            .filter(|(_, entry)| matches!(entry, TemplateEntry::Resolved(_)))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Declare template `name` in this collection and return a handle on it.
    ///
    /// The new template inherits this handle's delimiters. An existing entry
    /// of the same name is left untouched.
    pub fn new_template(&mut self, name: impl Into<String>) -> Template {
        let name = name.into();
        self.write()
            .entries
            .entry(name.clone())
            .or_insert(TemplateEntry::Unresolved);
        Template {
            name,
            common: self.common.clone(),
            left_delim: self.left_delim.clone(),
            right_delim: self.right_delim.clone(),
        }
    }

    /// A handle on the template named `name`, if the collection has one.
    pub fn lookup(&self, name: &str) -> Option<Template> {
        let exists = self.read()?.entries.contains_key(name);
        exists.then(|| Template {
            name: name.to_string(),
            common: self.common.clone(),
            left_delim: self.left_delim.clone(),
            right_delim: self.right_delim.clone(),
        })
    }

    /// The entry for this handle's own name.
    pub fn entry(&self) -> Option<TemplateEntry> {
        self.read()?.entries.get(&self.name).cloned()
    }

    /// Parse `text` as the body of this template.
    ///
    /// Templates defined with `{{define}}` or `{{block}}` are added to the
    /// collection alongside it. Names invoked with `{{template}}` that the
    /// collection does not know yet are declared as unresolved.
    pub fn parse(&mut self, text: &str) -> TemplateResult<&mut Self> {
        let name = self.name.clone();
        let (left, right) = (self.left_delim().to_string(), self.right_delim().to_string());
        {
            let mut common = self.write();
            let output = parser::parse(&name, text, &left, &right, &|f: &str| common.is_func(f))?;

            let defined = output.trees.len();
            for tree in output.trees {
                common.associate(tree);
            }
            for reference in output.references {
                common
                    .entries
                    .entry(reference)
                    .or_insert(TemplateEntry::Unresolved);
            }
            tracing::debug!(template = %name, defined, "parsed template");
        }
        Ok(self)
    }

    /// Add functions to the collection. Must precede parsing templates that use them.
    pub fn funcs(&mut self, funcs: FuncMap) -> &mut Self {
        self.write().funcs.extend(funcs);
        self
    }

    /// Add a single function to the collection.
    pub fn func<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&[Value]) -> Result<Value, FuncError> + Send + Sync + 'static,
    {
        let f: Func = Arc::new(f);
        self.write().funcs.insert(name.into(), f);
        self
    }

    /// Set an option on the collection. The only option is `missingkey`:
    ///
    /// - `missingkey=default` or `missingkey=invalid`: print the placeholder
    /// - `missingkey=zero`: use `nil`
    /// - `missingkey=error`: stop execution with an error
    pub fn option(&mut self, option: &str) -> TemplateResult<&mut Self> {
        let unknown = || TemplateError::UnknownOption(option.to_string());
        let (key, value) = option.split_once('=').ok_or_else(unknown)?;
        if key != "missingkey" {
            return Err(unknown());
        }
        let policy: MissingKey = value.parse().map_err(|_| unknown())?;
        self.write().missing_key = policy;
        Ok(self)
    }

    /// Set the action delimiters for subsequent `parse` calls on this handle.
    /// An empty string selects the default (`{{` or `}}`).
    pub fn delims(&mut self, left: &str, right: &str) -> &mut Self {
        self.left_delim = left.to_string();
        self.right_delim = right.to_string();
        self
    }

    pub(crate) fn left_delim(&self) -> &str {
        if self.left_delim.is_empty() {
            DEFAULT_LEFT_DELIM
        } else {
            &self.left_delim
        }
    }

    pub(crate) fn right_delim(&self) -> &str {
        if self.right_delim.is_empty() {
            DEFAULT_RIGHT_DELIM
        } else {
            &self.right_delim
        }
    }

    /// Print `placeholder` for missing values looked up in this template's body.
    ///
    /// Takes precedence over [`crate::ExecOptions::no_value`] and the
    /// process-wide [`crate::set_no_value`].
    pub fn set_missing_value(&mut self, placeholder: impl Into<String>) -> &mut Self {
        let name = self.name.clone();
        self.write().missing.entry(name).or_default().placeholder = Some(placeholder.into());
        self
    }

    /// Call `hook` every time a missing value in this template's body is printed.
    pub fn on_missing_value<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&MissingValue<'_>) + Send + Sync + 'static,
    {
        let name = self.name.clone();
        let hook: MissingValueHook = Arc::new(hook);
        self.write().missing.entry(name).or_default().hook = Some(hook);
        self
    }
}
