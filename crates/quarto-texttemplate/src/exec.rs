/*
 * exec.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template execution.
//!
//! Execution walks a parsed [`Tree`] against a data [`Value`] and writes the
//! result to an [`io::Write`]. Intermediate results are `Option<Value>`,
//! where `None` is a *missing value*: the result of looking up a field that
//! does not exist. Printing a missing value writes a placeholder instead.
//!
//! The placeholder is chosen per action, first match wins:
//!
//! 1. the placeholder set with [`Template::set_missing_value`] for the
//!    template whose body is executing,
//! 2. [`ExecOptions::no_value`],
//! 3. the process-wide placeholder from [`crate::no_value`], read once when
//!    the execution starts.

use crate::ast::{
    Arg, BranchNode, ChainNode, CommandNode, FieldNode, ListNode, Node, Number, PipeNode,
    TemplateNode, Tree, VariableNode,
};
use crate::error::{ExecError, TemplateResult};
use crate::funcs::{self, FuncMap};
use crate::lexer::Pos;
use crate::missing::{MissingKey, MissingSettings, MissingValue};
use crate::nodata;
use crate::template::{Common, Template, TemplateEntry};
use crate::value::Value;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::Arc;

/// Default bound on nested `{{template}}` invocations.
pub const DEFAULT_MAX_DEPTH: usize = 1000;

/// Per-execution settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOptions {
    /// Placeholder for missing values, overriding the process-wide one.
    pub no_value: Option<String>,
    /// Maximum nesting of `{{template}}` invocations.
    pub max_depth: usize,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            no_value: None,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl ExecOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Print `placeholder` for missing values in this execution.
    pub fn with_no_value(mut self, placeholder: impl Into<String>) -> Self {
        self.no_value = Some(placeholder.into());
        self
    }

    /// Set the maximum template nesting depth.
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }
}

impl Template {
    /// Execute this template against `data`, writing to `w`.
    pub fn execute<W: io::Write>(&self, w: &mut W, data: &Value) -> TemplateResult<()> {
        self.execute_with_options(w, data, &ExecOptions::default())
    }

    pub fn execute_with_options<W: io::Write>(
        &self,
        w: &mut W,
        data: &Value,
        options: &ExecOptions,
    ) -> TemplateResult<()> {
        self.run(w, self.name(), true, data, options)
    }

    /// Execute the template called `name` from this collection.
    pub fn execute_template<W: io::Write>(
        &self,
        w: &mut W,
        name: &str,
        data: &Value,
    ) -> TemplateResult<()> {
        self.execute_template_with_options(w, name, data, &ExecOptions::default())
    }

    pub fn execute_template_with_options<W: io::Write>(
        &self,
        w: &mut W,
        name: &str,
        data: &Value,
        options: &ExecOptions,
    ) -> TemplateResult<()> {
        self.run(w, name, false, data, options)
    }

    /// Execute this template and return the output as a string.
    pub fn render(&self, data: &Value) -> TemplateResult<String> {
        self.render_with_options(data, &ExecOptions::default())
    }

    pub fn render_with_options(&self, data: &Value, options: &ExecOptions) -> TemplateResult<String> {
        let mut out = Vec::new();
        self.execute_with_options(&mut out, data, options)?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    /// Execute the template called `name` and return the output as a string.
    pub fn render_template(&self, name: &str, data: &Value) -> TemplateResult<String> {
        self.render_template_with_options(name, data, &ExecOptions::default())
    }

    pub fn render_template_with_options(
        &self,
        name: &str,
        data: &Value,
        options: &ExecOptions,
    ) -> TemplateResult<String> {
        let mut out = Vec::new();
        self.execute_template_with_options(&mut out, name, data, options)?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    fn run(
        &self,
        w: &mut dyn io::Write,
        name: &str,
        own: bool,
        data: &Value,
        options: &ExecOptions,
    ) -> TemplateResult<()> {
        let snapshot = self.read().map(|common| Snapshot::take(&common));
        let tree = match snapshot.as_ref().and_then(|s| s.entries.get(name)) {
            Some(TemplateEntry::Resolved(tree)) => Arc::clone(tree),
            Some(TemplateEntry::Unresolved) => {
                return Err(ExecError::Incomplete {
                    name: name.to_string(),
                }
                .into());
            }
            None if own => {
                return Err(ExecError::Incomplete {
                    name: name.to_string(),
                }
                .into());
            }
            None => {
                return Err(ExecError::NoSuchTemplate {
                    name: name.to_string(),
                    root: self.name().to_string(),
                }
                .into());
            }
        };
        let snapshot = snapshot.unwrap_or_default();

        let (placeholder, source) = match &options.no_value {
            Some(placeholder) => (placeholder.clone(), "options"),
            None => (nodata::no_value(), "registry"),
        };
        tracing::debug!(template = %name, placeholder_source = source, "executing template");

        let mut state = State {
            w,
            common: snapshot,
            placeholder,
            max_depth: options.max_depth,
            depth: 0,
            tree: Arc::clone(&tree),
            vars: vec![("$".to_string(), Some(data.clone()))],
        };
        state.walk_list(&Some(data.clone()), &tree.root)?;
        Ok(())
    }
}

/// The parts of a collection an execution reads, copied when it starts.
#[derive(Default)]
struct Snapshot {
    entries: IndexMap<String, TemplateEntry>,
    funcs: FuncMap,
    missing_key: MissingKey,
    missing: HashMap<String, MissingSettings>,
}

impl Snapshot {
    fn take(common: &Common) -> Self {
        Self {
            entries: common.entries.clone(),
            funcs: common.funcs.clone(),
            missing_key: common.missing_key,
            missing: common.missing.clone(),
        }
    }
}

/// How a list walk ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Normal,
    Break,
    Continue,
}

/// `None` is a missing value.
type Val = Option<Value>;

/// Result of a `missingkey=zero` lookup miss.
static NIL: Value = Value::Nil;

struct State<'w> {
    w: &'w mut dyn io::Write,
    common: Snapshot,
    /// Placeholder for templates without their own override.
    placeholder: String,
    max_depth: usize,
    depth: usize,
    /// Tree whose body is executing.
    tree: Arc<Tree>,
    /// Variable stack, innermost last.
    vars: Vec<(String, Val)>,
}

impl State<'_> {
    fn error(&self, pos: Pos, node: &dyn fmt::Display, message: impl Into<String>) -> ExecError {
        ExecError::Exec {
            name: self.tree.name.clone(),
            location: self.tree.location(pos),
            context: node.to_string(),
            message: message.into(),
        }
    }

    // ------------------------------------------------------------------
    // Nodes
    // ------------------------------------------------------------------

    fn walk_list(&mut self, dot: &Val, list: &ListNode) -> Result<Flow, ExecError> {
        for node in &list.nodes {
            let flow = self.walk(dot, node)?;
            if flow != Flow::Normal {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn walk(&mut self, dot: &Val, node: &Node) -> Result<Flow, ExecError> {
        match node {
            Node::Text(text) => self.w.write_all(text.text.as_bytes())?,
            Node::Action(action) => {
                let mark = self.vars.len();
                let value = self.eval_pipeline(dot, &action.pipe)?;
                if action.pipe.decl.is_empty() {
                    self.vars.truncate(mark);
                    self.print(&action.pipe, value)?;
                }
            }
            Node::If(branch) => return self.walk_if_or_with(dot, branch, false),
            Node::With(branch) => return self.walk_if_or_with(dot, branch, true),
            Node::Range(branch) => return self.walk_range(dot, branch),
            Node::Template(template) => self.walk_template(dot, template)?,
            Node::Break(_) => return Ok(Flow::Break),
            Node::Continue(_) => return Ok(Flow::Continue),
        }
        Ok(Flow::Normal)
    }

    fn walk_if_or_with(
        &mut self,
        dot: &Val,
        branch: &BranchNode,
        rebind: bool,
    ) -> Result<Flow, ExecError> {
        let mark = self.vars.len();
        let value = self.eval_pipeline(dot, &branch.pipe)?;
        let flow = if truthy(&value) {
            if rebind {
                self.walk_list(&value, &branch.list)
            } else {
                self.walk_list(dot, &branch.list)
            }
        } else if let Some(else_list) = &branch.else_list {
            self.walk_list(dot, else_list)
        } else {
            Ok(Flow::Normal)
        };
        self.vars.truncate(mark);
        flow
    }

    fn walk_range(&mut self, dot: &Val, branch: &BranchNode) -> Result<Flow, ExecError> {
        let outer = self.vars.len();
        let value = self.eval_pipeline(dot, &branch.pipe)?;
        let inner = self.vars.len();

        let items: Box<dyn Iterator<Item = (Value, Value)> + '_> = match &value {
            None | Some(Value::Nil) => Box::new(std::iter::empty()),
            Some(Value::List(items)) => Box::new(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| (Value::from(i), item.clone())),
            ),
            Some(Value::Map(map)) => Box::new(
                map.iter()
                    .map(|(k, v)| (Value::from(k.as_str()), v.clone())),
            ),
            Some(Value::Int(n)) => Box::new((0..*n).map(|i| (Value::Int(i), Value::Int(i)))),
            Some(other) => {
                return Err(self.error(
                    branch.pos,
                    &branch.pipe,
                    format!("range can't iterate over {}", other),
                ));
            }
        };
        let mut items = items.peekable();

        if items.peek().is_none() {
            let flow = match &branch.else_list {
                Some(else_list) => self.walk_list(dot, else_list).map(|_| Flow::Normal),
                None => Ok(Flow::Normal),
            };
            self.vars.truncate(outer);
            return flow;
        }

        for (index, elem) in items {
            self.bind_range_vars(&branch.pipe, &index, &elem)?;
            let flow = self.walk_list(&Some(elem), &branch.list);
            self.vars.truncate(inner);
            match flow {
                Ok(Flow::Break) => break,
                Ok(Flow::Normal | Flow::Continue) => {}
                Err(err) => {
                    self.vars.truncate(outer);
                    return Err(err);
                }
            }
        }
        self.vars.truncate(outer);
        Ok(Flow::Normal)
    }

    fn bind_range_vars(&mut self, pipe: &PipeNode, index: &Value, elem: &Value) -> Result<(), ExecError> {
        let bindings: Vec<(&VariableNode, &Value)> = match pipe.decl.as_slice() {
            [] => return Ok(()),
            [only] => vec![(only, elem)],
            [first, second, ..] => vec![(first, index), (second, elem)],
        };
        if pipe.is_assign {
            for (var, value) in bindings {
                self.set_var(var, Some(value.clone()))?;
            }
        } else {
            // Declared variables sit on top of the stack in declaration order.
            let count = bindings.len();
            let base = self.vars.len() - count;
            for (offset, (_, value)) in bindings.into_iter().enumerate() {
                self.vars[base + offset].1 = Some(value.clone());
            }
        }
        Ok(())
    }

    fn walk_template(&mut self, dot: &Val, node: &TemplateNode) -> Result<(), ExecError> {
        let display = TemplateCall(node);
        let tree = match self.common.entries.get(&node.name) {
            Some(TemplateEntry::Resolved(tree)) => Arc::clone(tree),
            Some(TemplateEntry::Unresolved) => {
                return Err(self.error(
                    node.pos,
                    &display,
                    format!("{:?} is an incomplete or empty template", node.name),
                ));
            }
            None => {
                return Err(self.error(
                    node.pos,
                    &display,
                    format!("no such template {:?}", node.name),
                ));
            }
        };
        if self.depth >= self.max_depth {
            return Err(self.error(
                node.pos,
                &display,
                format!("exceeded maximum template depth ({})", self.max_depth),
            ));
        }

        let new_dot = match &node.pipe {
            Some(pipe) => {
                let mark = self.vars.len();
                let value = self.eval_pipeline(dot, pipe)?;
                self.vars.truncate(mark);
                value
            }
            None => Some(Value::Nil),
        };

        let saved_vars = std::mem::replace(&mut self.vars, vec![("$".to_string(), new_dot.clone())]);
        let saved_tree = std::mem::replace(&mut self.tree, Arc::clone(&tree));
        self.depth += 1;
        let result = self.walk_list(&new_dot, &tree.root);
        self.depth -= 1;
        self.tree = saved_tree;
        self.vars = saved_vars;
        result.map(|_| ())
    }

    // ------------------------------------------------------------------
    // Missing values
    // ------------------------------------------------------------------

    fn settings(&self) -> Option<&MissingSettings> {
        self.common.missing.get(&self.tree.name)
    }

    fn current_placeholder(&self) -> String {
        self.settings()
            .and_then(|s| s.placeholder.clone())
            .unwrap_or_else(|| self.placeholder.clone())
    }

    /// Report a substituted missing value to the template's hook and return the placeholder.
    fn substitute_missing(&self, pos: Pos) -> String {
        let placeholder = self.current_placeholder();
        let location = self.tree.location(pos);
        tracing::trace!(
            template = %self.tree.name,
            location = %location,
            placeholder = %placeholder,
            "substituting missing value"
        );
        if let Some(hook) = self.settings().and_then(|s| s.hook.as_ref()) {
            hook(&MissingValue {
                placeholder: &placeholder,
                pos,
                template: &self.tree.name,
                location: &location,
            });
        }
        placeholder
    }

    fn print(&mut self, pipe: &PipeNode, value: Val) -> Result<(), ExecError> {
        match value {
            Some(value) => write!(self.w, "{}", value)?,
            None => {
                let placeholder = self.substitute_missing(pipe.pos);
                self.w.write_all(placeholder.as_bytes())?;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Pipelines and commands
    // ------------------------------------------------------------------

    fn eval_pipeline(&mut self, dot: &Val, pipe: &PipeNode) -> Result<Val, ExecError> {
        let mut value: Option<Val> = None;
        for cmd in &pipe.cmds {
            value = Some(self.eval_command(dot, cmd, value)?);
        }
        let value = value.flatten();
        for var in &pipe.decl {
            if pipe.is_assign {
                self.set_var(var, value.clone())?;
            } else {
                self.vars.push((var.name().to_string(), value.clone()));
            }
        }
        Ok(value)
    }

    /// `final_arg` is the result of the previous pipeline stage, if any.
    fn eval_command(&mut self, dot: &Val, cmd: &CommandNode, final_arg: Option<Val>) -> Result<Val, ExecError> {
        let Some(first) = cmd.args.first() else {
            return Err(self.error(cmd.pos, cmd, "empty command"));
        };
        if let Arg::Identifier(ident) = first {
            return self.eval_function(dot, ident.pos, &ident.name, &cmd.args[1..], final_arg);
        }
        if cmd.args.len() > 1 || final_arg.is_some() {
            return Err(self.error(
                first.pos(),
                first,
                format!("can't give argument to non-function {}", first),
            ));
        }
        self.eval_arg(dot, first)
    }

    fn eval_arg(&mut self, dot: &Val, arg: &Arg) -> Result<Val, ExecError> {
        Ok(match arg {
            Arg::Dot(_) => dot.clone(),
            Arg::Nil(_) => Some(Value::Nil),
            Arg::Bool(_, b) => Some(Value::Bool(*b)),
            Arg::Number(n) => Some(match n.value {
                Number::Int(i) => Value::Int(i),
                Number::Float(x) => Value::Float(x),
            }),
            Arg::String(s) => Some(Value::String(s.text.clone())),
            Arg::Field(field) => self.eval_field_node(dot, field)?,
            Arg::Variable(var) => self.eval_variable(var)?,
            Arg::Identifier(ident) => self.eval_function(dot, ident.pos, &ident.name, &[], None)?,
            Arg::Chain(chain) => self.eval_chain(dot, chain)?,
            Arg::Pipe(pipe) => {
                let mark = self.vars.len();
                let value = self.eval_pipeline(dot, pipe)?;
                self.vars.truncate(mark);
                value
            }
        })
    }

    fn eval_function(
        &mut self,
        dot: &Val,
        pos: Pos,
        name: &str,
        args: &[Arg],
        final_arg: Option<Val>,
    ) -> Result<Val, ExecError> {
        let user = self.common.funcs.get(name).cloned();
        if user.is_none() && matches!(name, "and" | "or") {
            return self.eval_short_circuit(dot, pos, name, args, final_arg);
        }

        let mut values = Vec::with_capacity(args.len() + 1);
        for arg in args {
            values.push(self.eval_arg(dot, arg)?.unwrap_or_default());
        }
        if let Some(last) = final_arg {
            values.push(last.unwrap_or_default());
        }

        let result = match (user, funcs::builtin(name)) {
            (Some(f), _) => f(&values).map(Some),
            (None, Some(f)) => f(&values),
            (None, None) => {
                return Err(self.error(pos, &name, format!("{:?} is not a defined function", name)));
            }
        };
        result.map_err(|err| self.error(pos, &name, format!("error calling {}: {}", name, err)))
    }

    fn eval_short_circuit(
        &mut self,
        dot: &Val,
        pos: Pos,
        name: &str,
        args: &[Arg],
        final_arg: Option<Val>,
    ) -> Result<Val, ExecError> {
        if args.is_empty() && final_arg.is_none() {
            return Err(self.error(
                pos,
                &name,
                format!("wrong number of args for {}: want at least 1 got 0", name),
            ));
        }
        let decides = name == "or";
        let mut last = None;
        for arg in args {
            let value = self.eval_arg(dot, arg)?;
            if truthy(&value) == decides {
                return Ok(value);
            }
            last = value;
        }
        Ok(final_arg.unwrap_or(last))
    }

    // ------------------------------------------------------------------
    // Fields and variables
    // ------------------------------------------------------------------

    fn eval_field_node(&self, dot: &Val, field: &FieldNode) -> Result<Val, ExecError> {
        self.eval_fields(dot, &field.ident, field.pos, field)
    }

    fn eval_chain(&mut self, dot: &Val, chain: &ChainNode) -> Result<Val, ExecError> {
        let base = self.eval_arg(dot, &chain.node)?;
        self.eval_fields(&base, &chain.field, chain.pos, chain)
    }

    fn eval_variable(&self, var: &VariableNode) -> Result<Val, ExecError> {
        let value = self.lookup_var(var)?;
        self.eval_fields(value, &var.ident[1..], var.pos, var)
    }

    fn eval_fields(
        &self,
        receiver: &Val,
        idents: &[String],
        pos: Pos,
        node: &dyn fmt::Display,
    ) -> Result<Val, ExecError> {
        let mut current = receiver.as_ref();
        for ident in idents {
            current = self.eval_field(current, ident, pos, node)?;
        }
        Ok(current.cloned())
    }

    fn eval_field<'v>(
        &self,
        receiver: Option<&'v Value>,
        name: &str,
        pos: Pos,
        node: &dyn fmt::Display,
    ) -> Result<Option<&'v Value>, ExecError> {
        let policy = self.common.missing_key;
        match receiver {
            Some(Value::Map(map)) => match map.get(name) {
                Some(value) => Ok(Some(value)),
                None => match policy {
                    MissingKey::Default | MissingKey::Invalid => Ok(None),
                    MissingKey::Zero => Ok(Some(&NIL)),
                    MissingKey::Error => {
                        self.substitute_missing(pos);
                        Err(self.error(pos, node, format!("map has no entry for key {:?}", name)))
                    }
                },
            },
            None | Some(Value::Nil) => match policy {
                MissingKey::Error => {
                    self.substitute_missing(pos);
                    Err(self.error(pos, node, format!("nil data; no entry for key {:?}", name)))
                }
                _ => Ok(None),
            },
            Some(other) => Err(self.error(
                pos,
                node,
                format!("can't evaluate field {} in type {}", name, other.kind()),
            )),
        }
    }

    fn lookup_var(&self, var: &VariableNode) -> Result<&Val, ExecError> {
        self.vars
            .iter()
            .rev()
            .find(|(name, _)| name == var.name())
            .map(|(_, value)| value)
            .ok_or_else(|| {
                self.error(var.pos, var, format!("undefined variable: {}", var.name()))
            })
    }

    fn set_var(&mut self, var: &VariableNode, value: Val) -> Result<(), ExecError> {
        match self.vars.iter_mut().rev().find(|(name, _)| name == var.name()) {
            Some(slot) => {
                slot.1 = value;
                Ok(())
            }
            None => Err(self.error(var.pos, var, format!("undefined variable: {}", var.name()))),
        }
    }
}

fn truthy(value: &Val) -> bool {
    value.as_ref().is_some_and(Value::is_truthy)
}

/// Displays a `{{template}}` node for error context.
struct TemplateCall<'a>(&'a TemplateNode);

impl fmt::Display for TemplateCall<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{{template {:?}", self.0.name)?;
        if let Some(pipe) = &self.0.pipe {
            write!(f, " {}", pipe)?;
        }
        f.write_str("}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TemplateError;
    use crate::nodata::tests::REGISTRY_LOCK;
    use pretty_assertions::assert_eq;
    use std::sync::{Mutex, PoisonError};

    fn parsed(text: &str) -> Template {
        let mut t = Template::new("t");
        t.parse(text).expect("template should parse");
        t
    }

    fn render(text: &str, data: Value) -> String {
        parsed(text)
            .render_with_options(&data, &ExecOptions::new().with_no_value("<no value>"))
            .expect("template should execute")
    }

    fn render_err(text: &str, data: Value) -> String {
        parsed(text)
            .render_with_options(&data, &ExecOptions::new().with_no_value("<no value>"))
            .expect_err("execution should fail")
            .to_string()
    }

    fn data() -> Value {
        Value::map([
            ("name", Value::from("Ada")),
            ("items", Value::from(vec!["a", "b", "c"])),
            ("empty", Value::List(vec![])),
            ("count", Value::Int(3)),
            (
                "user",
                Value::map([("first", "Ada"), ("last", "Lovelace")]),
            ),
        ])
    }

    #[test]
    fn test_fields_and_dot() {
        assert_eq!(render("Hi {{.name}}", data()), "Hi Ada");
        assert_eq!(render("{{.user.last}}", data()), "Lovelace");
        assert_eq!(render("{{.}}", Value::from("x")), "x");
        assert_eq!(render("{{.items}}", data()), "[a b c]");
    }

    #[test]
    fn test_missing_fields_print_placeholder() {
        assert_eq!(render("[{{.nope}}]", data()), "[<no value>]");
        assert_eq!(render("[{{.nope.deeper}}]", data()), "[<no value>]");
        assert_eq!(render("[{{.nope}}]", Value::Nil), "[<no value>]");
    }

    #[test]
    fn test_field_on_scalar_is_an_error() {
        assert_eq!(
            render_err("{{.name.first}}", data()),
            "template: t:1:3: executing \"t\" at <.name.first>: can't evaluate field first in type string"
        );
    }

    #[test]
    fn test_missing_key_policies() {
        let mut t = Template::new("t");
        t.option("missingkey=zero").unwrap();
        t.parse("{{.nope}}").unwrap();
        assert_eq!(t.render(&data()).unwrap(), "<nil>");

        let mut t = Template::new("t");
        t.option("missingkey=error").unwrap();
        t.parse("{{.nope}}").unwrap();
        assert_eq!(
            t.render(&data()).unwrap_err().to_string(),
            "template: t:1:3: executing \"t\" at <.nope>: map has no entry for key \"nope\""
        );
    }

    #[test]
    fn test_if_else_chain() {
        let text = "{{if .nope}}A{{else if .count}}B{{else}}C{{end}}";
        assert_eq!(render(text, data()), "B");
        assert_eq!(render("{{if .empty}}A{{else}}C{{end}}", data()), "C");
    }

    #[test]
    fn test_with_rebinds_dot() {
        assert_eq!(render("{{with .user}}{{.first}}{{end}}", data()), "Ada");
        assert_eq!(render("{{with .nope}}x{{else}}none{{end}}", data()), "none");
    }

    #[test]
    fn test_range_forms() {
        assert_eq!(render("{{range .items}}<{{.}}>{{end}}", data()), "<a><b><c>");
        assert_eq!(
            render("{{range $i, $e := .items}}{{$i}}={{$e}} {{end}}", data()),
            "0=a 1=b 2=c "
        );
        assert_eq!(
            render("{{range $k, $v := .user}}{{$k}}:{{$v}};{{end}}", data()),
            "first:Ada;last:Lovelace;"
        );
        assert_eq!(render("{{range .count}}{{.}}{{end}}", data()), "012");
        assert_eq!(render("{{range .empty}}x{{else}}empty{{end}}", data()), "empty");
        assert_eq!(render("{{range .nope}}x{{else}}none{{end}}", data()), "none");
        assert!(render_err("{{range .name}}{{end}}", data()).contains("range can't iterate over Ada"));
    }

    #[test]
    fn test_break_and_continue() {
        let text = "{{range .items}}{{if eq . \"b\"}}{{continue}}{{end}}{{if eq . \"c\"}}{{break}}{{end}}{{.}}{{end}}";
        assert_eq!(render(text, data()), "a");
    }

    #[test]
    fn test_range_over_large_int_stops_at_break() {
        assert_eq!(
            render("{{range 1000000000000}}{{.}}{{break}}{{end}}", Value::Nil),
            "0"
        );
        assert_eq!(
            render(
                "{{range $i := 1000000000000}}{{if eq $i 2}}{{break}}{{end}}{{$i}}{{end}}",
                Value::Nil
            ),
            "01"
        );
    }

    #[test]
    fn test_variables() {
        assert_eq!(render("{{$x := .name}}{{$x}}", data()), "Ada");
        assert_eq!(render("{{$x := 1}}{{if true}}{{$x = 2}}{{end}}{{$x}}", data()), "2");
        assert_eq!(render("{{with .user}}{{$.name}}{{end}}", data()), "Ada");
    }

    #[test]
    fn test_pipelines_and_functions() {
        assert_eq!(render("{{.name | printf \"%s!\"}}", data()), "Ada!");
        assert_eq!(render("{{len .items}}", data()), "3");
        assert_eq!(render("{{index .items 1}}", data()), "b");
        assert_eq!(render("{{(index .user \"first\")}}", data()), "Ada");
        assert_eq!(render("{{index .user \"nope\"}}", data()), "<no value>");
        assert_eq!(render("{{and .count .name}}", data()), "Ada");
        assert_eq!(render("{{or .nope .name}}", data()), "Ada");
        assert_eq!(render("{{not .nope}}", data()), "true");
    }

    #[test]
    fn test_short_circuit_skips_failing_operand() {
        // Evaluating `.name.first` would fail; `and` stops at the falsy `.nope`.
        assert_eq!(render("{{and .nope .name.first}}", data()), "<no value>");
        assert_eq!(render("{{or .name .name.first}}", data()), "Ada");
    }

    #[test]
    fn test_function_errors_carry_context() {
        assert_eq!(
            render_err("{{index .items 7}}", data()),
            "template: t:1:3: executing \"t\" at <index>: error calling index: index out of range: 7"
        );
    }

    #[test]
    fn test_user_functions_shadow_builtins() {
        let mut t = Template::new("t");
        t.func("len", |_| Ok(Value::from("shadowed")));
        t.parse("{{len .items}}").unwrap();
        assert_eq!(t.render(&data()).unwrap(), "shadowed");
    }

    #[test]
    fn test_template_invocation() {
        let t = parsed(r#"{{define "item"}}({{.}}){{end}}{{range .items}}{{template "item" .}}{{end}}"#);
        assert_eq!(t.render(&data()).unwrap(), "(a)(b)(c)");
        assert_eq!(t.render_template("item", &Value::from("z")).unwrap(), "(z)");
    }

    #[test]
    fn test_unresolved_template_invocation_fails() {
        let err = render_err(r#"before {{template "later"}}"#, data());
        assert_eq!(
            err,
            "template: t:1:10: executing \"t\" at <{{template \"later\"}}>: \"later\" is an incomplete or empty template"
        );
    }

    #[test]
    fn test_top_level_lookup_errors() {
        let t = Template::new("t");
        assert!(matches!(
            t.render(&Value::Nil),
            Err(TemplateError::Exec(ExecError::Incomplete { .. }))
        ));

        let t = parsed("x");
        assert_eq!(
            t.render_template("other", &Value::Nil).unwrap_err().to_string(),
            "template: no template \"other\" associated with template \"t\""
        );
    }

    #[test]
    fn test_recursion_depth_is_bounded() {
        let t = parsed(r#"{{define "loop"}}{{template "loop" .}}{{end}}{{template "loop" .}}"#);
        let err = t
            .render_with_options(&Value::Nil, &ExecOptions::new().with_max_depth(10))
            .unwrap_err();
        assert!(err.to_string().ends_with("exceeded maximum template depth (10)"));
    }

    #[test]
    fn test_placeholder_precedence() {
        let _guard = REGISTRY_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        crate::nodata::set_no_value("global");

        let mut t = Template::new("t");
        t.parse(r#"{{.a}} {{template "sub" .}}{{define "sub"}}{{.b}}{{end}}"#)
            .unwrap();
        t.lookup("sub").unwrap().set_missing_value("local");

        assert_eq!(t.render(&Value::Nil).unwrap(), "global local");
        assert_eq!(
            t.render_with_options(&Value::Nil, &ExecOptions::new().with_no_value("opt"))
                .unwrap(),
            "opt local"
        );

        crate::nodata::reset_no_value();
    }

    #[test]
    fn test_hook_fires_per_substitution() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let mut t = Template::new("t");
        t.parse("{{.a}}\n  {{.b}}{{.c}}").unwrap();
        t.set_missing_value("?").on_missing_value(move |missing| {
            sink.lock()
                .unwrap()
                .push((missing.placeholder.to_string(), missing.location.to_string()));
        });

        assert_eq!(t.render(&Value::map([("c", "C")])).unwrap(), "?\n  ?C");
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                ("?".to_string(), "t:1:3".to_string()),
                ("?".to_string(), "t:2:5".to_string()),
            ]
        );
    }

    #[test]
    fn test_hook_fires_before_missing_key_error() {
        let calls = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&calls);

        let mut t = Template::new("t");
        t.option("missingkey=error").unwrap();
        t.parse("{{.a}}").unwrap();
        t.set_missing_value("-").on_missing_value(move |_| {
            *counter.lock().unwrap() += 1;
        });

        assert!(t.render(&Value::map([("b", 1)])).is_err());
        assert_eq!(*calls.lock().unwrap(), 1);
    }
}
