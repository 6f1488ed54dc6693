/*
 * ast.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template syntax tree types.
//!
//! Every node records its byte position in the source; the owning [`Tree`]
//! keeps the line index needed to turn positions into `line:col` locations.
//! The `Display` impls reproduce a normalized form of the source and are used
//! for the `at <...>` context in execution errors.

use crate::lexer::{LineIndex, Pos};
use std::fmt;
use std::sync::Arc;

/// The parsed body of one named template.
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    /// Name of the template this tree defines.
    pub name: String,
    /// Name of the top-level template whose source contained this tree.
    pub parse_name: String,
    /// Root node list.
    pub root: ListNode,
    /// Line index of the source text, shared by all trees parsed from it.
    pub lines: Arc<LineIndex>,
}

impl Tree {
    /// `name:line:col` of a position within this tree's source.
    pub fn location(&self, pos: Pos) -> String {
        let (line, col) = self.lines.line_col(pos);
        format!("{}:{}:{}", self.parse_name, line, col)
    }

    /// A tree is empty if it contains nothing but white space text.
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }
}

/// A sequence of nodes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ListNode {
    pub pos: Pos,
    pub nodes: Vec<Node>,
}

impl ListNode {
    pub fn new(pos: Pos) -> Self {
        Self {
            pos,
            nodes: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.iter().all(|node| match node {
            Node::Text(text) => text.text.trim().is_empty(),
            _ => false,
        })
    }
}

/// A node in a template body.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Literal text to be output as-is.
    Text(TextNode),

    /// `{{pipeline}}`, printed unless it declares variables.
    Action(ActionNode),

    /// `{{if pipeline}}...{{else}}...{{end}}`
    If(BranchNode),

    /// `{{range pipeline}}...{{else}}...{{end}}`
    Range(BranchNode),

    /// `{{with pipeline}}...{{else}}...{{end}}`
    With(BranchNode),

    /// `{{template "name" pipeline}}`
    Template(TemplateNode),

    /// `{{break}}`
    Break(Pos),

    /// `{{continue}}`
    Continue(Pos),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextNode {
    pub pos: Pos,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionNode {
    pub pos: Pos,
    pub pipe: PipeNode,
}

/// Shared shape of `if`, `range` and `with`.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchNode {
    pub pos: Pos,
    pub pipe: PipeNode,
    pub list: ListNode,
    pub else_list: Option<ListNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemplateNode {
    pub pos: Pos,
    /// Name of the invoked template.
    pub name: String,
    /// Value for dot; `None` invokes with `nil`.
    pub pipe: Option<PipeNode>,
}

/// A pipeline with optional variable declarations.
#[derive(Debug, Clone, PartialEq)]
pub struct PipeNode {
    pub pos: Pos,
    /// `true` for `$x = ...`, `false` for `$x := ...`.
    pub is_assign: bool,
    /// Declared or assigned variables, in order.
    pub decl: Vec<VariableNode>,
    pub cmds: Vec<CommandNode>,
}

/// One stage of a pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandNode {
    pub pos: Pos,
    pub args: Vec<Arg>,
}

/// An operand of a command.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Dot(Pos),
    Nil(Pos),
    Bool(Pos, bool),
    Number(NumberNode),
    String(StringNode),
    /// `.A.B`
    Field(FieldNode),
    /// `$x.A`
    Variable(VariableNode),
    /// A function name.
    Identifier(IdentifierNode),
    /// `(pipeline).A`
    Chain(ChainNode),
    /// `(pipeline)`
    Pipe(PipeNode),
}

impl Arg {
    pub fn pos(&self) -> Pos {
        match self {
            Arg::Dot(pos) | Arg::Nil(pos) | Arg::Bool(pos, _) => *pos,
            Arg::Number(n) => n.pos,
            Arg::String(s) => s.pos,
            Arg::Field(f) => f.pos,
            Arg::Variable(v) => v.pos,
            Arg::Identifier(i) => i.pos,
            Arg::Chain(c) => c.pos,
            Arg::Pipe(p) => p.pos,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldNode {
    pub pos: Pos,
    /// Field names without the leading dots.
    pub ident: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableNode {
    pub pos: Pos,
    /// Variable name (with `$`) followed by any field names.
    pub ident: Vec<String>,
}

impl VariableNode {
    pub fn name(&self) -> &str {
        &self.ident[0]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IdentifierNode {
    pub pos: Pos,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChainNode {
    pub pos: Pos,
    pub node: Box<Arg>,
    pub field: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct NumberNode {
    pub pos: Pos,
    pub value: Number,
    /// Original text of the literal.
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StringNode {
    pub pos: Pos,
    /// Original text including quotes.
    pub quoted: String,
    /// Unquoted value.
    pub text: String,
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Dot(_) => f.write_str("."),
            Arg::Nil(_) => f.write_str("nil"),
            Arg::Bool(_, b) => write!(f, "{}", b),
            Arg::Number(n) => f.write_str(&n.text),
            Arg::String(s) => f.write_str(&s.quoted),
            Arg::Field(field) => write!(f, "{}", field),
            Arg::Variable(var) => write!(f, "{}", var),
            Arg::Identifier(ident) => f.write_str(&ident.name),
            Arg::Chain(chain) => write!(f, "{}", chain),
            Arg::Pipe(pipe) => write!(f, "({})", pipe),
        }
    }
}

impl fmt::Display for FieldNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for ident in &self.ident {
            write!(f, ".{}", ident)?;
        }
        Ok(())
    }
}

impl fmt::Display for VariableNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.ident.join("."))
    }
}

impl fmt::Display for ChainNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.node)?;
        for field in &self.field {
            write!(f, ".{}", field)?;
        }
        Ok(())
    }
}

impl fmt::Display for CommandNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}", arg)?;
        }
        Ok(())
    }
}

impl fmt::Display for PipeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.decl.is_empty() {
            let names: Vec<&str> = self.decl.iter().map(VariableNode::name).collect();
            let op = if self.is_assign { "=" } else { ":=" };
            write!(f, "{} {} ", names.join(", "), op)?;
        }
        for (i, cmd) in self.cmds.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            write!(f, "{}", cmd)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(names: &[&str]) -> Arg {
        Arg::Field(FieldNode {
            pos: Pos(0),
            ident: names.iter().map(|s| s.to_string()).collect(),
        })
    }

    #[test]
    fn test_pipe_display() {
        let pipe = PipeNode {
            pos: Pos(0),
            is_assign: false,
            decl: vec![VariableNode {
                pos: Pos(0),
                ident: vec!["$x".to_string()],
            }],
            cmds: vec![
                CommandNode {
                    pos: Pos(0),
                    args: vec![field(&["A", "B"])],
                },
                CommandNode {
                    pos: Pos(0),
                    args: vec![
                        Arg::Identifier(IdentifierNode {
                            pos: Pos(0),
                            name: "printf".to_string(),
                        }),
                        Arg::String(StringNode {
                            pos: Pos(0),
                            quoted: "\"%s\"".to_string(),
                            text: "%s".to_string(),
                        }),
                    ],
                },
            ],
        };
        assert_eq!(pipe.to_string(), "$x := .A.B | printf \"%s\"");
    }

    #[test]
    fn test_list_is_empty() {
        let mut list = ListNode::new(Pos(0));
        assert!(list.is_empty());

        list.nodes.push(Node::Text(TextNode {
            pos: Pos(0),
            text: "  \n".to_string(),
        }));
        assert!(list.is_empty());

        list.nodes.push(Node::Break(Pos(3)));
        assert!(!list.is_empty());
    }
}
