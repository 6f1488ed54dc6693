/*
 * parser.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Recursive-descent parser from tokens to [`Tree`]s.
//!
//! One source text yields the tree for the template being parsed plus one tree
//! per `{{define}}` or `{{block}}` it contains. Names invoked through
//! `{{template}}` are reported back so the collection can record
//! forward references.

use crate::ast::{
    ActionNode, Arg, BranchNode, ChainNode, CommandNode, FieldNode, IdentifierNode, ListNode,
    Node, Number, NumberNode, PipeNode, StringNode, TemplateNode, TextNode, Tree, VariableNode,
};
use crate::error::ParseError;
use crate::lexer::{Keyword, LineIndex, Pos, Token, TokenKind, lex};
use std::sync::Arc;

/// Everything produced by parsing one source text.
#[derive(Debug)]
pub(crate) struct ParseOutput {
    /// Trees in definition order; the tree named after the parsed template comes first.
    pub trees: Vec<Tree>,
    /// Template names invoked via `{{template}}`, in source order.
    pub references: Vec<String>,
}

/// Parse `text` as the body of template `name`.
///
/// `is_func` reports whether an identifier names a callable function.
pub(crate) fn parse(
    name: &str,
    text: &str,
    left_delim: &str,
    right_delim: &str,
    is_func: &dyn Fn(&str) -> bool,
) -> Result<ParseOutput, ParseError> {
    let tokens = lex(name, text, left_delim, right_delim)?;
    let eof = tokens.last().cloned().unwrap_or(Token {
        kind: TokenKind::Eof,
        text: String::new(),
        pos: Pos(text.len()),
        line: 1,
    });
    let mut parser = Parser {
        name,
        tokens,
        eof,
        index: 0,
        is_func,
        vars: vec!["$".to_string()],
        range_depth: 0,
        lines: Arc::new(LineIndex::new(text)),
        trees: Vec::new(),
        references: Vec::new(),
    };
    parser.parse_top()?;
    Ok(ParseOutput {
        trees: parser.trees,
        references: parser.references,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ElseKind {
    Plain,
    If,
    With,
}

/// What ended an item list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Terminator {
    End(Pos),
    Else(Pos, ElseKind),
}

enum Item {
    Node(Node),
    Stop(Terminator),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    If,
    Range,
    With,
}

impl Control {
    fn context(self) -> &'static str {
        match self {
            Control::If => "if",
            Control::Range => "range",
            Control::With => "with",
        }
    }
}

struct Parser<'a> {
    name: &'a str,
    tokens: Vec<Token>,
    eof: Token,
    index: usize,
    is_func: &'a dyn Fn(&str) -> bool,
    /// Variables in scope, innermost last.
    vars: Vec<String>,
    range_depth: usize,
    lines: Arc<LineIndex>,
    trees: Vec<Tree>,
    references: Vec<String>,
}

impl Parser<'_> {
    // ------------------------------------------------------------------
    // Token stream helpers
    // ------------------------------------------------------------------

    fn next(&mut self) -> Token {
        let tok = self.tokens.get(self.index).unwrap_or(&self.eof).clone();
        self.index += 1;
        tok
    }

    fn backup(&mut self) {
        self.index = self.index.saturating_sub(1);
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.index).unwrap_or(&self.eof)
    }

    fn next_non_space(&mut self) -> Token {
        loop {
            let tok = self.next();
            if tok.kind != TokenKind::Space {
                return tok;
            }
        }
    }

    fn peek_non_space(&mut self) -> Token {
        let tok = self.next_non_space();
        self.backup();
        tok
    }

    fn error_at(&self, pos: Pos, message: impl Into<String>) -> ParseError {
        ParseError::new(self.name, self.lines.line(pos), message)
    }

    fn unexpected(&self, tok: &Token, context: &str) -> ParseError {
        self.error_at(tok.pos, format!("unexpected {} in {}", tok.describe(), context))
    }

    fn expect(&mut self, kind: TokenKind, context: &str) -> Result<Token, ParseError> {
        let tok = self.next_non_space();
        if tok.kind != kind {
            return Err(self.unexpected(&tok, context));
        }
        Ok(tok)
    }

    /// Is the token after the current left delimiter the `define` keyword?
    fn at_definition(&self) -> bool {
        self.tokens[self.index + 1..]
            .iter()
            .find(|t| t.kind != TokenKind::Space)
            .is_some_and(|t| t.kind == TokenKind::Keyword(Keyword::Define))
    }

    // ------------------------------------------------------------------
    // Top level and lists
    // ------------------------------------------------------------------

    fn parse_top(&mut self) -> Result<(), ParseError> {
        let mut root = ListNode::new(self.peek().pos);
        loop {
            let tok = self.peek().clone();
            match tok.kind {
                TokenKind::Eof => break,
                TokenKind::LeftDelim if self.at_definition() => {
                    self.next();
                    self.next_non_space();
                    self.parse_definition()?;
                }
                _ => match self.text_or_action()? {
                    Item::Node(node) => root.nodes.push(node),
                    Item::Stop(Terminator::End(pos)) => {
                        return Err(self.error_at(pos, "unexpected {{end}}"));
                    }
                    Item::Stop(Terminator::Else(pos, _)) => {
                        return Err(self.error_at(pos, "unexpected {{else}}"));
                    }
                },
            }
        }

        self.add_tree(self.name.to_string(), root)?;
        if let Some(i) = self.trees.iter().position(|t| t.name == self.name) {
            let tree = self.trees.remove(i);
            self.trees.insert(0, tree);
        }
        Ok(())
    }

    /// `{{define "name"}} ... {{end}}`, with the opening delimiter and keyword consumed.
    fn parse_definition(&mut self) -> Result<(), ParseError> {
        let context = "define clause";
        let name_tok = self.next_non_space();
        let name = self.template_name(&name_tok, context)?;
        self.expect(TokenKind::RightDelim, context)?;
        let list = self.isolated_list(context)?;
        self.add_tree(name, list)
    }

    /// Parse a list that ends in `{{end}}` with a fresh variable scope.
    fn isolated_list(&mut self, context: &str) -> Result<ListNode, ParseError> {
        let saved_vars = std::mem::replace(&mut self.vars, vec!["$".to_string()]);
        let saved_depth = std::mem::replace(&mut self.range_depth, 0);
        let result = self.item_list();
        self.vars = saved_vars;
        self.range_depth = saved_depth;

        match result? {
            (list, Terminator::End(_)) => Ok(list),
            (_, Terminator::Else(pos, _)) => {
                Err(self.error_at(pos, format!("unexpected {{{{else}}}} in {}", context)))
            }
        }
    }

    fn add_tree(&mut self, name: String, root: ListNode) -> Result<(), ParseError> {
        let tree = Tree {
            name,
            parse_name: self.name.to_string(),
            root,
            lines: Arc::clone(&self.lines),
        };
        if let Some(existing) = self.trees.iter_mut().find(|t| t.name == tree.name) {
            if existing.is_empty() {
                *existing = tree;
            } else if !tree.is_empty() {
                return Err(self.error_at(
                    tree.root.pos,
                    format!("multiple definition of template {:?}", tree.name),
                ));
            }
            return Ok(());
        }
        self.trees.push(tree);
        Ok(())
    }

    fn item_list(&mut self) -> Result<(ListNode, Terminator), ParseError> {
        let mut list = ListNode::new(self.peek().pos);
        loop {
            match self.text_or_action()? {
                Item::Node(node) => list.nodes.push(node),
                Item::Stop(term) => return Ok((list, term)),
            }
        }
    }

    fn text_or_action(&mut self) -> Result<Item, ParseError> {
        let tok = self.next();
        match tok.kind {
            TokenKind::Text => Ok(Item::Node(Node::Text(TextNode {
                pos: tok.pos,
                text: tok.text,
            }))),
            TokenKind::LeftDelim => self.action(),
            _ => Err(self.unexpected(&tok, "input")),
        }
    }

    // ------------------------------------------------------------------
    // Actions
    // ------------------------------------------------------------------

    fn action(&mut self) -> Result<Item, ParseError> {
        let tok = self.next_non_space();
        let node = match tok.kind {
            TokenKind::Keyword(Keyword::Block) => self.block_control(&tok)?,
            TokenKind::Keyword(Keyword::Break) => self.loop_control(&tok, "break")?,
            TokenKind::Keyword(Keyword::Continue) => self.loop_control(&tok, "continue")?,
            TokenKind::Keyword(Keyword::Else) => return self.else_control(&tok),
            TokenKind::Keyword(Keyword::End) => {
                self.expect(TokenKind::RightDelim, "end")?;
                return Ok(Item::Stop(Terminator::End(tok.pos)));
            }
            TokenKind::Keyword(Keyword::If) => Node::If(self.parse_control(Control::If, tok.pos)?),
            TokenKind::Keyword(Keyword::Range) => {
                Node::Range(self.parse_control(Control::Range, tok.pos)?)
            }
            TokenKind::Keyword(Keyword::With) => {
                Node::With(self.parse_control(Control::With, tok.pos)?)
            }
            TokenKind::Keyword(Keyword::Template) => self.template_control(&tok)?,
            TokenKind::Keyword(Keyword::Define) => return Err(self.unexpected(&tok, "command")),
            _ => {
                self.backup();
                let pipe = self.pipeline("command", TokenKind::RightDelim)?;
                Node::Action(ActionNode { pos: tok.pos, pipe })
            }
        };
        Ok(Item::Node(node))
    }

    fn parse_control(&mut self, control: Control, pos: Pos) -> Result<BranchNode, ParseError> {
        let context = control.context();
        let mark = self.vars.len();
        let pipe = self.pipeline(context, TokenKind::RightDelim)?;

        if control == Control::Range {
            self.range_depth += 1;
        }
        let body = self.item_list();
        if control == Control::Range {
            self.range_depth -= 1;
        }
        let (list, term) = body?;

        let else_list = match term {
            Terminator::End(_) => None,
            Terminator::Else(else_pos, kind) => {
                let chained = match (control, kind) {
                    (Control::If, ElseKind::If) | (Control::With, ElseKind::With) => true,
                    (_, ElseKind::Plain) => false,
                    _ => {
                        return Err(self.error_at(
                            else_pos,
                            format!("unexpected chained {{{{else}}}} in {}", context),
                        ));
                    }
                };
                if chained {
                    // `{{else if x}}` nests a new control that shares our {{end}}.
                    let keyword = self.next_non_space();
                    let nested = self.parse_control(control, keyword.pos)?;
                    let node = match control {
                        Control::With => Node::With(nested),
                        _ => Node::If(nested),
                    };
                    Some(ListNode {
                        pos: else_pos,
                        nodes: vec![node],
                    })
                } else {
                    match self.item_list()? {
                        (else_list, Terminator::End(_)) => Some(else_list),
                        (_, Terminator::Else(pos, _)) => {
                            return Err(self.error_at(pos, "expected end; found {{else}}"));
                        }
                    }
                }
            }
        };

        self.vars.truncate(mark);
        Ok(BranchNode {
            pos,
            pipe,
            list,
            else_list,
        })
    }

    fn else_control(&mut self, tok: &Token) -> Result<Item, ParseError> {
        // `{{else if ...}}` leaves the keyword for the chained control to consume.
        let peek = self.peek_non_space();
        let kind = match peek.kind {
            TokenKind::Keyword(Keyword::If) => ElseKind::If,
            TokenKind::Keyword(Keyword::With) => ElseKind::With,
            _ => {
                self.expect(TokenKind::RightDelim, "else")?;
                return Ok(Item::Stop(Terminator::Else(tok.pos, ElseKind::Plain)));
            }
        };
        Ok(Item::Stop(Terminator::Else(peek.pos, kind)))
    }

    fn loop_control(&mut self, tok: &Token, keyword: &str) -> Result<Node, ParseError> {
        self.expect(TokenKind::RightDelim, keyword)?;
        if self.range_depth == 0 {
            return Err(self.error_at(
                tok.pos,
                format!("{{{{{}}}}} outside {{{{range}}}}", keyword),
            ));
        }
        Ok(match keyword {
            "break" => Node::Break(tok.pos),
            _ => Node::Continue(tok.pos),
        })
    }

    fn template_name(&self, tok: &Token, context: &str) -> Result<String, ParseError> {
        match tok.kind {
            TokenKind::String | TokenKind::RawString => unquote(&tok.text)
                .ok_or_else(|| self.error_at(tok.pos, format!("invalid syntax: {}", tok.text))),
            _ => Err(self.unexpected(tok, context)),
        }
    }

    fn template_control(&mut self, tok: &Token) -> Result<Node, ParseError> {
        let context = "template clause";
        let name_tok = self.next_non_space();
        let name = self.template_name(&name_tok, context)?;

        let pipe = if self.next_non_space().kind == TokenKind::RightDelim {
            None
        } else {
            self.backup();
            Some(self.pipeline(context, TokenKind::RightDelim)?)
        };

        self.references.push(name.clone());
        Ok(Node::Template(TemplateNode {
            pos: tok.pos,
            name,
            pipe,
        }))
    }

    /// `{{block "name" pipeline}} ... {{end}}` defines `name` and invokes it in place.
    fn block_control(&mut self, tok: &Token) -> Result<Node, ParseError> {
        let context = "block clause";
        let name_tok = self.next_non_space();
        let name = self.template_name(&name_tok, context)?;
        let pipe = self.pipeline(context, TokenKind::RightDelim)?;
        let list = self.isolated_list(context)?;
        self.add_tree(name.clone(), list)?;
        Ok(Node::Template(TemplateNode {
            pos: tok.pos,
            name,
            pipe: Some(pipe),
        }))
    }

    // ------------------------------------------------------------------
    // Pipelines
    // ------------------------------------------------------------------

    fn pipeline(&mut self, context: &str, end: TokenKind) -> Result<PipeNode, ParseError> {
        let pos = self.peek_non_space().pos;
        let mut pipe = PipeNode {
            pos,
            is_assign: false,
            decl: Vec::new(),
            cmds: Vec::new(),
        };
        self.declarations(&mut pipe, context)?;

        loop {
            let tok = self.next_non_space();
            match tok.kind {
                kind if kind == end => {
                    self.check_pipeline(&pipe, context, &tok)?;
                    return Ok(pipe);
                }
                TokenKind::Bool
                | TokenKind::Dot
                | TokenKind::Field
                | TokenKind::Identifier
                | TokenKind::Number
                | TokenKind::Keyword(Keyword::Nil)
                | TokenKind::RawString
                | TokenKind::String
                | TokenKind::Variable
                | TokenKind::LeftParen => {
                    self.backup();
                    let cmd = self.command()?;
                    pipe.cmds.push(cmd);
                }
                _ => return Err(self.unexpected(&tok, context)),
            }
        }
    }

    /// Parse `$x :=`, `$x =` or (in range) `$i, $e :=` if present.
    fn declarations(&mut self, pipe: &mut PipeNode, context: &str) -> Result<(), ParseError> {
        let start = self.index;
        let first = self.next_non_space();
        if first.kind != TokenKind::Variable {
            self.index = start;
            return Ok(());
        }

        let op = self.peek_non_space();
        let mut vars = vec![first];
        match op.kind {
            TokenKind::Declare | TokenKind::Assign => {
                self.next_non_space();
            }
            TokenKind::Comma if context == "range" => {
                self.next_non_space();
                let second = self.next_non_space();
                if second.kind != TokenKind::Variable {
                    return Err(self.error_at(second.pos, "range can only initialize variables"));
                }
                vars.push(second);
                let op = self.next_non_space();
                if !matches!(op.kind, TokenKind::Declare | TokenKind::Assign) {
                    return Err(self.unexpected(&op, context));
                }
                pipe.is_assign = op.kind == TokenKind::Assign;
            }
            _ => {
                self.index = start;
                return Ok(());
            }
        }
        if op.kind != TokenKind::Comma {
            pipe.is_assign = op.kind == TokenKind::Assign;
        }

        for var in vars {
            if pipe.is_assign {
                self.use_var(&var)?;
            } else {
                self.vars.push(var.text.clone());
            }
            pipe.decl.push(VariableNode {
                pos: var.pos,
                ident: vec![var.text],
            });
        }
        Ok(())
    }

    fn check_pipeline(&self, pipe: &PipeNode, context: &str, tok: &Token) -> Result<(), ParseError> {
        if pipe.cmds.is_empty() {
            return Err(self.error_at(tok.pos, format!("missing value for {}", context)));
        }
        if let Some(nil @ Arg::Nil(_)) = pipe.cmds[0].args.first() {
            return Err(self.error_at(nil.pos(), "nil is not a command"));
        }
        for (i, cmd) in pipe.cmds.iter().enumerate().skip(1) {
            let Some(first) = cmd.args.first() else {
                continue;
            };
            if matches!(
                first,
                Arg::Bool(..) | Arg::Dot(_) | Arg::Nil(_) | Arg::Number(_) | Arg::String(_)
            ) {
                return Err(self.error_at(
                    first.pos(),
                    format!("non executable command in pipeline stage {}", i + 1),
                ));
            }
        }
        Ok(())
    }

    fn command(&mut self) -> Result<CommandNode, ParseError> {
        let pos = self.peek_non_space().pos;
        let mut cmd = CommandNode {
            pos,
            args: Vec::new(),
        };
        loop {
            self.peek_non_space();
            if let Some(operand) = self.operand()? {
                cmd.args.push(operand);
            }
            let tok = self.next();
            match tok.kind {
                TokenKind::Space => continue,
                TokenKind::RightDelim | TokenKind::RightParen => {
                    self.backup();
                    break;
                }
                TokenKind::Pipe => break,
                _ => return Err(self.unexpected(&tok, "operand")),
            }
        }
        if cmd.args.is_empty() {
            return Err(self.error_at(pos, "empty command"));
        }
        Ok(cmd)
    }

    fn operand(&mut self) -> Result<Option<Arg>, ParseError> {
        let Some(node) = self.term()? else {
            return Ok(None);
        };
        if self.peek().kind != TokenKind::Field {
            return Ok(Some(node));
        }

        let mut fields = Vec::new();
        while self.peek().kind == TokenKind::Field {
            let tok = self.next();
            fields.push(tok.text[1..].to_string());
        }
        let chained = match node {
            Arg::Field(mut field) => {
                field.ident.extend(fields);
                Arg::Field(field)
            }
            Arg::Variable(mut var) => {
                var.ident.extend(fields);
                Arg::Variable(var)
            }
            Arg::Bool(..) | Arg::Dot(_) | Arg::Nil(_) | Arg::Number(_) | Arg::String(_) => {
                return Err(
                    self.error_at(node.pos(), format!("unexpected . after term {:?}", node.to_string()))
                );
            }
            other => Arg::Chain(ChainNode {
                pos: other.pos(),
                node: Box::new(other),
                field: fields,
            }),
        };
        Ok(Some(chained))
    }

    fn term(&mut self) -> Result<Option<Arg>, ParseError> {
        let tok = self.next_non_space();
        let arg = match tok.kind {
            TokenKind::Identifier => {
                if !(self.is_func)(&tok.text) {
                    return Err(
                        self.error_at(tok.pos, format!("function {:?} not defined", tok.text))
                    );
                }
                Arg::Identifier(IdentifierNode {
                    pos: tok.pos,
                    name: tok.text,
                })
            }
            TokenKind::Dot => Arg::Dot(tok.pos),
            TokenKind::Keyword(Keyword::Nil) => Arg::Nil(tok.pos),
            TokenKind::Variable => {
                self.use_var(&tok)?;
                Arg::Variable(VariableNode {
                    pos: tok.pos,
                    ident: vec![tok.text],
                })
            }
            TokenKind::Field => Arg::Field(FieldNode {
                pos: tok.pos,
                ident: vec![tok.text[1..].to_string()],
            }),
            TokenKind::Bool => Arg::Bool(tok.pos, tok.text == "true"),
            TokenKind::Number => {
                let value = parse_number(&tok.text).ok_or_else(|| {
                    self.error_at(tok.pos, format!("illegal number syntax: {:?}", tok.text))
                })?;
                Arg::Number(NumberNode {
                    pos: tok.pos,
                    value,
                    text: tok.text,
                })
            }
            TokenKind::LeftParen => {
                Arg::Pipe(self.pipeline("parenthesized pipeline", TokenKind::RightParen)?)
            }
            TokenKind::String | TokenKind::RawString => {
                let text = unquote(&tok.text)
                    .ok_or_else(|| self.error_at(tok.pos, format!("invalid syntax: {}", tok.text)))?;
                Arg::String(StringNode {
                    pos: tok.pos,
                    quoted: tok.text,
                    text,
                })
            }
            _ => {
                self.backup();
                return Ok(None);
            }
        };
        Ok(Some(arg))
    }

    fn use_var(&self, tok: &Token) -> Result<(), ParseError> {
        if self.vars.iter().any(|v| *v == tok.text) {
            Ok(())
        } else {
            Err(self.error_at(tok.pos, format!("undefined variable {:?}", tok.text)))
        }
    }
}

fn parse_number(text: &str) -> Option<Number> {
    let clean: String = text.chars().filter(|c| *c != '_').collect();
    let (negative, digits) = match clean.as_bytes().first() {
        Some(b'-') => (true, &clean[1..]),
        Some(b'+') => (false, &clean[1..]),
        _ => (false, clean.as_str()),
    };

    if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        let value = i64::from_str_radix(hex, 16).ok()?;
        return Some(Number::Int(if negative { -value } else { value }));
    }
    if !digits.contains(['.', 'e', 'E']) {
        if let Ok(value) = clean.parse::<i64>() {
            return Some(Number::Int(value));
        }
    }
    clean.parse::<f64>().ok().map(Number::Float)
}

/// Unquote an interpreted (`"..."`) or raw (`` `...` ``) string literal.
pub(crate) fn unquote(quoted: &str) -> Option<String> {
    if let Some(raw) = quoted
        .strip_prefix('`')
        .and_then(|s| s.strip_suffix('`'))
    {
        return Some(raw.replace('\r', ""));
    }
    let inner = quoted.strip_prefix('"')?.strip_suffix('"')?;

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let escaped = match chars.next()? {
            'a' => '\u{7}',
            'b' => '\u{8}',
            'f' => '\u{c}',
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            'v' => '\u{b}',
            '\\' => '\\',
            '"' => '"',
            '\'' => '\'',
            'x' => hex_escape(&mut chars, 2)?,
            'u' => hex_escape(&mut chars, 4)?,
            'U' => hex_escape(&mut chars, 8)?,
            d @ '0'..='7' => {
                let rest: String = chars.by_ref().take(2).collect();
                let code = u32::from_str_radix(&format!("{}{}", d, rest), 8).ok()?;
                char::from_u32(code)?
            }
            _ => return None,
        };
        out.push(escaped);
    }
    Some(out)
}

fn hex_escape(chars: &mut std::str::Chars<'_>, len: usize) -> Option<char> {
    let digits: String = chars.by_ref().take(len).collect();
    if digits.len() != len {
        return None;
    }
    char::from_u32(u32::from_str_radix(&digits, 16).ok()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn builtin(name: &str) -> bool {
        matches!(name, "printf" | "len" | "eq" | "not")
    }

    fn parse_ok(text: &str) -> ParseOutput {
        parse("t", text, "", "", &builtin).expect("template should parse")
    }

    fn parse_err(text: &str) -> ParseError {
        parse("t", text, "", "", &builtin).expect_err("template should not parse")
    }

    fn root(text: &str) -> Vec<Node> {
        parse_ok(text).trees.remove(0).root.nodes
    }

    fn action_text(text: &str) -> String {
        match &root(text)[0] {
            Node::Action(action) => action.pipe.to_string(),
            other => panic!("expected action, got {:?}", other),
        }
    }

    #[test]
    fn test_text_and_action() {
        let nodes = root("Hello, {{.Name}}!");
        assert_eq!(nodes.len(), 3);
        assert!(matches!(&nodes[0], Node::Text(t) if t.text == "Hello, "));
        assert!(matches!(&nodes[1], Node::Action(_)));
        assert!(matches!(&nodes[2], Node::Text(t) if t.text == "!"));
    }

    #[test]
    fn test_pipelines_round_trip_through_display() {
        assert_eq!(action_text("{{.A.B}}"), ".A.B");
        assert_eq!(action_text("{{$x := len .Items}}"), "$x := len .Items");
        assert_eq!(action_text(r#"{{printf "%d" 3 | printf "%s"}}"#), r#"printf "%d" 3 | printf "%s""#);
        assert_eq!(action_text("{{(len .A).B}}"), "(len .A).B");
        assert_eq!(action_text("{{$.Top}}"), "$.Top");
    }

    #[test]
    fn test_define_produces_separate_tree() {
        let output = parse_ok(r#"main{{define "sub"}}body{{end}}"#);
        let names: Vec<&str> = output.trees.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["t", "sub"]);
        assert_eq!(output.trees[1].parse_name, "t");
    }

    #[test]
    fn test_template_reference_is_recorded() {
        let output = parse_ok(r#"{{template "later" .}}"#);
        assert_eq!(output.references, vec!["later".to_string()]);
    }

    #[test]
    fn test_block_defines_and_invokes() {
        let output = parse_ok(r#"{{block "list" .}}items{{end}}"#);
        assert_eq!(output.trees.len(), 2);
        assert!(matches!(&output.trees[0].root.nodes[0], Node::Template(t) if t.name == "list"));
    }

    #[test]
    fn test_else_if_chain_nests() {
        let nodes = root("{{if .A}}a{{else if .B}}b{{else}}c{{end}}");
        let Node::If(outer) = &nodes[0] else {
            panic!("expected if");
        };
        let else_list = outer.else_list.as_ref().unwrap();
        let Node::If(inner) = &else_list.nodes[0] else {
            panic!("expected nested if");
        };
        assert!(inner.else_list.is_some());
    }

    #[test]
    fn test_range_declarations() {
        let nodes = root("{{range $i, $e := .Items}}{{$i}}{{$e}}{{end}}");
        let Node::Range(range) = &nodes[0] else {
            panic!("expected range");
        };
        let names: Vec<&str> = range.pipe.decl.iter().map(|v| v.name()).collect();
        assert_eq!(names, vec!["$i", "$e"]);
    }

    #[test]
    fn test_variables_are_scoped_to_control() {
        let err = parse_err("{{if true}}{{$x := 1}}{{end}}{{$x}}");
        assert_eq!(err.message, "undefined variable \"$x\"");
    }

    #[test]
    fn test_redefinition_of_empty_tree_is_allowed() {
        let output = parse_ok(r#"{{define "a"}} {{end}}{{define "a"}}full{{end}}"#);
        let a = output.trees.iter().find(|t| t.name == "a").unwrap();
        assert!(!a.is_empty());
    }

    #[test]
    fn test_errors() {
        assert_eq!(parse_err("{{nope 1}}").message, "function \"nope\" not defined");
        assert_eq!(parse_err("{{end}}").message, "unexpected {{end}}");
        assert_eq!(parse_err("{{if .A}}").message, "unexpected EOF in input");
        assert_eq!(parse_err("{{break}}").message, "{{break}} outside {{range}}");
        assert_eq!(parse_err("{{}}").message, "missing value for command");
        assert_eq!(
            parse_err("{{.A | 3}}").message,
            "non executable command in pipeline stage 2"
        );
        assert_eq!(parse_err("{{nil}}").message, "nil is not a command");
        assert_eq!(parse_err("{{(nil)}}").message, "nil is not a command");
        assert_eq!(
            parse_err("{{.A | nil}}").message,
            "non executable command in pipeline stage 2"
        );
        assert_eq!(action_text(r#"{{printf "%v" nil}}"#), r#"printf "%v" nil"#);
        assert_eq!(
            parse_err(r#"{{define "a"}}x{{end}}{{define "a"}}y{{end}}"#).message,
            "multiple definition of template \"a\""
        );
        assert_eq!(
            parse_err(r#"{{if true}}{{define "a"}}{{end}}{{end}}"#).message,
            "unexpected <define> in command"
        );
        let err = parse_err("line one\n{{.A | }}\n{{$y}}");
        assert_eq!(err.line, 3);
    }

    #[test]
    fn test_numbers() {
        assert_eq!(parse_number("42"), Some(Number::Int(42)));
        assert_eq!(parse_number("-7"), Some(Number::Int(-7)));
        assert_eq!(parse_number("0x1F"), Some(Number::Int(31)));
        assert_eq!(parse_number("1_000"), Some(Number::Int(1000)));
        assert_eq!(parse_number("1.5"), Some(Number::Float(1.5)));
        assert_eq!(parse_number("1e3"), Some(Number::Float(1000.0)));
        assert_eq!(parse_number("0x"), None);
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquote(r#""a\tb\n""#).as_deref(), Some("a\tb\n"));
        assert_eq!(unquote(r#""é\x41\101""#).as_deref(), Some("éAA"));
        assert_eq!(unquote("`raw \\n`").as_deref(), Some("raw \\n"));
        assert_eq!(unquote(r#""bad \q""#), None);
    }
}
