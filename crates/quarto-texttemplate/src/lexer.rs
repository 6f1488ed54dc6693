/*
 * lexer.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template tokenizer.
//!
//! Splits template source into literal text and the tokens inside `{{ }}`
//! actions. Comments are dropped here, and trim markers (`{{- ` and ` -}}`)
//! are applied to the neighbouring text so the parser never sees them.

use crate::error::ParseError;

/// Byte offset into the template source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Pos(pub usize);

impl std::fmt::Display for Pos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub const DEFAULT_LEFT_DELIM: &str = "{{";
pub const DEFAULT_RIGHT_DELIM: &str = "}}";

const LEFT_COMMENT: &str = "/*";
const RIGHT_COMMENT: &str = "*/";

/// Maps byte offsets to 1-based line and column numbers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LineIndex {
    /// Offsets of the first byte of each line.
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            source
                .bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(i, _)| i + 1),
        );
        Self { line_starts }
    }

    /// Line number (1-based) containing `pos`.
    pub fn line(&self, pos: Pos) -> usize {
        match self.line_starts.binary_search(&pos.0) {
            Ok(i) => i + 1,
            Err(i) => i,
        }
    }

    /// Line and column (both 1-based) of `pos`.
    pub fn line_col(&self, pos: Pos) -> (usize, usize) {
        let line = self.line(pos);
        let start = self.line_starts[line - 1];
        (line, pos.0 - start + 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Block,
    Break,
    Continue,
    Define,
    Else,
    End,
    If,
    Nil,
    Range,
    Template,
    With,
}

impl Keyword {
    fn from_ident(word: &str) -> Option<Self> {
        Some(match word {
            "block" => Keyword::Block,
            "break" => Keyword::Break,
            "continue" => Keyword::Continue,
            "define" => Keyword::Define,
            "else" => Keyword::Else,
            "end" => Keyword::End,
            "if" => Keyword::If,
            "nil" => Keyword::Nil,
            "range" => Keyword::Range,
            "template" => Keyword::Template,
            "with" => Keyword::With,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Literal text outside actions.
    Text,
    LeftDelim,
    RightDelim,
    /// Run of white space inside an action; separates operands.
    Space,
    LeftParen,
    RightParen,
    Pipe,
    Comma,
    /// `:=`
    Declare,
    /// `=`
    Assign,
    /// A lone `.`
    Dot,
    /// `.Name`, text includes the leading dot.
    Field,
    /// `$` or `$name`, text includes the dollar sign.
    Variable,
    Identifier,
    Bool,
    Number,
    /// Quoted string, text includes the quotes.
    String,
    /// Raw string, text includes the backquotes.
    RawString,
    Keyword(Keyword),
    Eof,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub pos: Pos,
    pub line: usize,
}

impl Token {
    /// Human-readable description used in parse errors.
    pub fn describe(&self) -> String {
        match self.kind {
            TokenKind::Eof => "EOF".to_string(),
            TokenKind::Keyword(_) => format!("<{}>", self.text),
            TokenKind::Space => "space".to_string(),
            _ => format!("{:?}", self.text),
        }
    }
}

fn is_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

fn is_alphanumeric(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

fn trim_leading_space(s: &str) -> usize {
    s.len() - s.trim_start_matches(is_space).len()
}

struct Lexer<'a> {
    name: &'a str,
    input: &'a str,
    left: &'a str,
    right: &'a str,
    pos: usize,
    lines: LineIndex,
    tokens: Vec<Token>,
    paren_depth: usize,
}

/// Tokenize `input` using the given delimiters.
///
/// Empty delimiters fall back to `{{` and `}}`.
pub fn lex(name: &str, input: &str, left: &str, right: &str) -> Result<Vec<Token>, ParseError> {
    let mut lexer = Lexer {
        name,
        input,
        left: if left.is_empty() { DEFAULT_LEFT_DELIM } else { left },
        right: if right.is_empty() { DEFAULT_RIGHT_DELIM } else { right },
        pos: 0,
        lines: LineIndex::new(input),
        tokens: Vec::new(),
        paren_depth: 0,
    };
    lexer.run()?;
    Ok(lexer.tokens)
}

impl<'a> Lexer<'a> {
    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn error(&self, pos: usize, message: impl Into<String>) -> ParseError {
        ParseError::new(self.name, self.lines.line(Pos(pos)), message)
    }

    fn emit(&mut self, kind: TokenKind, start: usize) {
        let text = self.input[start..self.pos].to_string();
        self.emit_text(kind, text, start);
    }

    fn emit_text(&mut self, kind: TokenKind, text: String, start: usize) {
        self.tokens.push(Token {
            kind,
            text,
            pos: Pos(start),
            line: self.lines.line(Pos(start)),
        });
    }

    /// Is the action starting at `at` (just past the left delimiter) opened with a trim marker?
    fn has_left_trim_marker(&self, at: usize) -> bool {
        let s = &self.input[at..];
        let mut chars = s.chars();
        chars.next() == Some('-') && chars.next().is_some_and(is_space)
    }

    /// Returns the length of a closing ` -}}` sequence at the cursor, if present.
    fn right_trim_marker_len(&self) -> Option<usize> {
        let s = self.rest();
        let first = s.chars().next().filter(|c| is_space(*c))?;
        let after = &s[first.len_utf8()..];
        if after.starts_with('-') && after[1..].starts_with(self.right) {
            Some(first.len_utf8() + 1 + self.right.len())
        } else {
            None
        }
    }

    fn run(&mut self) -> Result<(), ParseError> {
        let mut trim_next_text = false;
        loop {
            let rest = self.rest();
            let start = self.pos;
            let found = rest.find(self.left);
            let text_end = found.map_or(self.input.len(), |i| start + i);

            let mut text = &self.input[start..text_end];
            if trim_next_text {
                text = text.trim_start_matches(is_space);
            }
            let text_start = text_end - text.len();

            let Some(_) = found else {
                if !text.is_empty() {
                    self.emit_text(TokenKind::Text, text.to_string(), text_start);
                }
                self.pos = self.input.len();
                self.emit_text(TokenKind::Eof, String::new(), self.pos);
                return Ok(());
            };

            let after_delim = text_end + self.left.len();
            let trim_left = self.has_left_trim_marker(after_delim);
            if trim_left {
                text = text.trim_end_matches(is_space);
            }
            if !text.is_empty() {
                self.emit_text(TokenKind::Text, text.to_string(), text_start);
            }

            self.pos = text_end;
            let delim_start = self.pos;
            self.pos = after_delim;
            if trim_left {
                // Skip the '-'; the following space is consumed as action space.
                self.pos += 1;
            }

            let body = &self.input[self.pos..];
            let spaced = trim_leading_space(body);
            if trim_left && body[spaced..].starts_with(LEFT_COMMENT)
                || !trim_left && body.starts_with(LEFT_COMMENT)
            {
                self.pos += if trim_left { spaced } else { 0 };
                trim_next_text = self.lex_comment()?;
                continue;
            }

            self.emit_text(TokenKind::LeftDelim, self.left.to_string(), delim_start);
            trim_next_text = self.lex_inside_action()?;
        }
    }

    /// Consume a `/* ... */` comment and its closing delimiter.
    ///
    /// Returns whether the comment closed with a trim marker.
    fn lex_comment(&mut self) -> Result<bool, ParseError> {
        let start = self.pos;
        self.pos += LEFT_COMMENT.len();
        let Some(end) = self.rest().find(RIGHT_COMMENT) else {
            return Err(self.error(start, "unclosed comment"));
        };
        self.pos += end + RIGHT_COMMENT.len();

        if let Some(len) = self.right_trim_marker_len() {
            self.pos += len;
            return Ok(true);
        }
        if self.rest().starts_with(self.right) {
            self.pos += self.right.len();
            return Ok(false);
        }
        Err(self.error(start, "comment ends before closing delimiter"))
    }

    /// Lex tokens until the closing delimiter.
    ///
    /// Returns whether the action closed with a trim marker.
    fn lex_inside_action(&mut self) -> Result<bool, ParseError> {
        loop {
            let start = self.pos;

            if let Some(len) = self.right_trim_marker_len() {
                self.check_parens(start)?;
                let delim_start = self.pos + len - self.right.len();
                self.pos += len;
                self.emit_text(TokenKind::RightDelim, self.right.to_string(), delim_start);
                return Ok(true);
            }
            if self.rest().starts_with(self.right) {
                self.check_parens(start)?;
                self.pos += self.right.len();
                self.emit(TokenKind::RightDelim, start);
                return Ok(false);
            }

            let Some(c) = self.peek() else {
                return Err(self.error(start, "unclosed action"));
            };

            match c {
                c if is_space(c) => {
                    // Stop before a trim marker so it is seen on the next turn.
                    while let Some(c) = self.peek() {
                        if !is_space(c) || self.right_trim_marker_len().is_some() {
                            break;
                        }
                        self.pos += c.len_utf8();
                    }
                    if self.pos == start {
                        // A trim marker at the very start of the run.
                        continue;
                    }
                    self.emit(TokenKind::Space, start);
                }
                '=' => {
                    self.pos += 1;
                    self.emit(TokenKind::Assign, start);
                }
                ':' => {
                    if !self.rest()[1..].starts_with('=') {
                        return Err(self.error(start, "expected :="));
                    }
                    self.pos += 2;
                    self.emit(TokenKind::Declare, start);
                }
                '|' => {
                    self.pos += 1;
                    self.emit(TokenKind::Pipe, start);
                }
                ',' => {
                    self.pos += 1;
                    self.emit(TokenKind::Comma, start);
                }
                '"' => self.lex_quote(start)?,
                '`' => self.lex_raw_quote(start)?,
                '$' => {
                    self.pos += 1;
                    self.eat_alphanumeric();
                    self.emit(TokenKind::Variable, start);
                }
                '.' => {
                    let next = self.rest()[1..].chars().next();
                    match next {
                        Some(d) if d.is_ascii_digit() => self.lex_number(start)?,
                        Some(n) if is_alphanumeric(n) => {
                            self.pos += 1;
                            self.eat_alphanumeric();
                            self.emit(TokenKind::Field, start);
                        }
                        _ => {
                            self.pos += 1;
                            self.emit(TokenKind::Dot, start);
                        }
                    }
                }
                '+' | '-' | '0'..='9' => self.lex_number(start)?,
                '(' => {
                    self.pos += 1;
                    self.paren_depth += 1;
                    self.emit(TokenKind::LeftParen, start);
                }
                ')' => {
                    if self.paren_depth == 0 {
                        return Err(self.error(start, "unexpected right paren"));
                    }
                    self.pos += 1;
                    self.paren_depth -= 1;
                    self.emit(TokenKind::RightParen, start);
                }
                c if is_alphanumeric(c) => {
                    self.eat_alphanumeric();
                    let word = &self.input[start..self.pos];
                    let kind = match word {
                        "true" | "false" => TokenKind::Bool,
                        _ => match Keyword::from_ident(word) {
                            Some(k) => TokenKind::Keyword(k),
                            None => TokenKind::Identifier,
                        },
                    };
                    self.emit(kind, start);
                }
                c => {
                    return Err(self.error(
                        start,
                        format!("unrecognized character in action: U+{:04X}", c as u32),
                    ));
                }
            }
        }
    }

    fn check_parens(&self, at: usize) -> Result<(), ParseError> {
        if self.paren_depth > 0 {
            Err(self.error(at, "unclosed left paren"))
        } else {
            Ok(())
        }
    }

    fn eat_alphanumeric(&mut self) {
        while let Some(c) = self.peek() {
            if !is_alphanumeric(c) {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    fn eat_while(&mut self, pred: impl Fn(char) -> bool) -> usize {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            self.pos += c.len_utf8();
        }
        self.pos - start
    }

    fn lex_number(&mut self, start: usize) -> Result<(), ParseError> {
        if matches!(self.peek(), Some('+' | '-')) {
            self.pos += 1;
        }
        let rest = self.rest();
        if rest.starts_with("0x") || rest.starts_with("0X") {
            self.pos += 2;
            self.eat_while(|c| c.is_ascii_hexdigit() || c == '_');
        } else {
            self.eat_while(|c| c.is_ascii_digit() || c == '_');
            if self.peek() == Some('.') {
                self.pos += 1;
                self.eat_while(|c| c.is_ascii_digit() || c == '_');
            }
            if matches!(self.peek(), Some('e' | 'E')) {
                self.pos += 1;
                if matches!(self.peek(), Some('+' | '-')) {
                    self.pos += 1;
                }
                self.eat_while(|c| c.is_ascii_digit());
            }
        }
        if self.peek().is_some_and(is_alphanumeric) || self.pos == start + 1 && {
            let c = self.input.as_bytes()[start];
            c == b'+' || c == b'-'
        } {
            self.eat_alphanumeric();
            return Err(self.error(
                start,
                format!("bad number syntax: {:?}", &self.input[start..self.pos]),
            ));
        }
        self.emit(TokenKind::Number, start);
        Ok(())
    }

    fn lex_quote(&mut self, start: usize) -> Result<(), ParseError> {
        self.pos += 1;
        loop {
            match self.peek() {
                Some('\\') => {
                    self.pos += 1;
                    match self.peek() {
                        Some(c) if c != '\n' => self.pos += c.len_utf8(),
                        _ => return Err(self.error(start, "unterminated quoted string")),
                    }
                }
                Some('"') => {
                    self.pos += 1;
                    break;
                }
                Some('\n') | None => {
                    return Err(self.error(start, "unterminated quoted string"));
                }
                Some(c) => self.pos += c.len_utf8(),
            }
        }
        self.emit(TokenKind::String, start);
        Ok(())
    }

    fn lex_raw_quote(&mut self, start: usize) -> Result<(), ParseError> {
        self.pos += 1;
        let Some(end) = self.rest().find('`') else {
            return Err(self.error(start, "unterminated raw quoted string"));
        };
        self.pos += end + 1;
        self.emit(TokenKind::RawString, start);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        lex("t", input, "", "")
            .expect("input should lex")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    fn texts(input: &str) -> Vec<String> {
        lex("t", input, "", "")
            .expect("input should lex")
            .into_iter()
            .map(|t| t.text)
            .collect()
    }

    #[test]
    fn test_text_only() {
        assert_eq!(kinds("hello"), vec![TokenKind::Text, TokenKind::Eof]);
        assert_eq!(kinds(""), vec![TokenKind::Eof]);
    }

    #[test]
    fn test_field_chain() {
        assert_eq!(
            kinds("a{{.A.B}}"),
            vec![
                TokenKind::Text,
                TokenKind::LeftDelim,
                TokenKind::Field,
                TokenKind::Field,
                TokenKind::RightDelim,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_pipeline_tokens() {
        assert_eq!(
            texts(r#"{{$x := printf "%d" 3 | len}}"#),
            vec!["{{", "$x", " ", ":=", " ", "printf", " ", "\"%d\"", " ", "3", " ", "|", " ", "len", "}}", ""]
        );
    }

    #[test]
    fn test_keywords_and_bools() {
        assert_eq!(
            kinds("{{if true}}{{end}}"),
            vec![
                TokenKind::LeftDelim,
                TokenKind::Keyword(Keyword::If),
                TokenKind::Space,
                TokenKind::Bool,
                TokenKind::RightDelim,
                TokenKind::LeftDelim,
                TokenKind::Keyword(Keyword::End),
                TokenKind::RightDelim,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_trim_markers() {
        let tokens = lex("t", "a  \n{{- .x -}}\n\t b", "", "").unwrap();
        assert_eq!(tokens[0].text, "a");
        assert_eq!(tokens.last().map(|t| t.kind), Some(TokenKind::Eof));
        let last_text = tokens
            .iter()
            .rev()
            .find(|t| t.kind == TokenKind::Text)
            .unwrap();
        assert_eq!(last_text.text, "b");
    }

    #[test]
    fn test_negative_number_is_not_trim_marker() {
        assert_eq!(texts("{{-3}}"), vec!["{{", "-3", "}}", ""]);
    }

    #[test]
    fn test_comment_is_dropped() {
        assert_eq!(texts("a{{/* note */}}b"), vec!["a", "b", ""]);
        assert_eq!(texts("a {{- /* note */ -}} b"), vec!["a", "b", ""]);
    }

    #[test]
    fn test_custom_delims() {
        let tokens = lex("t", "<<.x>>{{.y}}", "<<", ">>").unwrap();
        assert_eq!(tokens[1].kind, TokenKind::Field);
        assert_eq!(tokens[3].text, "{{.y}}");
    }

    #[test]
    fn test_errors() {
        let err = lex("t", "{{.x", "", "").unwrap_err();
        assert_eq!(err.message, "unclosed action");

        let err = lex("t", "line1\n{{\"abc}}", "", "").unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.message, "unterminated quoted string");

        let err = lex("t", "{{(.x}}", "", "").unwrap_err();
        assert_eq!(err.message, "unclosed left paren");

        let err = lex("t", "{{/* open", "", "").unwrap_err();
        assert_eq!(err.message, "unclosed comment");

        let err = lex("t", "{{3x}}", "", "").unwrap_err();
        assert_eq!(err.message, "bad number syntax: \"3x\"");
    }

    #[test]
    fn test_line_index() {
        let index = LineIndex::new("ab\ncd\n\nef");
        assert_eq!(index.line_col(Pos(0)), (1, 1));
        assert_eq!(index.line_col(Pos(1)), (1, 2));
        assert_eq!(index.line_col(Pos(3)), (2, 1));
        assert_eq!(index.line_col(Pos(6)), (3, 1));
        assert_eq!(index.line_col(Pos(7)), (4, 1));
    }
}
