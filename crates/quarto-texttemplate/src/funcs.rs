/*
 * funcs.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template functions.
//!
//! Builtins follow Go's `text/template` predefined functions. User functions
//! are registered on a collection with [`crate::Template::funcs`] and shadow
//! builtins of the same name.

use crate::error::FuncError;
use crate::value::{Value, go_exponent};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

/// A user-supplied template function.
pub type Func = Arc<dyn Fn(&[Value]) -> Result<Value, FuncError> + Send + Sync>;

/// Function name to implementation.
pub type FuncMap = HashMap<String, Func>;

/// Builtins may produce a missing value (`index` on an absent key).
pub(crate) type BuiltinFn = fn(&[Value]) -> Result<Option<Value>, FuncError>;

/// Look up a builtin function by name.
pub(crate) fn builtin(name: &str) -> Option<BuiltinFn> {
    let f: BuiltinFn = match name {
        "and" => and,
        "or" => or,
        "not" => not,
        "len" => len,
        "index" => index,
        "slice" => slice,
        "print" => print,
        "println" => println,
        "printf" => printf,
        "eq" => eq,
        "ne" => ne,
        "lt" => lt,
        "le" => le,
        "gt" => gt,
        "ge" => ge,
        "html" => html,
        "js" => js,
        "urlquery" => urlquery,
        _ => return None,
    };
    Some(f)
}

fn wrong_args(name: &str, want: &str, got: usize) -> FuncError {
    FuncError(format!(
        "wrong number of args for {}: want {} got {}",
        name, want, got
    ))
}

fn at_least(name: &str, args: &[Value], n: usize) -> Result<(), FuncError> {
    if args.len() < n {
        return Err(wrong_args(name, &format!("at least {}", n), args.len()));
    }
    Ok(())
}

fn exactly(name: &str, args: &[Value], n: usize) -> Result<(), FuncError> {
    if args.len() != n {
        return Err(wrong_args(name, &n.to_string(), args.len()));
    }
    Ok(())
}

// ----------------------------------------------------------------------
// Boolean
// ----------------------------------------------------------------------

fn and(args: &[Value]) -> Result<Option<Value>, FuncError> {
    at_least("and", args, 1)?;
    let decided = args.iter().find(|v| !v.is_truthy()).or(args.last());
    Ok(decided.cloned())
}

fn or(args: &[Value]) -> Result<Option<Value>, FuncError> {
    at_least("or", args, 1)?;
    let decided = args.iter().find(|v| v.is_truthy()).or(args.last());
    Ok(decided.cloned())
}

fn not(args: &[Value]) -> Result<Option<Value>, FuncError> {
    exactly("not", args, 1)?;
    Ok(Some(Value::Bool(!args[0].is_truthy())))
}

// ----------------------------------------------------------------------
// Collections
// ----------------------------------------------------------------------

fn len(args: &[Value]) -> Result<Option<Value>, FuncError> {
    exactly("len", args, 1)?;
    let n = match &args[0] {
        Value::String(s) => s.len(),
        Value::List(items) => items.len(),
        Value::Map(m) => m.len(),
        other => return Err(FuncError(format!("len of type {}", other.kind()))),
    };
    Ok(Some(Value::from(n)))
}

fn list_index(index: &Value, len: usize) -> Result<usize, FuncError> {
    match index {
        Value::Int(i) => {
            usize::try_from(*i).map_err(|_| FuncError(format!("index out of range: {}", i)))
        }
        other => Err(FuncError(format!(
            "cannot index slice/array with type {}",
            other.kind()
        ))),
    }
    .and_then(|i| {
        if i < len {
            Ok(i)
        } else {
            Err(FuncError(format!("index out of range: {}", i)))
        }
    })
}

fn index(args: &[Value]) -> Result<Option<Value>, FuncError> {
    at_least("index", args, 1)?;
    let mut item = Some(args[0].clone());
    for key in &args[1..] {
        item = match item {
            Some(Value::List(items)) => {
                let i = list_index(key, items.len())?;
                Some(items[i].clone())
            }
            Some(Value::String(s)) => {
                let i = list_index(key, s.len())?;
                Some(Value::Int(i64::from(s.as_bytes()[i])))
            }
            Some(Value::Map(m)) => match key {
                Value::String(k) => m.get(k).cloned(),
                other => {
                    return Err(FuncError(format!(
                        "value has type {}; should be string",
                        other.kind()
                    )));
                }
            },
            Some(Value::Nil) | None => {
                return Err(FuncError("index of untyped nil".to_string()));
            }
            Some(other) => {
                return Err(FuncError(format!("can't index item of type {}", other.kind())));
            }
        };
    }
    Ok(item)
}

fn slice_bound(index: &Value, cap: usize) -> Result<usize, FuncError> {
    match index {
        Value::Int(i) => usize::try_from(*i)
            .ok()
            .filter(|i| *i <= cap)
            .ok_or_else(|| FuncError(format!("index out of range: {}", i))),
        other => Err(FuncError(format!(
            "cannot index slice/array with type {}",
            other.kind()
        ))),
    }
}

fn slice(args: &[Value]) -> Result<Option<Value>, FuncError> {
    at_least("slice", args, 1)?;
    let indices = &args[1..];
    if indices.len() > 2 {
        return Err(FuncError(format!(
            "too many slice indexes: {}",
            indices.len()
        )));
    }
    let bounds = |len: usize| -> Result<(usize, usize), FuncError> {
        let start = match indices.first() {
            Some(i) => slice_bound(i, len)?,
            None => 0,
        };
        let end = match indices.get(1) {
            Some(i) => slice_bound(i, len)?,
            None => len,
        };
        if start > end {
            return Err(FuncError(format!("invalid slice index: {} > {}", start, end)));
        }
        Ok((start, end))
    };
    let sliced = match &args[0] {
        Value::String(s) => {
            let (start, end) = bounds(s.len())?;
            let part = s
                .get(start..end)
                .ok_or_else(|| FuncError("slice splits a UTF-8 sequence".to_string()))?;
            Value::String(part.to_string())
        }
        Value::List(items) => {
            let (start, end) = bounds(items.len())?;
            Value::List(items[start..end].to_vec())
        }
        other => return Err(FuncError(format!("can't slice item of type {}", other.kind()))),
    };
    Ok(Some(sliced))
}

// ----------------------------------------------------------------------
// Printing
// ----------------------------------------------------------------------

/// Go's `fmt.Sprint`: operands are separated by a space when neither is a string.
pub(crate) fn sprint(args: &[Value]) -> String {
    let mut out = String::new();
    for (i, arg) in args.iter().enumerate() {
        let is_string = matches!(arg, Value::String(_));
        if i > 0 && !is_string && !matches!(args[i - 1], Value::String(_)) {
            out.push(' ');
        }
        let _ = write!(out, "{}", arg);
    }
    out
}

fn print(args: &[Value]) -> Result<Option<Value>, FuncError> {
    Ok(Some(Value::String(sprint(args))))
}

fn println(args: &[Value]) -> Result<Option<Value>, FuncError> {
    let parts: Vec<String> = args.iter().map(ToString::to_string).collect();
    Ok(Some(Value::String(format!("{}\n", parts.join(" ")))))
}

fn printf(args: &[Value]) -> Result<Option<Value>, FuncError> {
    at_least("printf", args, 1)?;
    let format = match &args[0] {
        Value::String(s) => s.as_str(),
        other => {
            return Err(FuncError(format!(
                "printf format must be a string, got {}",
                other.kind()
            )));
        }
    };
    Ok(Some(Value::String(sprintf(format, &args[1..]))))
}

#[derive(Debug, Default)]
struct Directive {
    minus: bool,
    zero: bool,
    plus: bool,
    width: Option<usize>,
    precision: Option<usize>,
}

/// Widths and precisions past this swallow the rest of the format, as in Go.
const MAX_NUMBER: usize = 1_000_000;

fn take_number(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<usize> {
    let mut n: Option<usize> = None;
    while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
        let so_far = n.unwrap_or(0);
        if so_far > MAX_NUMBER {
            chars.by_ref().for_each(drop);
            return None;
        }
        n = Some(so_far * 10 + d as usize);
        chars.next();
    }
    n
}

/// A subset of Go's `fmt.Sprintf`.
pub(crate) fn sprintf(format: &str, args: &[Value]) -> String {
    let mut out = String::new();
    let mut chars = format.chars().peekable();
    let mut next_arg = 0;

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        let mut directive = Directive::default();
        while let Some(flag) = chars.peek() {
            match flag {
                '-' => directive.minus = true,
                '0' => directive.zero = true,
                '+' => directive.plus = true,
                _ => break,
            }
            chars.next();
        }
        directive.width = take_number(&mut chars);
        if chars.peek() == Some(&'.') {
            chars.next();
            directive.precision = Some(take_number(&mut chars).unwrap_or(0));
        }

        let Some(verb) = chars.next() else {
            out.push_str("%!(NOVERB)");
            break;
        };
        if verb == '%' {
            out.push('%');
            continue;
        }
        let Some(arg) = args.get(next_arg) else {
            let _ = write!(out, "%!{}(MISSING)", verb);
            continue;
        };
        next_arg += 1;

        let formatted = format_verb(verb, &directive, arg);
        out.push_str(&pad(formatted, &directive, matches!(arg, Value::Int(_) | Value::Float(_))));
    }

    if next_arg < args.len() {
        let extra: Vec<String> = args[next_arg..]
            .iter()
            .map(|v| format!("{}={}", v.kind(), v))
            .collect();
        let _ = write!(out, "%!(EXTRA {})", extra.join(", "));
    }
    out
}

fn bad_verb(verb: char, arg: &Value) -> String {
    format!("%!{}({}={})", verb, arg.kind(), arg)
}

fn format_verb(verb: char, directive: &Directive, arg: &Value) -> String {
    match (verb, arg) {
        ('v', _) => arg.to_string(),
        ('s', Value::String(s)) => match directive.precision {
            Some(p) => s.chars().take(p).collect(),
            None => s.clone(),
        },
        ('s', Value::List(_) | Value::Map(_) | Value::Bool(_) | Value::Nil) => arg.to_string(),
        ('d', Value::Int(i)) => {
            if directive.plus && *i >= 0 {
                format!("+{}", i)
            } else {
                i.to_string()
            }
        }
        ('q', Value::String(s)) => quote(s),
        ('t', Value::Bool(b)) => b.to_string(),
        ('f' | 'F', Value::Float(x)) => format!("{:.*}", directive.precision.unwrap_or(6), x),
        ('e', Value::Float(x)) => {
            go_exponent(&format!("{:.*e}", directive.precision.unwrap_or(6), x))
        }
        ('x', Value::Int(i)) => format!("{:x}", i),
        ('X', Value::Int(i)) => format!("{:X}", i),
        ('x', Value::String(s)) => s.bytes().map(|b| format!("{:02x}", b)).collect(),
        ('X', Value::String(s)) => s.bytes().map(|b| format!("{:02X}", b)).collect(),
        _ => bad_verb(verb, arg),
    }
}

fn pad(s: String, directive: &Directive, numeric: bool) -> String {
    let Some(width) = directive.width else {
        return s;
    };
    let len = s.chars().count();
    if len >= width {
        return s;
    }
    let fill = width - len;
    if directive.minus {
        format!("{}{}", s, " ".repeat(fill))
    } else if directive.zero && numeric {
        match s.strip_prefix('-') {
            Some(rest) => format!("-{}{}", "0".repeat(fill), rest),
            None => format!("{}{}", "0".repeat(fill), s),
        }
    } else {
        format!("{}{}", " ".repeat(fill), s)
    }
}

/// Double-quoted string with Go-style escapes.
fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

// ----------------------------------------------------------------------
// Comparison
// ----------------------------------------------------------------------

fn compare(a: &Value, b: &Value) -> Result<Ordering, FuncError> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(x.cmp(y)),
        (Value::Int(x), Value::Float(y)) => float_cmp(*x as f64, *y),
        (Value::Float(x), Value::Int(y)) => float_cmp(*x, *y as f64),
        (Value::Float(x), Value::Float(y)) => float_cmp(*x, *y),
        (Value::String(x), Value::String(y)) => Ok(x.cmp(y)),
        (Value::List(_) | Value::Map(_), _) | (_, Value::List(_) | Value::Map(_)) => {
            Err(FuncError("invalid type for comparison".to_string()))
        }
        _ => Err(FuncError("incompatible types for comparison".to_string())),
    }
}

fn float_cmp(x: f64, y: f64) -> Result<Ordering, FuncError> {
    x.partial_cmp(&y)
        .ok_or_else(|| FuncError("invalid type for comparison".to_string()))
}

fn equal(a: &Value, b: &Value) -> Result<bool, FuncError> {
    match (a, b) {
        (Value::Nil, _) | (_, Value::Nil) => Ok(matches!((a, b), (Value::Nil, Value::Nil))),
        (Value::Bool(x), Value::Bool(y)) => Ok(x == y),
        (Value::List(_) | Value::Map(_), _) | (_, Value::List(_) | Value::Map(_)) => {
            Err(FuncError("non-comparable type".to_string()))
        }
        _ => compare(a, b).map(|o| o == Ordering::Equal),
    }
}

fn eq(args: &[Value]) -> Result<Option<Value>, FuncError> {
    if args.len() < 2 {
        return Err(FuncError("missing argument for comparison".to_string()));
    }
    for other in &args[1..] {
        if equal(&args[0], other)? {
            return Ok(Some(Value::Bool(true)));
        }
    }
    Ok(Some(Value::Bool(false)))
}

fn ne(args: &[Value]) -> Result<Option<Value>, FuncError> {
    exactly("ne", args, 2)?;
    Ok(Some(Value::Bool(!equal(&args[0], &args[1])?)))
}

fn ordered(name: &str, args: &[Value], test: fn(Ordering) -> bool) -> Result<Option<Value>, FuncError> {
    exactly(name, args, 2)?;
    Ok(Some(Value::Bool(test(compare(&args[0], &args[1])?))))
}

fn lt(args: &[Value]) -> Result<Option<Value>, FuncError> {
    ordered("lt", args, Ordering::is_lt)
}

fn le(args: &[Value]) -> Result<Option<Value>, FuncError> {
    ordered("le", args, Ordering::is_le)
}

fn gt(args: &[Value]) -> Result<Option<Value>, FuncError> {
    ordered("gt", args, Ordering::is_gt)
}

fn ge(args: &[Value]) -> Result<Option<Value>, FuncError> {
    ordered("ge", args, Ordering::is_ge)
}

// ----------------------------------------------------------------------
// Escaping
// ----------------------------------------------------------------------

/// The text an escaper operates on: a lone string as-is, otherwise `Sprint` of the args.
fn escaper_input(args: &[Value]) -> String {
    match args {
        [Value::String(s)] => s.clone(),
        _ => sprint(args),
    }
}

pub fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\0' => out.push('\u{FFFD}'),
            c => out.push(c),
        }
    }
    out
}

pub fn js_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '<' => out.push_str("\\u003C"),
            '>' => out.push_str("\\u003E"),
            '&' => out.push_str("\\u0026"),
            '=' => out.push_str("\\u003D"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

pub fn url_query_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            b' ' => out.push('+'),
            b => {
                let _ = write!(out, "%{:02X}", b);
            }
        }
    }
    out
}

fn html(args: &[Value]) -> Result<Option<Value>, FuncError> {
    Ok(Some(Value::String(html_escape(&escaper_input(args)))))
}

fn js(args: &[Value]) -> Result<Option<Value>, FuncError> {
    Ok(Some(Value::String(js_escape(&escaper_input(args)))))
}

fn urlquery(args: &[Value]) -> Result<Option<Value>, FuncError> {
    Ok(Some(Value::String(url_query_escape(&escaper_input(args)))))
}
