/*
 * missing_value.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Integration tests for missing-value placeholders and notification hooks.
 */

use pretty_assertions::assert_eq;
use quarto_texttemplate::{
    ExecOptions, NO_VALUE_DEFAULT, Template, Value, no_value, reset_no_value, set_no_value,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Tests in this file share the process-wide placeholder.
static REGISTRY: Mutex<()> = Mutex::new(());

fn registry() -> MutexGuard<'static, ()> {
    let guard = REGISTRY.lock().unwrap_or_else(PoisonError::into_inner);
    reset_no_value();
    guard
}

fn empty_map() -> Value {
    Value::Map(Default::default())
}

#[test]
fn test_default_placeholder() {
    let _registry = registry();

    let mut t = Template::new("t");
    t.parse("[{{.missing}}]").unwrap();
    assert_eq!(t.render(&empty_map()).unwrap(), "[<no value>]");
    assert_eq!(no_value(), NO_VALUE_DEFAULT);
}

#[test]
fn test_set_no_value_applies_to_every_collection() {
    let _registry = registry();

    let mut first = Template::new("first");
    first.parse("{{.x}}").unwrap();
    let mut second = Template::new("second");
    second.parse("{{.y}}").unwrap();

    set_no_value("N/A");
    assert_eq!(first.render(&empty_map()).unwrap(), "N/A");
    assert_eq!(second.render(&empty_map()).unwrap(), "N/A");

    set_no_value("");
    assert_eq!(first.render(&empty_map()).unwrap(), "");

    reset_no_value();
    assert_eq!(first.render(&empty_map()).unwrap(), "<no value>");
}

#[test]
fn test_placeholder_and_hook_on_defined_template() {
    let _registry = registry();

    let calls: Arc<Mutex<Vec<(String, String, String)>>> = Arc::default();
    let record = {
        let calls = Arc::clone(&calls);
        move |missing: &quarto_texttemplate::MissingValue<'_>| {
            calls.lock().unwrap().push((
                missing.placeholder.to_string(),
                missing.template.to_string(),
                missing.location.to_string(),
            ));
        }
    };

    let mut t = Template::new("tmpl");
    t.parse(r#"{{define "sub"}} -->>{{.missing}}<<-- {{end}}"#)
        .unwrap();
    for name in t.available_templates() {
        let mut handle = t.lookup(&name).unwrap();
        handle.set_missing_value("bob").on_missing_value(record.clone());
    }

    let mut out = Vec::new();
    t.execute_template(&mut out, "sub", &empty_map()).unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), " -->>bob<<-- ");

    let calls = calls.lock().unwrap();
    assert_eq!(
        *calls,
        vec![("bob".to_string(), "sub".to_string(), "tmpl:1:24".to_string())]
    );
}

#[test]
fn test_template_override_beats_global_and_options() {
    let _registry = registry();
    set_no_value("global");

    let mut t = Template::new("t");
    t.parse(r#"{{.a}}|{{template "sub" .}}{{define "sub"}}{{.b}}{{end}}"#)
        .unwrap();
    t.lookup("sub").unwrap().set_missing_value("sub-only");

    assert_eq!(t.render(&empty_map()).unwrap(), "global|sub-only");
    let options = ExecOptions::new().with_no_value("per-call");
    assert_eq!(
        t.render_with_options(&empty_map(), &options).unwrap(),
        "per-call|sub-only"
    );
}

#[test]
fn test_hook_counts_every_substitution() {
    let _registry = registry();

    let count = Arc::new(Mutex::new(0usize));
    let mut t = Template::new("t");
    t.parse("{{range .rows}}{{.absent}};{{end}}").unwrap();
    {
        let count = Arc::clone(&count);
        t.on_missing_value(move |_| *count.lock().unwrap() += 1);
    }

    let data = Value::map([("rows", Value::from(vec![1, 2, 3]))]);
    let err = t.render(&data).unwrap_err();
    // Field access on an int is an error, not a missing value.
    assert!(err.to_string().contains("can't evaluate field absent in type int"));
    assert_eq!(*count.lock().unwrap(), 0);

    let rows = Value::from(vec![empty_map(), empty_map(), empty_map()]);
    let data = Value::map([("rows", rows)]);
    assert_eq!(t.render(&data).unwrap(), "<no value>;<no value>;<no value>;");
    assert_eq!(*count.lock().unwrap(), 3);
}

#[test]
fn test_hooks_are_per_template() {
    let _registry = registry();

    let seen: Arc<Mutex<Vec<String>>> = Arc::default();
    let mut t = Template::new("outer");
    t.parse(r#"{{.x}}{{template "inner" .}}{{define "inner"}}{{.y}}{{end}}"#)
        .unwrap();
    {
        let seen = Arc::clone(&seen);
        t.lookup("inner")
            .unwrap()
            .on_missing_value(move |m| seen.lock().unwrap().push(m.template.to_string()));
    }

    assert_eq!(t.render(&empty_map()).unwrap(), "<no value><no value>");
    assert_eq!(*seen.lock().unwrap(), vec!["inner".to_string()]);
}

#[test]
fn test_missing_key_error_still_notifies() {
    let _registry = registry();

    let seen: Arc<Mutex<Vec<String>>> = Arc::default();
    let mut t = Template::new("t");
    t.option("missingkey=error").unwrap();
    t.parse("{{.gone}}").unwrap();
    {
        let seen = Arc::clone(&seen);
        t.set_missing_value("?")
            .on_missing_value(move |m| seen.lock().unwrap().push(m.placeholder.to_string()));
    }

    let err = t.render(&empty_map()).unwrap_err();
    assert_eq!(
        err.to_string(),
        "template: t:1:3: executing \"t\" at <.gone>: map has no entry for key \"gone\""
    );
    assert_eq!(*seen.lock().unwrap(), vec!["?".to_string()]);
}

#[test]
fn test_execution_snapshots_placeholder() {
    let _registry = registry();

    let mut t = Template::new("t");
    t.func("change", |_| {
        set_no_value("changed");
        Ok(Value::from(""))
    });
    t.parse("{{.a}}{{change}}{{.b}}").unwrap();

    assert_eq!(t.render(&empty_map()).unwrap(), "<no value><no value>");
    assert_eq!(t.render(&empty_map()).unwrap(), "changedchanged");
}
