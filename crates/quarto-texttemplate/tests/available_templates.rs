/*
 * available_templates.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Integration tests for listing the templates of a collection.
 */

use pretty_assertions::assert_eq;
use quarto_texttemplate::{ExecError, Template, TemplateEntry, TemplateError, Value};
use std::path::Path;

fn fixture(name: &str) -> String {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("test-fixtures")
        .join(name);
    std::fs::read_to_string(&path).unwrap_or_else(|_| panic!("Failed to read fixture: {}", name))
}

fn fixture_data(name: &str) -> Value {
    let json: serde_json::Value =
        serde_json::from_str(&fixture(name)).expect("fixture should be valid JSON");
    Value::from(json)
}

#[test]
fn test_uninitialized_collection_is_empty() {
    let t = Template::new("tmpl");
    assert_eq!(t.available_templates(), Vec::<String>::new());
}

#[test]
fn test_single_parsed_template() {
    let mut t = Template::new("tmpl");
    t.parse(r#"{{template "tmpl" .}}"#).unwrap();
    assert_eq!(t.available_templates(), vec!["tmpl"]);
}

#[test]
fn test_forward_reference_without_body_is_excluded() {
    let mut t = Template::new("main");
    t.parse(r#"start {{template "later" .}} end"#).unwrap();

    assert_eq!(t.available_templates(), vec!["main"]);
    let later = t.lookup("later").expect("reference should declare the name");
    assert_eq!(later.entry(), Some(TemplateEntry::Unresolved));
}

#[test]
fn test_declared_template_without_body_is_excluded() {
    let mut t = Template::new("main");
    t.parse("body").unwrap();
    let _pending = t.new_template("pending");
    assert_eq!(t.available_templates(), vec!["main"]);
}

#[test]
fn test_enumeration_is_idempotent() {
    let mut t = Template::new("main");
    t.parse(r#"{{define "a"}}A{{end}}{{define "b"}}B{{end}}{{template "c"}}"#)
        .unwrap();

    let first = t.available_templates();
    let second = t.available_templates();
    assert_eq!(first, vec!["main", "a", "b"]);
    assert_eq!(first, second);
}

#[test]
fn test_every_handle_sees_the_same_collection() {
    let mut t = Template::new("main");
    t.parse(r#"{{define "a"}}A{{end}}main"#).unwrap();
    let a = t.lookup("a").unwrap();
    assert_eq!(a.available_templates(), t.available_templates());
}

#[test]
fn test_each_name_listed_once_after_redefinition() {
    let mut t = Template::new("main");
    t.parse(r#"{{define "a"}}one{{end}}"#).unwrap();
    t.parse(r#"{{define "a"}}two{{end}}"#).unwrap();
    assert_eq!(t.available_templates(), vec!["main", "a"]);
    assert_eq!(t.render_template("a", &Value::Nil).unwrap(), "two");
}

#[test]
fn test_fixture_collection_resolves_forward_reference() {
    let mut page = Template::new("page.tmpl");
    page.parse(&fixture("page.tmpl")).unwrap();
    assert_eq!(page.available_templates(), vec!["page.tmpl", "header", "item"]);

    let data = fixture_data("page.json");
    let err = page.render(&data).unwrap_err();
    assert!(
        matches!(&err, TemplateError::Exec(ExecError::Exec { message, .. })
            if message == "\"footer\" is an incomplete or empty template"),
        "unexpected error: {}",
        err
    );

    let mut footer = page.new_template("footer.tmpl");
    footer.parse(&fixture("footer.tmpl")).unwrap();
    assert_eq!(
        page.available_templates(),
        vec!["page.tmpl", "header", "item", "footer", "footer.tmpl"]
    );

    assert_eq!(
        page.render(&data).unwrap(),
        "# Groceries\n- apples (green)\n- bread\n- milk\n-- Ada\n\n"
    );
}

#[test]
fn test_enumeration_from_many_threads() {
    let mut t = Template::new("main");
    t.parse(r#"{{define "a"}}A{{end}}main"#).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let t = t.clone();
            std::thread::spawn(move || t.available_templates())
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), vec!["main", "a"]);
    }
}
