mod common;

use anyhow::Result;
use plinth::extend::{match_template, RouteRule};

#[test]
fn patterns_are_anchored_to_the_full_path() -> Result<()> {
    let rule = RouteRule::new("GET", "/api/items")?;

    assert!(rule.matches("GET", "/api/items"));
    assert!(!rule.matches("GET", "/api/items/7"));
    assert!(!rule.matches("GET", "/prefix/api/items"));
    Ok(())
}

#[test]
fn explicit_anchors_are_kept_as_written() -> Result<()> {
    let rule = RouteRule::new("GET", "^/admin/.+$")?;

    assert!(rule.matches("GET", "/admin/dashboard"));
    assert!(!rule.matches("GET", "/admin/"));
    Ok(())
}

#[test]
fn method_comparison_and_wildcard() -> Result<()> {
    let rule = RouteRule::new("POST", "/admin/login")?;
    assert!(rule.matches("POST", "/admin/login"));
    assert!(!rule.matches("GET", "/admin/login"));

    let any_method = RouteRule::new("*", "/admin/logout")?;
    assert!(any_method.matches("GET", "/admin/logout"));
    assert!(any_method.matches("DELETE", "/admin/logout"));
    Ok(())
}

#[test]
fn wildcard_path_matches_everything() -> Result<()> {
    let rule = RouteRule::new("GET", "*")?;
    assert!(rule.matches("GET", "/"));
    assert!(rule.matches("GET", "/deeply/nested/path"));
    assert!(!rule.matches("POST", "/"));

    let catch_all = RouteRule::any();
    assert!(catch_all.matches("PATCH", "/anything"));
    Ok(())
}

#[test]
fn regex_classes_and_optionals() -> Result<()> {
    let rule = RouteRule::new("GET", "/admin/?")?;
    assert!(rule.matches("GET", "/admin"));
    assert!(rule.matches("GET", "/admin/"));
    assert!(!rule.matches("GET", "/admin/x"));

    let sub = RouteRule::new("*", "/admin/.+")?;
    assert!(sub.matches("GET", "/admin/pages"));
    assert!(!sub.matches("GET", "/admin/"));
    Ok(())
}

#[test]
fn malformed_pattern_is_rejected_at_registration() {
    let result = RouteRule::new("GET", "/admin/(unclosed");
    assert!(result.is_err());
}

#[test]
fn template_matching_binds_named_segments() {
    let params = match_template("docs/42/edit", "docs/{id}/edit").expect("should match");
    assert_eq!(params.get("id").map(String::as_str), Some("42"));

    let params = match_template("docs/42", "docs/{id}").expect("should match");
    assert_eq!(params.get("id").map(String::as_str), Some("42"));
}

#[test]
fn template_matching_requires_exact_segment_count() {
    assert!(match_template("docs", "docs/{id}").is_none());
    assert!(match_template("docs/42/edit", "docs/{id}").is_none());
    assert!(match_template("pages/42", "docs/{id}").is_none());
}

#[test]
fn literal_segments_must_match_exactly() {
    assert!(match_template("docs/42/edit", "docs/{id}/delete").is_none());
    assert!(match_template("dashboard", "dashboard").is_some());
    assert!(match_template("dashboards", "dashboard").is_none());
}
