//! Generic DOM scanning: the fallback extraction strategy and the
//! validation-error reader.
//!
//! The walker prefers the schema-level read from the page handle; this
//! module fires only when that read returns nothing, or when the probe
//! needs to associate visible validation errors with their fields. It walks
//! raw HTML with `scraper`, filters out hidden elements and non-form chrome
//! by keyword table, and resolves labels in the fixed priority
//! `label[for]` > `aria-label` > `placeholder`.
//!
//! All functions here are synchronous because `scraper`'s types are
//! `!Send`; callers in async context keep the parse inside one call and
//! never hold it across an await.

use crate::discovery::heuristics::heuristics;
use crate::discovery::normalize::RawField;
use crate::discovery::types::FieldOption;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;

// ── Public types ────────────────────────────────────────────────────────────

/// A clickable control found on the page.
#[derive(Debug, Clone)]
pub struct ControlCandidate {
    /// Selector a driver can click (`#id`, `[name=..]`, or `idx:tag:n`).
    pub selector: String,
    /// Visible text of the control.
    pub text: String,
}

/// Everything one scan pass finds.
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    /// Form fields, in document order.
    pub fields: Vec<RawField>,
    /// Clickable controls, in document order.
    pub controls: Vec<ControlCandidate>,
}

/// A visible validation error associated with a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Raw `name`/`id` of the field the error points at (not yet
    /// normalized).
    pub field_ref: String,
    /// The error message text.
    pub message: String,
}

// ── Form element scan ───────────────────────────────────────────────────────

/// Scan raw HTML for form fields and clickable controls.
pub fn scan_form_elements(html: &str) -> ScanResult {
    let document = Html::parse_document(html);
    let mut result = ScanResult::default();

    let label_by_target = collect_label_targets(&document);

    let field_sel = Selector::parse("input, select, textarea, [contenteditable='true']")
        .expect("field selector is valid");

    for el in document.select(&field_sel) {
        if is_hidden(&el) || in_page_chrome(&el) {
            continue;
        }
        if let Some(raw) = raw_field_from_element(&el, &label_by_target) {
            result.fields.push(raw);
        }
    }

    let control_sel =
        Selector::parse("button, input[type='submit'], a[role='button'], [role='button']")
            .expect("control selector is valid");

    for el in document.select(&control_sel) {
        if is_hidden(&el) || in_page_chrome(&el) {
            continue;
        }
        let text = el
            .value()
            .attr("value")
            .map(str::to_string)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| element_text(&el));
        if text.trim().is_empty() {
            continue;
        }
        result.controls.push(ControlCandidate {
            selector: control_selector(&document, &el),
            text: text.trim().to_string(),
        });
    }

    result
}

fn raw_field_from_element(
    el: &ElementRef<'_>,
    labels: &HashMap<String, String>,
) -> Option<RawField> {
    let tag = el.value().name().to_lowercase();
    let is_editable = el.value().attr("contenteditable") == Some("true");
    if !matches!(tag.as_str(), "input" | "select" | "textarea") && !is_editable {
        return None;
    }

    let id = el.value().attr("id").map(str::to_string);
    let name = el.value().attr("name").map(str::to_string);
    let type_attr = el.value().attr("type").map(|t| t.to_lowercase());

    let label_for = id.as_deref().and_then(|i| labels.get(i).cloned());

    let required = el.value().attr("required").is_some()
        || el.value().attr("aria-required") == Some("true");

    let options = match tag.as_str() {
        "select" => {
            let option_sel = Selector::parse("option").expect("option selector is valid");
            el.select(&option_sel)
                .filter_map(|opt| {
                    let value = opt.value().attr("value").map(str::to_string)?;
                    if value.is_empty() {
                        return None;
                    }
                    Some(FieldOption {
                        label: element_text(&opt),
                        value,
                    })
                })
                .collect()
        }
        "input" if type_attr.as_deref() == Some("radio") => {
            let value = el.value().attr("value").unwrap_or_default().to_string();
            if value.is_empty() {
                Vec::new()
            } else {
                vec![FieldOption {
                    label: label_for.clone().unwrap_or_else(|| value.clone()),
                    value,
                }]
            }
        }
        _ => Vec::new(),
    };

    Some(RawField {
        // Contenteditable regions behave like free-text areas.
        tag: if is_editable && tag != "textarea" {
            "textarea".to_string()
        } else {
            tag
        },
        type_attr,
        name,
        id,
        label_for,
        aria_label: el.value().attr("aria-label").map(str::to_string),
        placeholder: el.value().attr("placeholder").map(str::to_string),
        required,
        options,
    })
}

/// Map of `label[for]` target id to label text.
fn collect_label_targets(document: &Html) -> HashMap<String, String> {
    let label_sel = Selector::parse("label[for]").expect("label selector is valid");
    document
        .select(&label_sel)
        .filter_map(|l| {
            let target = l.value().attr("for")?.to_string();
            let text = element_text(&l);
            if text.is_empty() {
                None
            } else {
                Some((target, text))
            }
        })
        .collect()
}

/// Clickable selector for a control: `#id`, then `[name=..]`, then the
/// positional `idx:tag:n` form.
fn control_selector(document: &Html, el: &ElementRef<'_>) -> String {
    if let Some(id) = el.value().attr("id").filter(|i| !i.is_empty()) {
        return format!("#{id}");
    }
    if let Some(name) = el.value().attr("name").filter(|n| !n.is_empty()) {
        return format!("{}[name=\"{}\"]", el.value().name(), name);
    }
    let tag = el.value().name().to_string();
    let tag_sel = Selector::parse(&tag).expect("tag selector is valid");
    let index = document
        .select(&tag_sel)
        .position(|e| e.id() == el.id())
        .unwrap_or(0);
    format!("idx:{tag}:{index}")
}

// ── Visibility and chrome filtering ─────────────────────────────────────────

fn is_hidden(el: &ElementRef<'_>) -> bool {
    if el.value().attr("type") == Some("hidden")
        || el.value().attr("hidden").is_some()
        || el.value().attr("aria-hidden") == Some("true")
    {
        return true;
    }
    if let Some(style) = el.value().attr("style") {
        let style = style.to_lowercase().replace(' ', "");
        if style.contains("display:none") || style.contains("visibility:hidden") {
            return true;
        }
    }
    false
}

/// Whether an element sits inside layout/navigation chrome rather than the
/// actual form: `nav`/`header`/`footer`/`aside` ancestors, or an ancestor
/// whose class/id carries a chrome keyword.
fn in_page_chrome(el: &ElementRef<'_>) -> bool {
    let keywords = &heuristics().chrome_keywords;
    for ancestor in el.ancestors() {
        let Some(ancestor_el) = ElementRef::wrap(ancestor) else {
            continue;
        };
        let tag = ancestor_el.value().name();
        if matches!(tag, "nav" | "header" | "footer" | "aside") {
            return true;
        }
        let identity = format!(
            "{} {}",
            ancestor_el.value().attr("class").unwrap_or(""),
            ancestor_el.value().attr("id").unwrap_or("")
        )
        .to_lowercase();
        if !identity.trim().is_empty()
            && keywords.iter().any(|kw| identity.contains(kw.as_str()))
        {
            return true;
        }
    }
    false
}

/// Collect visible text content, trimmed and whitespace-collapsed.
fn element_text(el: &ElementRef<'_>) -> String {
    el.text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

// ── Validation error reading ────────────────────────────────────────────────

/// Error-indicator selectors, broad on purpose: each candidate node still
/// has to resolve to an originating field to count.
const ERROR_SELECTORS: &str = "[role='alert'], .error, .form-error, .field-error, \
     .invalid-feedback, .form-item--error-message, .messages--error, .validation-error";

/// Read visible validation errors and associate each with its field.
///
/// Association strategies, in order:
/// 1. `aria-describedby`: an input pointing at the error node's id.
/// 2. Naming convention: error id `child_name-error` maps to `child_name`.
/// 3. Wrapper proximity: a field inside the error node's parent element.
///
/// Inputs flagged `aria-invalid="true"` count as errors even without a
/// visible message node.
pub fn read_validation_errors(html: &str) -> Vec<ValidationIssue> {
    let document = Html::parse_document(html);
    let mut issues: Vec<ValidationIssue> = Vec::new();

    let error_sel = Selector::parse(ERROR_SELECTORS).expect("error selector is valid");
    let field_sel =
        Selector::parse("input, select, textarea").expect("field selector is valid");

    let described_by: HashMap<String, String> = document
        .select(&field_sel)
        .filter_map(|el| {
            let described = el.value().attr("aria-describedby")?;
            let field_ref = field_ref_of(&el)?;
            Some(
                described
                    .split_whitespace()
                    .map(|token| (token.to_string(), field_ref.clone()))
                    .collect::<Vec<_>>(),
            )
        })
        .flatten()
        .collect();

    for error_el in document.select(&error_sel) {
        let message = element_text(&error_el);
        if message.is_empty() || is_hidden(&error_el) {
            continue;
        }

        let field_ref = error_el
            .value()
            .attr("id")
            .and_then(|error_id| {
                // Strategy 1: aria-describedby back-reference.
                described_by.get(error_id).cloned().or_else(|| {
                    // Strategy 2: naming convention on the error id.
                    strip_error_suffix(error_id)
                        .filter(|base| element_exists(&document, &field_sel, base))
                })
            })
            .or_else(|| {
                // Strategy 3: a field inside the same wrapper.
                error_el.parent().and_then(|parent| {
                    ElementRef::wrap(parent).and_then(|parent_el| {
                        parent_el
                            .select(&field_sel)
                            .find_map(|f| field_ref_of(&f))
                    })
                })
            });

        if let Some(field_ref) = field_ref {
            push_issue(&mut issues, field_ref, message);
        }
    }

    // aria-invalid without a resolvable message node.
    for el in document.select(&field_sel) {
        if el.value().attr("aria-invalid") == Some("true") {
            if let Some(field_ref) = field_ref_of(&el) {
                push_issue(&mut issues, field_ref, "invalid value".to_string());
            }
        }
    }

    issues
}

fn push_issue(issues: &mut Vec<ValidationIssue>, field_ref: String, message: String) {
    if !issues.iter().any(|i| i.field_ref == field_ref) {
        issues.push(ValidationIssue { field_ref, message });
    }
}

fn field_ref_of(el: &ElementRef<'_>) -> Option<String> {
    el.value()
        .attr("name")
        .or_else(|| el.value().attr("id"))
        .map(str::to_string)
        .filter(|s| !s.is_empty())
}

fn strip_error_suffix(error_id: &str) -> Option<String> {
    for suffix in ["-error", "_error", "-message", "-feedback"] {
        if let Some(base) = error_id.strip_suffix(suffix) {
            if !base.is_empty() {
                return Some(base.to_string());
            }
        }
    }
    None
}

fn element_exists(document: &Html, field_sel: &Selector, reference: &str) -> bool {
    document.select(field_sel).any(|el| {
        el.value().attr("name") == Some(reference) || el.value().attr("id") == Some(reference)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::types::FieldType;
    use crate::hints::WarmHints;

    const FORM_HTML: &str = r#"
    <html><body>
        <nav class="main-nav"><input type="text" name="q" placeholder="Search" /></nav>
        <form>
            <label for="child-name">Child name</label>
            <input id="child-name" name="child_name" type="text" required />

            <label for="level">Ability level</label>
            <select id="level" name="level">
                <option value="">Choose...</option>
                <option value="beginner">Beginner</option>
                <option value="intermediate">Intermediate</option>
            </select>

            <input type="hidden" name="form_token" value="abc" />
            <input type="text" name="ghost" style="display: none" />

            <button id="edit-submit" type="submit">Continue</button>
        </form>
    </body></html>
    "#;

    #[test]
    fn test_scan_skips_hidden_and_chrome() {
        let scan = scan_form_elements(FORM_HTML);
        let names: Vec<_> = scan
            .fields
            .iter()
            .filter_map(|f| f.name.as_deref())
            .collect();
        assert!(names.contains(&"child_name"));
        assert!(names.contains(&"level"));
        // Search box in nav chrome, hidden token, and display:none ghost
        // must all be absent.
        assert!(!names.contains(&"q"));
        assert!(!names.contains(&"ghost"));
        assert!(!names.contains(&"form_token"));
    }

    #[test]
    fn test_scan_resolves_labels_and_options() {
        let scan = scan_form_elements(FORM_HTML);
        let child = scan
            .fields
            .iter()
            .find(|f| f.name.as_deref() == Some("child_name"))
            .unwrap();
        assert_eq!(child.label_for.as_deref(), Some("Child name"));
        assert!(child.required);

        let level = scan
            .fields
            .iter()
            .find(|f| f.name.as_deref() == Some("level"))
            .unwrap();
        // The empty "Choose..." placeholder option is dropped.
        assert_eq!(level.options.len(), 2);
        assert_eq!(level.options[0].value, "beginner");

        let field = level.normalize(&WarmHints::default()).unwrap();
        assert_eq!(field.field_type, FieldType::Select);
    }

    #[test]
    fn test_scan_finds_controls_with_selectors() {
        let scan = scan_form_elements(FORM_HTML);
        assert_eq!(scan.controls.len(), 1);
        assert_eq!(scan.controls[0].selector, "#edit-submit");
        assert_eq!(scan.controls[0].text, "Continue");
    }

    #[test]
    fn test_positional_selector_for_anonymous_buttons() {
        let html = r#"
        <form>
            <button>First</button>
            <button>Second</button>
        </form>
        "#;
        let scan = scan_form_elements(html);
        assert_eq!(scan.controls[0].selector, "idx:button:0");
        assert_eq!(scan.controls[1].selector, "idx:button:1");
    }

    #[test]
    fn test_radio_group_options() {
        let html = r#"
        <form>
            <fieldset>
                <legend>Session</legend>
                <label for="am">Morning</label>
                <input type="radio" id="am" name="session" value="am" />
                <label for="pm">Afternoon</label>
                <input type="radio" id="pm" name="session" value="pm" />
            </fieldset>
        </form>
        "#;
        let scan = scan_form_elements(html);
        let radios: Vec<_> = scan
            .fields
            .iter()
            .filter(|f| f.name.as_deref() == Some("session"))
            .collect();
        assert_eq!(radios.len(), 2);
        assert_eq!(radios[0].options[0].value, "am");
        assert_eq!(radios[0].options[0].label, "Morning");
    }

    #[test]
    fn test_errors_via_aria_describedby() {
        let html = r#"
        <form>
            <input name="child_name" aria-describedby="cn-err other" />
            <div id="cn-err" class="error">Child name is required</div>
        </form>
        "#;
        let issues = read_validation_errors(html);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].field_ref, "child_name");
        assert_eq!(issues[0].message, "Child name is required");
    }

    #[test]
    fn test_errors_via_naming_convention() {
        let html = r#"
        <form>
            <input name="dob" id="dob" />
            <span id="dob-error" class="field-error">Enter a date of birth</span>
        </form>
        "#;
        let issues = read_validation_errors(html);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].field_ref, "dob");
    }

    #[test]
    fn test_errors_via_wrapper_proximity() {
        let html = r#"
        <form>
            <div class="form-item">
                <input name="emergency_phone" />
                <div class="form-item--error-message">Required field</div>
            </div>
        </form>
        "#;
        let issues = read_validation_errors(html);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].field_ref, "emergency_phone");
    }

    #[test]
    fn test_aria_invalid_counts_without_message() {
        let html = r#"<form><input name="email" aria-invalid="true" /></form>"#;
        let issues = read_validation_errors(html);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].field_ref, "email");
    }

    #[test]
    fn test_orphan_error_nodes_ignored() {
        let html = r#"<div class="error">Something went wrong globally</div>"#;
        assert!(read_validation_errors(html).is_empty());
    }

    #[test]
    fn test_duplicate_errors_deduplicated() {
        let html = r#"
        <form>
            <input name="dob" id="dob" aria-invalid="true" />
            <span id="dob-error" class="error">Enter a date of birth</span>
        </form>
        "#;
        let issues = read_validation_errors(html);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].message, "Enter a date of birth");
    }
}
