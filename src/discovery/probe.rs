//! Serial field probe: closed-loop discovery of one form's required fields.
//!
//! The probe is deliberately not a form filler. It uses client-side
//! validation failures as an oracle: fill everything already known with
//! plausible placeholder data, leave the rest empty, submit through the
//! safe submit control, and read which fields the page complains about.
//! Each complaint is a discovery. The loop converges when two consecutive
//! submissions surface nothing new.
//!
//! Submission only ever goes through a control the payment guardrail
//! clears; a form whose only submit path is payment-intent is left
//! untouched and reported with whatever was learned so far.

use crate::discovery::guardrail;
use crate::discovery::heuristics::{heuristics, text_indicates_success};
use crate::discovery::normalize::normalize_key;
use crate::discovery::scan::{self, ControlCandidate, ScanResult};
use crate::discovery::types::{
    DiscoveredField, FieldSet, FieldType, LoopState,
};
use crate::driver::PageHandle;
use crate::hints::WarmHints;
use crate::humanize;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Iteration cap for one probe run.
pub const PROBE_MAX_ITERATIONS: u32 = 10;

/// Bounded settle wait after a submission, in milliseconds.
const SETTLE_TIMEOUT_MS: u64 = 5_000;

/// How a probe run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStop {
    /// Two consecutive submissions surfaced nothing new (or no safe
    /// submit control exists).
    Converged,
    /// The form accepted the submission and showed a success indicator.
    Success,
    /// The iteration cap was reached with errors still appearing.
    MaxIterations,
}

/// What one probe run learned.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    /// Fields the form requires, discovered through validation errors.
    pub fields: Vec<DiscoveredField>,
    /// Why probing stopped.
    pub stop: ProbeStop,
    /// Iterations used.
    pub iterations: u32,
    /// Confidence in the discovered set, in `[0.0, 1.0]`. A success
    /// indicator is the strongest signal; hitting the cap is the weakest.
    pub confidence: f32,
}

/// Probe the form on the current page.
///
/// The page must already be on the form; the probe never navigates. Soft
/// failures (settle timeouts, failed fills, JS-less pages) degrade the
/// outcome's confidence instead of erroring.
pub async fn probe_form(page: &mut dyn PageHandle, hints: &WarmHints) -> ProbeOutcome {
    let mut known = FieldSet::new();
    let mut selectors: HashMap<String, String> = HashMap::new();
    let mut state = LoopState::new(PROBE_MAX_ITERATIONS);
    let mut stop = ProbeStop::MaxIterations;

    while !state.is_exhausted() {
        // 1. Fill every known field with a placeholder; unknown fields stay
        //    empty on purpose so the page keeps telling us about them.
        for field in known.iter() {
            let Some(selector) = selectors.get(&field.id) else {
                continue;
            };
            let value = placeholder_for(field, hints);
            humanize::before_fill().await;
            match page.fill(selector, &value).await {
                Ok(true) => {}
                Ok(false) => debug!("fill matched nothing: {selector}"),
                Err(e) => warn!("fill failed for {selector}: {e}"),
            }
        }

        // 2. Submit through the safe submit control only.
        let html = match page.html().await {
            Ok(html) => html,
            Err(e) => {
                warn!("could not read page, stopping probe: {e}");
                stop = ProbeStop::Converged;
                break;
            }
        };
        let scan_result = scan::scan_form_elements(&html);
        let Some(submit) = safe_submit_control(&scan_result) else {
            debug!("no safe submit control, nothing further to probe");
            stop = ProbeStop::Converged;
            break;
        };

        humanize::before_click().await;
        if let Err(e) = page.click(&submit.selector).await {
            warn!("submit click failed: {e}");
        }
        let _ = page.wait_for_settle(SETTLE_TIMEOUT_MS).await;

        // 3. Success indicator means the form accepted the submission.
        if let Ok(text) = page.visible_text().await {
            if text_indicates_success(&text) {
                stop = ProbeStop::Success;
                state = state.advance(false);
                break;
            }
        }

        // 4. Read validation errors and merge the fields they point at.
        let after = match page.html().await {
            Ok(html) => html,
            Err(e) => {
                warn!("could not read page after submit: {e}");
                stop = ProbeStop::Converged;
                break;
            }
        };
        let issues = scan::read_validation_errors(&after);
        let post_scan = scan::scan_form_elements(&after);

        let mut found_new = false;
        for issue in issues {
            let Some(key) = normalize_key(&issue.field_ref) else {
                continue;
            };
            if known.contains(&key) {
                continue;
            }
            let (field, selector) =
                field_for_issue(&key, &issue.field_ref, &post_scan, hints);
            debug!("validation error surfaced new field '{key}'");
            selectors.insert(key, selector);
            known.observe(field, 0);
            found_new = true;
        }

        state = state.advance(found_new);

        if state.is_stable() {
            stop = ProbeStop::Converged;
            break;
        }
    }

    let confidence = match stop {
        ProbeStop::Success => 0.9,
        ProbeStop::Converged => 0.75,
        ProbeStop::MaxIterations => 0.4,
    };

    ProbeOutcome {
        fields: known.into_vec(),
        stop,
        iterations: state.iteration,
        confidence,
    }
}

/// First submit-like control the guardrail clears, in lexicon priority
/// order then document order.
fn safe_submit_control(scan_result: &ScanResult) -> Option<&ControlCandidate> {
    for keyword in &heuristics().advance_priority {
        for control in &scan_result.controls {
            if guardrail::is_payment_control(&control.text) {
                continue;
            }
            if control.text.to_lowercase().contains(keyword.as_str()) {
                return Some(control);
            }
        }
    }
    None
}

/// Build the discovered field (and its fill selector) for a validation
/// issue, preferring the live element's attributes over synthesis.
fn field_for_issue(
    key: &str,
    field_ref: &str,
    post_scan: &ScanResult,
    hints: &WarmHints,
) -> (DiscoveredField, String) {
    let raw = post_scan.fields.iter().find(|f| {
        f.name.as_deref() == Some(field_ref) || f.id.as_deref() == Some(field_ref)
    });

    let mut field = raw
        .and_then(|r| r.normalize(hints))
        .unwrap_or_else(|| DiscoveredField {
            id: key.to_string(),
            label: crate::discovery::normalize::humanize_key(key),
            field_type: FieldType::Text,
            required: true,
            options: Vec::new(),
            category: crate::discovery::normalize::infer_category(key, key),
            seen_at_steps: Vec::new(),
        });
    // The page complained when it was empty, so it is required regardless
    // of what the markup says.
    field.required = true;

    let selector = hints
        .fields
        .get(key)
        .and_then(|h| h.selector.clone())
        .or_else(|| {
            raw.and_then(|r| {
                r.id.as_ref()
                    .map(|id| format!("#{id}"))
                    .or_else(|| r.name.as_ref().map(|n| format!("[name=\"{n}\"]")))
            })
        })
        .unwrap_or_else(|| format!("[name=\"{field_ref}\"]"));

    (field, selector)
}

/// Placeholder value for a known field: warm hint first, then a generic
/// per-type default shaped by the field's key.
fn placeholder_for(field: &DiscoveredField, hints: &WarmHints) -> String {
    if let Some(value) = hints.placeholder(&field.id) {
        return value.to_string();
    }
    if let Some(first) = field.options.first() {
        return first.value.clone();
    }
    match field.field_type {
        FieldType::Number => "1".to_string(),
        FieldType::Date => "2015-03-14".to_string(),
        FieldType::Checkbox => "on".to_string(),
        FieldType::Textarea => "None".to_string(),
        _ => {
            let key = field.id.as_str();
            if key.contains("email") {
                "probe@example.com".to_string()
            } else if key.contains("phone") {
                "555-201-4433".to_string()
            } else if key.contains("zip") || key.contains("postal") {
                "80302".to_string()
            } else if key.contains("name") {
                "Avery Example".to_string()
            } else {
                "Test entry".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::scripted::{ClickRule, ScriptedSite, StateSpec};

    const FORM: &str = r#"
    <form>
        <label for="child-name">Child name</label>
        <input id="child-name" name="child_name" type="text" />
        <button id="edit-submit" type="submit">Submit</button>
    </form>
    "#;

    const FORM_WITH_ERROR: &str = r#"
    <form>
        <label for="child-name">Child name</label>
        <input id="child-name" name="child_name" type="text" aria-describedby="cn-err" />
        <div id="cn-err" class="error">Child name is required</div>
        <button id="edit-submit" type="submit">Submit</button>
    </form>
    "#;

    fn probe_site() -> ScriptedSite {
        ScriptedSite::new()
            .state(
                "form",
                StateSpec {
                    url: "https://club.example.com/membership/signup".to_string(),
                    html: FORM.to_string(),
                    clicks: vec![ClickRule::validated(
                        "#edit-submit",
                        &["#child-name"],
                        "done",
                        "form_err",
                    )],
                    ..Default::default()
                },
            )
            .state(
                "form_err",
                StateSpec {
                    url: "https://club.example.com/membership/signup".to_string(),
                    html: FORM_WITH_ERROR.to_string(),
                    clicks: vec![ClickRule::validated(
                        "#edit-submit",
                        &["#child-name"],
                        "done",
                        "form_err",
                    )],
                    ..Default::default()
                },
            )
            .state(
                "done",
                StateSpec {
                    url: "https://club.example.com/membership".to_string(),
                    html: "<h1>Thank you</h1><p>Submission received.</p>".to_string(),
                    ..Default::default()
                },
            )
    }

    #[tokio::test]
    async fn test_probe_discovers_required_field_then_succeeds() {
        let mut page = probe_site().open("form");
        let outcome = probe_form(&mut page, &WarmHints::default()).await;

        assert_eq!(outcome.stop, ProbeStop::Success);
        assert_eq!(outcome.fields.len(), 1);
        assert_eq!(outcome.fields[0].id, "child_name");
        assert!(outcome.fields[0].required);
        assert!(outcome.iterations <= PROBE_MAX_ITERATIONS);
        assert!(outcome.confidence > 0.8);
    }

    #[tokio::test]
    async fn test_probe_no_form_converges_empty() {
        let site = ScriptedSite::new().state(
            "bare",
            StateSpec {
                url: "https://club.example.com/membership".to_string(),
                html: "<h1>Membership</h1><p>Your membership is active.</p>".to_string(),
                ..Default::default()
            },
        );
        let mut page = site.open("bare");
        let outcome = probe_form(&mut page, &WarmHints::default()).await;

        assert_eq!(outcome.stop, ProbeStop::Converged);
        assert!(outcome.fields.is_empty());
    }

    #[tokio::test]
    async fn test_probe_never_clicks_payment_submit() {
        let site = ScriptedSite::new().state(
            "paywall",
            StateSpec {
                url: "https://club.example.com/billing".to_string(),
                html: r#"
                <form>
                    <input name="amount" />
                    <button id="pay">Pay Now</button>
                </form>
                "#
                .to_string(),
                ..Default::default()
            },
        );
        let mut page = site.open("paywall");
        let log = page.click_log();
        let outcome = probe_form(&mut page, &WarmHints::default()).await;

        assert_eq!(outcome.stop, ProbeStop::Converged);
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_probe_converges_when_errors_stop_changing() {
        // A form that always re-renders the same single error and never
        // accepts: the probe must settle after two quiet rounds, not spin
        // to the cap.
        let site = ScriptedSite::new().state(
            "sticky",
            StateSpec {
                url: "https://club.example.com/waiver".to_string(),
                html: FORM_WITH_ERROR.to_string(),
                clicks: vec![ClickRule::goto("#edit-submit", "sticky")],
                ..Default::default()
            },
        );
        let mut page = site.open("sticky");
        let outcome = probe_form(&mut page, &WarmHints::default()).await;

        assert_eq!(outcome.stop, ProbeStop::Converged);
        assert_eq!(outcome.fields.len(), 1);
        assert!(outcome.iterations < PROBE_MAX_ITERATIONS);
    }

    #[test]
    fn test_placeholder_shapes() {
        let field = |id: &str, ft: FieldType| DiscoveredField {
            id: id.to_string(),
            label: id.to_string(),
            field_type: ft,
            required: true,
            options: Vec::new(),
            category: None,
            seen_at_steps: Vec::new(),
        };
        let hints = WarmHints::default();
        assert!(placeholder_for(&field("parent_email", FieldType::Text), &hints)
            .contains('@'));
        assert_eq!(
            placeholder_for(&field("child_dob", FieldType::Date), &hints),
            "2015-03-14"
        );
        assert_eq!(placeholder_for(&field("qty", FieldType::Number), &hints), "1");
    }

    #[test]
    fn test_warm_hint_placeholder_wins() {
        let mut hints = WarmHints::default();
        hints.fields.insert(
            "child_name".to_string(),
            crate::hints::FieldHint {
                placeholder: Some("Sam Tester".to_string()),
                label: None,
                selector: None,
            },
        );
        let field = DiscoveredField {
            id: "child_name".to_string(),
            label: "Child name".to_string(),
            field_type: FieldType::Text,
            required: true,
            options: Vec::new(),
            category: None,
            seen_at_steps: Vec::new(),
        };
        assert_eq!(placeholder_for(&field, &hints), "Sam Tester");
    }
}
