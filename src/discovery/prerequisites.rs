//! Prerequisite gates: membership, waiver, payment method on file, profile.
//!
//! For each prerequisite the provider profile supplies an ordered list of
//! candidate paths (sites move these pages around; later entries are
//! fallbacks). Candidate paths are tried in order and evaluation stops at
//! the first definitive signal:
//!
//! 1. **Redirect**: landing on a safe-harbor listing page means no gate
//!    form was presented, so the gate is already satisfied.
//! 2. **Completion text**: active-membership / waiver-on-file wording.
//! 3. **Form presence**: the serial probe runs; discovered fields mean the
//!    gate needs user action, zero fields means nothing to complete.
//!
//! When every candidate path fails to produce a signal (navigation errors
//! all the way down), the gate is assumed complete. That optimistic default
//! is a documented business decision: a wrongly blocked signup costs more
//! than a late surprise, and the real form will still stop at the gate.
//! Do not change it to fail-closed.

use crate::discovery::heuristics::{text_indicates_completion, url_is_safe_harbor};
use crate::discovery::probe::{self, ProbeStop};
use crate::discovery::types::{
    PrereqAggregate, PrereqStatus, PrerequisiteCheckResult, UrlTrail,
};
use crate::driver::PageHandle;
use crate::hints::WarmHints;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Bounded navigation timeout per candidate path, in milliseconds.
const NAV_TIMEOUT_MS: u64 = 15_000;

/// One prerequisite gate to check, from the provider profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrerequisiteDefinition {
    /// Stable identifier (e.g. "membership", "waiver").
    pub id: String,
    /// Human-readable label.
    pub label: String,
    /// Candidate paths tried in order, relative to the base URL.
    pub candidate_paths: Vec<String>,
}

/// Everything the prerequisite stage produced.
#[derive(Debug, Clone)]
pub struct PrerequisiteReport {
    /// Per-gate results, in definition order.
    pub checks: Vec<PrerequisiteCheckResult>,
    /// Aggregate verdict.
    pub aggregate: PrereqAggregate,
    /// Total probe iterations spent across all gates.
    pub probe_iterations: u32,
    /// URLs visited while checking.
    pub urls_visited: UrlTrail,
    /// Confidence in the verdicts, in `[0.0, 1.0]`. Assumed-complete gates
    /// drag this down.
    pub confidence: f32,
}

/// Check every prerequisite gate in order.
pub async fn check_prerequisites(
    page: &mut dyn PageHandle,
    base_url: &str,
    definitions: &[PrerequisiteDefinition],
    hints: &WarmHints,
) -> PrerequisiteReport {
    let mut checks = Vec::with_capacity(definitions.len());
    let mut trail = UrlTrail::new();
    let mut probe_iterations = 0u32;
    let mut confidence_sum = 0.0f32;

    for definition in definitions {
        let (check, check_confidence) = check_one(
            page,
            base_url,
            definition,
            hints,
            &mut trail,
            &mut probe_iterations,
        )
        .await;
        info!(
            "prerequisite '{}': {:?} ({})",
            definition.id, check.status, check.message
        );
        confidence_sum += check_confidence;
        checks.push(check);
    }

    let aggregate = if checks.is_empty() {
        PrereqAggregate::Unknown
    } else if checks.iter().any(|c| c.status == PrereqStatus::Fail) {
        PrereqAggregate::Required
    } else {
        PrereqAggregate::Complete
    };

    let confidence = if checks.is_empty() {
        0.0
    } else {
        confidence_sum / checks.len() as f32
    };

    PrerequisiteReport {
        checks,
        aggregate,
        probe_iterations,
        urls_visited: trail,
        confidence,
    }
}

/// Check one gate. Returns the result and the confidence of how it was
/// reached.
async fn check_one(
    page: &mut dyn PageHandle,
    base_url: &str,
    definition: &PrerequisiteDefinition,
    hints: &WarmHints,
    trail: &mut UrlTrail,
    probe_iterations: &mut u32,
) -> (PrerequisiteCheckResult, f32) {
    for path in &definition.candidate_paths {
        let target = match resolve_path(base_url, path) {
            Some(url) => url,
            None => {
                warn!("unusable candidate path '{path}' for {}", definition.id);
                continue;
            }
        };

        let nav = match page.navigate(&target, NAV_TIMEOUT_MS).await {
            Ok(nav) => nav,
            Err(e) => {
                debug!("candidate path {target} failed: {e}");
                continue;
            }
        };
        trail.visit(&nav.final_url);

        // Signal 1: bounced to a listing page, no gate form presented.
        if nav.final_url != target && url_is_safe_harbor(&nav.final_url) {
            return (
                result(definition, PrereqStatus::Pass,
                    format!("no form presented; redirected to {}", nav.final_url),
                    Vec::new()),
                0.9,
            );
        }

        // Signal 2: the page says the gate is already satisfied.
        let text = page.visible_text().await.unwrap_or_default();
        if text_indicates_completion(&text) {
            return (
                result(definition, PrereqStatus::Pass,
                    "completion wording found on page".to_string(),
                    Vec::new()),
                0.95,
            );
        }

        // Signal 3: probe the form. Any probe outcome is definitive; no
        // further candidate paths are tried after this.
        let outcome = probe::probe_form(page, hints).await;
        *probe_iterations += outcome.iterations;

        if outcome.fields.is_empty() || outcome.stop == ProbeStop::Success {
            // Zero actionable fields means nothing to complete. A probe
            // that sailed through to a success panel also cleared the gate.
            return (
                result(definition, PrereqStatus::Pass,
                    "no outstanding form fields".to_string(),
                    Vec::new()),
                outcome.confidence,
            );
        }
        let message = format!(
            "action required: {} field(s) to complete",
            outcome.fields.len()
        );
        return (
            result(definition, PrereqStatus::Fail, message, outcome.fields),
            outcome.confidence,
        );
    }

    // Every candidate path was exhausted without a signal. Assume complete
    // rather than block the signup; the documented optimistic default.
    (
        result(definition, PrereqStatus::Pass,
            "could not verify, assuming complete".to_string(),
            Vec::new()),
        0.3,
    )
}

fn result(
    definition: &PrerequisiteDefinition,
    status: PrereqStatus,
    message: String,
    fields: Vec<crate::discovery::types::DiscoveredField>,
) -> PrerequisiteCheckResult {
    PrerequisiteCheckResult {
        id: definition.id.clone(),
        label: definition.label.clone(),
        status,
        message,
        fields,
    }
}

/// Resolve a candidate path against the base URL.
fn resolve_path(base_url: &str, path: &str) -> Option<String> {
    if path.starts_with("http://") || path.starts_with("https://") {
        return Some(path.to_string());
    }
    url::Url::parse(base_url)
        .ok()?
        .join(path)
        .ok()
        .map(|u| u.to_string())
}
