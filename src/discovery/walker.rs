//! Multi-step walker: collects the union of fields across an unknown-length
//! chain of registration steps, stopping before any payment action.
//!
//! Each iteration follows a fixed order:
//!
//! 1. Bounded settle wait.
//! 2. Payment-page pre-check. This runs before any extraction because some
//!    payment pages expose probe-friendly-looking fields that must never be
//!    touched.
//! 3. Primary extraction: the page handle's schema-level form read.
//! 4. Fallback extraction: the generic DOM scan, only when the primary read
//!    found literally nothing.
//! 5. Merge into the running field set by normalized key, recording the
//!    step index.
//! 6. Stop-condition checks, in order: success text, two quiet iterations,
//!    no advance control, iteration cap.
//! 7. Advance: pick the best candidate control by lexicon priority (first
//!    visible match wins, document order breaks ties), run the guardrail on
//!    it before clicking, click, settle, and loop; the next iteration's
//!    pre-check doubles as the post-navigation payment check.
//!
//! The walker never fills or submits anything; probing with deliberate
//! validation failures is the serial probe's job.

use crate::discovery::guardrail;
use crate::discovery::heuristics::{heuristics, text_indicates_success};
use crate::discovery::scan::{self, ControlCandidate};
use crate::discovery::types::{
    DiscoveredField, FieldSet, LoopState, PaymentStopEvidence, PaymentStopReason, StopReason,
    UrlTrail,
};
use crate::driver::PageHandle;
use crate::hints::WarmHints;
use crate::humanize;
use tracing::{debug, info, warn};

/// Iteration cap for one walk.
pub const WALKER_MAX_ITERATIONS: u32 = 10;

/// Bounded settle wait per step, in milliseconds.
const SETTLE_TIMEOUT_MS: u64 = 8_000;

/// What one walk produced.
#[derive(Debug, Clone)]
pub struct WalkOutcome {
    /// Union of fields across all steps walked.
    pub fields: Vec<DiscoveredField>,
    /// Why the walk stopped.
    pub stop_reason: StopReason,
    /// Evidence when the guardrail tripped.
    pub stop_evidence: Option<PaymentStopEvidence>,
    /// Iterations used.
    pub iterations: u32,
    /// URLs visited during the walk, in order.
    pub urls_visited: UrlTrail,
    /// Confidence in the collected schema, in `[0.0, 1.0]`.
    pub confidence: f32,
}

/// Walk the registration flow starting from the page's current position.
///
/// The caller navigates to the entry point first; the walker only ever
/// advances through in-flow controls.
pub async fn walk_steps(page: &mut dyn PageHandle, hints: &WarmHints) -> WalkOutcome {
    let mut fields = FieldSet::new();
    let mut trail = UrlTrail::new();
    let mut state = LoopState::new(WALKER_MAX_ITERATIONS);
    let mut evidence: Option<PaymentStopEvidence> = None;

    let stop_reason = loop {
        let _ = page.wait_for_settle(SETTLE_TIMEOUT_MS).await;

        let url = page.current_url().await.unwrap_or_default();
        trail.visit(&url);

        let html = match page.html().await {
            Ok(html) => html,
            Err(e) => {
                warn!("could not read step page: {e}");
                String::new()
            }
        };

        // Pre-check before any extraction.
        if guardrail::page_indicates_payment(&html, &url) {
            info!("payment page detected at {url}, stopping walk");
            evidence = Some(guardrail::capture_evidence(
                &url,
                PaymentStopReason::PaymentPage,
                None,
            ));
            break StopReason::PaymentDetected;
        }

        let scanned = scan::scan_form_elements(&html);

        // Primary extraction, then generic scan only when it found nothing.
        let step = state.iteration;
        let raw_fields = match page.read_form_schema().await {
            Ok(schema) if !schema.is_empty() => schema,
            Ok(_) => {
                debug!("schema read empty at step {step}, falling back to DOM scan");
                scanned.fields.clone()
            }
            Err(e) => {
                warn!("schema read failed at step {step}: {e}");
                scanned.fields.clone()
            }
        };

        let mut new_count = 0u32;
        for raw in raw_fields {
            if let Some(field) = raw.normalize(hints) {
                if fields.observe(field, step) {
                    new_count += 1;
                }
            }
        }
        debug!("step {step}: {new_count} new fields ({} total)", fields.len());

        state = state.advance(new_count > 0);

        let text = page.visible_text().await.unwrap_or_default();
        if text_indicates_success(&text) {
            break StopReason::Success;
        }
        if state.is_stable() {
            break StopReason::NoNewErrors;
        }
        let Some(control) = find_advance_control(&scanned.controls) else {
            debug!("no advance control on step {step}");
            break StopReason::NoNewErrors;
        };
        if state.is_exhausted() {
            break StopReason::MaxIterations;
        }

        // The chosen control itself goes through the guardrail before any
        // click; a trip halts the walk instead of skipping to another
        // candidate.
        if guardrail::is_payment_control(&control.text) {
            info!("advance control '{}' is payment-intent, stopping walk", control.text);
            evidence = Some(guardrail::capture_evidence(
                &url,
                PaymentStopReason::PaymentButton,
                Some(&control.text),
            ));
            break StopReason::PaymentDetected;
        }

        humanize::before_click().await;
        match page.click(&control.selector).await {
            Ok(true) => {}
            Ok(false) => debug!("advance control vanished: {}", control.selector),
            Err(e) => warn!("advance click failed: {e}"),
        }
    };

    let mut confidence: f32 = match stop_reason {
        StopReason::Success => 0.9,
        StopReason::NoNewErrors => 0.75,
        StopReason::PaymentDetected => 0.7,
        StopReason::MaxIterations => 0.45,
    };
    // An empty schema with anything other than a success stop means the
    // extraction likely failed; the score must be low enough that callers
    // retry or fall back to manual input.
    if fields.is_empty() && stop_reason != StopReason::Success {
        confidence = confidence.min(0.2);
    }

    WalkOutcome {
        fields: fields.into_vec(),
        stop_reason,
        stop_evidence: evidence,
        iterations: state.iteration,
        urls_visited: trail,
        confidence,
    }
}

/// Best advance candidate: lexicon keywords in priority order, first match
/// in document order wins. Payment-intent candidates are not filtered out
/// here; the guardrail decision on the winner is what stops the walk.
fn find_advance_control(controls: &[ControlCandidate]) -> Option<&ControlCandidate> {
    for keyword in &heuristics().advance_priority {
        if let Some(control) = controls
            .iter()
            .find(|c| c.text.to_lowercase().contains(keyword.as_str()))
        {
            return Some(control);
        }
    }
    None
}
