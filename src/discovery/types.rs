//! Core data model for a discovery run.
//!
//! Everything a discovery run produces is expressed with the types in this
//! module: the fields it found, the prerequisite verdicts, the reason it
//! stopped, and the evidence captured when the payment guardrail tripped.
//! All types are serde-serializable so the persistence and UI collaborators
//! can consume results without further conversion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Fields ──────────────────────────────────────────────────────────────────

/// The input widget class of a discovered field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Textarea,
    Select,
    Radio,
    Checkbox,
    Number,
    Date,
}

/// One choice of a `select` or `radio` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldOption {
    /// Submitted value.
    pub value: String,
    /// Visible label.
    pub label: String,
}

/// A single form field discovered during a run.
///
/// `id` is the normalized key (see `normalize`) and is unique within one
/// discovery result: a field seen on several steps is merged into one entry
/// with every step index recorded in `seen_at_steps`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredField {
    /// Normalized key, unique within a discovery result.
    pub id: String,
    /// Human-readable label resolved from the DOM.
    pub label: String,
    /// Widget class.
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Whether client-side validation treats the field as required.
    pub required: bool,
    /// Choices for `select`/`radio` fields; empty otherwise.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<FieldOption>,
    /// Semantic grouping (e.g. "participant", "emergency", "medical").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Step indices (0-based) the field was observed at, in order, no
    /// duplicates.
    pub seen_at_steps: Vec<u32>,
}

impl DiscoveredField {
    /// Record a sighting at `step`, keeping `seen_at_steps` an ordered set.
    pub fn mark_seen_at(&mut self, step: u32) {
        if !self.seen_at_steps.contains(&step) {
            self.seen_at_steps.push(step);
        }
    }

    /// Merge a re-observation of the same key into this entry.
    ///
    /// Required-ness is sticky (a field required on any step is required),
    /// options union by value (radio groups surface one option per input),
    /// the label fills in if the earlier sighting lacked one, and the step
    /// index is appended.
    pub fn absorb(&mut self, other: &DiscoveredField, step: u32) {
        self.required |= other.required;
        for option in &other.options {
            if !self.options.iter().any(|o| o.value == option.value) {
                self.options.push(option.clone());
            }
        }
        if self.label.is_empty() && !other.label.is_empty() {
            self.label = other.label.clone();
        }
        if self.category.is_none() {
            self.category = other.category.clone();
        }
        self.mark_seen_at(step);
    }
}

/// An ordered, keyed collection of discovered fields.
///
/// Insertion is idempotent by field `id`: re-observing a key merges into the
/// existing entry instead of duplicating it. Iteration order is first-seen
/// order, which keeps discovery output deterministic.
#[derive(Debug, Clone, Default)]
pub struct FieldSet {
    fields: Vec<DiscoveredField>,
}

impl FieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or merge a field observed at `step`. Returns `true` when the
    /// key was new.
    pub fn observe(&mut self, mut field: DiscoveredField, step: u32) -> bool {
        if let Some(existing) = self.fields.iter_mut().find(|f| f.id == field.id) {
            existing.absorb(&field, step);
            return false;
        }
        field.seen_at_steps.clear();
        field.mark_seen_at(step);
        self.fields.push(field);
        true
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.fields.iter().any(|f| f.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&DiscoveredField> {
        self.fields.iter().find(|f| f.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DiscoveredField> {
        self.fields.iter()
    }

    pub fn into_vec(self) -> Vec<DiscoveredField> {
        self.fields
    }
}

// ── Prerequisites ───────────────────────────────────────────────────────────

/// Verdict for a single prerequisite gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrereqStatus {
    Pass,
    Fail,
    Unknown,
}

/// Result of checking one prerequisite gate (membership, waiver, ...).
///
/// `status == Fail` implies `fields` is non-empty: the fields are what the
/// user must supply to pass the gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrerequisiteCheckResult {
    /// Prerequisite identifier from the provider profile (e.g. "membership").
    pub id: String,
    /// Human-readable label.
    pub label: String,
    /// Verdict.
    pub status: PrereqStatus,
    /// Explanation of how the verdict was reached.
    pub message: String,
    /// Fields the user must complete when `status == Fail`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<DiscoveredField>,
}

/// Aggregate verdict across all prerequisite gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrereqAggregate {
    /// Every gate passed (or was optimistically assumed complete).
    Complete,
    /// At least one gate needs user action first.
    Required,
    /// No gate produced a usable signal.
    Unknown,
}

// ── Stops and evidence ──────────────────────────────────────────────────────

/// Why a walk or probe terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// A success/confirmation indicator appeared.
    Success,
    /// Two consecutive iterations yielded nothing new, or no advance
    /// control was found.
    NoNewErrors,
    /// The iteration cap was reached.
    MaxIterations,
    /// The payment guardrail tripped. A deliberate, successful halt.
    PaymentDetected,
}

/// What the payment guardrail classified when it tripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStopReason {
    PaymentButton,
    PaymentPage,
}

/// Snapshot captured at the moment the guardrail tripped.
///
/// Created once, never mutated. The snapshot is the audit trail for "we
/// stopped here and did not click".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentStopEvidence {
    /// Which classifier tripped.
    pub reason: PaymentStopReason,
    /// URL of the page at trip time.
    pub url: String,
    /// Visible text of the offending control, when a control tripped it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button_text: Option<String>,
    /// When the evidence was captured.
    pub captured_at: DateTime<Utc>,
}

// ── Loop bookkeeping ────────────────────────────────────────────────────────

/// Explicit loop-termination state for the probe and the walker.
///
/// Carried and returned as a value so termination behavior is testable
/// without a browser. `stable_count` counts consecutive iterations that
/// produced no new information; two stable iterations mean convergence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopState {
    /// Iterations completed so far.
    pub iteration: u32,
    /// Consecutive iterations with no new information.
    pub stable_count: u32,
    /// Hard cap on iterations.
    pub max_iterations: u32,
}

/// Consecutive no-new-information iterations required to call a loop
/// converged.
pub const STABLE_ITERATIONS: u32 = 2;

impl LoopState {
    pub fn new(max_iterations: u32) -> Self {
        Self {
            iteration: 0,
            stable_count: 0,
            max_iterations,
        }
    }

    /// Record one completed iteration. `found_new` resets the stability
    /// counter; a quiet iteration advances it.
    #[must_use]
    pub fn advance(self, found_new: bool) -> Self {
        Self {
            iteration: self.iteration + 1,
            stable_count: if found_new { 0 } else { self.stable_count + 1 },
            max_iterations: self.max_iterations,
        }
    }

    /// Converged: enough consecutive quiet iterations.
    pub fn is_stable(&self) -> bool {
        self.stable_count >= STABLE_ITERATIONS
    }

    /// Cap reached.
    pub fn is_exhausted(&self) -> bool {
        self.iteration >= self.max_iterations
    }
}

// ── Aggregate result ────────────────────────────────────────────────────────

/// Iteration counters surfaced for observability.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LoopCounts {
    /// Total probe iterations across all prerequisite checks.
    pub probe_iterations: u32,
    /// Walker iterations over the program form.
    pub walker_iterations: u32,
}

/// Everything one discovery run produced.
///
/// Constructed once by the orchestrator and never mutated afterwards; the
/// caller owns it and decides whether to cache, display, or discard it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryResult {
    /// Unique id of this run.
    pub run_id: String,
    /// Per-gate verdicts, in profile order.
    pub prerequisites: Vec<PrerequisiteCheckResult>,
    /// Aggregate prerequisite verdict.
    pub prereq_status: PrereqAggregate,
    /// Union of program-form fields across all steps.
    pub program_fields: Vec<DiscoveredField>,
    /// Confidence in the prerequisite verdicts, in `[0.0, 1.0]`.
    pub confidence_prereq: f32,
    /// Confidence in the program field schema, in `[0.0, 1.0]`.
    pub confidence_program: f32,
    /// Iteration counters.
    pub loop_counts: LoopCounts,
    /// Every URL visited during the run, in first-visit order, no
    /// duplicates.
    pub urls_visited: Vec<String>,
    /// Why the program walk stopped.
    pub stop_reason: StopReason,
    /// Guardrail evidence when `stop_reason == PaymentDetected`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_evidence: Option<PaymentStopEvidence>,
}

/// Ordered-unique URL trail threaded through a run.
#[derive(Debug, Clone, Default)]
pub struct UrlTrail {
    urls: Vec<String>,
}

impl UrlTrail {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a visit; repeat visits keep the original position.
    pub fn visit(&mut self, url: &str) {
        if !url.is_empty() && !self.urls.iter().any(|u| u == url) {
            self.urls.push(url.to_string());
        }
    }

    pub fn extend(&mut self, other: &UrlTrail) {
        for url in &other.urls {
            self.visit(url);
        }
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.urls
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(id: &str, required: bool) -> DiscoveredField {
        DiscoveredField {
            id: id.to_string(),
            label: id.to_string(),
            field_type: FieldType::Text,
            required,
            options: Vec::new(),
            category: None,
            seen_at_steps: Vec::new(),
        }
    }

    #[test]
    fn test_field_set_merges_by_key() {
        let mut set = FieldSet::new();
        assert!(set.observe(field("child_name", true), 2));
        assert!(!set.observe(field("child_name", false), 4));
        assert_eq!(set.len(), 1);

        let merged = set.get("child_name").unwrap();
        assert_eq!(merged.seen_at_steps, vec![2, 4]);
        // Required-ness is sticky across sightings.
        assert!(merged.required);
    }

    #[test]
    fn test_field_set_repeat_step_not_duplicated() {
        let mut set = FieldSet::new();
        set.observe(field("email", false), 1);
        set.observe(field("email", false), 1);
        assert_eq!(set.get("email").unwrap().seen_at_steps, vec![1]);
    }

    #[test]
    fn test_loop_state_converges_after_two_quiet_iterations() {
        let mut state = LoopState::new(10);
        state = state.advance(true);
        assert!(!state.is_stable());
        state = state.advance(false);
        assert!(!state.is_stable());
        state = state.advance(false);
        assert!(state.is_stable());
        assert_eq!(state.iteration, 3);
    }

    #[test]
    fn test_loop_state_new_info_resets_stability() {
        let mut state = LoopState::new(10);
        state = state.advance(false);
        state = state.advance(true);
        assert_eq!(state.stable_count, 0);
        assert!(!state.is_stable());
    }

    #[test]
    fn test_loop_state_exhaustion() {
        let mut state = LoopState::new(3);
        for _ in 0..3 {
            assert!(!state.is_exhausted());
            state = state.advance(true);
        }
        assert!(state.is_exhausted());
    }

    #[test]
    fn test_url_trail_ordered_unique() {
        let mut trail = UrlTrail::new();
        trail.visit("https://a.example/one");
        trail.visit("https://a.example/two");
        trail.visit("https://a.example/one");
        trail.visit("");
        assert_eq!(
            trail.into_vec(),
            vec![
                "https://a.example/one".to_string(),
                "https://a.example/two".to_string()
            ]
        );
    }

    #[test]
    fn test_stop_reason_serialization() {
        let json = serde_json::to_string(&StopReason::PaymentDetected).unwrap();
        assert_eq!(json, "\"payment_detected\"");
        let json = serde_json::to_string(&StopReason::NoNewErrors).unwrap();
        assert_eq!(json, "\"no_new_errors\"");
    }
}
