//! Discovery orchestrator: sequences the prerequisite checks and the
//! program-form walk, then assembles the final result.
//!
//! Prerequisites run first because an unsatisfied gate usually blocks the
//! real signup form; their verdicts travel with the result either way. The
//! walk still runs when a gate failed, since partial schema knowledge is
//! better than none for the caller's UI. Only two conditions are fatal: a
//! program whose registration URL cannot be resolved, and an entry-point
//! navigation that fails outright. Everything softer lands in the result as
//! degraded confidence.

use crate::discovery::prerequisites::{self, PrerequisiteDefinition};
use crate::discovery::types::{DiscoveryResult, LoopCounts, StopReason, UrlTrail};
use crate::discovery::walker;
use crate::driver::PageHandle;
use crate::error::DiscoveryError;
use crate::hints::WarmHints;
use crate::navigator::{FormUrlResolver, ProfileResolver};
use crate::profiles::provider_profile;
use crate::progress::{self, DiscoveryPhase, ProgressEventKind, ProgressSender};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Bounded navigation timeout for the registration entry point, in
/// milliseconds.
const ENTRY_NAV_TIMEOUT_MS: u64 = 20_000;

/// One discovery request: which program on which provider site.
#[derive(Debug, Clone)]
pub struct DiscoveryRequest {
    /// Provider identifier (e.g. "skiclubpro").
    pub provider: String,
    /// Program reference understood by the resolver (usually a numeric id
    /// or slug).
    pub program_ref: String,
    /// Base URL of the authenticated site.
    pub base_url: String,
}

/// The discovery engine. Cheap to construct; one engine can serve many
/// runs, each with its own exclusively-owned page.
pub struct DiscoveryEngine {
    resolver: Arc<dyn FormUrlResolver>,
    progress: Option<ProgressSender>,
}

impl Default for DiscoveryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DiscoveryEngine {
    /// Engine with the profile-template resolver and no progress channel.
    pub fn new() -> Self {
        Self {
            resolver: Arc::new(ProfileResolver),
            progress: None,
        }
    }

    /// Replace the entry-URL resolver.
    pub fn with_resolver(mut self, resolver: Arc<dyn FormUrlResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Attach a progress event channel.
    pub fn with_progress(mut self, sender: ProgressSender) -> Self {
        self.progress = Some(sender);
        self
    }

    /// Run one full discovery against an authenticated page.
    ///
    /// The page is owned exclusively by this call for its whole duration;
    /// the caller gets it back (still authenticated) when the run ends.
    pub async fn discover(
        &self,
        page: &mut dyn PageHandle,
        request: &DiscoveryRequest,
        hints: &WarmHints,
    ) -> Result<DiscoveryResult, DiscoveryError> {
        let run_id = Uuid::new_v4().to_string();
        let mut seq = 0u64;
        let mut trail = UrlTrail::new();

        let profile = provider_profile(&request.provider)
            .ok_or_else(|| DiscoveryError::UnknownProvider(request.provider.clone()))?;

        info!(
            "discovery run {run_id} starting: provider={} program={}",
            request.provider, request.program_ref
        );

        // Phase 1: prerequisite gates.
        progress::emit(
            &self.progress,
            &run_id,
            &mut seq,
            ProgressEventKind::PhaseStarted {
                phase: DiscoveryPhase::Prerequisites,
            },
        );
        let prereq = prerequisites::check_prerequisites(
            page,
            &request.base_url,
            &profile.prerequisites,
            hints,
        )
        .await;
        for check in &prereq.checks {
            progress::emit(
                &self.progress,
                &run_id,
                &mut seq,
                ProgressEventKind::PrerequisiteChecked {
                    id: check.id.clone(),
                    status: check.status,
                    message: check.message.clone(),
                },
            );
        }
        trail.extend(&prereq.urls_visited);

        // Phase 2: resolve and reach the registration entry point.
        let entry_url = self
            .resolver
            .resolve_form_url(&request.provider, &request.base_url, &request.program_ref)
            .ok_or_else(|| DiscoveryError::ProgramUnresolvable {
                provider: request.provider.clone(),
                program_ref: request.program_ref.clone(),
            })?;

        let nav = page
            .navigate(&entry_url, ENTRY_NAV_TIMEOUT_MS)
            .await
            .map_err(|source| DiscoveryError::EntryNavigationFailed {
                url: entry_url.clone(),
                source: source.into(),
            })?;
        trail.visit(&nav.final_url);

        // Phase 3: walk the program form.
        progress::emit(
            &self.progress,
            &run_id,
            &mut seq,
            ProgressEventKind::PhaseStarted {
                phase: DiscoveryPhase::ProgramForm,
            },
        );
        let walk = walker::walk_steps(page, hints).await;
        trail.extend(&walk.urls_visited);

        progress::emit(
            &self.progress,
            &run_id,
            &mut seq,
            ProgressEventKind::WalkCompleted {
                field_count: walk.fields.len() as u32,
                iterations: walk.iterations,
                stop_reason: walk.stop_reason,
            },
        );
        if let Some(ref evidence) = walk.stop_evidence {
            progress::emit(
                &self.progress,
                &run_id,
                &mut seq,
                ProgressEventKind::GuardrailTripped {
                    reason: evidence.reason,
                    url: evidence.url.clone(),
                },
            );
        }

        let result = DiscoveryResult {
            run_id: run_id.clone(),
            prerequisites: prereq.checks,
            prereq_status: prereq.aggregate,
            program_fields: walk.fields,
            confidence_prereq: prereq.confidence,
            confidence_program: walk.confidence,
            loop_counts: LoopCounts {
                probe_iterations: prereq.probe_iterations,
                walker_iterations: walk.iterations,
            },
            urls_visited: trail.into_vec(),
            stop_reason: walk.stop_reason,
            stop_evidence: walk.stop_evidence,
        };

        progress::emit(
            &self.progress,
            &run_id,
            &mut seq,
            ProgressEventKind::RunCompleted {
                stop_reason: result.stop_reason,
                field_count: result.program_fields.len() as u32,
                urls_visited: result.urls_visited.len() as u32,
            },
        );
        info!(
            "discovery run {run_id} complete: {:?}, {} fields, {} urls",
            result.stop_reason,
            result.program_fields.len(),
            result.urls_visited.len()
        );

        Ok(result)
    }
}

/// Convenience: was the walk a usable schema discovery?
///
/// A guardrail trip still counts; the caller simply knows the flow ends at
/// a payment step the worker will handle under a real mandate.
pub fn schema_is_usable(result: &DiscoveryResult) -> bool {
    match result.stop_reason {
        StopReason::Success | StopReason::NoNewErrors | StopReason::PaymentDetected => {
            !result.program_fields.is_empty() || result.stop_reason == StopReason::Success
        }
        StopReason::MaxIterations => result.confidence_program >= 0.5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::scripted::{ClickRule, ScriptedSite, StateSpec};

    fn request() -> DiscoveryRequest {
        DiscoveryRequest {
            provider: "skiclubpro".to_string(),
            program_ref: "42".to_string(),
            base_url: "https://club.example.com".to_string(),
        }
    }

    /// Minimal site: every prerequisite path bounces to the listing page,
    /// the registration form has one step and a success panel.
    fn minimal_site() -> ScriptedSite {
        ScriptedSite::new()
            .state(
                "listing",
                StateSpec {
                    url: "https://club.example.com/registration".to_string(),
                    aliases: vec![
                        "https://club.example.com/membership".to_string(),
                        "https://club.example.com/waiver".to_string(),
                        "https://club.example.com/user/payment-methods".to_string(),
                        "https://club.example.com/user/profile".to_string(),
                    ],
                    html: "<h1>Programs</h1>".to_string(),
                    ..Default::default()
                },
            )
            .state(
                "questions",
                StateSpec {
                    url: "https://club.example.com/registration/42".to_string(),
                    html: r#"
                    <form>
                        <label for="child-name">Child name</label>
                        <input id="child-name" name="child_name" required />
                        <button id="next">Next</button>
                    </form>
                    "#
                    .to_string(),
                    clicks: vec![ClickRule::goto("#next", "done")],
                    ..Default::default()
                },
            )
            .state(
                "done",
                StateSpec {
                    url: "https://club.example.com/registration/42/done".to_string(),
                    html: "<h1>Registration complete</h1>".to_string(),
                    ..Default::default()
                },
            )
    }

    #[tokio::test]
    async fn test_full_run_assembles_result() {
        let mut page = minimal_site().open("listing");
        let engine = DiscoveryEngine::new();

        let result = engine
            .discover(&mut page, &request(), &WarmHints::default())
            .await
            .unwrap();

        assert_eq!(result.prerequisites.len(), 4);
        assert_eq!(
            result.prereq_status,
            crate::discovery::types::PrereqAggregate::Complete
        );
        assert_eq!(result.stop_reason, StopReason::Success);
        assert_eq!(result.program_fields.len(), 1);
        assert_eq!(result.program_fields[0].id, "child_name");
        assert_eq!(result.loop_counts.probe_iterations, 0);
        assert!(result.loop_counts.walker_iterations > 0);

        // URL trail is ordered and unique even though four prerequisite
        // paths bounced to the same listing page.
        let listing_count = result
            .urls_visited
            .iter()
            .filter(|u| u.as_str() == "https://club.example.com/registration")
            .count();
        assert_eq!(listing_count, 1);
        assert!(!result.urls_visited.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_provider_is_fatal() {
        let mut page = minimal_site().open("listing");
        let engine = DiscoveryEngine::new();
        let bad = DiscoveryRequest {
            provider: "unheard-of".to_string(),
            ..request()
        };

        let err = engine
            .discover(&mut page, &bad, &WarmHints::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::UnknownProvider(_)));
    }

    #[tokio::test]
    async fn test_unreachable_entry_is_fatal() {
        // Prerequisites resolve, but the registration entry URL is not a
        // known state: the run must fail fatally, not degrade.
        let site = ScriptedSite::new().state(
            "listing",
            StateSpec {
                url: "https://club.example.com/registration".to_string(),
                aliases: vec![
                    "https://club.example.com/membership".to_string(),
                    "https://club.example.com/waiver".to_string(),
                    "https://club.example.com/user/payment-methods".to_string(),
                    "https://club.example.com/user/profile".to_string(),
                ],
                html: "<h1>Programs</h1>".to_string(),
                ..Default::default()
            },
        );
        let mut page = site.open("listing");
        let engine = DiscoveryEngine::new();

        let err = engine
            .discover(&mut page, &request(), &WarmHints::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::EntryNavigationFailed { .. }));
    }

    #[tokio::test]
    async fn test_progress_events_flow() {
        let (tx, mut rx) = crate::progress::channel();
        let mut page = minimal_site().open("listing");
        let engine = DiscoveryEngine::new().with_progress(tx);

        engine
            .discover(&mut page, &request(), &WarmHints::default())
            .await
            .unwrap();

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(event.event);
        }
        assert!(kinds
            .iter()
            .any(|k| matches!(k, ProgressEventKind::PhaseStarted { .. })));
        assert!(kinds
            .iter()
            .any(|k| matches!(k, ProgressEventKind::PrerequisiteChecked { .. })));
        assert!(kinds
            .iter()
            .any(|k| matches!(k, ProgressEventKind::RunCompleted { .. })));
    }
}
