//! Fatal error taxonomy for discovery runs.
//!
//! Only conditions that make a run impossible are represented here. Soft
//! failures (navigation timeouts, missing selectors, JS evaluation errors)
//! are handled at the call site with `anyhow`, logged, and treated as
//! "feature absent" so the loop can proceed with degraded confidence. A
//! payment-guardrail trip is not an error at all; it is a successful stop
//! reported through `StopReason::PaymentDetected`.

use thiserror::Error;

/// A condition that prevents a discovery run from proceeding.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// No registration entry URL could be resolved for the program.
    #[error("no registration URL resolvable for program '{program_ref}' on {provider}")]
    ProgramUnresolvable {
        provider: String,
        program_ref: String,
    },

    /// Navigation to the resolved registration entry point failed outright.
    #[error("failed to reach registration entry point {url}: {source}")]
    EntryNavigationFailed {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The provider has no profile and no prerequisite definitions were
    /// supplied by the caller.
    #[error("unknown provider '{0}' and no prerequisite definitions supplied")]
    UnknownProvider(String),
}
