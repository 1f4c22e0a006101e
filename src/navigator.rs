//! Registration entry URL resolution.
//!
//! Finding the right signup URL for a program is an external concern:
//! production callers plug in a resolver backed by listing-page search and
//! cached results. The [`FormUrlResolver`] trait is that seam. The built-in
//! [`ProfileResolver`] covers the common case by filling the provider
//! profile's URL template.

use crate::profiles::provider_profile;

/// Resolves a program reference to its registration entry URL.
pub trait FormUrlResolver: Send + Sync {
    /// Resolve the registration entry URL, or `None` when the program
    /// cannot be located. `None` is fatal for the run.
    fn resolve_form_url(&self, provider: &str, base_url: &str, program_ref: &str)
        -> Option<String>;
}

/// Template-based resolver using the embedded provider profiles.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProfileResolver;

impl FormUrlResolver for ProfileResolver {
    fn resolve_form_url(
        &self,
        provider: &str,
        base_url: &str,
        program_ref: &str,
    ) -> Option<String> {
        if program_ref.trim().is_empty() {
            return None;
        }
        let template = provider_profile(provider)?.registration_path.clone();
        let path = template.replace("{program}", program_ref.trim());
        url::Url::parse(base_url)
            .ok()?
            .join(&path)
            .ok()
            .map(|u| u.to_string())
    }
}
