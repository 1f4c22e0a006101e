//! Provider profiles: per-provider path hints, embedded at compile time.
//!
//! A profile is not an API contract; it is a list of places a provider's
//! sites usually keep their prerequisite pages plus a registration URL
//! template. Discovery degrades gracefully when paths are wrong (every
//! navigation has fallbacks and the optimistic default), so profiles can be
//! sparse. New providers are added by editing `profiles.json`, not code.

use crate::discovery::prerequisites::PrerequisiteDefinition;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Raw JSON content of the provider profiles, embedded at compile time.
const PROFILES_JSON: &str = include_str!("profiles.json");

/// Known path hints for one registration provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderProfile {
    /// Display name.
    pub label: String,
    /// Prerequisite gates this provider is known to have, in check order.
    pub prerequisites: Vec<PrerequisiteDefinition>,
    /// Registration entry URL template with a `{program}` placeholder.
    pub registration_path: String,
}

type ProfileRegistry = HashMap<String, ProviderProfile>;

fn registry() -> &'static ProfileRegistry {
    static REGISTRY: OnceLock<ProfileRegistry> = OnceLock::new();
    REGISTRY
        .get_or_init(|| serde_json::from_str(PROFILES_JSON).expect("profiles.json is valid"))
}

/// Look up a provider profile by identifier.
pub fn provider_profile(provider: &str) -> Option<&'static ProviderProfile> {
    registry().get(provider)
}

/// Known provider identifiers, sorted for stable output.
pub fn known_providers() -> Vec<&'static str> {
    let mut providers: Vec<&'static str> = registry().keys().map(String::as_str).collect();
    providers.sort_unstable();
    providers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profiles_parse() {
        let providers = known_providers();
        assert_eq!(providers, vec!["campminder", "daysmart", "skiclubpro"]);
    }

    #[test]
    fn test_skiclubpro_profile() {
        let profile = provider_profile("skiclubpro").unwrap();
        assert_eq!(profile.prerequisites.len(), 4);
        assert_eq!(profile.prerequisites[0].id, "membership");
        assert!(profile.registration_path.contains("{program}"));
        // Every gate carries at least one candidate path.
        assert!(profile
            .prerequisites
            .iter()
            .all(|p| !p.candidate_paths.is_empty()));
    }

    #[test]
    fn test_unknown_provider() {
        assert!(provider_profile("nosuch").is_none());
    }
}
