//! Shared heuristic lexicons, loaded once from `heuristics.json`.
//!
//! Completion phrases, success phrases, safe-harbor URL patterns, advance
//! control priorities, chrome keywords, and category keywords are all data,
//! not code: they change as target sites change and must be tunable without
//! touching control flow.

use serde::Deserialize;
use std::sync::OnceLock;

/// Raw JSON content of the heuristic tables, embedded at compile time.
const HEURISTICS_JSON: &str = include_str!("heuristics.json");

/// All heuristic lexicons used across the discovery modules.
#[derive(Debug, Deserialize)]
pub struct Heuristics {
    /// Page text meaning "this gate is already satisfied".
    pub completion_phrases: Vec<String>,
    /// Page text meaning "the form was submitted successfully".
    pub success_phrases: Vec<String>,
    /// URL fragments of general listing pages; a redirect here means no
    /// gate form was presented.
    pub safe_harbor_patterns: Vec<String>,
    /// Advance-control keywords in priority order.
    pub advance_priority: Vec<String>,
    /// Keywords marking non-form page chrome to skip during scans.
    pub chrome_keywords: Vec<String>,
    /// Field-category inference keywords, checked in declared order so the
    /// most specific category wins deterministically.
    pub category_keywords: Vec<CategoryKeywords>,
}

/// One category inference entry.
#[derive(Debug, Deserialize)]
pub struct CategoryKeywords {
    pub category: String,
    pub keywords: Vec<String>,
}

/// Parse and cache the embedded heuristic tables.
pub fn heuristics() -> &'static Heuristics {
    static TABLES: OnceLock<Heuristics> = OnceLock::new();
    TABLES.get_or_init(|| {
        serde_json::from_str(HEURISTICS_JSON).expect("heuristics.json is valid")
    })
}

/// Case-insensitive check for any completion phrase in page text.
pub fn text_indicates_completion(text: &str) -> bool {
    let lower = text.to_lowercase();
    heuristics()
        .completion_phrases
        .iter()
        .any(|p| lower.contains(p.as_str()))
}

/// Case-insensitive check for any success phrase in page text.
pub fn text_indicates_success(text: &str) -> bool {
    let lower = text.to_lowercase();
    heuristics()
        .success_phrases
        .iter()
        .any(|p| lower.contains(p.as_str()))
}

/// Whether a URL landed on a safe-harbor listing page.
pub fn url_is_safe_harbor(url: &str) -> bool {
    let lower = url.to_lowercase();
    let path = url::Url::parse(&lower)
        .map(|u| u.path().to_string())
        .unwrap_or(lower);
    heuristics()
        .safe_harbor_patterns
        .iter()
        .any(|p| path.ends_with(p.as_str()) || path.contains(&format!("{p}/")))
}
