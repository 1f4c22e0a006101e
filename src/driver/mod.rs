//! Page abstraction for discovery runs.
//!
//! Defines the [`PageHandle`] trait that abstracts over the browser engine.
//! A discovery run owns exactly one page handle, threaded explicitly through
//! every call; nothing in this crate reaches for ambient browser state. Two
//! implementations exist:
//!
//! - [`chromium`] drives a real page through chromiumoxide. Each handle is
//!   an isolated browser context, so concurrent runs never share cookies.
//! - [`scripted`] is a deterministic in-memory state machine with an
//!   external click log, used by the test suite and `--dry-run`.
//!
//! ## Click selectors
//!
//! `fill` and `click` take CSS selectors. Controls without an `id` or `name`
//! are addressed with the positional form `idx:<tag>:<n>` (the n-th element
//! of that tag in document order), which both drivers understand; it exists
//! because CSS cannot select by text content.

pub mod chromium;
pub mod scripted;

use crate::discovery::normalize::RawField;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Result of navigating to a URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    /// The final URL after any redirects.
    pub final_url: String,
    /// Time taken to load the page in milliseconds.
    pub load_time_ms: u64,
}

/// An exclusively-owned, already-authenticated browser page.
///
/// All mutation (navigation, fills, clicks) is strictly sequenced by the
/// calling loop; implementations never mutate the page from background
/// tasks. Every operation that can wait carries a bounded timeout.
#[async_trait]
pub trait PageHandle: Send + Sync {
    /// Navigate to a URL, bounded by `timeout_ms`.
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult>;

    /// The page's current URL.
    async fn current_url(&self) -> Result<String>;

    /// Full page HTML.
    async fn html(&self) -> Result<String>;

    /// Visible text content of the page body.
    async fn visible_text(&self) -> Result<String>;

    /// Schema-level read of the current step's form definitions.
    ///
    /// This is the walker's primary extraction strategy: a structural read
    /// of the live form (labels, required flags, options) that is cheaper
    /// and more accurate than scanning raw HTML. An empty result is not an
    /// error; it tells the walker to fall back to the generic DOM scan.
    async fn read_form_schema(&self) -> Result<Vec<RawField>>;

    /// Fill a field. Returns `false` when the selector matched nothing.
    async fn fill(&mut self, selector: &str, value: &str) -> Result<bool>;

    /// Click a control. Returns `false` when the selector matched nothing.
    async fn click(&mut self, selector: &str) -> Result<bool>;

    /// Wait for DOM/network stability, bounded by `timeout_ms`. Timing out
    /// is soft: the page is simply used as-is afterwards.
    async fn wait_for_settle(&self, timeout_ms: u64) -> Result<()>;
}
