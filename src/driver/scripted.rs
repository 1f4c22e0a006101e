//! Deterministic in-memory page for tests and dry runs.
//!
//! A [`ScriptedSite`] is a small state machine: named states carry a URL,
//! fixture HTML, an optional schema (what the primary extraction would
//! see), and click rules describing where each control leads. Click rules
//! can require fields to have been filled first, which is how fixtures
//! model client-side validation.
//!
//! Every click and every navigation is recorded in externally observable
//! logs. The safety tests assert over the click log that no payment-intent
//! control was ever clicked.

use super::{NavigationResult, PageHandle};
use crate::discovery::normalize::RawField;
use anyhow::{bail, Result};
use async_trait::async_trait;
use scraper::Html;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// One page state in a scripted site.
#[derive(Debug, Clone, Default)]
pub struct StateSpec {
    /// Canonical URL of this state.
    pub url: String,
    /// Other URLs that land here (models server-side redirects).
    pub aliases: Vec<String>,
    /// Fixture HTML served for this state.
    pub html: String,
    /// What the schema-level read returns. Empty forces the generic scan.
    pub schema: Vec<RawField>,
    /// Click transitions, first match wins.
    pub clicks: Vec<ClickRule>,
}

/// Where a click on a matching control leads.
#[derive(Debug, Clone)]
pub struct ClickRule {
    /// Substring matched against the clicked selector.
    pub control: String,
    /// Selectors that must have been filled for `then` to apply.
    pub requires_filled: Vec<String>,
    /// Destination state when the requirements are met.
    pub then: String,
    /// Destination when they are not (`None` keeps the current state).
    pub otherwise: Option<String>,
}

impl ClickRule {
    /// Unconditional transition.
    pub fn goto(control: &str, then: &str) -> Self {
        Self {
            control: control.to_string(),
            requires_filled: Vec::new(),
            then: then.to_string(),
            otherwise: None,
        }
    }

    /// Transition gated on fields having been filled.
    pub fn validated(
        control: &str,
        requires_filled: &[&str],
        then: &str,
        otherwise: &str,
    ) -> Self {
        Self {
            control: control.to_string(),
            requires_filled: requires_filled.iter().map(|s| s.to_string()).collect(),
            then: then.to_string(),
            otherwise: Some(otherwise.to_string()),
        }
    }
}

/// A scripted site: the fixture a [`ScriptedPage`] walks.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSite {
    states: HashMap<String, StateSpec>,
}

impl ScriptedSite {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a state under a name.
    pub fn state(mut self, name: &str, spec: StateSpec) -> Self {
        self.states.insert(name.to_string(), spec);
        self
    }

    /// Open a page positioned at `start`.
    pub fn open(&self, start: &str) -> ScriptedPage {
        assert!(
            self.states.contains_key(start),
            "unknown start state '{start}'"
        );
        ScriptedPage {
            states: self.states.clone(),
            current: start.to_string(),
            filled: HashMap::new(),
            click_log: Arc::new(Mutex::new(Vec::new())),
            nav_log: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

/// A click as recorded in the external click log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickRecord {
    /// State the page was in when the click happened.
    pub state: String,
    /// The selector that was clicked.
    pub selector: String,
}

/// A deterministic page over a [`ScriptedSite`].
pub struct ScriptedPage {
    states: HashMap<String, StateSpec>,
    current: String,
    filled: HashMap<String, String>,
    click_log: Arc<Mutex<Vec<ClickRecord>>>,
    nav_log: Arc<Mutex<Vec<String>>>,
}

impl ScriptedPage {
    /// Shared handle to the click log.
    pub fn click_log(&self) -> Arc<Mutex<Vec<ClickRecord>>> {
        Arc::clone(&self.click_log)
    }

    /// Shared handle to the navigation log (requested URLs, in order).
    pub fn nav_log(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.nav_log)
    }

    /// Name of the current state (test helper).
    pub fn current_state(&self) -> &str {
        &self.current
    }

    fn spec(&self) -> &StateSpec {
        &self.states[&self.current]
    }
}

#[async_trait]
impl PageHandle for ScriptedPage {
    async fn navigate(&mut self, url: &str, _timeout_ms: u64) -> Result<NavigationResult> {
        self.nav_log.lock().unwrap().push(url.to_string());

        let target = self
            .states
            .iter()
            .find(|(_, spec)| {
                spec.url == url || spec.aliases.iter().any(|a| a == url)
            })
            .map(|(name, _)| name.clone());

        match target {
            Some(name) => {
                self.current = name;
                Ok(NavigationResult {
                    final_url: self.spec().url.clone(),
                    load_time_ms: 0,
                })
            }
            None => bail!("scripted site has no state for {url}"),
        }
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.spec().url.clone())
    }

    async fn html(&self) -> Result<String> {
        Ok(self.spec().html.clone())
    }

    async fn visible_text(&self) -> Result<String> {
        let document = Html::parse_document(&self.spec().html);
        let text = document
            .root_element()
            .text()
            .collect::<Vec<_>>()
            .join(" ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        Ok(text)
    }

    async fn read_form_schema(&self) -> Result<Vec<RawField>> {
        Ok(self.spec().schema.clone())
    }

    async fn fill(&mut self, selector: &str, value: &str) -> Result<bool> {
        self.filled
            .insert(selector.to_string(), value.to_string());
        Ok(true)
    }

    async fn click(&mut self, selector: &str) -> Result<bool> {
        self.click_log.lock().unwrap().push(ClickRecord {
            state: self.current.clone(),
            selector: selector.to_string(),
        });

        let matching: Vec<ClickRule> = self
            .spec()
            .clicks
            .iter()
            .filter(|r| selector.contains(r.control.as_str()) || r.control.contains(selector))
            .cloned()
            .collect();

        if matching.is_empty() {
            return Ok(false);
        }

        let satisfied = |rule: &ClickRule| {
            rule.requires_filled.iter().all(|sel| {
                self.filled
                    .get(sel)
                    .map(|v| !v.is_empty())
                    .unwrap_or(false)
            })
        };

        // First rule whose fill requirements are met wins; when none are,
        // the first matching rule's `otherwise` models the re-rendered
        // validation-error page.
        let destination = match matching.iter().find(|r| satisfied(r)) {
            Some(rule) => Some(rule.then.clone()),
            None => matching[0].otherwise.clone(),
        };

        if let Some(dest) = destination {
            if self.states.contains_key(&dest) {
                self.current = dest;
            } else {
                bail!("click rule points at unknown state '{dest}'");
            }
        }
        Ok(true)
    }

    async fn wait_for_settle(&self, _timeout_ms: u64) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_state_site() -> ScriptedSite {
        ScriptedSite::new()
            .state(
                "form",
                StateSpec {
                    url: "https://club.example.com/form".to_string(),
                    html: "<form><input name='a'/><button id='next'>Next</button></form>"
                        .to_string(),
                    clicks: vec![ClickRule::goto("#next", "done")],
                    ..Default::default()
                },
            )
            .state(
                "done",
                StateSpec {
                    url: "https://club.example.com/done".to_string(),
                    html: "<p>Registration complete</p>".to_string(),
                    ..Default::default()
                },
            )
    }

    #[tokio::test]
    async fn test_click_transition_and_log() {
        let mut page = two_state_site().open("form");
        assert!(page.click("#next").await.unwrap());
        assert_eq!(page.current_state(), "done");

        let log = page.click_log();
        let log = log.lock().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].selector, "#next");
        assert_eq!(log[0].state, "form");
    }

    #[tokio::test]
    async fn test_unmatched_click_stays_put() {
        let mut page = two_state_site().open("form");
        assert!(!page.click("#nothing").await.unwrap());
        assert_eq!(page.current_state(), "form");
    }

    #[tokio::test]
    async fn test_validated_click() {
        let site = ScriptedSite::new()
            .state(
                "form",
                StateSpec {
                    url: "https://x.example/f".to_string(),
                    clicks: vec![ClickRule::validated(
                        "#submit",
                        &["#child_name"],
                        "ok",
                        "form",
                    )],
                    ..Default::default()
                },
            )
            .state(
                "ok",
                StateSpec {
                    url: "https://x.example/ok".to_string(),
                    ..Default::default()
                },
            );

        let mut page = site.open("form");
        page.click("#submit").await.unwrap();
        assert_eq!(page.current_state(), "form");

        page.fill("#child_name", "Avery").await.unwrap();
        page.click("#submit").await.unwrap();
        assert_eq!(page.current_state(), "ok");
    }

    #[tokio::test]
    async fn test_navigate_via_alias() {
        let site = ScriptedSite::new().state(
            "listing",
            StateSpec {
                url: "https://x.example/registration".to_string(),
                aliases: vec!["https://x.example/membership".to_string()],
                ..Default::default()
            },
        );
        let mut page = site.open("listing");
        let nav = page
            .navigate("https://x.example/membership", 1000)
            .await
            .unwrap();
        assert_eq!(nav.final_url, "https://x.example/registration");
    }

    #[tokio::test]
    async fn test_visible_text_strips_markup() {
        let page = two_state_site().open("done");
        // Move to done state directly via open.
        assert_eq!(page.visible_text().await.unwrap(), "Registration complete");
    }
}
