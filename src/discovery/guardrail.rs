//! Payment guardrail: pure classification of controls and pages as
//! payment-intent.
//!
//! This module enforces the single non-negotiable invariant of the whole
//! subsystem: no code path may submit a form or click a control after either
//! classifier here returns true for the current context. The walker runs
//! [`page_indicates_payment`] before extracting anything from a freshly
//! loaded step, runs [`is_payment_control`] on every advance control before
//! clicking it, and the probe refuses any submit control the classifier
//! flags.
//!
//! Classification is driven by pattern tables loaded at compile time from
//! `payment_patterns.json`, so the lexicons can be tuned and tested without
//! touching control flow. Both classifiers are synchronous and side-effect
//! free; the only construction this module performs is the evidence
//! snapshot built by [`capture_evidence`] when a trip halts discovery.

use crate::discovery::types::{PaymentStopEvidence, PaymentStopReason};
use chrono::Utc;
use regex::Regex;
use scraper::{Html, Selector};
use serde::Deserialize;
use std::sync::OnceLock;

/// Raw JSON content of the payment pattern tables, embedded at compile time.
const PAYMENT_PATTERNS_JSON: &str = include_str!("payment_patterns.json");

// ── Pattern table loading ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct PaymentPatternsConfig {
    button_lexicon: Vec<String>,
    currency_patterns: Vec<String>,
    page: PagePatternsConfig,
}

#[derive(Debug, Deserialize)]
struct PagePatternsConfig {
    autocomplete_markers: Vec<String>,
    input_patterns: Vec<String>,
    gateway_patterns: Vec<String>,
    url_patterns: Vec<String>,
}

/// Pattern tables with regexes compiled once.
struct CompiledPatterns {
    button_phrases: Vec<Regex>,
    currency: Vec<Regex>,
    autocomplete_markers: Vec<String>,
    input_patterns: Vec<Regex>,
    gateway_patterns: Vec<String>,
    url_patterns: Vec<String>,
}

fn patterns() -> &'static CompiledPatterns {
    static PATTERNS: OnceLock<CompiledPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let config: PaymentPatternsConfig = serde_json::from_str(PAYMENT_PATTERNS_JSON)
            .expect("payment_patterns.json is valid");

        let button_phrases = config
            .button_lexicon
            .iter()
            .map(|phrase| {
                // Whole-phrase match with word boundaries, so "Display"
                // never trips on the "pay" entry.
                let escaped = regex::escape(phrase);
                Regex::new(&format!(r"\b{escaped}\b")).expect("lexicon phrase regex is valid")
            })
            .collect();

        let currency = config
            .currency_patterns
            .iter()
            .map(|pat| Regex::new(pat).expect("currency regex is valid"))
            .collect();

        let input_patterns = config
            .page
            .input_patterns
            .iter()
            .map(|pat| Regex::new(pat).expect("input pattern regex is valid"))
            .collect();

        CompiledPatterns {
            button_phrases,
            currency,
            autocomplete_markers: config.page.autocomplete_markers,
            input_patterns,
            gateway_patterns: config.page.gateway_patterns,
            url_patterns: config.page.url_patterns,
        }
    })
}

// ── Classifiers ─────────────────────────────────────────────────────────────

/// Classify a control's visible text as payment-intent.
///
/// True when the text matches the payment lexicon (whole-phrase, word
/// boundaries) or carries a currency amount on the control itself
/// ("Pay $45.00").
pub fn is_payment_control(text: &str) -> bool {
    let lower = text.trim().to_lowercase();
    if lower.is_empty() {
        return false;
    }
    let p = patterns();
    p.button_phrases.iter().any(|re| re.is_match(&lower))
        || p.currency.iter().any(|re| re.is_match(&lower))
}

/// Classify a page as a payment page from its HTML and URL.
///
/// Structural markers win over text: card-number-style inputs
/// (`autocomplete="cc-number"` and friends, or name/id/placeholder matching
/// the card-field patterns), payment-gateway iframes and scripts, or a URL
/// matching the checkout path patterns. Some payment pages expose
/// probe-friendly-looking fields, which is exactly why this check runs
/// before any extraction.
pub fn page_indicates_payment(html: &str, url: &str) -> bool {
    let p = patterns();

    let url_lower = url.to_lowercase();
    if p.url_patterns.iter().any(|pat| url_lower.contains(pat)) {
        return true;
    }

    // Gateway fingerprints are plain substrings; check the raw source
    // before paying for a DOM parse.
    let html_lower = html.to_lowercase();
    if p.gateway_patterns
        .iter()
        .any(|pat| html_lower.contains(pat))
    {
        return true;
    }

    let document = Html::parse_document(html);
    let input_sel = Selector::parse("input").expect("input selector is valid");

    for input in document.select(&input_sel) {
        if let Some(autocomplete) = input.value().attr("autocomplete") {
            let ac = autocomplete.to_lowercase();
            if p.autocomplete_markers.iter().any(|m| ac == *m) {
                return true;
            }
        }
        let identity = [
            input.value().attr("name").unwrap_or(""),
            input.value().attr("id").unwrap_or(""),
            input.value().attr("placeholder").unwrap_or(""),
        ]
        .join(" ")
        .to_lowercase();
        if !identity.trim().is_empty()
            && p.input_patterns.iter().any(|re| re.is_match(&identity))
        {
            return true;
        }
    }

    false
}

/// Build the evidence snapshot for a guardrail trip.
pub fn capture_evidence(
    url: &str,
    reason: PaymentStopReason,
    control_text: Option<&str>,
) -> PaymentStopEvidence {
    PaymentStopEvidence {
        reason,
        url: url.to_string(),
        button_text: control_text.map(|t| t.trim().to_string()),
        captured_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_lexicon_matches() {
        assert!(is_payment_control("Pay Now"));
        assert!(is_payment_control("  Complete Purchase  "));
        assert!(is_payment_control("Place Order"));
        assert!(is_payment_control("checkout"));
    }

    #[test]
    fn test_word_boundaries_prevent_substring_trips() {
        // "pay" must not match inside other words.
        assert!(!is_payment_control("Display options"));
        assert!(!is_payment_control("Paypal-free since 2019"));
        assert!(!is_payment_control("Continue"));
        assert!(!is_payment_control("Next"));
        assert!(!is_payment_control("Register"));
    }

    #[test]
    fn test_currency_amount_on_control() {
        assert!(is_payment_control("Confirm $45.00"));
        assert!(is_payment_control("Submit €120"));
        assert!(is_payment_control("Continue 99.00 USD"));
        assert!(!is_payment_control("Step 2 of 4"));
    }

    #[test]
    fn test_empty_control_text() {
        assert!(!is_payment_control(""));
        assert!(!is_payment_control("   "));
    }

    #[test]
    fn test_page_card_inputs() {
        let html = r#"
        <html><body>
            <form>
                <input name="cardNumber" placeholder="Card number" />
                <input name="cvc" />
                <input name="exp_month" />
            </form>
        </body></html>
        "#;
        assert!(page_indicates_payment(html, "https://club.example.com/register/confirm"));
    }

    #[test]
    fn test_page_autocomplete_markers() {
        let html = r#"<input autocomplete="cc-number" name="f1" />"#;
        assert!(page_indicates_payment(html, "https://club.example.com/step"));
    }

    #[test]
    fn test_page_gateway_iframe() {
        let html = r#"
        <html><body>
            <iframe src="https://js.stripe.com/v3/elements-inner-card.html"></iframe>
        </body></html>
        "#;
        assert!(page_indicates_payment(html, "https://club.example.com/register"));
    }

    #[test]
    fn test_page_url_pattern() {
        let html = "<html><body><h1>Almost done</h1></body></html>";
        assert!(page_indicates_payment(html, "https://club.example.com/checkout"));
    }

    #[test]
    fn test_ordinary_form_page_is_clean() {
        let html = r#"
        <html><body>
            <form>
                <label for="child_name">Child name</label>
                <input id="child_name" name="child_name" required />
                <select name="session"><option value="am">Morning</option></select>
                <button type="submit">Continue</button>
            </form>
        </body></html>
        "#;
        assert!(!page_indicates_payment(
            html,
            "https://club.example.com/registration/42/questions"
        ));
    }

    #[test]
    fn test_capture_evidence_snapshot() {
        let evidence = capture_evidence(
            "https://club.example.com/checkout",
            PaymentStopReason::PaymentButton,
            Some("  Pay Now  "),
        );
        assert_eq!(evidence.reason, PaymentStopReason::PaymentButton);
        assert_eq!(evidence.url, "https://club.example.com/checkout");
        assert_eq!(evidence.button_text.as_deref(), Some("Pay Now"));
    }
}
