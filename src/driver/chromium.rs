//! Chromium-backed page handle using chromiumoxide.

use super::{NavigationResult, PageHandle};
use crate::discovery::normalize::RawField;
use crate::discovery::types::FieldOption;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. FORMSCOUT_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("FORMSCOUT_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. ~/.formscout/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".formscout/chromium/chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".formscout/chromium/chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".formscout/chromium/chrome"),
            ]
        } else {
            vec![
                home.join(".formscout/chromium/chrome-linux64/chrome"),
                home.join(".formscout/chromium/chrome"),
            ]
        };
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    // 3. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 4. Common macOS location
    if cfg!(target_os = "macos") {
        let common = PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Headless Chromium driver. Hands out one isolated page per discovery run.
pub struct ChromiumDriver {
    browser: Browser,
    active_count: Arc<AtomicUsize>,
}

impl ChromiumDriver {
    /// Launch a headless Chromium instance.
    pub async fn new() -> Result<Self> {
        let chrome_path =
            find_chromium().context("Chromium not found. Run `formscout doctor`.")?;

        let config = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking")
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        // Spawn the handler task
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        Ok(Self {
            browser,
            active_count: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Open a fresh page for one discovery run. The run owns the page
    /// exclusively; no two runs ever share one.
    pub async fn new_page(&self) -> Result<ChromiumPage> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;

        self.active_count.fetch_add(1, Ordering::Relaxed);

        Ok(ChromiumPage {
            page,
            active_count: Arc::clone(&self.active_count),
        })
    }

    /// Number of pages currently handed out.
    pub fn active_pages(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

/// A single Chromium page owned by one discovery run.
pub struct ChromiumPage {
    page: Page,
    active_count: Arc<AtomicUsize>,
}

impl ChromiumPage {
    /// Close the underlying page.
    pub async fn close(self) -> Result<()> {
        self.active_count.fetch_sub(1, Ordering::Relaxed);
        let _ = self.page.close().await;
        Ok(())
    }

    async fn eval_string(&self, script: &str) -> Result<String> {
        let result = self
            .page
            .evaluate(script)
            .await
            .context("JS evaluation failed")?;
        result
            .into_value()
            .map_err(|e| anyhow::anyhow!("failed to convert JS result: {e:?}"))
    }
}

/// The in-page structural read behind [`PageHandle::read_form_schema`].
///
/// Collects every visible form element with its live label (`el.labels`),
/// required flag, and options. Radios report one option each and are merged
/// into a group by the normalizer downstream.
const READ_SCHEMA_JS: &str = r#"
(() => {
    const visible = (el) => {
        if (el.type === 'hidden') return false;
        const style = window.getComputedStyle(el);
        if (style.display === 'none' || style.visibility === 'hidden') return false;
        return el.offsetParent !== null || el.tagName === 'INPUT';
    };
    const labelOf = (el) => {
        if (el.labels && el.labels.length) return el.labels[0].innerText.trim();
        if (el.type === 'radio' || el.type === 'checkbox') {
            const legend = el.closest('fieldset')?.querySelector('legend');
            if (legend) return legend.innerText.trim();
        }
        return null;
    };
    const out = [];
    for (const el of document.querySelectorAll('input, select, textarea')) {
        if (!visible(el)) continue;
        const entry = {
            tag: el.tagName.toLowerCase(),
            type: el.getAttribute('type'),
            name: el.getAttribute('name'),
            id: el.id || null,
            label: labelOf(el),
            aria_label: el.getAttribute('aria-label'),
            placeholder: el.getAttribute('placeholder'),
            required: el.required || el.getAttribute('aria-required') === 'true',
            options: []
        };
        if (el.tagName === 'SELECT') {
            entry.options = [...el.options]
                .filter(o => o.value !== '')
                .map(o => ({ value: o.value, label: o.label.trim() }));
        } else if (el.type === 'radio') {
            const optLabel = (el.labels && el.labels.length)
                ? el.labels[0].innerText.trim() : el.value;
            entry.options = [{ value: el.value, label: optLabel }];
        }
        out.push(entry);
    }
    return JSON.stringify(out);
})()
"#;

#[derive(Debug, Deserialize)]
struct JsFormField {
    tag: String,
    #[serde(rename = "type")]
    type_attr: Option<String>,
    name: Option<String>,
    id: Option<String>,
    label: Option<String>,
    aria_label: Option<String>,
    placeholder: Option<String>,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    options: Vec<JsFieldOption>,
}

#[derive(Debug, Deserialize)]
struct JsFieldOption {
    value: String,
    label: String,
}

#[async_trait]
impl PageHandle for ChromiumPage {
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult> {
        let start = Instant::now();

        let result = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            self.page.goto(url),
        )
        .await;

        let load_time_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(_response)) => {
                let _ = self.page.wait_for_navigation().await;

                let final_url = self
                    .page
                    .url()
                    .await
                    .unwrap_or_default()
                    .map(|u| u.to_string())
                    .unwrap_or_else(|| url.to_string());

                Ok(NavigationResult {
                    final_url,
                    load_time_ms,
                })
            }
            Ok(Err(e)) => bail!("navigation failed: {e}"),
            Err(_) => bail!("navigation timed out after {timeout_ms}ms"),
        }
    }

    async fn current_url(&self) -> Result<String> {
        let url = self
            .page
            .url()
            .await
            .context("failed to get URL")?
            .map(|u| u.to_string())
            .unwrap_or_default();
        Ok(url)
    }

    async fn html(&self) -> Result<String> {
        self.eval_string("document.documentElement.outerHTML")
            .await
            .context("failed to get HTML")
    }

    async fn visible_text(&self) -> Result<String> {
        self.eval_string("document.body ? document.body.innerText : ''")
            .await
            .context("failed to get page text")
    }

    async fn read_form_schema(&self) -> Result<Vec<RawField>> {
        let raw = self.eval_string(READ_SCHEMA_JS).await?;
        let parsed: Vec<JsFormField> =
            serde_json::from_str(&raw).context("schema read returned malformed JSON")?;

        Ok(parsed
            .into_iter()
            .map(|f| RawField {
                tag: f.tag,
                type_attr: f.type_attr,
                name: f.name,
                id: f.id,
                label_for: f.label,
                aria_label: f.aria_label,
                placeholder: f.placeholder,
                required: f.required,
                options: f
                    .options
                    .into_iter()
                    .map(|o| FieldOption {
                        value: o.value,
                        label: o.label,
                    })
                    .collect(),
            })
            .collect())
    }

    async fn fill(&mut self, selector: &str, value: &str) -> Result<bool> {
        let js = format!(
            r#"(() => {{
                const el = document.querySelector('{}');
                if (!el) return false;
                if (el.type === 'checkbox' || el.type === 'radio') {{
                    el.checked = true;
                }} else {{
                    el.value = '{}';
                }}
                el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return true;
            }})()"#,
            sanitize_js_string(selector),
            sanitize_js_string(value)
        );
        let result = self.page.evaluate(js).await.context("fill failed")?;
        Ok(result.into_value::<bool>().unwrap_or(false))
    }

    async fn click(&mut self, selector: &str) -> Result<bool> {
        let js = if let Some((tag, index)) = parse_index_selector(selector) {
            format!(
                r#"(() => {{
                    const els = document.querySelectorAll('{}');
                    if (els.length <= {index}) return false;
                    els[{index}].click();
                    return true;
                }})()"#,
                sanitize_js_string(&tag)
            )
        } else {
            format!(
                r#"(() => {{
                    const el = document.querySelector('{}');
                    if (!el) return false;
                    el.click();
                    return true;
                }})()"#,
                sanitize_js_string(selector)
            )
        };
        let result = self.page.evaluate(js).await.context("click failed")?;
        Ok(result.into_value::<bool>().unwrap_or(false))
    }

    async fn wait_for_settle(&self, timeout_ms: u64) -> Result<()> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            let ready = self
                .eval_string("document.readyState")
                .await
                .unwrap_or_default();
            if ready == "complete" {
                break;
            }
            if Instant::now() >= deadline {
                // Soft timeout: proceed with whatever the page has.
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        // Grace period for late XHR re-renders, still bounded.
        tokio::time::sleep(Duration::from_millis(250)).await;
        Ok(())
    }
}

/// Parse the positional `idx:<tag>:<n>` click selector form.
fn parse_index_selector(selector: &str) -> Option<(String, usize)> {
    let rest = selector.strip_prefix("idx:")?;
    let (tag, index) = rest.split_once(':')?;
    Some((tag.to_string(), index.parse().ok()?))
}

/// Sanitize a string for safe injection into a JavaScript string literal.
///
/// Escapes all characters that could break out of a JS string context:
/// backslashes, quotes, backticks, newlines, and angle brackets (to prevent
/// `</script>` injection). Null bytes are stripped.
fn sanitize_js_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 8);
    for ch in s.chars() {
        match ch {
            '\\' => result.push_str("\\\\"),
            '\'' => result.push_str("\\'"),
            '"' => result.push_str("\\\""),
            '`' => result.push_str("\\`"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            '\0' => {}
            '<' => result.push_str("\\x3c"),
            '>' => result.push_str("\\x3e"),
            _ => result.push(ch),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_basic() {
        assert_eq!(sanitize_js_string("hello"), "hello");
        assert_eq!(sanitize_js_string("it's"), "it\\'s");
        assert_eq!(sanitize_js_string("a\"b"), "a\\\"b");
    }

    #[test]
    fn test_sanitize_xss() {
        let malicious = r#"</script><script>alert(1)</script>"#;
        let sanitized = sanitize_js_string(malicious);
        assert!(!sanitized.contains("</script>"));
        assert!(sanitized.contains("\\x3c/script\\x3e"));
    }

    #[test]
    fn test_parse_index_selector() {
        assert_eq!(
            parse_index_selector("idx:button:3"),
            Some(("button".to_string(), 3))
        );
        assert_eq!(parse_index_selector("#submit"), None);
        assert_eq!(parse_index_selector("idx:button:x"), None);
    }

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_chromium_schema_read() {
        let driver = ChromiumDriver::new().await.expect("failed to launch");
        let mut page = driver.new_page().await.expect("failed to open page");

        page.navigate(
            "data:text/html,<form><label for='a'>Child name</label><input id='a' name='child_name' required></form>",
            10000,
        )
        .await
        .expect("navigation failed");

        let schema = page.read_form_schema().await.expect("schema read failed");
        assert_eq!(schema.len(), 1);
        assert_eq!(schema[0].name.as_deref(), Some("child_name"));
        assert!(schema[0].required);

        page.close().await.expect("close failed");
        assert_eq!(driver.active_pages(), 0);
    }
}
