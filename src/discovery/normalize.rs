//! Field normalization: raw DOM attributes to canonical keys and labels.
//!
//! Registration platforms name the same field a dozen ways
//! (`edit-field-child-name-0-value`, `fields[childName]`, `child_name`).
//! Discovery merges observations across steps and extraction strategies by
//! normalized key, so the key function here defines field identity for the
//! whole subsystem.

use crate::discovery::heuristics::heuristics;
use crate::discovery::types::{DiscoveredField, FieldOption, FieldType};
use crate::hints::WarmHints;

// ── Raw observations ────────────────────────────────────────────────────────

/// A field as observed in the DOM, before normalization.
///
/// Produced by both extraction strategies (the in-page schema read and the
/// scraper fallback) so they converge on identical [`DiscoveredField`]s.
#[derive(Debug, Clone, Default)]
pub struct RawField {
    /// Element tag name (`input`, `select`, `textarea`).
    pub tag: String,
    /// The `type` attribute for inputs.
    pub type_attr: Option<String>,
    /// The `name` attribute.
    pub name: Option<String>,
    /// The `id` attribute.
    pub id: Option<String>,
    /// Label text resolved from `label[for]`.
    pub label_for: Option<String>,
    /// The `aria-label` attribute.
    pub aria_label: Option<String>,
    /// The `placeholder` attribute.
    pub placeholder: Option<String>,
    /// Whether the `required` attribute (or aria-required) is present.
    pub required: bool,
    /// Options for selects and radio groups.
    pub options: Vec<FieldOption>,
}

impl RawField {
    /// Normalize into a [`DiscoveredField`], or `None` when the element has
    /// no usable identity or is not a user-facing field.
    pub fn normalize(&self, hints: &WarmHints) -> Option<DiscoveredField> {
        if let Some(t) = self.type_attr.as_deref() {
            if matches!(t, "hidden" | "submit" | "button" | "image" | "reset") {
                return None;
            }
        }

        let key = self
            .name
            .as_deref()
            .and_then(normalize_key)
            .or_else(|| self.id.as_deref().and_then(normalize_key))
            .or_else(|| self.label_for.as_deref().and_then(normalize_key))
            .or_else(|| self.aria_label.as_deref().and_then(normalize_key))?;

        let label = hints
            .label(&key)
            .map(str::to_string)
            .or_else(|| non_empty(self.label_for.as_deref()))
            .or_else(|| non_empty(self.aria_label.as_deref()))
            .or_else(|| non_empty(self.placeholder.as_deref()))
            .unwrap_or_else(|| humanize_key(&key));

        Some(DiscoveredField {
            category: infer_category(&key, &label),
            id: key,
            label,
            field_type: classify_type(&self.tag, self.type_attr.as_deref()),
            required: self.required,
            options: self.options.clone(),
            seen_at_steps: Vec::new(),
        })
    }
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

// ── Key normalization ───────────────────────────────────────────────────────

/// Produce the canonical snake_case key for a raw attribute value.
///
/// Strips platform scaffolding (Drupal's `edit-` prefixes, `fields[...]`
/// array wrappers, trailing `-0-value` indices), converts camelCase, and
/// collapses everything else to `[a-z0-9_]`. Returns `None` when nothing
/// meaningful survives.
pub fn normalize_key(raw: &str) -> Option<String> {
    let mut s = raw.trim().to_string();
    if s.is_empty() {
        return None;
    }

    // Array wrappers: fields[child_name][0][value] -> fields child_name 0 value
    s = s.replace(['[', ']'], " ");

    // camelCase boundaries before lowercasing.
    let mut spaced = String::with_capacity(s.len() + 8);
    let chars: Vec<char> = s.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() && i > 0 && chars[i - 1].is_lowercase() {
            spaced.push(' ');
        }
        spaced.push(c);
    }

    let tokens: Vec<String> = spaced
        .to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();

    // Drop scaffolding tokens and pure indices.
    let meaningful: Vec<&str> = tokens
        .iter()
        .map(String::as_str)
        .filter(|t| !matches!(*t, "edit" | "fields" | "field" | "value" | "wrapper" | "form"))
        .filter(|t| t.parse::<u64>().is_err())
        .collect();

    if meaningful.is_empty() {
        return None;
    }
    Some(meaningful.join("_"))
}

/// Title-case a normalized key into a displayable fallback label.
pub fn humanize_key(key: &str) -> String {
    key.split('_')
        .filter(|w| !w.is_empty())
        .enumerate()
        .map(|(i, w)| {
            if i == 0 {
                let mut c = w.chars();
                match c.next() {
                    Some(first) => first.to_uppercase().collect::<String>() + c.as_str(),
                    None => String::new(),
                }
            } else {
                w.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ── Type and category classification ────────────────────────────────────────

/// Map a tag + `type` attribute to a [`FieldType`].
pub fn classify_type(tag: &str, type_attr: Option<&str>) -> FieldType {
    match tag.to_lowercase().as_str() {
        "textarea" => FieldType::Textarea,
        "select" => FieldType::Select,
        _ => match type_attr.unwrap_or("text").to_lowercase().as_str() {
            "radio" => FieldType::Radio,
            "checkbox" => FieldType::Checkbox,
            "number" => FieldType::Number,
            "date" | "datetime-local" => FieldType::Date,
            _ => FieldType::Text,
        },
    }
}

/// Infer a semantic category from the key and label keyword tables.
pub fn infer_category(key: &str, label: &str) -> Option<String> {
    let haystack = format!("{} {}", key, label).to_lowercase();
    for entry in &heuristics().category_keywords {
        if entry.keywords.iter().any(|kw| haystack.contains(kw.as_str())) {
            return Some(entry.category.clone());
        }
    }
    None
}
