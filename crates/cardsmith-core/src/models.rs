//! Hosted model metadata and selection heuristics
//!
//! Picks a cheap model for summarization and resolves duplicate catalog
//! entries to their most recent version.

use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use regex::Regex;

/// Date embedded in model ids like `gpt-4o-2024-11-20`
static DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4}-\d{2}-\d{2})").expect("valid regex"));

/// Metadata for one hosted chat model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    pub vendor: String,
    pub family: String,
    pub version: String,
    /// Human-readable display name
    pub name: String,
    pub max_input_tokens: usize,
}

impl ModelDescriptor {
    pub fn new(id: &str, vendor: &str, family: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            vendor: vendor.to_string(),
            family: family.to_string(),
            version: String::new(),
            name: name.to_string(),
            max_input_tokens: 0,
        }
    }

    /// Best available display name
    pub fn display_name(&self) -> &str {
        if !self.name.is_empty() {
            &self.name
        } else if !self.id.is_empty() {
            &self.id
        } else {
            &self.family
        }
    }

    /// Free/standard tier models get per-design requests for better quality
    pub fn is_standard_tier(&self) -> bool {
        self.vendor.eq_ignore_ascii_case("copilot")
    }

    fn id_or_family_contains(&self, needles: &[&str]) -> bool {
        let family = self.family.to_lowercase();
        let id = self.id.to_lowercase();
        needles.iter().any(|n| family.contains(n) || id.contains(n))
    }

    fn is_mini(&self) -> bool {
        self.id_or_family_contains(&["mini", "small"])
    }

    fn release_date(&self) -> Option<&str> {
        DATE_RE.find(&self.id).map(|m| m.as_str())
    }
}

/// Pick the most recent model from a candidate set
///
/// Models carrying a release date in their id compare by date; otherwise
/// the lexicographically larger id wins (later models sort higher).
fn most_recent<'a>(candidates: &[&'a ModelDescriptor]) -> Option<&'a ModelDescriptor> {
    candidates.iter().copied().max_by(|a, b| {
        match (a.release_date(), b.release_date()) {
            (Some(da), Some(db)) => da.cmp(db),
            _ => a.id.cmp(&b.id),
        }
    })
}

/// Select the preferred cheap model for the summarization step
///
/// Priority: the economical tier of the current flagship family, then a
/// same-vendor smaller sibling, then any mini/small model, then the first
/// model available. Returns `None` only for an empty catalog.
pub fn pick_summary_model(models: &[ModelDescriptor]) -> Option<&ModelDescriptor> {
    let gpt5_mini: Vec<&ModelDescriptor> = models
        .iter()
        .filter(|m| m.id_or_family_contains(&["gpt-5", "gpt5"]) && m.is_mini())
        .collect();
    if let Some(model) = most_recent(&gpt5_mini) {
        return Some(model);
    }

    let gpt4o_mini: Vec<&ModelDescriptor> = models
        .iter()
        .filter(|m| m.id_or_family_contains(&["gpt-4o"]) && m.is_mini())
        .collect();
    if let Some(model) = most_recent(&gpt4o_mini) {
        return Some(model);
    }

    let any_mini: Vec<&ModelDescriptor> = models.iter().filter(|m| m.is_mini()).collect();
    if let Some(model) = most_recent(&any_mini) {
        return Some(model);
    }

    models.first()
}

/// Collapse duplicate catalog entries sharing a display name
///
/// Keeps the most recent version of each; dated ids take priority over
/// undated ones. Input order is preserved for first occurrences.
pub fn dedupe_by_display_name(models: Vec<ModelDescriptor>) -> Vec<ModelDescriptor> {
    let mut result: Vec<ModelDescriptor> = Vec::with_capacity(models.len());
    for model in models {
        match result
            .iter_mut()
            .find(|kept| kept.display_name() == model.display_name())
        {
            Some(kept) => {
                let newer = match (model.release_date(), kept.release_date()) {
                    (Some(dm), Some(dk)) => dm > dk,
                    (Some(_), None) => true,
                    (None, Some(_)) => false,
                    (None, None) => model.id > kept.id,
                };
                if newer {
                    *kept = model;
                }
            }
            None => result.push(model),
        }
    }
    result
}
