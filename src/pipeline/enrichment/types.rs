use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::normalize_drug_name;

// ═══════════════════════════════════════════
// Drug-knowledge records (wire field names are PascalCase)
// ═══════════════════════════════════════════

/// One prescribable drug as returned by the knowledge service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrugRecord {
    #[serde(rename = "PrescribableDrugID")]
    pub prescribable_drug_id: i64,

    #[serde(rename = "DispensableGenericDesc", default)]
    pub dispensable_generic_desc: Option<String>,

    #[serde(rename = "RouteDesc", default)]
    pub route_desc: Option<String>,

    #[serde(rename = "DoseFormDesc", default)]
    pub dose_form_desc: Option<String>,
}

/// One drug-drug interaction warning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionWarning {
    #[serde(rename = "ScreenMessage", default)]
    pub screen_message: Option<String>,

    #[serde(rename = "Severity", default)]
    pub severity: Option<String>,
}

impl InteractionWarning {
    /// Single-line rendering with "N/A" for missing fields.
    pub fn summary(&self) -> String {
        format!(
            "{} (severity: {})",
            self.screen_message.as_deref().unwrap_or("N/A"),
            self.severity.as_deref().unwrap_or("N/A")
        )
    }
}

/// One dosing guideline entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoseRecord {
    #[serde(rename = "DoseDescription", default)]
    pub dose_description: Option<String>,
}

impl DoseRecord {
    pub fn summary(&self) -> &str {
        self.dose_description.as_deref().unwrap_or("N/A")
    }
}

// ═══════════════════════════════════════════
// Per-drug enrichment outcome
// ═══════════════════════════════════════════

/// The lookup stage a partial failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentStage {
    Search,
    Interactions,
    Dosing,
}

impl EnrichmentStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Interactions => "interactions",
            Self::Dosing => "dosing",
        }
    }
}

impl fmt::Display for EnrichmentStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How far enrichment got for one drug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EnrichmentStatus {
    /// Search, interactions, and dosing all answered.
    Resolved,
    /// The knowledge service knows no drug by this name.
    NoMatch,
    /// A stage failed; earlier stages' data is kept.
    PartialFailure { stage: EnrichmentStage },
    /// No credentials were configured, so no lookup ran.
    Unavailable,
}

impl EnrichmentStatus {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved)
    }
}

impl fmt::Display for EnrichmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolved => write!(f, "resolved"),
            Self::NoMatch => write!(f, "no_match"),
            Self::PartialFailure { stage } => write!(f, "partial_failure({stage})"),
            Self::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// Everything enrichment learned about one distinct drug.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentEntry {
    /// Normalized name the drug was deduplicated under.
    pub key: String,
    /// Name as it first appeared in the regimen.
    pub display_name: String,
    pub search_result: Option<DrugRecord>,
    pub interactions: Vec<InteractionWarning>,
    pub dose_records: Vec<DoseRecord>,
    pub status: EnrichmentStatus,
    /// Message of the failed call, when status is a partial failure.
    pub error: Option<String>,
}

impl EnrichmentEntry {
    pub(crate) fn new(key: &str, display_name: &str) -> Self {
        Self {
            key: key.to_string(),
            display_name: display_name.to_string(),
            search_result: None,
            interactions: Vec::new(),
            dose_records: Vec::new(),
            status: EnrichmentStatus::Unavailable,
            error: None,
        }
    }
}

/// Enrichment outcomes for every distinct drug in a regimen, in first
/// appearance order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentReport {
    entries: Vec<EnrichmentEntry>,
}

impl EnrichmentReport {
    pub(crate) fn from_entries(entries: Vec<EnrichmentEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[EnrichmentEntry] {
        &self.entries
    }

    /// Look up a drug by any spelling that normalizes to its key.
    pub fn get(&self, name: &str) -> Option<&EnrichmentEntry> {
        let key = normalize_drug_name(name);
        self.entries.iter().find(|e| e.key == key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn resolved_count(&self) -> usize {
        self.entries.iter().filter(|e| e.status.is_resolved()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.status, EnrichmentStatus::PartialFailure { .. }))
            .count()
    }
}
