//! Typed chemotherapy regimen model.
//!
//! Mirrors the structure a protocol document describes: a regimen is a
//! sequence of phases, each phase carries one cycle template, and a cycle
//! maps 1-based day numbers to the medications given on that day.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════
// Regimen tree
// ═══════════════════════════════════════════

/// A complete chemotherapy regimen extracted from one protocol document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Regimen {
    /// Treatment phases in protocol order; never empty after validation.
    pub phases: Vec<Phase>,
}

/// One treatment phase (induction, consolidation, maintenance, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    /// Wire key the phase was parsed from ("phase1", "phase2", ...).
    pub name: String,
    pub template: TreatmentTemplate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreatmentTemplate {
    pub cycle: Cycle,
}

/// A repeating treatment cycle: length in days plus per-day schedules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cycle {
    pub duration_days: u32,
    /// Keyed by 1-based day number within `1..=duration_days`.
    /// Days without an entry are rest days.
    pub medications_by_day: BTreeMap<u32, DaySchedule>,
}

impl Cycle {
    pub fn schedule_for(&self, day: u32) -> Option<&DaySchedule> {
        self.medications_by_day.get(&day)
    }
}

/// Medications given on a single cycle day, grouped by role.
/// Group order is administration order: pretreatment first, then
/// chemotherapy, then targeted therapy. Order within a group is the
/// administration sequence from the document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DaySchedule {
    pub pretreatment: Vec<Medication>,
    pub chemotherapy: Vec<Medication>,
    pub targeted_therapy: Vec<Medication>,
}

impl DaySchedule {
    pub fn group(&self, group: MedicationGroup) -> &[Medication] {
        match group {
            MedicationGroup::Pretreatment => &self.pretreatment,
            MedicationGroup::Chemotherapy => &self.chemotherapy,
            MedicationGroup::TargetedTherapy => &self.targeted_therapy,
        }
    }

    /// All medications on this day in administration order.
    pub fn all_medications(&self) -> impl Iterator<Item = &Medication> {
        MedicationGroup::all()
            .iter()
            .flat_map(|group| self.group(*group).iter())
    }

    pub fn medication_count(&self) -> usize {
        self.pretreatment.len() + self.chemotherapy.len() + self.targeted_therapy.len()
    }

    pub fn is_empty(&self) -> bool {
        self.medication_count() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Medication {
    /// Stored trimmed with internal whitespace collapsed, case preserved.
    pub name: String,
    /// Free text when the document states one ("8mg", "75mg/m2").
    pub dose: Option<String>,
}

// ═══════════════════════════════════════════
// Medication groups
// ═══════════════════════════════════════════

/// The three per-day medication roles, in administration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MedicationGroup {
    Pretreatment,
    Chemotherapy,
    TargetedTherapy,
}

impl MedicationGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pretreatment => "pretreatment",
            Self::Chemotherapy => "chemotherapy",
            Self::TargetedTherapy => "targeted_therapy",
        }
    }

    pub fn all() -> &'static [MedicationGroup] {
        &[
            Self::Pretreatment,
            Self::Chemotherapy,
            Self::TargetedTherapy,
        ]
    }
}

impl std::fmt::Display for MedicationGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ═══════════════════════════════════════════
// Drug-name normalization
// ═══════════════════════════════════════════

/// Canonical enrichment key for a drug name: trimmed, internal whitespace
/// collapsed, lowercased. "  Docetaxel " and "docetaxel" share a key.
pub fn normalize_drug_name(name: &str) -> String {
    clean_medication_name(name).to_lowercase()
}

/// Stored display form: trimmed with internal whitespace collapsed,
/// case preserved.
pub fn clean_medication_name(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl Regimen {
    /// Distinct medications across the whole regimen as
    /// (normalized key, first-seen display name) pairs, in first-occurrence
    /// order: phases in order, days ascending, groups in administration
    /// order, list order within a group.
    pub fn distinct_medications(&self) -> Vec<(String, String)> {
        let mut seen = HashSet::new();
        let mut distinct = Vec::new();
        for phase in &self.phases {
            for schedule in phase.template.cycle.medications_by_day.values() {
                for med in schedule.all_medications() {
                    let key = normalize_drug_name(&med.name);
                    if seen.insert(key.clone()) {
                        distinct.push((key, med.name.clone()));
                    }
                }
            }
        }
        distinct
    }

    /// Total medication entries across all phases and days, duplicates
    /// included.
    pub fn medication_count(&self) -> usize {
        self.phases
            .iter()
            .flat_map(|p| p.template.cycle.medications_by_day.values())
            .map(DaySchedule::medication_count)
            .sum()
    }
}
