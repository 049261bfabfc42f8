use std::collections::BTreeMap;

use serde::Deserialize;

use crate::models::{
    clean_medication_name, Cycle, DaySchedule, Medication, MedicationGroup, Phase, Regimen,
    TreatmentTemplate,
};

use super::StructuringError;

/// Cycle length assumed when a phase does not state one.
pub const DEFAULT_CYCLE_DAYS: u32 = 28;

/// Parse a model reply into a typed regimen.
///
/// The reply must be a single JSON object keyed by `phaseN`, optionally
/// wrapped in a ```json fence. Anything else is rejected; there is no
/// repair pass, a malformed reply fails so the caller can retry or surface
/// the raw text.
pub fn parse_regimen_reply(reply: &str) -> Result<Regimen, StructuringError> {
    let json_str = extract_json(reply);

    let value: serde_json::Value =
        serde_json::from_str(json_str).map_err(|e| StructuringError::Json {
            message: e.to_string(),
            raw: reply.to_string(),
        })?;

    build_regimen(value).map_err(|message| StructuringError::Schema {
        message,
        raw: reply.to_string(),
    })
}

/// Strip an optional ```json fence. Replies without a properly closed
/// fence are taken verbatim.
fn extract_json(reply: &str) -> &str {
    if let Some(start) = reply.find("```json") {
        let body = &reply[start + 7..];
        if let Some(end) = body.find("```") {
            return body[..end].trim();
        }
    }
    reply.trim()
}

// ═══════════════════════════════════════════
// Wire shapes
// ═══════════════════════════════════════════

#[derive(Deserialize)]
struct WirePhase {
    #[serde(rename = "treatmentTemplate")]
    treatment_template: WireTemplate,
}

#[derive(Deserialize)]
struct WireTemplate {
    cycle: WireCycle,
}

#[derive(Deserialize)]
struct WireCycle {
    duration: Option<WireDuration>,
    #[serde(default)]
    medications: BTreeMap<String, WireDaySchedule>,
}

#[derive(Deserialize)]
struct WireDuration {
    #[serde(rename = "numberOfDays")]
    number_of_days: Option<i64>,
}

#[derive(Deserialize)]
struct WireDaySchedule {
    #[serde(default, rename = "pretreatmentMedications")]
    pretreatment_medications: Vec<WireMedication>,
    #[serde(default)]
    chemotherapy: Vec<WireMedication>,
    #[serde(default, rename = "targetedTherapy")]
    targeted_therapy: Vec<WireMedication>,
}

#[derive(Deserialize)]
struct WireMedication {
    name: String,
    dose: Option<String>,
}

// ═══════════════════════════════════════════
// Validation
// ═══════════════════════════════════════════

fn build_regimen(value: serde_json::Value) -> Result<Regimen, String> {
    let wire_phases: BTreeMap<String, WirePhase> =
        serde_json::from_value(value).map_err(|e| e.to_string())?;

    if wire_phases.is_empty() {
        return Err("no phases present".into());
    }

    let mut indexed: Vec<(u32, String, WirePhase)> = Vec::with_capacity(wire_phases.len());
    for (key, wire) in wire_phases {
        let n = parse_indexed_key(&key, "phase")
            .ok_or_else(|| format!("\"{key}\" is not a valid phase key"))?;
        indexed.push((n, key, wire));
    }
    // Numeric order, not the lexicographic order phase10 would sort into.
    indexed.sort_by_key(|(n, _, _)| *n);
    for pair in indexed.windows(2) {
        if pair[0].0 == pair[1].0 {
            return Err(format!("phase {} appears more than once", pair[0].0));
        }
    }

    let mut phases = Vec::with_capacity(indexed.len());
    for (_, name, wire) in indexed {
        let cycle = build_cycle(&name, wire.treatment_template.cycle)?;
        phases.push(Phase {
            name,
            template: TreatmentTemplate { cycle },
        });
    }

    Ok(Regimen { phases })
}

fn build_cycle(phase_name: &str, wire: WireCycle) -> Result<Cycle, String> {
    let duration_days = match wire.duration.and_then(|d| d.number_of_days) {
        None => DEFAULT_CYCLE_DAYS,
        Some(n) if n >= 1 => u32::try_from(n)
            .map_err(|_| format!("{phase_name}: cycle duration {n} is out of range"))?,
        Some(n) => {
            return Err(format!(
                "{phase_name}: cycle duration must be positive, got {n}"
            ))
        }
    };

    let mut medications_by_day = BTreeMap::new();
    for (key, wire_day) in wire.medications {
        let day = parse_indexed_key(&key, "day")
            .ok_or_else(|| format!("{phase_name}: \"{key}\" is not a valid day key"))?;
        if day > duration_days {
            return Err(format!(
                "{phase_name}: day {day} is outside the {duration_days}-day cycle"
            ));
        }
        let schedule = build_day_schedule(phase_name, day, wire_day)?;
        if medications_by_day.insert(day, schedule).is_some() {
            return Err(format!("{phase_name}: day {day} appears more than once"));
        }
    }

    Ok(Cycle {
        duration_days,
        medications_by_day,
    })
}

fn build_day_schedule(
    phase_name: &str,
    day: u32,
    wire: WireDaySchedule,
) -> Result<DaySchedule, String> {
    Ok(DaySchedule {
        pretreatment: build_medications(
            phase_name,
            day,
            MedicationGroup::Pretreatment,
            wire.pretreatment_medications,
        )?,
        chemotherapy: build_medications(
            phase_name,
            day,
            MedicationGroup::Chemotherapy,
            wire.chemotherapy,
        )?,
        targeted_therapy: build_medications(
            phase_name,
            day,
            MedicationGroup::TargetedTherapy,
            wire.targeted_therapy,
        )?,
    })
}

fn build_medications(
    phase_name: &str,
    day: u32,
    group: MedicationGroup,
    wire: Vec<WireMedication>,
) -> Result<Vec<Medication>, String> {
    wire.into_iter()
        .map(|m| {
            let name = clean_medication_name(&m.name);
            if name.is_empty() {
                return Err(format!(
                    "{phase_name}/day{day}/{group}: medication name is empty"
                ));
            }
            let dose = m
                .dose
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty());
            Ok(Medication { name, dose })
        })
        .collect()
}

/// Parse keys of the form `<prefix><N>` where N is a positive integer
/// written in ASCII digits. Returns None for anything else.
fn parse_indexed_key(key: &str, prefix: &str) -> Option<u32> {
    let digits = key.strip_prefix(prefix)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let n: u32 = digits.parse().ok()?;
    if n == 0 {
        return None;
    }
    Some(n)
}
