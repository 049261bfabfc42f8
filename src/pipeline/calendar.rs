use serde::Serialize;

use crate::models::{Cycle, Medication, Regimen};

/// One calendar day inside a cycle. Days the template does not schedule
/// carry empty medication lists.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayEntry {
    pub day: u32,
    pub pretreatment: Vec<Medication>,
    pub chemotherapy: Vec<Medication>,
    pub targeted_therapy: Vec<Medication>,
}

impl DayEntry {
    pub fn is_rest_day(&self) -> bool {
        self.medication_count() == 0
    }

    pub fn medication_count(&self) -> usize {
        self.pretreatment.len() + self.chemotherapy.len() + self.targeted_therapy.len()
    }
}

/// Day-by-day calendar for one phase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseCalendar {
    pub phase: String,
    pub days: Vec<DayEntry>,
}

/// Expand a cycle into one entry per day, 1 through the cycle duration.
pub fn project_cycle(cycle: &Cycle) -> Vec<DayEntry> {
    (1..=cycle.duration_days)
        .map(|day| match cycle.schedule_for(day) {
            Some(schedule) => DayEntry {
                day,
                pretreatment: schedule.pretreatment.clone(),
                chemotherapy: schedule.chemotherapy.clone(),
                targeted_therapy: schedule.targeted_therapy.clone(),
            },
            None => DayEntry {
                day,
                pretreatment: Vec::new(),
                chemotherapy: Vec::new(),
                targeted_therapy: Vec::new(),
            },
        })
        .collect()
}

/// Expand every phase of a regimen, in phase order.
pub fn project_regimen(regimen: &Regimen) -> Vec<PhaseCalendar> {
    regimen
        .phases
        .iter()
        .map(|phase| PhaseCalendar {
            phase: phase.name.clone(),
            days: project_cycle(&phase.template.cycle),
        })
        .collect()
}
