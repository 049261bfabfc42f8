use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;

use crate::models::Regimen;

use super::fdb::DrugKnowledgeClient;
use super::types::{EnrichmentEntry, EnrichmentReport, EnrichmentStage, EnrichmentStatus};

/// Looks up each distinct drug in a regimen against the knowledge service.
///
/// A drug is looked up once no matter how many days repeat it. A failed
/// lookup marks that drug's entry and moves on; enrichment never fails the
/// document it belongs to.
pub struct EnrichmentEngine {
    client: Option<Box<dyn DrugKnowledgeClient + Send + Sync>>,
    workers: usize,
}

impl EnrichmentEngine {
    pub fn new(client: Box<dyn DrugKnowledgeClient + Send + Sync>) -> Self {
        Self {
            client: Some(client),
            workers: 1,
        }
    }

    /// Engine without credentials: every drug comes back Unavailable.
    pub fn unavailable() -> Self {
        Self {
            client: None,
            workers: 1,
        }
    }

    /// Fan lookups over up to `workers` threads. One worker keeps the
    /// engine strictly sequential.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn enrich(&self, regimen: &Regimen) -> EnrichmentReport {
        let distinct = regimen.distinct_medications();

        let Some(client) = self.client.as_deref() else {
            tracing::warn!(
                drugs = distinct.len(),
                "No drug-knowledge credentials; skipping enrichment"
            );
            let entries = distinct
                .iter()
                .map(|(key, name)| EnrichmentEntry::new(key, name))
                .collect();
            return EnrichmentReport::from_entries(entries);
        };

        let entries = if self.workers > 1 && distinct.len() > 1 {
            enrich_parallel(client, &distinct, self.workers)
        } else {
            distinct
                .iter()
                .map(|(key, name)| enrich_one(client, key, name))
                .collect()
        };

        EnrichmentReport::from_entries(entries)
    }
}

/// Run the three lookup stages for one drug. Stops at the first failing
/// stage, keeping whatever the earlier stages returned.
fn enrich_one(client: &dyn DrugKnowledgeClient, key: &str, display_name: &str) -> EnrichmentEntry {
    let mut entry = EnrichmentEntry::new(key, display_name);

    let record = match client.search_drug(display_name) {
        Ok(Some(record)) => record,
        Ok(None) => {
            tracing::info!(drug = display_name, "No match in drug knowledge base");
            entry.status = EnrichmentStatus::NoMatch;
            return entry;
        }
        Err(e) => {
            tracing::warn!(
                drug = display_name,
                stage = %EnrichmentStage::Search,
                error = %e,
                "Drug lookup failed"
            );
            entry.status = EnrichmentStatus::PartialFailure {
                stage: EnrichmentStage::Search,
            };
            entry.error = Some(e.to_string());
            return entry;
        }
    };

    let drug_id = record.prescribable_drug_id;
    entry.search_result = Some(record);

    match client.interactions(drug_id) {
        Ok(warnings) => entry.interactions = warnings,
        Err(e) => {
            tracing::warn!(
                drug = display_name,
                stage = %EnrichmentStage::Interactions,
                error = %e,
                "Drug lookup failed"
            );
            entry.status = EnrichmentStatus::PartialFailure {
                stage: EnrichmentStage::Interactions,
            };
            entry.error = Some(e.to_string());
            return entry;
        }
    }

    match client.dose_records(drug_id) {
        Ok(records) => entry.dose_records = records,
        Err(e) => {
            tracing::warn!(
                drug = display_name,
                stage = %EnrichmentStage::Dosing,
                error = %e,
                "Drug lookup failed"
            );
            entry.status = EnrichmentStatus::PartialFailure {
                stage: EnrichmentStage::Dosing,
            };
            entry.error = Some(e.to_string());
            return entry;
        }
    }

    entry.status = EnrichmentStatus::Resolved;
    entry
}

/// Fan the drug list over a small thread pool. Entry order matches the
/// input order regardless of which worker finished first.
fn enrich_parallel(
    client: &(dyn DrugKnowledgeClient + Send + Sync),
    distinct: &[(String, String)],
    workers: usize,
) -> Vec<EnrichmentEntry> {
    let worker_count = workers.min(distinct.len());
    let next = AtomicUsize::new(0);
    let (tx, rx) = mpsc::channel::<(usize, EnrichmentEntry)>();

    std::thread::scope(|scope| {
        for _ in 0..worker_count {
            let tx = tx.clone();
            let next = &next;
            scope.spawn(move || loop {
                let i = next.fetch_add(1, Ordering::SeqCst);
                let Some((key, name)) = distinct.get(i) else {
                    break;
                };
                if tx.send((i, enrich_one(client, key, name))).is_err() {
                    break;
                }
            });
        }
    });
    drop(tx);

    let mut slots: Vec<Option<EnrichmentEntry>> = vec![None; distinct.len()];
    for (i, entry) in rx {
        slots[i] = Some(entry);
    }
    slots.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Cycle, DaySchedule, Medication, Phase, TreatmentTemplate};
    use crate::pipeline::enrichment::{
        DoseRecord, DrugRecord, EnrichmentCallError, InteractionWarning, MockDrugKnowledgeClient,
    };
    use std::collections::{BTreeMap, HashMap, HashSet};
    use std::sync::atomic::Ordering;
    use std::sync::{Arc, Mutex};

    const SIX_DRUGS: [&str; 6] = [
        "Docetaxel",
        "Cisplatin",
        "Carboplatin",
        "Paclitaxel",
        "Trastuzumab",
        "Ondansetron",
    ];

    fn record(id: i64) -> DrugRecord {
        DrugRecord {
            prescribable_drug_id: id,
            dispensable_generic_desc: Some(format!("drug {id}")),
            route_desc: Some("intravenous".into()),
            dose_form_desc: None,
        }
    }

    fn warning(message: &str) -> InteractionWarning {
        InteractionWarning {
            screen_message: Some(message.into()),
            severity: Some("2".into()),
        }
    }

    fn dose(description: &str) -> DoseRecord {
        DoseRecord {
            dose_description: Some(description.into()),
        }
    }

    fn phase(name: &str, days: &[(u32, &[&str])]) -> Phase {
        let mut medications_by_day = BTreeMap::new();
        for (day, names) in days {
            let mut schedule = DaySchedule::default();
            for drug in *names {
                schedule.chemotherapy.push(Medication {
                    name: (*drug).to_string(),
                    dose: None,
                });
            }
            medications_by_day.insert(*day, schedule);
        }
        Phase {
            name: name.to_string(),
            template: TreatmentTemplate {
                cycle: Cycle {
                    duration_days: 21,
                    medications_by_day,
                },
            },
        }
    }

    fn regimen_with(names: &[&str]) -> Regimen {
        Regimen {
            phases: vec![phase("phase1", &[(1, names)])],
        }
    }

    /// Scripted knowledge client with per-name and per-id failure switches.
    #[derive(Default)]
    struct ScriptedClient {
        drugs: HashMap<String, DrugRecord>,
        interactions: HashMap<i64, Vec<InteractionWarning>>,
        dose_records: HashMap<i64, Vec<DoseRecord>>,
        fail_search: HashSet<String>,
        fail_interactions: HashSet<i64>,
        fail_dosing: HashSet<i64>,
        search_log: Arc<Mutex<Vec<String>>>,
        interaction_calls: Arc<AtomicUsize>,
    }

    impl DrugKnowledgeClient for ScriptedClient {
        fn search_drug(&self, name: &str) -> Result<Option<DrugRecord>, EnrichmentCallError> {
            self.search_log.lock().unwrap().push(name.to_string());
            if self.fail_search.contains(&name.to_lowercase()) {
                return Err(EnrichmentCallError::Connection("service down".into()));
            }
            Ok(self.drugs.get(&name.to_lowercase()).cloned())
        }

        fn interactions(
            &self,
            drug_id: i64,
        ) -> Result<Vec<InteractionWarning>, EnrichmentCallError> {
            self.interaction_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_interactions.contains(&drug_id) {
                return Err(EnrichmentCallError::Api {
                    status: 500,
                    body: "server error".into(),
                });
            }
            Ok(self.interactions.get(&drug_id).cloned().unwrap_or_default())
        }

        fn dose_records(&self, drug_id: i64) -> Result<Vec<DoseRecord>, EnrichmentCallError> {
            if self.fail_dosing.contains(&drug_id) {
                return Err(EnrichmentCallError::Timeout(30));
            }
            Ok(self.dose_records.get(&drug_id).cloned().unwrap_or_default())
        }
    }

    #[test]
    fn resolves_drug_through_all_stages() {
        let mock = MockDrugKnowledgeClient::new()
            .with_drug("docetaxel", record(11))
            .with_interactions(11, vec![warning("Avoid strong CYP3A4 inhibitors")])
            .with_dose_records(11, vec![dose("75 mg/m2 IV every 3 weeks")]);
        let engine = EnrichmentEngine::new(Box::new(mock));

        let report = engine.enrich(&regimen_with(&["Docetaxel"]));

        assert_eq!(report.len(), 1);
        let entry = report.get("docetaxel").unwrap();
        assert!(entry.status.is_resolved());
        assert_eq!(entry.display_name, "Docetaxel");
        assert_eq!(entry.search_result.as_ref().unwrap().prescribable_drug_id, 11);
        assert_eq!(entry.interactions.len(), 1);
        assert_eq!(entry.dose_records.len(), 1);
        assert!(entry.error.is_none());
    }

    #[test]
    fn unknown_drug_is_recorded_as_no_match() {
        let engine = EnrichmentEngine::new(Box::new(MockDrugKnowledgeClient::new()));

        let report = engine.enrich(&regimen_with(&["Docetaxel"]));

        let entry = report.get("Docetaxel").unwrap();
        assert_eq!(entry.status, EnrichmentStatus::NoMatch);
        assert!(entry.search_result.is_none());
        assert!(entry.error.is_none());
    }

    #[test]
    fn missing_credentials_mark_all_unavailable() {
        let engine = EnrichmentEngine::unavailable();

        let report = engine.enrich(&regimen_with(&["Docetaxel", "Cisplatin"]));

        assert_eq!(report.len(), 2);
        assert!(report
            .entries()
            .iter()
            .all(|e| e.status == EnrichmentStatus::Unavailable));
        assert_eq!(report.entries()[0].display_name, "Docetaxel");
        assert_eq!(report.entries()[1].display_name, "Cisplatin");
    }

    #[test]
    fn deduplicates_repeated_names_across_phases() {
        let client = ScriptedClient {
            drugs: HashMap::from([
                ("docetaxel".to_string(), record(1)),
                ("cisplatin".to_string(), record(2)),
            ]),
            ..Default::default()
        };
        let log = Arc::clone(&client.search_log);
        let engine = EnrichmentEngine::new(Box::new(client));

        let regimen = Regimen {
            phases: vec![
                phase(
                    "phase1",
                    &[
                        (1, &["Docetaxel", "Cisplatin"][..]),
                        (8, &["Docetaxel"][..]),
                    ],
                ),
                phase("phase2", &[(1, &["DOCETAXEL"][..])]),
            ],
        };
        let report = engine.enrich(&regimen);

        assert_eq!(report.len(), 2);
        assert_eq!(report.entries()[0].display_name, "Docetaxel");
        assert_eq!(
            *log.lock().unwrap(),
            vec!["Docetaxel".to_string(), "Cisplatin".to_string()]
        );
    }

    #[test]
    fn interaction_failure_does_not_affect_other_drugs() {
        let client = ScriptedClient {
            drugs: HashMap::from([
                ("docetaxel".to_string(), record(1)),
                ("cisplatin".to_string(), record(2)),
            ]),
            interactions: HashMap::from([(2, vec![warning("Check renal function")])]),
            dose_records: HashMap::from([
                (1, vec![dose("75 mg/m2")]),
                (2, vec![dose("50 mg/m2")]),
            ]),
            fail_interactions: HashSet::from([1]),
            ..Default::default()
        };
        let engine = EnrichmentEngine::new(Box::new(client));

        let report = engine.enrich(&regimen_with(&["Docetaxel", "Cisplatin"]));

        let failed = report.get("docetaxel").unwrap();
        assert_eq!(
            failed.status,
            EnrichmentStatus::PartialFailure {
                stage: EnrichmentStage::Interactions
            }
        );
        assert!(failed.search_result.is_some());
        assert!(failed.error.is_some());

        let ok = report.get("cisplatin").unwrap();
        assert!(ok.status.is_resolved());
        assert_eq!(ok.interactions.len(), 1);
        assert_eq!(ok.dose_records.len(), 1);
    }

    #[test]
    fn dosing_failure_keeps_earlier_stages() {
        let client = ScriptedClient {
            drugs: HashMap::from([("docetaxel".to_string(), record(1))]),
            interactions: HashMap::from([(1, vec![warning("Watch for neutropenia")])]),
            fail_dosing: HashSet::from([1]),
            ..Default::default()
        };
        let engine = EnrichmentEngine::new(Box::new(client));

        let report = engine.enrich(&regimen_with(&["Docetaxel"]));

        let entry = report.get("docetaxel").unwrap();
        assert_eq!(
            entry.status,
            EnrichmentStatus::PartialFailure {
                stage: EnrichmentStage::Dosing
            }
        );
        assert!(entry.search_result.is_some());
        assert_eq!(entry.interactions.len(), 1);
        assert!(entry.dose_records.is_empty());
    }

    #[test]
    fn search_failure_stops_the_chain() {
        let client = ScriptedClient {
            drugs: HashMap::from([("docetaxel".to_string(), record(1))]),
            fail_search: HashSet::from(["docetaxel".to_string()]),
            ..Default::default()
        };
        let calls = Arc::clone(&client.interaction_calls);
        let engine = EnrichmentEngine::new(Box::new(client));

        let report = engine.enrich(&regimen_with(&["Docetaxel"]));

        let entry = report.get("docetaxel").unwrap();
        assert_eq!(
            entry.status,
            EnrichmentStatus::PartialFailure {
                stage: EnrichmentStage::Search
            }
        );
        assert!(entry.search_result.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn entries_follow_first_appearance_order() {
        let engine = EnrichmentEngine::new(Box::new(MockDrugKnowledgeClient::new()));

        let report = engine.enrich(&regimen_with(&[
            "Paclitaxel",
            "Carboplatin",
            "Pembrolizumab",
        ]));

        let keys: Vec<&str> = report.entries().iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["paclitaxel", "carboplatin", "pembrolizumab"]);
    }

    #[test]
    fn parallel_enrichment_matches_sequential() {
        fn six_drug_client() -> ScriptedClient {
            let mut drugs = HashMap::new();
            let mut interactions = HashMap::new();
            let mut dose_records = HashMap::new();
            for (i, name) in SIX_DRUGS.iter().enumerate() {
                let id = i as i64 + 1;
                drugs.insert(name.to_lowercase(), record(id));
                interactions.insert(id, vec![warning("warning")]);
                dose_records.insert(id, vec![dose("dose")]);
            }
            ScriptedClient {
                drugs,
                interactions,
                dose_records,
                ..Default::default()
            }
        }

        let regimen = regimen_with(&SIX_DRUGS);
        let sequential = EnrichmentEngine::new(Box::new(six_drug_client())).enrich(&regimen);
        let parallel = EnrichmentEngine::new(Box::new(six_drug_client()))
            .with_workers(4)
            .enrich(&regimen);

        assert_eq!(parallel, sequential);
        assert_eq!(parallel.resolved_count(), 6);
    }

    #[test]
    fn empty_regimen_produces_empty_report() {
        let engine = EnrichmentEngine::new(Box::new(MockDrugKnowledgeClient::new()));
        let report = engine.enrich(&Regimen { phases: vec![] });
        assert!(report.is_empty());
        assert_eq!(report.resolved_count(), 0);
    }
}
