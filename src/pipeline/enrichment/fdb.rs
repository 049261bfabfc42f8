use std::collections::HashMap;

use serde::Deserialize;

use super::types::{DoseRecord, DrugRecord, InteractionWarning};
use super::EnrichmentCallError;

/// FDB Cloud Connector endpoint.
const FDB_BASE_URL: &str = "https://api.fdbcloudconnector.com/CC/api/v1_4";

/// Caller identifier sent with every request.
const CALL_SYSTEM_NAME: &str = "ChemoAnalyzer";

/// Seam for the drug-knowledge backend. The production implementation talks
/// to FDB Cloud Connector; tests substitute scripted records.
pub trait DrugKnowledgeClient {
    /// Best match for a drug name, or None when nothing matches.
    fn search_drug(&self, name: &str) -> Result<Option<DrugRecord>, EnrichmentCallError>;

    fn interactions(&self, drug_id: i64) -> Result<Vec<InteractionWarning>, EnrichmentCallError>;

    fn dose_records(&self, drug_id: i64) -> Result<Vec<DoseRecord>, EnrichmentCallError>;
}

/// API credentials, held in memory only. Nothing in this crate writes them
/// anywhere.
#[derive(Debug, Clone)]
pub struct FdbCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// FDB Cloud Connector client.
pub struct FdbClient {
    base_url: String,
    credentials: FdbCredentials,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl FdbClient {
    pub fn new(base_url: &str, credentials: FdbCredentials, timeout_secs: u64) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            client,
            timeout_secs,
        }
    }

    /// Hosted endpoint.
    pub fn with_defaults(credentials: FdbCredentials, timeout_secs: u64) -> Self {
        Self::new(FDB_BASE_URL, credentials, timeout_secs)
    }

    fn auth_header(&self) -> String {
        format!(
            "SHAREDKEY {}:{}",
            self.credentials.client_id, self.credentials.client_secret
        )
    }

    fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        extra_query: &[(&str, &str)],
    ) -> Result<T, EnrichmentCallError> {
        let url = format!("{}/{}", self.base_url, path);
        let call_id = call_id();

        let mut query: Vec<(&str, &str)> = vec![
            ("callSystemName", CALL_SYSTEM_NAME),
            ("callid", call_id.as_str()),
        ];
        query.extend_from_slice(extra_query);

        let response = self
            .client
            .get(&url)
            .query(&query)
            .header("Authorization", self.auth_header())
            .header("Accept", "application/json")
            .send()
            .map_err(|e| {
                if e.is_connect() {
                    EnrichmentCallError::Connection(self.base_url.clone())
                } else if e.is_timeout() {
                    EnrichmentCallError::Timeout(self.timeout_secs)
                } else {
                    EnrichmentCallError::Connection(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(EnrichmentCallError::Api {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .map_err(|e| EnrichmentCallError::Decode(e.to_string()))
    }
}

/// Per-request call id, a wall-clock timestamp down to the second.
fn call_id() -> String {
    chrono::Utc::now().format("%Y%m%d%H%M%S").to_string()
}

/// Response body for PrescribableDrugs search
#[derive(Deserialize)]
struct SearchResponse {
    #[serde(rename = "Items", default)]
    items: Vec<DrugRecord>,
}

/// Response body for PrescribableDrugs/{id}/Interactions
#[derive(Deserialize)]
struct InteractionsResponse {
    #[serde(rename = "Items", default)]
    items: Vec<InteractionWarning>,
}

/// Response body for PrescribableDrugs/{id}/DoseRecords
#[derive(Deserialize)]
struct DoseRecordsResponse {
    #[serde(rename = "DoseRecords", default)]
    dose_records: Vec<DoseRecord>,
}

impl DrugKnowledgeClient for FdbClient {
    fn search_drug(&self, name: &str) -> Result<Option<DrugRecord>, EnrichmentCallError> {
        let response: SearchResponse = self.get_json(
            "PrescribableDrugs",
            &[
                ("searchtext", name),
                ("searchtype", "contains"),
                ("limit", "1"),
            ],
        )?;
        Ok(response.items.into_iter().next())
    }

    fn interactions(&self, drug_id: i64) -> Result<Vec<InteractionWarning>, EnrichmentCallError> {
        let response: InteractionsResponse =
            self.get_json(&format!("PrescribableDrugs/{drug_id}/Interactions"), &[])?;
        Ok(response.items)
    }

    fn dose_records(&self, drug_id: i64) -> Result<Vec<DoseRecord>, EnrichmentCallError> {
        let response: DoseRecordsResponse =
            self.get_json(&format!("PrescribableDrugs/{drug_id}/DoseRecords"), &[])?;
        Ok(response.dose_records)
    }
}

/// Mock drug-knowledge client for testing, backed by in-memory maps.
/// Drug names match case-insensitively; unknown ids return empty lists.
#[derive(Default)]
pub struct MockDrugKnowledgeClient {
    drugs: HashMap<String, DrugRecord>,
    interactions: HashMap<i64, Vec<InteractionWarning>>,
    dose_records: HashMap<i64, Vec<DoseRecord>>,
}

impl MockDrugKnowledgeClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_drug(mut self, name: &str, record: DrugRecord) -> Self {
        self.drugs.insert(name.to_lowercase(), record);
        self
    }

    pub fn with_interactions(mut self, drug_id: i64, warnings: Vec<InteractionWarning>) -> Self {
        self.interactions.insert(drug_id, warnings);
        self
    }

    pub fn with_dose_records(mut self, drug_id: i64, records: Vec<DoseRecord>) -> Self {
        self.dose_records.insert(drug_id, records);
        self
    }
}

impl DrugKnowledgeClient for MockDrugKnowledgeClient {
    fn search_drug(&self, name: &str) -> Result<Option<DrugRecord>, EnrichmentCallError> {
        Ok(self.drugs.get(&name.to_lowercase()).cloned())
    }

    fn interactions(&self, drug_id: i64) -> Result<Vec<InteractionWarning>, EnrichmentCallError> {
        Ok(self.interactions.get(&drug_id).cloned().unwrap_or_default())
    }

    fn dose_records(&self, drug_id: i64) -> Result<Vec<DoseRecord>, EnrichmentCallError> {
        Ok(self.dose_records.get(&drug_id).cloned().unwrap_or_default())
    }
}
