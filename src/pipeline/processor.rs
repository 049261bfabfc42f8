//! Document processing orchestrator.
//!
//! Single entry point that drives the full template pipeline:
//! upload → extract text → structure → enrich → project calendar.
//!
//! Uses trait-based DI for the completion and drug-knowledge backends so
//! the orchestrator remains fully testable with mock implementations.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::PipelineSettings;
use crate::models::Regimen;
use crate::pipeline::calendar::{project_regimen, PhaseCalendar};
use crate::pipeline::enrichment::{EnrichmentEngine, EnrichmentReport, FdbClient, FdbCredentials};
use crate::pipeline::extraction::TextExtractionAdapter;
use crate::pipeline::structuring::{AnthropicClient, RegimenExtractor};

// ---------------------------------------------------------------------------
// States
// ---------------------------------------------------------------------------

/// Where a document is in the pipeline.
///
/// `Ready`, `ExtractionFailed`, and `ParseFailed` are terminal: `process`
/// never touches a document in one of them, only `reprocess` does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Uploaded,
    TextExtracted,
    Extracted,
    Enriched,
    Ready,
    ExtractionFailed,
    ParseFailed,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploaded => "uploaded",
            Self::TextExtracted => "text_extracted",
            Self::Extracted => "extracted",
            Self::Enriched => "enriched",
            Self::Ready => "ready",
            Self::ExtractionFailed => "extraction_failed",
            Self::ParseFailed => "parse_failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "uploaded" => Some(Self::Uploaded),
            "text_extracted" => Some(Self::TextExtracted),
            "extracted" => Some(Self::Extracted),
            "enriched" => Some(Self::Enriched),
            "ready" => Some(Self::Ready),
            "extraction_failed" => Some(Self::ExtractionFailed),
            "parse_failed" => Some(Self::ParseFailed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Ready | Self::ExtractionFailed | Self::ParseFailed
        )
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::ExtractionFailed | Self::ParseFailed)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One uploaded protocol document and everything derived from it.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentRecord {
    pub document_id: Uuid,
    pub name: String,
    pub state: PipelineState,
    pub uploaded_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub page_count: Option<usize>,
    pub extracted_text: Option<String>,
    pub regimen: Option<Regimen>,
    /// Verbatim model reply, kept on success and on parse failure alike.
    pub raw_model_reply: Option<String>,
    pub enrichment: Option<EnrichmentReport>,
    pub calendars: Vec<PhaseCalendar>,
    /// Message of the failing stage when the state is a failure.
    pub failure: Option<String>,
    #[serde(skip)]
    bytes: Vec<u8>,
}

impl DocumentRecord {
    fn new(name: &str, bytes: Vec<u8>) -> Self {
        Self {
            document_id: Uuid::new_v4(),
            name: name.to_string(),
            state: PipelineState::Uploaded,
            uploaded_at: Utc::now(),
            processed_at: None,
            page_count: None,
            extracted_text: None,
            regimen: None,
            raw_model_reply: None,
            enrichment: None,
            calendars: Vec::new(),
            failure: None,
            bytes,
        }
    }

    fn fail(&mut self, state: PipelineState, message: String) {
        self.state = state;
        self.failure = Some(message);
        self.processed_at = Some(Utc::now());
    }

    /// Drop everything derived from the bytes, returning to Uploaded.
    fn clear_derived(&mut self) {
        self.state = PipelineState::Uploaded;
        self.processed_at = None;
        self.page_count = None;
        self.extracted_text = None;
        self.regimen = None;
        self.raw_model_reply = None;
        self.enrichment = None;
        self.calendars = Vec::new();
        self.failure = None;
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Unknown document: {0}")]
    UnknownDocument(String),
}

/// Outcome of a `process_all` sweep.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub processed: u32,
    pub skipped: u32,
    pub ready: u32,
    pub failed: u32,
    /// "name: message" for each document that failed during this sweep.
    pub errors: Vec<String>,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Holds every uploaded document and drives each through the pipeline.
///
/// One failed document never affects another; a sweep over the whole set
/// always visits every non-terminal record.
pub struct TemplateAnalyzer {
    adapter: TextExtractionAdapter,
    extractor: RegimenExtractor,
    enricher: EnrichmentEngine,
    documents: HashMap<String, DocumentRecord>,
    order: Vec<String>,
}

impl TemplateAnalyzer {
    pub fn new(
        adapter: TextExtractionAdapter,
        extractor: RegimenExtractor,
        enricher: EnrichmentEngine,
    ) -> Self {
        Self {
            adapter,
            extractor,
            enricher,
            documents: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Assemble the production pipeline: PDF text extraction, the hosted
    /// completion model, and drug-knowledge lookups when credentials are
    /// given. Credentials stay inside the clients, in memory.
    pub fn from_settings(
        settings: &PipelineSettings,
        api_key: &str,
        fdb_credentials: Option<FdbCredentials>,
    ) -> Self {
        let completion = AnthropicClient::hosted(
            api_key,
            &settings.model,
            settings.max_tokens,
            settings.completion_timeout_secs,
        );
        let extractor =
            RegimenExtractor::new(Box::new(completion), settings.max_completion_attempts);

        let enricher = match fdb_credentials {
            Some(credentials) => EnrichmentEngine::new(Box::new(FdbClient::with_defaults(
                credentials,
                settings.fdb_timeout_secs,
            )))
            .with_workers(settings.enrichment_workers),
            None => EnrichmentEngine::unavailable(),
        };

        Self::new(TextExtractionAdapter::pdf(), extractor, enricher)
    }

    /// Register a document under its name. A name already present keeps
    /// its existing record and results; upload never re-runs anything.
    pub fn upload(&mut self, name: &str, bytes: Vec<u8>) -> &DocumentRecord {
        match self.documents.entry(name.to_string()) {
            Entry::Occupied(entry) => {
                tracing::debug!(document = name, "Already uploaded; keeping existing record");
                entry.into_mut()
            }
            Entry::Vacant(entry) => {
                tracing::info!(document = name, size = bytes.len(), "Document uploaded");
                self.order.push(name.to_string());
                entry.insert(DocumentRecord::new(name, bytes))
            }
        }
    }

    /// Drive one document to a terminal state. A document already in a
    /// terminal state is returned untouched.
    pub fn process(&mut self, name: &str) -> Result<&DocumentRecord, ProcessError> {
        let record = self
            .documents
            .get_mut(name)
            .ok_or_else(|| ProcessError::UnknownDocument(name.to_string()))?;

        if record.state.is_terminal() {
            tracing::debug!(document = name, state = %record.state, "Already terminal; skipping");
            return Ok(record);
        }

        Self::run_pipeline(record, &self.adapter, &self.extractor, &self.enricher);
        Ok(record)
    }

    /// Clear derived results and run the pipeline again from the stored
    /// bytes. This is the only way out of a terminal state.
    pub fn reprocess(&mut self, name: &str) -> Result<&DocumentRecord, ProcessError> {
        let record = self
            .documents
            .get_mut(name)
            .ok_or_else(|| ProcessError::UnknownDocument(name.to_string()))?;

        record.clear_derived();
        Self::run_pipeline(record, &self.adapter, &self.extractor, &self.enricher);
        Ok(record)
    }

    /// Process every non-terminal document in upload order. Failures are
    /// recorded per document and never stop the sweep.
    pub fn process_all(&mut self) -> RunSummary {
        let mut summary = RunSummary::default();

        for name in self.order.clone() {
            let Some(record) = self.documents.get_mut(&name) else {
                continue;
            };

            if record.state.is_terminal() {
                summary.skipped += 1;
                continue;
            }

            Self::run_pipeline(record, &self.adapter, &self.extractor, &self.enricher);
            summary.processed += 1;

            if record.state == PipelineState::Ready {
                summary.ready += 1;
            } else if record.state.is_failure() {
                summary.failed += 1;
                if let Some(message) = &record.failure {
                    summary.errors.push(format!("{name}: {message}"));
                }
            }
        }

        tracing::info!(
            processed = summary.processed,
            skipped = summary.skipped,
            ready = summary.ready,
            failed = summary.failed,
            "Processing sweep complete"
        );
        summary
    }

    /// Drop derived results, returning the document to Uploaded without
    /// running anything.
    pub fn reset(&mut self, name: &str) -> Result<&DocumentRecord, ProcessError> {
        let record = self
            .documents
            .get_mut(name)
            .ok_or_else(|| ProcessError::UnknownDocument(name.to_string()))?;

        record.clear_derived();
        Ok(record)
    }

    pub fn record(&self, name: &str) -> Option<&DocumentRecord> {
        self.documents.get(name)
    }

    /// All records in upload order.
    pub fn documents(&self) -> Vec<&DocumentRecord> {
        self.order
            .iter()
            .filter_map(|name| self.documents.get(name))
            .collect()
    }

    pub fn remove(&mut self, name: &str) -> Option<DocumentRecord> {
        self.order.retain(|n| n != name);
        self.documents.remove(name)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// The four pipeline stages for one record. Extraction and structuring
    /// failures park the record in the matching terminal state; enrichment
    /// cannot fail a document.
    fn run_pipeline(
        record: &mut DocumentRecord,
        adapter: &TextExtractionAdapter,
        extractor: &RegimenExtractor,
        enricher: &EnrichmentEngine,
    ) {
        let _span = tracing::info_span!(
            "process_document",
            document = %record.name,
            doc_id = %record.document_id
        )
        .entered();

        // Step 1: text extraction
        let extracted = match adapter.extract(&record.bytes) {
            Ok(extracted) => extracted,
            Err(e) => {
                tracing::warn!(error = %e, "Text extraction failed");
                record.fail(PipelineState::ExtractionFailed, e.to_string());
                return;
            }
        };
        record.page_count = Some(extracted.page_count);
        record.extracted_text = Some(extracted.text);
        record.state = PipelineState::TextExtracted;

        // Step 2: regimen structuring
        let text = record.extracted_text.as_deref().unwrap_or_default();
        let structured = match extractor.extract_regimen(&record.document_id, text) {
            Ok(structured) => structured,
            Err(e) => {
                tracing::warn!(error = %e, "Regimen structuring failed");
                record.raw_model_reply = e.raw_reply().map(str::to_string);
                record.fail(PipelineState::ParseFailed, e.to_string());
                return;
            }
        };
        record.state = PipelineState::Extracted;

        // Step 3: enrichment (never fails the document)
        let enrichment = enricher.enrich(&structured.regimen);
        record.state = PipelineState::Enriched;

        // Step 4: calendar projection
        let calendars = project_regimen(&structured.regimen);

        let phase_count = structured.regimen.phases.len();
        let drug_count = enrichment.len();
        let resolved = enrichment.resolved_count();

        record.regimen = Some(structured.regimen);
        record.raw_model_reply = Some(structured.raw_reply);
        record.enrichment = Some(enrichment);
        record.calendars = calendars;
        record.processed_at = Some(Utc::now());
        record.state = PipelineState::Ready;

        tracing::info!(
            phases = phase_count,
            drugs = drug_count,
            resolved = resolved,
            "Document ready"
        );
    }
}
