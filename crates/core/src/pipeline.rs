//! Patient health data resolution pipeline.
//!
//! ```text
//! Start → IdentifierLookup → MetadataQuery → IdentifierExtraction
//!       → RetrievalRequestBuilt → DocumentRetrieval → Aggregation → Done
//! ```
//!
//! The pipeline runs linearly and synchronously; every stage either hands its output to the
//! next one or ends the run with a distinct [`HieError`]. Nothing is retried here.

use crate::aggregate::{AggregateResult, DocumentAggregator};
use crate::config::CoreConfig;
use crate::exchange::{
    DocumentClass, DocumentPublisher, ExchangeError, PatientIdentifierResolver, RegistryQuery,
    RepositoryRetrieve,
};
use crate::registry::{extract_document_identifiers, RegistryError};
use crate::render::{CdaJsonRenderer, DocumentRenderer};
use crate::retrieval::build_retrieval_request;
use crate::template::TemplateFilter;
use crate::{HieError, HieResult};
use std::sync::Arc;
use xds_types::Oid;

/// Stages of a resolution run, used for logging.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineStage {
    IdentifierLookup,
    MetadataQuery,
    IdentifierExtraction,
    RetrievalRequestBuilt,
    DocumentRetrieval,
    Aggregation,
    Done,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PipelineStage::IdentifierLookup => "identifier_lookup",
            PipelineStage::MetadataQuery => "metadata_query",
            PipelineStage::IdentifierExtraction => "identifier_extraction",
            PipelineStage::RetrievalRequestBuilt => "retrieval_request_built",
            PipelineStage::DocumentRetrieval => "document_retrieval",
            PipelineStage::Aggregation => "aggregation",
            PipelineStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Exchange collaborators used by [`HealthInformationService`].
#[derive(Clone)]
pub struct Collaborators {
    pub resolver: Arc<dyn PatientIdentifierResolver>,
    pub registry: Arc<dyn RegistryQuery>,
    pub repository: Arc<dyn RepositoryRetrieve>,
    pub publisher: Arc<dyn DocumentPublisher>,
    pub renderer: Arc<dyn DocumentRenderer>,
}

impl Collaborators {
    /// Use one exchange for every role, rendering with [`CdaJsonRenderer`].
    pub fn from_exchange<E>(exchange: Arc<E>) -> Self
    where
        E: PatientIdentifierResolver
            + RegistryQuery
            + RepositoryRetrieve
            + DocumentPublisher
            + 'static,
    {
        Self {
            resolver: exchange.clone(),
            registry: exchange.clone(),
            repository: exchange.clone(),
            publisher: exchange,
            renderer: Arc::new(CdaJsonRenderer),
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn DocumentRenderer>) -> Self {
        self.renderer = renderer;
        self
    }
}

/// Retrieves and publishes patient clinical documents through the exchange.
#[derive(Clone)]
pub struct HealthInformationService {
    cfg: Arc<CoreConfig>,
    collaborators: Collaborators,
    aggregator: DocumentAggregator,
}

impl HealthInformationService {
    /// # Errors
    ///
    /// Returns `HieError::PathEvaluationFailed` if the template filter cannot be compiled.
    pub fn new(cfg: Arc<CoreConfig>, collaborators: Collaborators) -> HieResult<Self> {
        let filter = TemplateFilter::for_template_root(cfg.template_root().as_str())?;
        let aggregator = DocumentAggregator::new(filter, collaborators.renderer.clone());
        Ok(Self {
            cfg,
            collaborators,
            aggregator,
        })
    }

    /// Fetch every document the exchange holds for a patient and aggregate the ones matching
    /// the configured template.
    ///
    /// # Arguments
    ///
    /// * `patient_id` - The patient's MRN.
    ///
    /// # Errors
    ///
    /// Returns, by stage:
    /// - `PatientNotFound` / `IdentifierResolutionFailed` from identifier lookup,
    /// - `RegistryQueryFailed` / `RegistryUnavailable` from the registry query,
    /// - `NoCandidateDocuments` if the registry returned nothing,
    /// - `NoMatchingEntries` if no entry yielded a document unique id,
    /// - `RetrievalFailed` / `NoDocumentsReturned` from the repository,
    /// - `DocumentParseFailed` / `TransformFailed` from aggregation,
    /// - `NoMatchingDocuments` if no retrieved document matched the template.
    pub fn get_patient_health_data(&self, patient_id: &str) -> HieResult<AggregateResult> {
        if patient_id.trim().is_empty() {
            return Err(HieError::InvalidInput("patient_id cannot be empty".into()));
        }

        tracing::info!(stage = %PipelineStage::IdentifierLookup, "fetching patient identifier system");
        let identifier = self
            .collaborators
            .resolver
            .resolve(patient_id)
            .map_err(|e| match e {
                ExchangeError::NotFound(_) => {
                    tracing::error!("identifier resolver found no patient for {}", patient_id);
                    HieError::PatientNotFound(patient_id.to_owned())
                }
                other => {
                    tracing::error!("identifier resolver failed: {}", other);
                    HieError::IdentifierResolutionFailed(other.to_string())
                }
            })?;
        let formatted_patient_id = format_patient_id(patient_id, &identifier.oid)?;

        tracing::info!(stage = %PipelineStage::MetadataQuery, "calling document registry");
        let response = self
            .collaborators
            .registry
            .query(&formatted_patient_id, DocumentClass::ClinicalDocument)
            .map_err(|e| HieError::RegistryUnavailable(e.to_string()))?;

        if !response.errors.is_empty() {
            log_registry_errors(&response.errors);
            return Err(HieError::RegistryQueryFailed {
                errors: response.errors,
            });
        }

        if response.entries.is_empty() {
            tracing::info!("no documents found for the given patient id");
            return Err(HieError::NoCandidateDocuments);
        }

        tracing::info!(stage = %PipelineStage::IdentifierExtraction, entries = response.entries.len(), "registry returned entries");
        let documents = extract_document_identifiers(response.entries);
        if documents.is_empty() {
            tracing::info!("no XDSDocumentEntry documents found for the given patient id");
            return Err(HieError::NoMatchingEntries);
        }

        let request = build_retrieval_request(self.cfg.repository_unique_id(), documents);
        tracing::info!(stage = %PipelineStage::RetrievalRequestBuilt, documents = request.len(), "built retrieve document set request");

        tracing::info!(stage = %PipelineStage::DocumentRetrieval, "calling document repository");
        let retrieved = self
            .collaborators
            .repository
            .retrieve(request)
            .map_err(|e| {
                tracing::error!("retrieve document set failed: {}", e);
                HieError::RetrievalFailed(e.to_string())
            })?;

        if retrieved.is_empty() {
            tracing::info!("retrieve document set found no documents for the given patient id");
            return Err(HieError::NoDocumentsReturned);
        }

        tracing::info!(stage = %PipelineStage::Aggregation, documents = retrieved.len(), "converting retrieved documents");
        let aggregate = self.aggregator.aggregate(retrieved)?;
        if aggregate.is_empty() {
            return Err(HieError::NoMatchingDocuments);
        }

        tracing::info!(stage = %PipelineStage::Done, documents = aggregate.len(), "patient health data resolved");
        Ok(aggregate)
    }

    /// Publish a clinical document to the exchange under the configured home community.
    ///
    /// # Errors
    ///
    /// Returns `HieError::PublishFailed` if the document is empty or not UTF-8, or the
    /// publisher rejects it.
    pub fn publish_patient_health_data(&self, document: &[u8]) -> HieResult<()> {
        if document.is_empty() {
            return Err(HieError::PublishFailed("document is empty".into()));
        }
        let document = std::str::from_utf8(document)
            .map_err(|e| HieError::PublishFailed(format!("document is not UTF-8: {e}")))?;

        tracing::info!("calling document repository to publish");
        self.collaborators
            .publisher
            .publish(
                document,
                self.cfg.home_community_id().as_str(),
                DocumentClass::ClinicalDocument,
            )
            .map_err(|e| {
                tracing::error!("publish failed: {}", e);
                HieError::PublishFailed(e.to_string())
            })?;

        tracing::info!("successfully published the document to the exchange");
        Ok(())
    }
}

/// Format an MRN as an HL7 CX patient identifier: `{patient_id}^^^&{oid}&ISO`.
///
/// Any `urn:oid:` prefix on the assigning authority is removed.
///
/// # Errors
///
/// Returns `HieError::IdentifierResolutionFailed` if `oid` is not a valid OID.
pub fn format_patient_id(patient_id: &str, oid: &str) -> HieResult<String> {
    let oid = Oid::parse(oid).map_err(|e| {
        HieError::IdentifierResolutionFailed(format!("identifier system has {e}"))
    })?;
    Ok(format!("{patient_id}^^^&{oid}&ISO"))
}

fn log_registry_errors(errors: &[RegistryError]) {
    tracing::error!("call to document registry returned an error");
    for error in errors {
        tracing::error!(
            error_code = error.error_code.as_deref().unwrap_or_default(),
            code_context = error.code_context.as_deref().unwrap_or_default(),
            location = error.location.as_deref().unwrap_or_default(),
            severity = error.severity.as_deref().unwrap_or_default(),
            value = error.value.as_deref().unwrap_or_default(),
            "registry error"
        );
    }
}
