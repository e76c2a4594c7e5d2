//! Collaborator seams to the health information exchange.
//!
//! The pipeline never talks to a wire protocol directly. Identifier lookup, registry
//! queries, repository retrieval and publication are each a trait so that transports can be
//! swapped (and faked in tests). Implementations own their own timeout and retry policy;
//! whatever they report is treated as a terminal outcome.

use crate::registry::QueryResponse;
use crate::retrieval::{RetrievalRequest, RetrievedDocument};
use serde::{Deserialize, Serialize};

/// Failures reported by exchange collaborators.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("communication error: {0}")]
    Communication(String),
    #[error("marshalling error: {0}")]
    Marshalling(String),
}

/// Document class used for registry queries and publication.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentClass {
    ClinicalDocument,
}

impl DocumentClass {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentClass::ClinicalDocument => "clinical_document",
        }
    }
}

impl std::fmt::Display for DocumentClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The identifier system a patient's MRN belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierSystem {
    pub value: String,
    /// OID of the assigning authority, optionally in `urn:oid:` form.
    pub oid: String,
}

pub trait PatientIdentifierResolver: Send + Sync {
    /// Look up the identifier system of a patient MRN.
    ///
    /// Returns `ExchangeError::NotFound` when the patient is unknown.
    fn resolve(&self, patient_id: &str) -> Result<IdentifierSystem, ExchangeError>;
}

pub trait RegistryQuery: Send + Sync {
    /// Run a stored query for a patient id formatted as an HL7 CX (`id^^^&oid&ISO`).
    fn query(
        &self,
        patient_id: &str,
        document_class: DocumentClass,
    ) -> Result<QueryResponse, ExchangeError>;
}

pub trait RepositoryRetrieve: Send + Sync {
    fn retrieve(&self, request: RetrievalRequest) -> Result<Vec<RetrievedDocument>, ExchangeError>;
}

pub trait DocumentPublisher: Send + Sync {
    /// Provide and register a document.
    ///
    /// Returns `ExchangeError::Marshalling` when the document cannot be turned into a
    /// submission.
    fn publish(
        &self,
        document: &str,
        home_community_id: &str,
        document_class: DocumentClass,
    ) -> Result<(), ExchangeError>;
}
