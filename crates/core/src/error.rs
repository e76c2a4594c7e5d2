use crate::registry::RegistryError;
use crate::xml::XmlError;

#[derive(Debug, thiserror::Error)]
pub enum HieError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("no patient was found for the specified patient id: {0}")]
    PatientNotFound(String),
    #[error("failed to resolve patient identifier system: {0}")]
    IdentifierResolutionFailed(String),

    #[error("document registry returned {} error(s)", .errors.len())]
    RegistryQueryFailed { errors: Vec<RegistryError> },
    #[error("document registry could not be reached: {0}")]
    RegistryUnavailable(String),
    #[error("no documents found in the registry for the given patient id")]
    NoCandidateDocuments,
    #[error("no XDSDocumentEntry documents found for the given patient id")]
    NoMatchingEntries,

    #[error("retrieve document set failed: {0}")]
    RetrievalFailed(String),
    #[error("retrieve document set returned no documents for the given patient id")]
    NoDocumentsReturned,
    #[error("no retrieved document matched the required template")]
    NoMatchingDocuments,

    #[error("failed to parse document {document_id}: {source}")]
    DocumentParseFailed {
        document_id: String,
        #[source]
        source: XmlError,
    },
    #[error("error evaluating path expression: {0}")]
    PathEvaluationFailed(String),
    #[error("failed to transform document {document_id}: {reason}")]
    TransformFailed { document_id: String, reason: String },

    #[error("failed to publish document: {0}")]
    PublishFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize YAML: {0}")]
    YamlSerialization(serde_yaml::Error),
    #[error("failed to deserialize YAML: {0}")]
    YamlDeserialization(String),
    #[error("failed to serialize JSON: {0}")]
    Serialization(serde_json::Error),
}

impl HieError {
    /// True for the outcomes that mean "the exchange had nothing to give back" rather than
    /// "something went wrong".
    pub fn is_nothing_found(&self) -> bool {
        matches!(
            self,
            HieError::NoCandidateDocuments
                | HieError::NoMatchingEntries
                | HieError::NoDocumentsReturned
                | HieError::NoMatchingDocuments
        )
    }
}

pub type HieResult<T> = std::result::Result<T, HieError>;
