//! Retrieve document set requests and the documents they return.

use crate::registry::DocumentIdentifierMap;
use serde::{Deserialize, Serialize};
use xds_types::NonEmptyText;

/// One document requested from a repository.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRequest {
    pub document_unique_id: String,
    pub repository_unique_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_community_id: Option<String>,
}

/// A batch retrieve document set request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalRequest {
    pub documents: Vec<DocumentRequest>,
}

impl RetrievalRequest {
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// A document returned by a repository.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetrievedDocument {
    pub document_unique_id: String,
    pub mime_type: String,
    pub content: Vec<u8>,
}

impl RetrievedDocument {
    /// True if the MIME type denotes XML content.
    ///
    /// Accepts `text/xml`, `application/xml` and any `+xml` structured suffix, ignoring ASCII
    /// case and any parameters such as `charset`.
    pub fn is_xml(&self) -> bool {
        is_xml_mime_type(&self.mime_type)
    }
}

/// Wider than an exact `text/xml` comparison: repositories also label CDA as
/// `application/xml` or a `+xml` type, sometimes with a `charset` parameter, and those are
/// kept too.
pub fn is_xml_mime_type(mime_type: &str) -> bool {
    let essence = mime_type.split(';').next().unwrap_or("").trim();
    essence.eq_ignore_ascii_case("text/xml")
        || essence.eq_ignore_ascii_case("application/xml")
        || essence
            .len()
            .checked_sub(4)
            .and_then(|start| essence.get(start..))
            .is_some_and(|suffix| suffix.eq_ignore_ascii_case("+xml"))
}

/// Expand the identifier map into a retrieve request against a single repository.
///
/// Every document is requested exactly once. The home community id is only set when the
/// registry reported one.
pub fn build_retrieval_request(
    repository_unique_id: &NonEmptyText,
    documents: DocumentIdentifierMap,
) -> RetrievalRequest {
    let documents = documents
        .into_iter()
        .map(|(document_unique_id, home_community_id)| DocumentRequest {
            document_unique_id,
            repository_unique_id: repository_unique_id.as_str().to_owned(),
            home_community_id,
        })
        .collect();

    RetrievalRequest { documents }
}
