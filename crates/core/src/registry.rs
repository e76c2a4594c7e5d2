//! Registry metadata models and document identifier extraction.
//!
//! A registry stored query returns a heterogeneous list of identifiable objects. Document
//! entries (ebRIM `ExtrinsicObject`) carry their globally unique id as an external
//! identifier named `XDSDocumentEntry.uniqueId`; any other identifiable object is taken at
//! face value and its own id is used. The polymorphism is resolved once, here, into a
//! [`RegistryEntry`] sum type.

use crate::constants::XDS_DOCUMENT_ENTRY_UNIQUE_ID;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Registry models
// ============================================================================

/// One metadata record returned by a registry query.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegistryEntry {
    /// A document entry with external identifiers.
    Document(DocumentEntry),
    /// Any other identifiable registry object.
    Identifiable(Identifiable),
}

/// A registry document entry (`ExtrinsicObject`).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentEntry {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home: Option<String>,
    #[serde(default)]
    pub external_identifiers: Vec<ExternalIdentifier>,
}

/// A generic identifiable registry object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifiable {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home: Option<String>,
}

/// A typed, named identifier attached to a document entry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalIdentifier {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identification_scheme: Option<String>,
    pub value: String,
    #[serde(default)]
    pub name: Vec<LocalizedString>,
}

impl ExternalIdentifier {
    /// Build an identifier with a single display name.
    pub fn named(name: &str, value: impl Into<String>) -> Self {
        Self {
            identification_scheme: None,
            value: value.into(),
            name: vec![LocalizedString {
                value: Some(name.to_owned()),
                lang: None,
            }],
        }
    }

    /// True if any display name equals `designation`, ignoring ASCII case.
    pub fn is_designated(&self, designation: &str) -> bool {
        self.name.iter().any(|localized| {
            localized
                .value
                .as_deref()
                .is_some_and(|v| v.eq_ignore_ascii_case(designation))
        })
    }
}

/// A localized display string.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedString {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
}

/// A structured error reported by the registry in place of (or alongside) results.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// Result of a registry stored query.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub entries: Vec<RegistryEntry>,
    #[serde(default)]
    pub errors: Vec<RegistryError>,
}

impl QueryResponse {
    pub fn from_entries(entries: Vec<RegistryEntry>) -> Self {
        Self {
            entries,
            errors: Vec::new(),
        }
    }
}

// ============================================================================
// Document identifier map
// ============================================================================

/// Document unique ids mapped to the home community they came from, when known.
///
/// Keys are never empty. Iteration is ordered by unique id, though callers should not rely
/// on any particular order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DocumentIdentifierMap(BTreeMap<String, Option<String>>);

impl DocumentIdentifierMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a document. Blank unique ids are ignored and `false` is returned.
    pub fn insert(&mut self, unique_id: impl Into<String>, home: Option<String>) -> bool {
        let unique_id = unique_id.into();
        if unique_id.trim().is_empty() {
            return false;
        }
        self.0.insert(unique_id, home);
        true
    }

    pub fn get(&self, unique_id: &str) -> Option<&Option<String>> {
        self.0.get(unique_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }
}

impl IntoIterator for DocumentIdentifierMap {
    type Item = (String, Option<String>);
    type IntoIter = std::collections::btree_map::IntoIter<String, Option<String>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

// ============================================================================
// Extraction
// ============================================================================

/// Extract the document unique ids (and their home community ids) from registry entries.
///
/// Document entries contribute the value of their first external identifier designated
/// `XDSDocumentEntry.uniqueId`; the scan stops there, so a later identifier with the same
/// designation never overrides it. Entries without such an identifier contribute nothing.
/// Other identifiable objects contribute their own id.
///
/// This never fails; unusable entries are logged and skipped.
pub fn extract_document_identifiers(entries: Vec<RegistryEntry>) -> DocumentIdentifierMap {
    let mut documents = DocumentIdentifierMap::new();

    for entry in entries {
        match entry {
            RegistryEntry::Document(document) => {
                let unique_id = document
                    .external_identifiers
                    .into_iter()
                    .find(|identifier| identifier.is_designated(XDS_DOCUMENT_ENTRY_UNIQUE_ID))
                    .map(|identifier| identifier.value);

                match unique_id {
                    Some(unique_id) => {
                        tracing::debug!("located {XDS_DOCUMENT_ENTRY_UNIQUE_ID} external identifier");
                        if documents.insert(unique_id.clone(), document.home.clone()) {
                            tracing::debug!(
                                "document id added: {}, home community id: {:?}",
                                unique_id,
                                document.home
                            );
                        } else {
                            tracing::debug!("entry {} has a blank unique id", document.id);
                        }
                    }
                    None => {
                        tracing::debug!("entry {} has no unique id identifier", document.id);
                    }
                }
            }
            RegistryEntry::Identifiable(identifiable) => {
                tracing::info!("registry object {} is not a document entry", identifiable.id);
                if documents.insert(identifiable.id.clone(), identifiable.home.clone()) {
                    tracing::debug!(
                        "document id added: {}, home community id: {:?}",
                        identifiable.id,
                        identifiable.home
                    );
                }
            }
        }
    }

    tracing::info!(
        "number of XDSDocumentEntry documents found = {}",
        documents.len()
    );
    documents
}
