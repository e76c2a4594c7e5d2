//! Directory-backed health information exchange.
//!
//! Implements every exchange collaborator against plain files so the service can run (and
//! be tested) without a live registry or repository.
//!
//! ## Storage Layout
//!
//! ```text
//! <exchange_dir>/
//!   patients.yaml      # patient id -> identifier system
//!   registry.yaml      # registry entries, keyed by formatted patient id
//!   repository.yaml    # repository records pointing at files under documents/
//!   documents/
//!     <file>           # raw document content
//! ```
//!
//! Missing metadata files read as empty. Writes (publication, patient registration) are
//! serialised behind a mutex; reads are not cached.

use crate::constants::{
    DOCUMENTS_DIR_NAME, PATIENTS_FILENAME, PATIENT_ROLE_ID_PATH, REGISTRY_FILENAME,
    REPOSITORY_FILENAME, XDS_DOCUMENT_ENTRY_PATIENT_ID, XDS_DOCUMENT_ENTRY_UNIQUE_ID,
    XDS_PATIENT_ID_SCHEME, XDS_UNIQUE_ID_SCHEME,
};
use crate::exchange::{
    DocumentClass, DocumentPublisher, ExchangeError, IdentifierSystem, PatientIdentifierResolver,
    RegistryQuery, RepositoryRetrieve,
};
use crate::pipeline::format_patient_id;
use crate::registry::{DocumentEntry, ExternalIdentifier, QueryResponse, RegistryEntry};
use crate::retrieval::{RetrievalRequest, RetrievedDocument};
use crate::template::TemplatePath;
use crate::xml::XmlDocument;
use crate::{HieError, HieResult};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;
use xds_types::NonEmptyText;

// ============================================================================
// On-disk models
// ============================================================================

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct PatientsFile {
    #[serde(default)]
    patients: BTreeMap<String, IdentifierSystem>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RegistryFile {
    #[serde(default)]
    entries: Vec<StoredEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    patient_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    document_class: Option<DocumentClass>,
    entry: RegistryEntry,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RepositoryFile {
    #[serde(default)]
    documents: Vec<StoredDocument>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct StoredDocument {
    document_unique_id: String,
    repository_unique_id: String,
    mime_type: String,
    file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    published_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Local exchange
// ============================================================================

/// A health information exchange stored in a directory.
#[derive(Debug)]
pub struct LocalExchange {
    root: PathBuf,
    repository_unique_id: NonEmptyText,
    write_lock: Mutex<()>,
}

impl LocalExchange {
    /// Open (creating if needed) an exchange directory.
    ///
    /// Published documents are recorded under `repository_unique_id`.
    ///
    /// # Errors
    ///
    /// Returns `HieError::Io` if the directory structure cannot be created.
    pub fn open(root: impl Into<PathBuf>, repository_unique_id: NonEmptyText) -> HieResult<Self> {
        let root = root.into();
        fs::create_dir_all(root.join(DOCUMENTS_DIR_NAME))?;
        Ok(Self {
            root,
            repository_unique_id,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Record the identifier system of a patient MRN, replacing any previous record.
    ///
    /// # Errors
    ///
    /// Returns `HieError` if `patients.yaml` cannot be read or written.
    pub fn register_patient(&self, patient_id: &str, identifier: IdentifierSystem) -> HieResult<()> {
        if patient_id.trim().is_empty() {
            return Err(HieError::InvalidInput("patient_id cannot be empty".into()));
        }
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| HieError::InvalidInput("exchange lock poisoned".into()))?;

        let path = self.root.join(PATIENTS_FILENAME);
        let mut patients: PatientsFile = load_yaml(&path)?;
        patients.patients.insert(patient_id.to_owned(), identifier);
        save_yaml(&path, &patients)?;

        tracing::info!("registered patient {} in local exchange", patient_id);
        Ok(())
    }

    fn document_path(&self, file: &str) -> Result<PathBuf, ExchangeError> {
        if file.is_empty() || file.contains(['/', '\\']) || file.contains("..") {
            return Err(ExchangeError::Communication(format!(
                "repository record points outside the documents directory: {file}"
            )));
        }
        Ok(self.root.join(DOCUMENTS_DIR_NAME).join(file))
    }

    fn publish_locked(
        &self,
        document: &str,
        home_community_id: &str,
        document_class: DocumentClass,
    ) -> HieResult<String> {
        let parsed = XmlDocument::parse(document.as_bytes()).map_err(|e| {
            HieError::PublishFailed(format!("document is not well-formed XML: {e}"))
        })?;
        let patient_id = record_target_patient_id(&parsed)?;

        let repository_path = self.root.join(REPOSITORY_FILENAME);
        let registry_path = self.root.join(REGISTRY_FILENAME);
        let mut repository: RepositoryFile = load_yaml(&repository_path)?;
        let mut registry: RegistryFile = load_yaml(&registry_path)?;

        let uuid = Uuid::new_v4();
        let document_unique_id = format!("2.25.{}", uuid.as_u128());
        let file = format!("{}.xml", uuid.simple());
        let document_path = self.root.join(DOCUMENTS_DIR_NAME).join(&file);

        repository.documents.push(StoredDocument {
            document_unique_id: document_unique_id.clone(),
            repository_unique_id: self.repository_unique_id.as_str().to_owned(),
            mime_type: "text/xml".into(),
            file,
            published_at: Some(Utc::now()),
        });
        registry.entries.push(StoredEntry {
            patient_id: patient_id.clone(),
            document_class: Some(document_class),
            entry: RegistryEntry::Document(DocumentEntry {
                id: format!("urn:uuid:{uuid}"),
                home: Some(home_community_id.to_owned()),
                external_identifiers: vec![
                    ExternalIdentifier {
                        identification_scheme: Some(XDS_UNIQUE_ID_SCHEME.into()),
                        ..ExternalIdentifier::named(
                            XDS_DOCUMENT_ENTRY_UNIQUE_ID,
                            document_unique_id.clone(),
                        )
                    },
                    ExternalIdentifier {
                        identification_scheme: Some(XDS_PATIENT_ID_SCHEME.into()),
                        ..ExternalIdentifier::named(XDS_DOCUMENT_ENTRY_PATIENT_ID, patient_id)
                    },
                ],
            }),
        });

        fs::write(&document_path, document)?;

        let committed = save_yaml(&repository_path, &repository)
            .and_then(|()| save_yaml(&registry_path, &registry));
        if let Err(e) = committed {
            tracing::error!("publish of {} failed, rolling back: {}", document_unique_id, e);
            repository.documents.pop();
            if let Err(undo) = save_yaml(&repository_path, &repository) {
                tracing::warn!("could not restore {}: {}", repository_path.display(), undo);
            }
            if let Err(undo) = fs::remove_file(&document_path) {
                tracing::warn!("could not remove {}: {}", document_path.display(), undo);
            }
            return Err(e);
        }

        Ok(document_unique_id)
    }
}

impl PatientIdentifierResolver for LocalExchange {
    fn resolve(&self, patient_id: &str) -> Result<IdentifierSystem, ExchangeError> {
        let patients: PatientsFile =
            load_yaml(&self.root.join(PATIENTS_FILENAME)).map_err(communication)?;
        patients
            .patients
            .get(patient_id)
            .cloned()
            .ok_or_else(|| ExchangeError::NotFound(patient_id.to_owned()))
    }
}

impl RegistryQuery for LocalExchange {
    fn query(
        &self,
        patient_id: &str,
        document_class: DocumentClass,
    ) -> Result<QueryResponse, ExchangeError> {
        let registry: RegistryFile =
            load_yaml(&self.root.join(REGISTRY_FILENAME)).map_err(communication)?;

        let entries = registry
            .entries
            .into_iter()
            .filter(|stored| stored.patient_id == patient_id)
            .filter(|stored| stored.document_class.map_or(true, |c| c == document_class))
            .map(|stored| stored.entry)
            .collect();

        Ok(QueryResponse::from_entries(entries))
    }
}

impl RepositoryRetrieve for LocalExchange {
    fn retrieve(&self, request: RetrievalRequest) -> Result<Vec<RetrievedDocument>, ExchangeError> {
        let repository: RepositoryFile =
            load_yaml(&self.root.join(REPOSITORY_FILENAME)).map_err(communication)?;

        let mut retrieved = Vec::new();
        for requested in request.documents {
            let stored = repository.documents.iter().find(|stored| {
                stored.document_unique_id == requested.document_unique_id
                    && stored.repository_unique_id == requested.repository_unique_id
            });

            let Some(stored) = stored else {
                tracing::warn!(
                    "document {} not found in repository {}",
                    requested.document_unique_id,
                    requested.repository_unique_id
                );
                continue;
            };

            let content = fs::read(self.document_path(&stored.file)?).map_err(|e| {
                ExchangeError::Communication(format!(
                    "failed to read document {}: {e}",
                    stored.document_unique_id
                ))
            })?;

            retrieved.push(RetrievedDocument {
                document_unique_id: stored.document_unique_id.clone(),
                mime_type: stored.mime_type.clone(),
                content,
            });
        }

        Ok(retrieved)
    }
}

impl DocumentPublisher for LocalExchange {
    fn publish(
        &self,
        document: &str,
        home_community_id: &str,
        document_class: DocumentClass,
    ) -> Result<(), ExchangeError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| ExchangeError::Communication("exchange lock poisoned".into()))?;

        match self.publish_locked(document, home_community_id, document_class) {
            Ok(document_unique_id) => {
                tracing::info!("published document {} to local exchange", document_unique_id);
                Ok(())
            }
            Err(HieError::PublishFailed(reason)) => Err(ExchangeError::Marshalling(reason)),
            Err(other) => Err(communication(other)),
        }
    }
}

/// Read the HL7 CX patient id of a CDA document's record target.
fn record_target_patient_id(document: &XmlDocument) -> HieResult<String> {
    let path = TemplatePath::parse(PATIENT_ROLE_ID_PATH)?;
    let id = path
        .select(document)
        .into_iter()
        .find_map(|id| Some((id.attribute("extension")?, id.attribute("root")?)))
        .ok_or_else(|| {
            HieError::PublishFailed("document has no recordTarget patient identifier".into())
        })?;

    format_patient_id(id.0, id.1).map_err(|e| HieError::PublishFailed(e.to_string()))
}

fn communication(err: HieError) -> ExchangeError {
    ExchangeError::Communication(err.to_string())
}

fn load_yaml<T: DeserializeOwned + Default>(path: &Path) -> HieResult<T> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(T::default()),
        Err(e) => return Err(HieError::Io(e)),
    };
    if text.trim().is_empty() {
        return Ok(T::default());
    }

    let deserializer = serde_yaml::Deserializer::from_str(&text);
    serde_path_to_error::deserialize(deserializer).map_err(|err| {
        let field = err.path().to_string();
        let field = if field.is_empty() || field == "." {
            "<root>".to_string()
        } else {
            field
        };
        HieError::YamlDeserialization(format!(
            "{} schema mismatch at {field}: {}",
            path.display(),
            err.into_inner()
        ))
    })
}

fn save_yaml<T: Serialize>(path: &Path, value: &T) -> HieResult<()> {
    let text = serde_yaml::to_string(value).map_err(HieError::YamlSerialization)?;
    fs::write(path, text)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::CCD_TEMPLATE_ID_ROOT;
    use crate::registry::extract_document_identifiers;
    use crate::retrieval::build_retrieval_request;
    use tempfile::TempDir;

    const REPOSITORY: &str = "1.3.6.1.4.1.21367.2010.1.2.1125";

    fn ccd(mrn: &str) -> String {
        format!(
            r#"<?xml version="1.0"?>
<ClinicalDocument xmlns="urn:hl7-org:v3">
  <templateId root="{CCD_TEMPLATE_ID_ROOT}"/>
  <recordTarget>
    <patientRole>
      <id extension="{mrn}" root="urn:oid:2.16.840.1.113883.4.357"/>
    </patientRole>
  </recordTarget>
</ClinicalDocument>"#
        )
    }

    fn exchange() -> (TempDir, LocalExchange) {
        let dir = TempDir::new().expect("tempdir");
        let exchange = LocalExchange::open(
            dir.path(),
            NonEmptyText::new(REPOSITORY).expect("non-empty"),
        )
        .expect("open exchange");
        (dir, exchange)
    }

    #[test]
    fn empty_directory_reads_as_empty_exchange() {
        let (_dir, exchange) = exchange();

        assert!(matches!(
            exchange.resolve("mrn-1"),
            Err(ExchangeError::NotFound(id)) if id == "mrn-1"
        ));
        let response = exchange
            .query("mrn-1^^^&1.2&ISO", DocumentClass::ClinicalDocument)
            .expect("query");
        assert!(response.entries.is_empty());
    }

    #[test]
    fn registered_patient_resolves() {
        let (_dir, exchange) = exchange();
        let identifier = IdentifierSystem {
            value: "MRN".into(),
            oid: "urn:oid:2.16.840.1.113883.4.357".into(),
        };

        exchange
            .register_patient("mrn-1", identifier.clone())
            .expect("register");

        assert_eq!(exchange.resolve("mrn-1").expect("resolve"), identifier);
    }

    #[test]
    fn published_document_can_be_queried_and_retrieved() {
        let (dir, exchange) = exchange();
        let document = ccd("mrn-1");

        exchange
            .publish(&document, "urn:oid:1.1", DocumentClass::ClinicalDocument)
            .expect("publish");

        let response = exchange
            .query(
                "mrn-1^^^&2.16.840.1.113883.4.357&ISO",
                DocumentClass::ClinicalDocument,
            )
            .expect("query");
        assert_eq!(response.entries.len(), 1);

        let documents = extract_document_identifiers(response.entries);
        assert_eq!(documents.len(), 1);
        let (unique_id, home) = documents.iter().next().expect("one document");
        assert!(unique_id.starts_with("2.25."));
        assert_eq!(home, Some("urn:oid:1.1"));

        let request =
            build_retrieval_request(&NonEmptyText::new(REPOSITORY).expect("non-empty"), documents);
        let retrieved = exchange.retrieve(request).expect("retrieve");
        assert_eq!(retrieved.len(), 1);
        assert_eq!(retrieved[0].mime_type, "text/xml");
        assert_eq!(retrieved[0].content, document.as_bytes());

        assert!(dir.path().join(REGISTRY_FILENAME).is_file());
        assert!(dir.path().join(REPOSITORY_FILENAME).is_file());
    }

    #[test]
    fn publish_without_patient_id_is_marshalling_error() {
        let (_dir, exchange) = exchange();

        let err = exchange
            .publish(
                r#"<ClinicalDocument xmlns="urn:hl7-org:v3"/>"#,
                "urn:oid:1.1",
                DocumentClass::ClinicalDocument,
            )
            .expect_err("should fail");

        assert!(matches!(err, ExchangeError::Marshalling(msg) if msg.contains("recordTarget")));
    }

    #[test]
    fn publish_of_malformed_xml_is_marshalling_error() {
        let (_dir, exchange) = exchange();

        let err = exchange
            .publish("<ClinicalDocument>", "urn:oid:1.1", DocumentClass::ClinicalDocument)
            .expect_err("should fail");

        assert!(matches!(err, ExchangeError::Marshalling(_)));
    }

    #[test]
    fn failed_publish_leaves_no_document_behind() {
        let (_dir, exchange) = exchange();
        fs::create_dir(exchange.root().join(REGISTRY_FILENAME)).expect("block registry file");

        let err = exchange
            .publish(&ccd("mrn-1"), "urn:oid:1.1", DocumentClass::ClinicalDocument)
            .expect_err("should fail");

        assert!(matches!(err, ExchangeError::Communication(_)));
        let stored = fs::read_dir(exchange.root().join(DOCUMENTS_DIR_NAME))
            .expect("documents dir")
            .count();
        assert_eq!(stored, 0);
        assert!(!exchange.root().join(REPOSITORY_FILENAME).exists());
    }

    #[test]
    fn retrieve_skips_unknown_documents_and_other_repositories() {
        let (dir, exchange) = exchange();
        fs::write(dir.path().join(DOCUMENTS_DIR_NAME).join("a.xml"), "<a/>").expect("write");
        fs::write(
            dir.path().join(REPOSITORY_FILENAME),
            format!(
                "documents:\n  - document_unique_id: '1.2.3'\n    repository_unique_id: '{REPOSITORY}'\n    mime_type: text/xml\n    file: a.xml\n"
            ),
        )
        .expect("write");

        let request = RetrievalRequest {
            documents: vec![
                crate::retrieval::DocumentRequest {
                    document_unique_id: "1.2.3".into(),
                    repository_unique_id: REPOSITORY.into(),
                    home_community_id: None,
                },
                crate::retrieval::DocumentRequest {
                    document_unique_id: "1.2.3".into(),
                    repository_unique_id: "9.9.9".into(),
                    home_community_id: None,
                },
                crate::retrieval::DocumentRequest {
                    document_unique_id: "4.5.6".into(),
                    repository_unique_id: REPOSITORY.into(),
                    home_community_id: None,
                },
            ],
        };

        let retrieved = exchange.retrieve(request).expect("retrieve");

        assert_eq!(retrieved.len(), 1);
        assert_eq!(retrieved[0].document_unique_id, "1.2.3");
    }

    #[test]
    fn repository_file_outside_documents_dir_is_rejected() {
        let (dir, exchange) = exchange();
        fs::write(
            dir.path().join(REPOSITORY_FILENAME),
            format!(
                "documents:\n  - document_unique_id: '1.2.3'\n    repository_unique_id: '{REPOSITORY}'\n    mime_type: text/xml\n    file: ../patients.yaml\n"
            ),
        )
        .expect("write");

        let mut documents = crate::registry::DocumentIdentifierMap::new();
        documents.insert("1.2.3", None);
        let request =
            build_retrieval_request(&NonEmptyText::new(REPOSITORY).expect("non-empty"), documents);

        let err = exchange.retrieve(request).expect_err("should fail");
        assert!(matches!(err, ExchangeError::Communication(msg) if msg.contains("outside")));
    }

    #[test]
    fn malformed_registry_file_reports_field_path() {
        let (dir, exchange) = exchange();
        fs::write(
            dir.path().join(REGISTRY_FILENAME),
            "entries:\n  - patient_id: p\n    entry:\n      type: document\n      id: [not, a, string]\n",
        )
        .expect("write");

        let err = exchange
            .query("p", DocumentClass::ClinicalDocument)
            .expect_err("should fail");

        assert!(matches!(err, ExchangeError::Communication(msg) if msg.contains("entries")));
    }
}
