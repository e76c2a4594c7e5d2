//! Constants used throughout the HIE core crate.
//!
//! Template OIDs, registry designations and the on-disk names used by the local exchange
//! live here so every module agrees on them.

/// Display name of the external identifier carrying a document's unique id.
pub const XDS_DOCUMENT_ENTRY_UNIQUE_ID: &str = "XDSDocumentEntry.uniqueId";

/// Display name of the external identifier carrying a document's patient id.
pub const XDS_DOCUMENT_ENTRY_PATIENT_ID: &str = "XDSDocumentEntry.patientId";

/// Identification scheme of `XDSDocumentEntry.uniqueId`.
pub const XDS_UNIQUE_ID_SCHEME: &str = "urn:uuid:2e82c1f6-a085-4c72-9da3-8640a32e42ab";

/// Identification scheme of `XDSDocumentEntry.patientId`.
pub const XDS_PATIENT_ID_SCHEME: &str = "urn:uuid:58a6f841-87b3-4a3e-92fd-a8ffeff98427";

/// HL7 v3 namespace used by CDA documents.
pub const HL7_V3_NAMESPACE: &str = "urn:hl7-org:v3";

/// Prefix bound to [`HL7_V3_NAMESPACE`] in path expressions.
pub const HL7_PREFIX: &str = "hl7";

/// Template id root of the C-CDA Continuity of Care Document.
pub const CCD_TEMPLATE_ID_ROOT: &str = "2.16.840.1.113883.10.20.22.1.2";

/// Path selecting the document-level template identifiers of a CDA document.
pub const TEMPLATE_ID_PATH: &str = "/hl7:ClinicalDocument/hl7:templateId";

/// Attribute of a template identifier holding the template OID.
pub const TEMPLATE_ID_ATTRIBUTE: &str = "root";

/// Path selecting the record target's patient identifiers of a CDA document.
pub const PATIENT_ROLE_ID_PATH: &str = "/hl7:ClinicalDocument/hl7:recordTarget/hl7:patientRole/hl7:id";

/// Default repository unique id used in retrieve document set requests.
pub const DEFAULT_REPOSITORY_UNIQUE_ID: &str = "1.3.6.1.4.1.21367.2010.1.2.1125";

/// Default home community id attached to published documents.
pub const DEFAULT_HOME_COMMUNITY_ID: &str = "urn:oid:2.16.840.1.113883.3.467";

/// Default directory for the local exchange when no explicit directory is configured.
pub const DEFAULT_EXCHANGE_DIR: &str = "exchange";

/// Filename mapping patient ids to identifier systems.
pub const PATIENTS_FILENAME: &str = "patients.yaml";

/// Filename holding registry metadata.
pub const REGISTRY_FILENAME: &str = "registry.yaml";

/// Filename holding repository metadata.
pub const REPOSITORY_FILENAME: &str = "repository.yaml";

/// Directory holding raw document content.
pub const DOCUMENTS_DIR_NAME: &str = "documents";

/// Top-level key of the aggregate output.
pub const AGGREGATE_DOCUMENTS_KEY: &str = "Documents";
