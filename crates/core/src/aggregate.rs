//! Aggregation of retrieved documents into a single structured payload.

use crate::constants::AGGREGATE_DOCUMENTS_KEY;
use crate::render::DocumentRenderer;
use crate::retrieval::RetrievedDocument;
use crate::template::TemplateFilter;
use crate::xml::XmlDocument;
use crate::{HieError, HieResult};
use serde::ser::SerializeMap;
use serde::Serialize;
use serde_json::value::RawValue;
use std::sync::Arc;

/// Rendered documents, in the order they were retrieved.
///
/// Serialises as `{"Documents":[...]}` with each fragment embedded verbatim.
#[derive(Clone, Debug, Default)]
pub struct AggregateResult {
    documents: Vec<Box<RawValue>>,
}

impl AggregateResult {
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// The rendered fragments as JSON text.
    pub fn documents(&self) -> impl Iterator<Item = &str> {
        self.documents.iter().map(|raw| raw.get())
    }

    /// # Errors
    ///
    /// Returns `HieError::Serialization` if serialisation fails.
    pub fn to_json(&self) -> HieResult<String> {
        serde_json::to_string(self).map_err(HieError::Serialization)
    }
}

impl Serialize for AggregateResult {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(AGGREGATE_DOCUMENTS_KEY, &self.documents)?;
        map.end()
    }
}

/// Filters retrieved documents by template and renders the matches.
#[derive(Clone)]
pub struct DocumentAggregator {
    filter: TemplateFilter,
    renderer: Arc<dyn DocumentRenderer>,
}

impl DocumentAggregator {
    pub fn new(filter: TemplateFilter, renderer: Arc<dyn DocumentRenderer>) -> Self {
        Self { filter, renderer }
    }

    /// Render every XML document that carries the required template, preserving input order.
    ///
    /// Non-XML documents and documents without the template are skipped. An empty result is
    /// not an error here; the caller decides what zero matches means.
    ///
    /// # Errors
    ///
    /// Returns:
    /// - `HieError::DocumentParseFailed` if an XML document cannot be parsed (the whole
    ///   aggregation fails, nothing partial is returned),
    /// - `HieError::TransformFailed` if the renderer fails or produces something that is not
    ///   JSON.
    pub fn aggregate(&self, documents: Vec<RetrievedDocument>) -> HieResult<AggregateResult> {
        let mut result = AggregateResult::default();

        for retrieved in documents {
            tracing::debug!("processing document id: {}", retrieved.document_unique_id);

            if !retrieved.is_xml() {
                tracing::warn!(
                    "document {} is not XML (mime type {})",
                    retrieved.document_unique_id,
                    retrieved.mime_type
                );
                continue;
            }

            let document_id = retrieved.document_unique_id;

            let document = XmlDocument::parse(&retrieved.content).map_err(|source| {
                HieError::DocumentParseFailed {
                    document_id: document_id.clone(),
                    source,
                }
            })?;

            if !self.filter.matches(&document) {
                tracing::debug!(
                    "document {} doesn't match required template id {}",
                    document_id,
                    self.filter.required_value()
                );
                continue;
            }

            let fragment =
                self.renderer
                    .render(&document)
                    .map_err(|e| HieError::TransformFailed {
                        document_id: document_id.clone(),
                        reason: e.to_string(),
                    })?;

            let fragment =
                RawValue::from_string(fragment).map_err(|e| HieError::TransformFailed {
                    document_id: document_id.clone(),
                    reason: format!("renderer output is not JSON: {e}"),
                })?;

            result.documents.push(fragment);
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::CCD_TEMPLATE_ID_ROOT;
    use crate::render::{CdaJsonRenderer, RenderError};

    /// Renders the document title, so output order can be checked.
    struct TitleRenderer;

    impl DocumentRenderer for TitleRenderer {
        fn render(&self, document: &XmlDocument) -> Result<String, RenderError> {
            let title = document
                .root()
                .children()
                .iter()
                .find(|c| c.local_name() == "title")
                .map(|c| c.text().to_owned())
                .unwrap_or_default();
            Ok(serde_json::json!({ "title": title }).to_string())
        }
    }

    struct FixedRenderer(&'static str);

    impl DocumentRenderer for FixedRenderer {
        fn render(&self, _document: &XmlDocument) -> Result<String, RenderError> {
            Ok(self.0.to_owned())
        }
    }

    struct FailingRenderer;

    impl DocumentRenderer for FailingRenderer {
        fn render(&self, _document: &XmlDocument) -> Result<String, RenderError> {
            Err(RenderError("stylesheet unavailable".into()))
        }
    }

    fn cda(id: &str, template_root: &str, title: &str) -> RetrievedDocument {
        RetrievedDocument {
            document_unique_id: id.into(),
            mime_type: "text/xml".into(),
            content: format!(
                r#"<ClinicalDocument xmlns="urn:hl7-org:v3"><templateId root="{template_root}"/><title>{title}</title></ClinicalDocument>"#
            )
            .into_bytes(),
        }
    }

    fn other(id: &str, mime_type: &str) -> RetrievedDocument {
        RetrievedDocument {
            document_unique_id: id.into(),
            mime_type: mime_type.into(),
            content: b"%PDF-1.4".to_vec(),
        }
    }

    fn aggregator(renderer: Arc<dyn DocumentRenderer>) -> DocumentAggregator {
        DocumentAggregator::new(TemplateFilter::ccd().expect("valid filter"), renderer)
    }

    #[test]
    fn only_xml_matching_documents_are_rendered() {
        let documents = vec![
            other("1", "application/pdf"),
            cda("2", CCD_TEMPLATE_ID_ROOT, "match"),
            other("3", "text/plain"),
        ];

        let result = aggregator(Arc::new(TitleRenderer))
            .aggregate(documents)
            .expect("aggregate");

        assert_eq!(result.len(), 1);
        assert_eq!(result.to_json().expect("json"), r#"{"Documents":[{"title":"match"}]}"#);
    }

    #[test]
    fn matching_documents_keep_input_order() {
        let documents = vec![
            cda("1", CCD_TEMPLATE_ID_ROOT, "first"),
            cda("2", "2.16.840.1.113883.10.20.22.1.1", "skipped"),
            cda("3", CCD_TEMPLATE_ID_ROOT, "third"),
        ];

        let result = aggregator(Arc::new(TitleRenderer))
            .aggregate(documents)
            .expect("aggregate");

        let titles: Vec<&str> = result.documents().collect();
        assert_eq!(titles, vec![r#"{"title":"first"}"#, r#"{"title":"third"}"#]);
        assert_eq!(
            result.to_json().expect("json"),
            r#"{"Documents":[{"title":"first"},{"title":"third"}]}"#
        );
    }

    #[test]
    fn no_xml_documents_is_an_empty_success() {
        let documents = vec![other("1", "application/pdf"), other("2", "image/png")];

        let result = aggregator(Arc::new(TitleRenderer))
            .aggregate(documents)
            .expect("aggregate");

        assert!(result.is_empty());
        assert_eq!(result.to_json().expect("json"), r#"{"Documents":[]}"#);
    }

    #[test]
    fn mime_type_check_ignores_case() {
        let mut document = cda("1", CCD_TEMPLATE_ID_ROOT, "upper");
        document.mime_type = "TEXT/XML".into();

        let result = aggregator(Arc::new(TitleRenderer))
            .aggregate(vec![document])
            .expect("aggregate");

        assert_eq!(result.len(), 1);
    }

    #[test]
    fn skipped_and_rendered_documents_mixed() {
        let mut labelled = cda("2", CCD_TEMPLATE_ID_ROOT, "labelled");
        labelled.mime_type = "application/hl7-v3+xml; charset=UTF-8".into();
        let documents = vec![
            other("1", "application/pdf"),
            labelled,
            other("3", "text/plain"),
            cda("4", CCD_TEMPLATE_ID_ROOT, "plain"),
        ];

        let result = aggregator(Arc::new(TitleRenderer))
            .aggregate(documents)
            .expect("aggregate");

        assert_eq!(
            result.to_json().expect("json"),
            r#"{"Documents":[{"title":"labelled"},{"title":"plain"}]}"#
        );
    }

    #[test]
    fn malformed_xml_fails_the_whole_aggregation() {
        let broken = RetrievedDocument {
            document_unique_id: "2".into(),
            mime_type: "text/xml".into(),
            content: b"<ClinicalDocument><title>".to_vec(),
        };
        let documents = vec![cda("1", CCD_TEMPLATE_ID_ROOT, "ok"), broken];

        let err = aggregator(Arc::new(TitleRenderer))
            .aggregate(documents)
            .expect_err("should fail");

        assert!(matches!(err, HieError::DocumentParseFailed { document_id, .. } if document_id == "2"));
    }

    #[test]
    fn renderer_failure_is_a_transform_failure() {
        let err = aggregator(Arc::new(FailingRenderer))
            .aggregate(vec![cda("1", CCD_TEMPLATE_ID_ROOT, "x")])
            .expect_err("should fail");

        assert!(matches!(
            err,
            HieError::TransformFailed { document_id, reason }
                if document_id == "1" && reason.contains("stylesheet")
        ));
    }

    #[test]
    fn non_json_renderer_output_is_rejected() {
        let err = aggregator(Arc::new(FixedRenderer("not json")))
            .aggregate(vec![cda("1", CCD_TEMPLATE_ID_ROOT, "x")])
            .expect_err("should fail");

        assert!(matches!(err, HieError::TransformFailed { .. }));
    }

    #[test]
    fn builtin_renderer_produces_valid_aggregate() {
        let result = aggregator(Arc::new(CdaJsonRenderer))
            .aggregate(vec![cda("1", CCD_TEMPLATE_ID_ROOT, "Summary")])
            .expect("aggregate");

        let parsed: serde_json::Value =
            serde_json::from_str(&result.to_json().expect("json")).expect("valid json");
        assert_eq!(
            parsed["Documents"][0]["ClinicalDocument"]["title"],
            serde_json::json!("Summary")
        );
    }
}
