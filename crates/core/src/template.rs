//! Clinical document template matching.
//!
//! A CDA document declares the templates it conforms to with `templateId` elements directly
//! under `ClinicalDocument`. Whether a retrieved document is a Continuity of Care Document
//! is decided by selecting those elements with a path expression and comparing their `root`
//! attribute against the template OID.
//!
//! Path expressions are absolute, `/`-separated element steps. A step is `prefix:local`,
//! `local` (element in no namespace) or `*` (any element). Prefixes are resolved against a
//! namespace context; the default context binds `hl7` to the HL7 v3 namespace.

use crate::constants::{
    CCD_TEMPLATE_ID_ROOT, HL7_PREFIX, HL7_V3_NAMESPACE, TEMPLATE_ID_ATTRIBUTE, TEMPLATE_ID_PATH,
};
use crate::xml::{XmlDocument, XmlElement};
use crate::{HieError, HieResult};

#[derive(Clone, Debug, PartialEq, Eq)]
enum Step {
    Any,
    Named {
        namespace: Option<String>,
        local_name: String,
    },
}

impl Step {
    fn matches(&self, element: &XmlElement) -> bool {
        match self {
            Step::Any => true,
            Step::Named {
                namespace,
                local_name,
            } => element.is(namespace.as_deref(), local_name),
        }
    }
}

/// A compiled absolute element path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TemplatePath {
    steps: Vec<Step>,
}

impl TemplatePath {
    /// Compile `expression` with the default namespace context (`hl7` → `urn:hl7-org:v3`).
    ///
    /// # Errors
    ///
    /// Returns `HieError::PathEvaluationFailed` for empty or relative expressions, empty
    /// steps, and prefixes with no namespace binding.
    pub fn parse(expression: &str) -> HieResult<Self> {
        Self::parse_with_namespaces(expression, &[(HL7_PREFIX, HL7_V3_NAMESPACE)])
    }

    /// Compile `expression` with an explicit prefix → namespace context.
    pub fn parse_with_namespaces(expression: &str, namespaces: &[(&str, &str)]) -> HieResult<Self> {
        let fail = |reason: &str| {
            HieError::PathEvaluationFailed(format!("{reason} in expression '{expression}'"))
        };

        let Some(relative) = expression.trim().strip_prefix('/') else {
            return Err(fail("path must be absolute"));
        };

        let mut steps = Vec::new();
        for raw in relative.split('/') {
            let raw = raw.trim();
            if raw.is_empty() {
                return Err(fail("empty path step"));
            }
            if raw == "*" {
                steps.push(Step::Any);
                continue;
            }

            let (namespace, local_name) = match raw.split_once(':') {
                Some((prefix, local_name)) => {
                    let namespace = namespaces
                        .iter()
                        .find(|(bound, _)| *bound == prefix)
                        .map(|(_, uri)| (*uri).to_owned())
                        .ok_or_else(|| fail(&format!("unbound namespace prefix '{prefix}'")))?;
                    (Some(namespace), local_name)
                }
                None => (None, raw),
            };

            if !is_valid_name(local_name) {
                return Err(fail(&format!("invalid element name '{local_name}'")));
            }

            steps.push(Step::Named {
                namespace,
                local_name: local_name.to_owned(),
            });
        }

        Ok(Self { steps })
    }

    /// Select every element reached by this path, in document order.
    pub fn select<'a>(&self, document: &'a XmlDocument) -> Vec<&'a XmlElement> {
        let Some((first, rest)) = self.steps.split_first() else {
            return Vec::new();
        };

        let mut current: Vec<&XmlElement> = if first.matches(document.root()) {
            vec![document.root()]
        } else {
            Vec::new()
        };

        for step in rest {
            current = current
                .into_iter()
                .flat_map(|element| element.children().iter())
                .filter(|child| step.matches(child))
                .collect();
        }

        current
    }
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Decides whether a document carries a particular template marker.
#[derive(Clone, Debug)]
pub struct TemplateFilter {
    path: TemplatePath,
    attribute_name: String,
    required_value: String,
}

impl TemplateFilter {
    pub fn new(path: TemplatePath, attribute_name: &str, required_value: &str) -> Self {
        Self {
            path,
            attribute_name: attribute_name.to_owned(),
            required_value: required_value.to_owned(),
        }
    }

    /// Filter for document-level template ids with the given `root` OID.
    pub fn for_template_root(template_root: &str) -> HieResult<Self> {
        Ok(Self::new(
            TemplatePath::parse(TEMPLATE_ID_PATH)?,
            TEMPLATE_ID_ATTRIBUTE,
            template_root,
        ))
    }

    /// Filter for the C-CDA Continuity of Care Document.
    pub fn ccd() -> HieResult<Self> {
        Self::for_template_root(CCD_TEMPLATE_ID_ROOT)
    }

    pub fn required_value(&self) -> &str {
        &self.required_value
    }

    /// True iff a selected element has the attribute with the required value (ASCII case
    /// ignored). Elements lacking the attribute simply do not match.
    pub fn matches(&self, document: &XmlDocument) -> bool {
        self.path.select(document).into_iter().any(|element| {
            element
                .attribute(&self.attribute_name)
                .is_some_and(|value| value.eq_ignore_ascii_case(&self.required_value))
        })
    }
}

/// Evaluate `xpath` against `document` and report whether any selected element has
/// `attribute_name` equal (ignoring ASCII case) to `required_value`.
///
/// # Errors
///
/// Returns `HieError::PathEvaluationFailed` if the expression cannot be evaluated.
pub fn matches_template(
    document: &XmlDocument,
    xpath: &str,
    attribute_name: &str,
    required_value: &str,
) -> HieResult<bool> {
    let filter = TemplateFilter::new(TemplatePath::parse(xpath)?, attribute_name, required_value);
    Ok(filter.matches(document))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ccd(template_roots: &[&str]) -> XmlDocument {
        let template_ids: String = template_roots
            .iter()
            .map(|root| format!(r#"<templateId root="{root}"/>"#))
            .collect();
        let xml = format!(
            r#"<ClinicalDocument xmlns="urn:hl7-org:v3"><realmCode code="US"/>{template_ids}<title>CCD</title></ClinicalDocument>"#
        );
        XmlDocument::parse(xml.as_bytes()).expect("parse")
    }

    #[test]
    fn matches_ccd_template_root() {
        let doc = ccd(&["2.16.840.1.113883.10.20.22.1.1", CCD_TEMPLATE_ID_ROOT]);
        assert!(matches_template(&doc, TEMPLATE_ID_PATH, "root", CCD_TEMPLATE_ID_ROOT)
            .expect("evaluates"));
    }

    #[test]
    fn attribute_value_comparison_ignores_case() {
        let doc = ccd(&["urn:OID:ABC"]);
        assert!(matches_template(&doc, TEMPLATE_ID_PATH, "root", "urn:oid:abc").expect("evaluates"));
    }

    #[test]
    fn other_template_does_not_match() {
        let doc = ccd(&["2.16.840.1.113883.10.20.22.1.1"]);
        let filter = TemplateFilter::ccd().expect("valid filter");
        assert!(!filter.matches(&doc));
    }

    #[test]
    fn no_template_ids_does_not_match() {
        let doc = ccd(&[]);
        assert!(!matches_template(&doc, TEMPLATE_ID_PATH, "root", CCD_TEMPLATE_ID_ROOT)
            .expect("evaluates"));
    }

    #[test]
    fn template_id_without_root_does_not_match() {
        let doc = XmlDocument::parse(
            br#"<ClinicalDocument xmlns="urn:hl7-org:v3"><templateId extension="2015-08-01"/></ClinicalDocument>"#,
        )
        .expect("parse");
        assert!(!matches_template(&doc, TEMPLATE_ID_PATH, "root", CCD_TEMPLATE_ID_ROOT)
            .expect("evaluates"));
    }

    #[test]
    fn nested_template_ids_are_not_document_level() {
        let doc = XmlDocument::parse(
            format!(
                r#"<ClinicalDocument xmlns="urn:hl7-org:v3"><component><templateId root="{CCD_TEMPLATE_ID_ROOT}"/></component></ClinicalDocument>"#
            )
            .as_bytes(),
        )
        .expect("parse");
        assert!(!TemplateFilter::ccd().expect("valid filter").matches(&doc));
    }

    #[test]
    fn document_outside_hl7_namespace_does_not_match() {
        let doc = XmlDocument::parse(
            format!(r#"<ClinicalDocument><templateId root="{CCD_TEMPLATE_ID_ROOT}"/></ClinicalDocument>"#)
                .as_bytes(),
        )
        .expect("parse");
        assert!(!TemplateFilter::ccd().expect("valid filter").matches(&doc));
    }

    #[test]
    fn unbound_prefix_is_an_evaluation_failure() {
        let doc = ccd(&[CCD_TEMPLATE_ID_ROOT]);
        let err = matches_template(&doc, "/cda:ClinicalDocument/cda:templateId", "root", "x")
            .expect_err("should fail");
        assert!(matches!(err, HieError::PathEvaluationFailed(msg) if msg.contains("cda")));
    }

    #[test]
    fn malformed_expressions_are_evaluation_failures() {
        let doc = ccd(&[CCD_TEMPLATE_ID_ROOT]);
        for expression in ["", "hl7:ClinicalDocument", "//hl7:templateId", "/hl7:ClinicalDocument/", "/hl7:[0]"] {
            let err = matches_template(&doc, expression, "root", CCD_TEMPLATE_ID_ROOT)
                .expect_err("should fail");
            assert!(matches!(err, HieError::PathEvaluationFailed(_)), "{expression}");
        }
    }

    #[test]
    fn wildcard_step_selects_any_child() {
        let doc = ccd(&[CCD_TEMPLATE_ID_ROOT]);
        let path = TemplatePath::parse("/hl7:ClinicalDocument/*").expect("valid path");
        assert_eq!(path.select(&doc).len(), 3);
    }

    #[test]
    fn custom_namespace_context() {
        let doc = ccd(&[CCD_TEMPLATE_ID_ROOT]);
        let path = TemplatePath::parse_with_namespaces(
            "/v3:ClinicalDocument/v3:title",
            &[("v3", HL7_V3_NAMESPACE)],
        )
        .expect("valid path");
        let selected = path.select(&doc);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].text(), "CCD");
    }
}
