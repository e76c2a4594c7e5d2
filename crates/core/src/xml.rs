//! Namespace-aware XML element tree.
//!
//! Retrieved document bodies are parsed once into an owned [`XmlDocument`] so that template
//! matching, rendering and patient id lookup can all walk the same structure. Element names
//! are resolved against their namespace at parse time; attribute names are kept as written.

use quick_xml::events::attributes::AttrError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::reader::NsReader;

/// Errors raised while parsing a document body.
#[derive(Debug, thiserror::Error)]
pub enum XmlError {
    #[error("document is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),
    #[error("malformed XML: {0}")]
    Syntax(#[from] quick_xml::Error),
    #[error("malformed attribute: {0}")]
    Attribute(#[from] AttrError),
    #[error("undeclared namespace prefix: {0}")]
    UnboundPrefix(String),
    #[error("document has no root element")]
    MissingRoot,
    #[error("document has more than one root element")]
    MultipleRoots,
    #[error("unexpected text outside the root element")]
    TextOutsideRoot,
    #[error("element <{0}> is not closed")]
    UnclosedElement(String),
}

/// An attribute as written on its element.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct XmlAttribute {
    pub name: String,
    pub value: String,
}

/// An element with its resolved namespace, attributes, child elements and text content.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct XmlElement {
    namespace: Option<String>,
    local_name: String,
    attributes: Vec<XmlAttribute>,
    children: Vec<XmlElement>,
    text: String,
}

impl XmlElement {
    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    pub fn attributes(&self) -> &[XmlAttribute] {
        &self.attributes
    }

    /// Value of the attribute named exactly `name`.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attr| attr.name == name)
            .map(|attr| attr.value.as_str())
    }

    pub fn children(&self) -> &[XmlElement] {
        &self.children
    }

    /// Concatenated text and CDATA content directly inside this element, trimmed.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// True if this element has the given namespace and local name.
    pub fn is(&self, namespace: Option<&str>, local_name: &str) -> bool {
        self.namespace.as_deref() == namespace && self.local_name == local_name
    }
}

/// A parsed document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct XmlDocument {
    root: XmlElement,
}

impl XmlDocument {
    /// Parse document bytes.
    ///
    /// # Errors
    ///
    /// Returns [`XmlError`] if the bytes are not UTF-8, are not well-formed XML, use an
    /// undeclared namespace prefix, or do not contain exactly one root element.
    pub fn parse(content: &[u8]) -> Result<Self, XmlError> {
        let text = std::str::from_utf8(content)?;
        let mut reader = NsReader::from_str(text);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            let (resolved, event) = reader.read_resolved_event()?;
            match event {
                Event::Start(start) => {
                    let namespace = owned_namespace(resolved, &start)?;
                    stack.push(open_element(namespace, &start)?);
                }
                Event::Empty(start) => {
                    let namespace = owned_namespace(resolved, &start)?;
                    let element = open_element(namespace, &start)?;
                    close_element(element, &mut stack, &mut root)?;
                }
                Event::End(_) => {
                    // End tag names are checked by the reader.
                    if let Some(element) = stack.pop() {
                        close_element(element, &mut stack, &mut root)?;
                    }
                }
                Event::Text(content) => {
                    let unescaped = content.unescape()?;
                    append_text(&mut stack, &unescaped)?;
                }
                Event::CData(content) => {
                    let raw = content.into_inner();
                    append_text(&mut stack, std::str::from_utf8(&raw)?)?;
                }
                Event::Eof => break,
                Event::Decl(_) | Event::PI(_) | Event::Comment(_) | Event::DocType(_) => {}
            }
        }

        if let Some(open) = stack.pop() {
            return Err(XmlError::UnclosedElement(open.local_name));
        }

        root.map(|root| Self { root }).ok_or(XmlError::MissingRoot)
    }

    pub fn root(&self) -> &XmlElement {
        &self.root
    }
}

fn owned_namespace(
    resolved: ResolveResult<'_>,
    start: &BytesStart<'_>,
) -> Result<Option<String>, XmlError> {
    match resolved {
        ResolveResult::Bound(ns) => Ok(Some(std::str::from_utf8(ns.as_ref())?.to_owned())),
        ResolveResult::Unbound => Ok(None),
        ResolveResult::Unknown(_) => Err(XmlError::UnboundPrefix(
            String::from_utf8_lossy(start.name().as_ref()).into_owned(),
        )),
    }
}

fn open_element(namespace: Option<String>, start: &BytesStart<'_>) -> Result<XmlElement, XmlError> {
    let local_name = std::str::from_utf8(start.local_name().as_ref())?.to_owned();

    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr?;
        let name = std::str::from_utf8(attr.key.as_ref())?;
        if name == "xmlns" || name.starts_with("xmlns:") {
            continue;
        }
        attributes.push(XmlAttribute {
            name: name.to_owned(),
            value: attr.unescape_value()?.into_owned(),
        });
    }

    Ok(XmlElement {
        namespace,
        local_name,
        attributes,
        children: Vec::new(),
        text: String::new(),
    })
}

fn close_element(
    element: XmlElement,
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(element);
            Ok(())
        }
        None if root.is_some() => Err(XmlError::MultipleRoots),
        None => {
            *root = Some(element);
            Ok(())
        }
    }
}

fn append_text(stack: &mut [XmlElement], content: &str) -> Result<(), XmlError> {
    let content = content.trim();
    if content.is_empty() {
        return Ok(());
    }
    let Some(current) = stack.last_mut() else {
        return Err(XmlError::TextOutsideRoot);
    };
    if !current.text.is_empty() {
        current.text.push(' ');
    }
    current.text.push_str(content);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HL7: &str = "urn:hl7-org:v3";

    #[test]
    fn parses_namespaced_tree() {
        let input = br#"<?xml version="1.0" encoding="UTF-8"?>
<ClinicalDocument xmlns="urn:hl7-org:v3" xmlns:sdtc="urn:hl7-org:sdtc">
  <!-- header -->
  <templateId root="2.16.840.1.113883.10.20.22.1.1"/>
  <title>Summary &amp; Plan</title>
  <sdtc:raceCode code="2106-3"/>
</ClinicalDocument>"#;

        let doc = XmlDocument::parse(input).expect("parse");
        let root = doc.root();

        assert!(root.is(Some(HL7), "ClinicalDocument"));
        assert!(root.attributes().is_empty());
        assert_eq!(root.children().len(), 3);
        assert_eq!(
            root.children()[0].attribute("root"),
            Some("2.16.840.1.113883.10.20.22.1.1")
        );
        assert_eq!(root.children()[1].text(), "Summary & Plan");
        assert!(root.children()[2].is(Some("urn:hl7-org:sdtc"), "raceCode"));
    }

    #[test]
    fn unprefixed_elements_without_default_namespace_are_unbound() {
        let doc = XmlDocument::parse(b"<a><b/></a>").expect("parse");
        assert!(doc.root().is(None, "a"));
        assert!(doc.root().children()[0].is(None, "b"));
    }

    #[test]
    fn cdata_is_kept_as_text() {
        let doc = XmlDocument::parse(b"<a><![CDATA[x < y]]></a>").expect("parse");
        assert_eq!(doc.root().text(), "x < y");
    }

    #[test]
    fn rejects_mismatched_end_tag() {
        let err = XmlDocument::parse(b"<a><b></a>").expect_err("should fail");
        assert!(matches!(err, XmlError::Syntax(_)));
    }

    #[test]
    fn rejects_unclosed_element() {
        let err = XmlDocument::parse(b"<a><b>").expect_err("should fail");
        assert!(matches!(
            err,
            XmlError::Syntax(_) | XmlError::UnclosedElement(_)
        ));
    }

    #[test]
    fn rejects_empty_document() {
        let err = XmlDocument::parse(b"").expect_err("should fail");
        assert!(matches!(err, XmlError::MissingRoot));
    }

    #[test]
    fn rejects_plain_text() {
        let err = XmlDocument::parse(b"not xml at all").expect_err("should fail");
        assert!(matches!(err, XmlError::TextOutsideRoot));
    }

    #[test]
    fn rejects_second_root() {
        let err = XmlDocument::parse(b"<a/><b/>").expect_err("should fail");
        assert!(matches!(err, XmlError::MultipleRoots));
    }

    #[test]
    fn rejects_undeclared_prefix() {
        let err = XmlDocument::parse(b"<x:a/>").expect_err("should fail");
        assert!(matches!(err, XmlError::UnboundPrefix(name) if name == "x:a"));
    }

    #[test]
    fn rejects_invalid_utf8() {
        let err = XmlDocument::parse(&[0x3c, 0x61, 0xff, 0x3e]).expect_err("should fail");
        assert!(matches!(err, XmlError::Encoding(_)));
    }
}
