//! Document rendering.
//!
//! The transform from a clinical document to its structured (JSON) form is an injected
//! capability: anything implementing [`DocumentRenderer`] can be plugged into the
//! aggregator. [`CdaJsonRenderer`] is the built-in transform used by the binaries.

use crate::xml::{XmlDocument, XmlElement};
use serde_json::{Map, Value};

/// Failure reported by a renderer.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct RenderError(pub String);

/// Transforms a parsed document into a JSON fragment.
pub trait DocumentRenderer: Send + Sync {
    fn render(&self, document: &XmlDocument) -> Result<String, RenderError>;
}

/// Deterministic XML to JSON transform.
///
/// Each element becomes an object keyed by child local name. Attributes are stored under
/// `@name`, text content under `#text`, and repeated children collapse into an array in
/// document order. An element with only text becomes a string; an empty element becomes
/// `null`. The output is wrapped in an object keyed by the root element's local name.
#[derive(Clone, Copy, Debug, Default)]
pub struct CdaJsonRenderer;

impl CdaJsonRenderer {
    pub fn new() -> Self {
        Self
    }

    pub fn to_value(document: &XmlDocument) -> Value {
        let root = document.root();
        let mut wrapper = Map::new();
        wrapper.insert(root.local_name().to_owned(), element_to_value(root));
        Value::Object(wrapper)
    }
}

impl DocumentRenderer for CdaJsonRenderer {
    fn render(&self, document: &XmlDocument) -> Result<String, RenderError> {
        serde_json::to_string(&Self::to_value(document)).map_err(|e| RenderError(e.to_string()))
    }
}

fn element_to_value(element: &XmlElement) -> Value {
    if element.attributes().is_empty() && element.children().is_empty() {
        return if element.text().is_empty() {
            Value::Null
        } else {
            Value::String(element.text().to_owned())
        };
    }

    let mut object = Map::new();
    for attr in element.attributes() {
        object.insert(format!("@{}", attr.name), Value::String(attr.value.clone()));
    }

    for child in element.children() {
        let value = element_to_value(child);
        match object.get_mut(child.local_name()) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                object.insert(child.local_name().to_owned(), value);
            }
        }
    }

    if !element.text().is_empty() {
        object.insert("#text".into(), Value::String(element.text().to_owned()));
    }

    Value::Object(object)
}
