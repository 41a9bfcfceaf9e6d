//! The editor document tree and the reference extractor.
//!
//! Documents arrive from the editor as a JSON forest of element and text nodes. Two element
//! kinds are recognized: concept references (`"type": "concept"`) and tag references
//! (`"type": "tag"`), each carrying the referenced name in a `name` attribute. Every other
//! element is kept opaque; its attributes round-trip untouched.
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

use crate::error::ConceptError;

pub const CONCEPT_NODE: &str = "concept";
pub const TAG_NODE: &str = "tag";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(pub Vec<Node>);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawNode", into = "RawNode")]
pub enum Node {
    Concept(Reference),
    Tag(Reference),
    Element(Element),
    Text(Text),
}

/// An inline reference to a concept or tag by name.
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub name: String,
    pub children: Vec<Node>,
    pub attributes: Map<String, Value>,
}

/// Any element the graph engine does not interpret.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub children: Vec<Node>,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Text {
    pub text: String,
    #[serde(flatten)]
    pub marks: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawNode {
    Element(Element),
    Text(Text),
}

impl From<RawNode> for Node {
    fn from(raw: RawNode) -> Self {
        let mut element = match raw {
            RawNode::Text(text) => return Node::Text(text),
            RawNode::Element(element) => element,
        };
        let is_reference = matches!(element.kind.as_deref(), Some(CONCEPT_NODE | TAG_NODE));
        let name = match element.attributes.get("name") {
            Some(Value::String(name)) if is_reference => Some(name.clone()),
            _ => None,
        };
        // Unrecognized, or a reference element without a usable name
        let Some(name) = name else {
            return Node::Element(element);
        };
        element.attributes.remove("name");
        let reference = Reference {
            name,
            children: element.children,
            attributes: element.attributes,
        };
        match element.kind.as_deref() {
            Some(CONCEPT_NODE) => Node::Concept(reference),
            _ => Node::Tag(reference),
        }
    }
}

impl From<Node> for RawNode {
    fn from(node: Node) -> Self {
        let (kind, reference) = match node {
            Node::Text(text) => return RawNode::Text(text),
            Node::Element(element) => return RawNode::Element(element),
            Node::Concept(reference) => (CONCEPT_NODE, reference),
            Node::Tag(reference) => (TAG_NODE, reference),
        };
        let mut attributes = reference.attributes;
        attributes.insert("name".to_string(), Value::String(reference.name));
        RawNode::Element(Element {
            kind: Some(kind.to_string()),
            children: reference.children,
            attributes,
        })
    }
}

impl Node {
    pub fn text(text: &str) -> Node {
        Node::Text(Text {
            text: text.to_string(),
            marks: Map::new(),
        })
    }

    pub fn concept(name: &str) -> Node {
        Node::Concept(Reference::new(name))
    }

    pub fn tag(name: &str) -> Node {
        Node::Tag(Reference::new(name))
    }

    pub fn paragraph(children: Vec<Node>) -> Node {
        Node::Element(Element {
            kind: Some("paragraph".to_string()),
            children,
            attributes: Map::new(),
        })
    }

    pub fn children(&self) -> &[Node] {
        match self {
            Node::Concept(reference) | Node::Tag(reference) => &reference.children,
            Node::Element(element) => &element.children,
            Node::Text(_) => &[],
        }
    }
}

impl Reference {
    pub fn new(name: &str) -> Self {
        Reference {
            name: name.to_string(),
            children: vec![Node::text("")],
            attributes: Map::new(),
        }
    }
}

impl Document {
    /// The body of a note that has never been written: one empty block.
    pub fn empty() -> Self {
        Document(vec![Node::Element(Element {
            kind: None,
            children: vec![Node::text("")],
            attributes: Map::new(),
        })])
    }

    pub fn is_empty_sentinel(&self) -> bool {
        *self == Document::empty()
    }

    pub fn parse(body: &str) -> Result<Self, ConceptError> {
        Ok(serde_json::from_str(body)?)
    }

    /// Serialized form stored as the note body. Deterministic for a given tree.
    pub fn to_body(&self) -> Result<String, ConceptError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Names referenced by a document, in first-occurrence order without duplicates.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct References {
    pub concepts: Vec<String>,
    pub tags: Vec<String>,
}

/// Collect the concept and tag names carried by reference nodes, depth first in document
/// order. Pure and cheap enough to run on every save.
pub fn extract_references(doc: &Document) -> References {
    let mut refs = References::default();
    let mut seen_concepts = HashSet::new();
    let mut seen_tags = HashSet::new();
    let mut stack: Vec<&Node> = doc.0.iter().rev().collect();
    while let Some(node) = stack.pop() {
        match node {
            Node::Concept(reference) => {
                if seen_concepts.insert(reference.name.as_str()) {
                    refs.concepts.push(reference.name.clone());
                }
            }
            Node::Tag(reference) => {
                if seen_tags.insert(reference.name.as_str()) {
                    refs.tags.push(reference.name.clone());
                }
            }
            Node::Element(_) | Node::Text(_) => {}
        }
        stack.extend(node.children().iter().rev());
    }
    refs
}
