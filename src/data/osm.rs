#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Node,
    Way,
}

impl ElementKind {
    /// Maps an XML element name to the kinds we shape. Everything else
    /// (relation, bounds, ...) yields `None` and is skipped by the driver.
    pub fn from_name(name: &[u8]) -> Option<ElementKind> {
        match name {
            b"node" => Some(ElementKind::Node),
            b"way" => Some(ElementKind::Way),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ElementKind::Node => "node",
            ElementKind::Way => "way",
        }
    }
}

/// One top-level element with its attributes and nested children, all in
/// document order. `node_refs` is only ever populated for ways.
#[derive(Debug, Clone)]
pub struct Element {
    pub kind: ElementKind,
    pub attributes: Vec<(String, String)>,
    pub tags: Vec<(String, String)>,
    pub node_refs: Vec<String>,
}

impl Element {
    pub fn new(kind: ElementKind, attributes: Vec<(String, String)>) -> Element {
        Element {
            kind,
            attributes,
            tags: Vec::new(),
            node_refs: Vec::new(),
        }
    }
}
