//! Namespace-aware XML tree.
//!
//! Signature containers and hash-chain documents are small, so they are read
//! fully into an owned tree with every element and attribute name resolved to
//! its namespace URI. Comments and processing instructions are dropped;
//! document type declarations are rejected.

use std::borrow::Cow;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::TrustError;

/// Namespace bound to the reserved `xml` prefix.
pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// Deepest element nesting accepted by [`Document::parse`].
///
/// Tree walks over a parsed document recurse once per level.
pub const MAX_DEPTH: usize = 256;

/// An attribute with its resolved namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Prefix as written, if any.
    pub prefix: Option<String>,
    /// Local name.
    pub local_name: String,
    /// Namespace URI; unprefixed attributes have none.
    pub namespace: Option<String>,
    /// Normalized, unescaped value.
    pub value: String,
}

impl Attribute {
    /// Name as written in the document.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        qualify(self.prefix.as_deref(), &self.local_name)
    }
}

/// Child of an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Nested element.
    Element(Element),
    /// Character data, CDATA sections merged in.
    Text(String),
}

/// An element with its resolved namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Prefix as written, if any.
    pub prefix: Option<String>,
    /// Local name.
    pub local_name: String,
    /// Namespace URI, if the element is in one.
    pub namespace: Option<String>,
    /// Attributes other than namespace declarations, in document order.
    pub attributes: Vec<Attribute>,
    /// Child nodes in document order.
    pub children: Vec<Node>,
}

impl Element {
    /// Name as written in the document.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        qualify(self.prefix.as_deref(), &self.local_name)
    }

    /// Whether the element has namespace `ns` and local name `local`.
    #[must_use]
    pub fn is(&self, ns: &str, local: &str) -> bool {
        self.local_name == local && self.namespace.as_deref() == Some(ns)
    }

    /// Value of the unprefixed attribute `name`.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.namespace.is_none() && a.local_name == name)
            .map(|a| a.value.as_str())
    }

    /// Element children.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// Element children with the given name.
    pub fn children_named<'s>(
        &'s self,
        ns: &'s str,
        local: &'s str,
    ) -> impl Iterator<Item = &'s Element> + 's {
        self.elements().filter(move |e| e.is(ns, local))
    }

    /// First element child with the given name.
    #[must_use]
    pub fn child(&self, ns: &str, local: &str) -> Option<&Element> {
        self.elements().find(|e| e.is(ns, local))
    }

    /// Concatenated text of the direct text children.
    #[must_use]
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Text(t) => Some(t.as_str()),
                Node::Element(_) => None,
            })
            .collect()
    }

    /// Descendant-or-self element whose `Id` or `id` attribute is `id`.
    #[must_use]
    pub fn find_by_id(&self, id: &str) -> Option<&Element> {
        let matches = self
            .attributes
            .iter()
            .any(|a| a.namespace.is_none() && (a.local_name == "Id" || a.local_name == "id") && a.value == id);
        if matches {
            return Some(self);
        }
        self.elements().find_map(|child| child.find_by_id(id))
    }
}

/// A parsed XML document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    root: Element,
}

impl Document {
    /// Parse UTF-8 bytes.
    pub fn parse_bytes(data: &[u8]) -> Result<Self, TrustError> {
        let text = std::str::from_utf8(data)
            .map_err(|e| TrustError::invalid_xml(format!("document is not UTF-8: {e}")))?;
        Self::parse(text)
    }

    /// Parse a document.
    pub fn parse(text: &str) -> Result<Self, TrustError> {
        let text = text.strip_prefix('\u{FEFF}').unwrap_or(text);
        let normalized = normalize_line_endings(text);
        let mut reader = Reader::from_str(&normalized);

        let mut scopes: Vec<Vec<(Option<String>, String)>> = Vec::new();
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            let event = reader
                .read_event()
                .map_err(|e| TrustError::invalid_xml(format!("at byte {}: {e}", reader.buffer_position())))?;
            match event {
                Event::Start(start) => {
                    check_depth(stack.len() + 1)?;
                    let element = open_element(&start, &mut scopes)?;
                    stack.push(element);
                },
                Event::Empty(start) => {
                    check_depth(stack.len() + 1)?;
                    let element = open_element(&start, &mut scopes)?;
                    scopes.pop();
                    close_element(element, &mut stack, &mut root)?;
                },
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| TrustError::invalid_xml("unexpected end tag"))?;
                    scopes.pop();
                    close_element(element, &mut stack, &mut root)?;
                },
                Event::Text(text) => {
                    let text = text
                        .unescape()
                        .map_err(|e| TrustError::invalid_xml(e.to_string()))?;
                    append_text(&mut stack, &text)?;
                },
                Event::CData(data) => {
                    let data = String::from_utf8(data.into_inner().into_owned())
                        .map_err(|e| TrustError::invalid_xml(e.to_string()))?;
                    append_text(&mut stack, &data)?;
                },
                Event::DocType(_) => {
                    return Err(TrustError::invalid_xml("DOCTYPE is not allowed"));
                },
                Event::Comment(_) | Event::PI(_) | Event::Decl(_) => {},
                Event::Eof => break,
            }
        }

        if !stack.is_empty() {
            return Err(TrustError::invalid_xml("unclosed element at end of document"));
        }
        root.map(|root| Self { root })
            .ok_or_else(|| TrustError::invalid_xml("document has no root element"))
    }

    /// Root element.
    #[must_use]
    pub fn root(&self) -> &Element {
        &self.root
    }

    /// Consume the document, returning the root element.
    #[must_use]
    pub fn into_root(self) -> Element {
        self.root
    }
}

fn qualify(prefix: Option<&str>, local: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}:{local}"),
        None => local.to_string(),
    }
}

fn normalize_line_endings(text: &str) -> Cow<'_, str> {
    if text.contains('\r') {
        Cow::Owned(text.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        Cow::Borrowed(text)
    }
}

fn check_depth(depth: usize) -> Result<(), TrustError> {
    if depth > MAX_DEPTH {
        return Err(TrustError::invalid_xml(format!(
            "elements nested deeper than {MAX_DEPTH} levels"
        )));
    }
    Ok(())
}

fn utf8(bytes: &[u8]) -> Result<String, TrustError> {
    String::from_utf8(bytes.to_vec()).map_err(|e| TrustError::invalid_xml(e.to_string()))
}

fn lookup<'s>(scopes: &'s [Vec<(Option<String>, String)>], prefix: Option<&str>) -> Option<&'s str> {
    if prefix == Some("xml") {
        return Some(XML_NS);
    }
    scopes
        .iter()
        .rev()
        .flat_map(|scope| scope.iter().rev())
        .find(|(p, _)| p.as_deref() == prefix)
        .map(|(_, uri)| uri.as_str())
        .filter(|uri| !uri.is_empty())
}

fn open_element(
    start: &BytesStart<'_>,
    scopes: &mut Vec<Vec<(Option<String>, String)>>,
) -> Result<Element, TrustError> {
    let mut declarations = Vec::new();
    let mut raw_attributes = Vec::new();

    for attr in start.attributes() {
        let attr = attr.map_err(|e| TrustError::invalid_xml(e.to_string()))?;
        let key = attr.key.as_ref();

        // Attribute-value normalization happens before entity expansion so
        // that character references to whitespace survive.
        let raw = utf8(&attr.value)?.replace(['\t', '\n'], " ");
        let value = quick_xml::escape::unescape(&raw)
            .map_err(|e| TrustError::invalid_xml(e.to_string()))?
            .into_owned();

        if key == b"xmlns" {
            declarations.push((None, value));
        } else if let Some(prefix) = key.strip_prefix(b"xmlns:") {
            if value.is_empty() {
                return Err(TrustError::invalid_xml("prefixed namespace cannot be undeclared"));
            }
            declarations.push((Some(utf8(prefix)?), value));
        } else {
            let prefix = attr.key.prefix().map(|p| utf8(p.as_ref())).transpose()?;
            let local_name = utf8(attr.key.local_name().as_ref())?;
            raw_attributes.push((prefix, local_name, value));
        }
    }
    scopes.push(declarations);

    let name = start.name();
    let prefix = name.prefix().map(|p| utf8(p.as_ref())).transpose()?;
    let local_name = utf8(name.local_name().as_ref())?;
    let namespace = lookup(scopes, prefix.as_deref()).map(str::to_string);
    if prefix.is_some() && namespace.is_none() {
        return Err(TrustError::invalid_xml(format!(
            "unbound namespace prefix in <{}>",
            qualify(prefix.as_deref(), &local_name)
        )));
    }

    let mut attributes = Vec::with_capacity(raw_attributes.len());
    for (prefix, local_name, value) in raw_attributes {
        let namespace = match &prefix {
            Some(p) => Some(
                lookup(scopes, Some(p))
                    .ok_or_else(|| {
                        TrustError::invalid_xml(format!("unbound namespace prefix '{p}'"))
                    })?
                    .to_string(),
            ),
            None => None,
        };
        attributes.push(Attribute {
            prefix,
            local_name,
            namespace,
            value,
        });
    }

    Ok(Element {
        prefix,
        local_name,
        namespace,
        attributes,
        children: Vec::new(),
    })
}

fn close_element(
    element: Element,
    stack: &mut [Element],
    root: &mut Option<Element>,
) -> Result<(), TrustError> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(Node::Element(element));
            Ok(())
        },
        None if root.is_none() => {
            *root = Some(element);
            Ok(())
        },
        None => Err(TrustError::invalid_xml("more than one root element")),
    }
}

fn append_text(stack: &mut [Element], text: &str) -> Result<(), TrustError> {
    let Some(parent) = stack.last_mut() else {
        if text.trim().is_empty() {
            return Ok(());
        }
        return Err(TrustError::invalid_xml("text outside the root element"));
    };
    if let Some(Node::Text(existing)) = parent.children.last_mut() {
        existing.push_str(text);
    } else if !text.is_empty() {
        parent.children.push(Node::Text(text.to_string()));
    }
    Ok(())
}
