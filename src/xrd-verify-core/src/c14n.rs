//! Exclusive XML Canonicalization 1.0, without comments.
//!
//! Only the namespace declarations an element visibly uses are emitted, so
//! a subtree canonicalizes the same way whether or not it is embedded in a
//! larger document.

use std::collections::BTreeMap;

use crate::xml::{Element, Node};

/// Algorithm URI.
pub const EXC_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";

/// Canonical form of `element` and its descendants.
#[must_use]
pub fn canonicalize(element: &Element) -> Vec<u8> {
    let mut out = String::new();
    write_element(element, &BTreeMap::new(), &mut out);
    out.into_bytes()
}

/// Namespace bindings already in force in the output, keyed by prefix
/// (`""` for the default namespace).
type Rendered = BTreeMap<String, String>;

fn write_element(element: &Element, rendered: &Rendered, out: &mut String) {
    let mut utilized: BTreeMap<String, String> = BTreeMap::new();
    utilized.insert(
        element.prefix.clone().unwrap_or_default(),
        element.namespace.clone().unwrap_or_default(),
    );
    for attr in &element.attributes {
        if let (Some(prefix), Some(ns)) = (&attr.prefix, &attr.namespace) {
            if prefix != "xml" {
                utilized.insert(prefix.clone(), ns.clone());
            }
        }
    }

    let mut in_scope = rendered.clone();
    let mut declarations = Vec::new();
    for (prefix, uri) in utilized {
        let already = match rendered.get(&prefix) {
            Some(existing) => *existing == uri,
            // An empty default namespace needs no declaration at the top.
            None => prefix.is_empty() && uri.is_empty(),
        };
        if already {
            continue;
        }
        declarations.push((prefix.clone(), uri.clone()));
        in_scope.insert(prefix, uri);
    }

    let name = element.qualified_name();
    out.push('<');
    out.push_str(&name);

    // BTreeMap iteration already sorts by prefix, default first.
    for (prefix, uri) in &declarations {
        if prefix.is_empty() {
            out.push_str(" xmlns=\"");
        } else {
            out.push_str(" xmlns:");
            out.push_str(prefix);
            out.push_str("=\"");
        }
        escape_attr(uri, out);
        out.push('"');
    }

    let mut attributes: Vec<_> = element.attributes.iter().collect();
    attributes.sort_by(|a, b| {
        let a_ns = a.namespace.as_deref().unwrap_or("");
        let b_ns = b.namespace.as_deref().unwrap_or("");
        (a_ns, a.local_name.as_str()).cmp(&(b_ns, b.local_name.as_str()))
    });
    for attr in attributes {
        out.push(' ');
        out.push_str(&attr.qualified_name());
        out.push_str("=\"");
        escape_attr(&attr.value, out);
        out.push('"');
    }
    out.push('>');

    for child in &element.children {
        match child {
            Node::Element(e) => write_element(e, &in_scope, out),
            Node::Text(text) => escape_text(text, out),
        }
    }

    out.push_str("</");
    out.push_str(&name);
    out.push('>');
}

fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            c => out.push(c),
        }
    }
}

fn escape_attr(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            c => out.push(c),
        }
    }
}
