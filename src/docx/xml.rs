//! Minimal XML tree for WordprocessingML parts
//!
//! Start tags are kept verbatim so that untouched elements serialize back
//! byte for byte. Text nodes hold the escaped source text.

use std::sync::OnceLock;

use regex_lite::Regex;

use crate::core::error::DocumentError;

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)<!--.*?-->|<!\[CDATA\[.*?\]\]>|<[^>]*>|[^<]+").expect("token pattern is valid")
    })
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    /// Escaped character data
    Text(String),
    /// Declarations, comments, or pre-rendered markup, written verbatim
    Raw(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub name: String,
    /// The start tag exactly as it appeared, attributes included
    pub start_tag: String,
    pub children: Vec<Node>,
    pub self_closing: bool,
}

impl Element {
    /// First child element called `name`
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.elements().find(|el| el.name == name)
    }

    /// Child elements, skipping text
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(el) => Some(el),
            _ => None,
        })
    }

    /// Check whether the start tag carries any attribute
    pub fn has_attributes(&self) -> bool {
        self.start_tag.contains('=')
    }

    /// Unescaped value of attribute `name`
    pub fn attr(&self, name: &str) -> Option<String> {
        let tag = &self.start_tag;
        for quote in ['"', '\''] {
            let key = format!("{}={}", name, quote);
            let mut search = 0;
            while let Some(found) = tag[search..].find(&key) {
                let start = search + found;
                let preceded_by_space = tag[..start].chars().next_back().map_or(false, char::is_whitespace);
                let value_start = start + key.len();
                if preceded_by_space {
                    let value_end = tag[value_start..].find(quote)? + value_start;
                    return Some(unescape(&tag[value_start..value_end]));
                }
                search = value_start;
            }
        }
        None
    }

    /// Concatenated, unescaped text of all descendants
    pub fn text(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            match node {
                Node::Text(text) => out.push_str(&unescape(text)),
                Node::Element(el) => out.push_str(&el.text()),
                Node::Raw(_) => {}
            }
        }
        out
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_to(&mut out);
        out
    }

    fn write_to(&self, out: &mut String) {
        out.push_str(&self.start_tag);
        if self.self_closing {
            return;
        }
        write_nodes(&self.children, out);
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

fn write_nodes(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Element(el) => el.write_to(out),
            Node::Text(text) | Node::Raw(text) => out.push_str(text),
        }
    }
}

/// Serialize a node list
pub fn to_xml(nodes: &[Node]) -> String {
    let mut out = String::new();
    write_nodes(nodes, &mut out);
    out
}

fn tag_name(tag: &str) -> &str {
    let inner = tag.trim_start_matches('<');
    let end = inner
        .find(|c: char| c.is_whitespace() || c == '/' || c == '>')
        .unwrap_or(inner.len());
    &inner[..end]
}

/// Parse a document into a node list
pub fn parse(xml: &str) -> Result<Vec<Node>, DocumentError> {
    let mut roots = Vec::new();
    let mut stack: Vec<Element> = Vec::new();
    let mut expected = 0;

    for token in token_pattern().find_iter(xml) {
        if token.start() != expected {
            return Err(DocumentError::Xml(format!("unterminated tag at byte {}", expected)));
        }
        expected = token.end();
        let text = token.as_str();

        let node = if let Some(rest) = text.strip_prefix("</") {
            let name = rest.trim_end_matches('>').trim();
            let element = stack
                .pop()
                .ok_or_else(|| DocumentError::Xml(format!("unexpected </{}>", name)))?;
            if element.name != name {
                return Err(DocumentError::Xml(format!(
                    "</{}> closes <{}>",
                    name, element.name
                )));
            }
            Node::Element(element)
        } else if text.starts_with("<?") || text.starts_with("<!") {
            Node::Raw(text.to_string())
        } else if text.starts_with('<') {
            let element = Element {
                name: tag_name(text).to_string(),
                start_tag: text.to_string(),
                children: Vec::new(),
                self_closing: text.ends_with("/>"),
            };
            if !element.self_closing {
                stack.push(element);
                continue;
            }
            Node::Element(element)
        } else {
            Node::Text(text.to_string())
        };

        match stack.last_mut() {
            Some(parent) => parent.children.push(node),
            None => roots.push(node),
        }
    }

    if expected != xml.len() {
        return Err(DocumentError::Xml(format!("unterminated tag at byte {}", expected)));
    }
    if let Some(open) = stack.last() {
        return Err(DocumentError::Xml(format!("<{}> is never closed", open.name)));
    }
    Ok(roots)
}

/// Depth-first search for the first element called `name`
pub fn find_mut<'a>(nodes: &'a mut [Node], name: &str) -> Option<&'a mut Element> {
    for node in nodes.iter_mut() {
        if let Node::Element(el) = node {
            if el.name == name {
                return Some(el);
            }
            if let Some(found) = find_mut(&mut el.children, name) {
                return Some(found);
            }
        }
    }
    None
}

/// Depth-first search for the first element called `name`
pub fn find<'a>(nodes: &'a [Node], name: &str) -> Option<&'a Element> {
    nodes.iter().find_map(|node| match node {
        Node::Element(el) if el.name == name => Some(el),
        Node::Element(el) => find(&el.children, name),
        _ => None,
    })
}

/// Escape character data and attribute values
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn unescape(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let Some(semi) = rest.find(';') else {
            break;
        };
        let entity = &rest[1..semi];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                .and_then(char::from_u32),
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trip_is_verbatim() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?><w:document xmlns:w="x"><w:body><w:p w:rsidR="00A1"><w:r><w:t xml:space="preserve">A &amp; B</w:t></w:r></w:p><w:sectPr/></w:body></w:document>"#;
        let nodes = parse(xml).unwrap();
        assert_eq!(to_xml(&nodes), xml);
    }

    #[test]
    fn test_attributes_and_text() {
        let nodes = parse(r#"<w:ins w:id="3" w:author="A &amp; B"><w:r><w:t>x&lt;y</w:t></w:r></w:ins>"#).unwrap();
        let ins = find(&nodes, "w:ins").unwrap();
        assert_eq!(ins.attr("w:id").as_deref(), Some("3"));
        assert_eq!(ins.attr("w:author").as_deref(), Some("A & B"));
        assert_eq!(ins.attr("id"), None);
        assert_eq!(ins.text(), "x<y");
    }

    #[test]
    fn test_mismatched_tags() {
        assert!(parse("<a><b></a>").is_err());
        assert!(parse("<a>").is_err());
        assert!(parse("<a></a><b").is_err());
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape("&#65;&#x42;&apos;&bogus; &"), "AB'&bogus; &");
        assert_eq!(escape("<\"&\">"), "&lt;&quot;&amp;&quot;&gt;");
    }

    #[test]
    fn test_find_mut() {
        let mut nodes = parse("<a><b><c/></b></a>").unwrap();
        let b = find_mut(&mut nodes, "b").unwrap();
        b.children.clear();
        assert_eq!(to_xml(&nodes), "<a><b></b></a>");
    }
}
