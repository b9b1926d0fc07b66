//! Minimal HTML fragment parser
//!
//! Good enough for captured element snippets and small test documents: start/end tags,
//! quoted and bare attributes, void elements, comments, doctypes, raw-text `<script>`/`<style>`
//! bodies and the common character references. Mis-nested end tags close up to the nearest
//! matching open element; unmatched end tags are ignored.

use crate::dom::element::{ElementNode, Node, is_void_tag};
use crate::error::{BrowserError, Result};

/// Parse an HTML fragment into its top-level nodes
pub fn parse_fragment(html: &str) -> Result<Vec<Node>> {
    // The bottom of the stack is a synthetic container for top-level nodes
    let mut stack: Vec<ElementNode> = vec![ElementNode::new("#fragment")];
    let bytes = html.as_bytes();
    let mut i = 0usize;

    while i < bytes.len() {
        if html[i..].starts_with("<!--") {
            let end = html[i + 4..]
                .find("-->")
                .ok_or_else(|| BrowserError::HtmlParse("unclosed HTML comment".into()))?;
            i += 4 + end + 3;
            continue;
        }

        if bytes[i] == b'<' && html[i..].starts_with("</") {
            let (tag, next) = parse_end_tag(html, i)?;
            i = next;
            close_element(&mut stack, &tag);
            continue;
        }

        if bytes[i] == b'<' && html[i..].starts_with("<!") {
            let end = html[i..]
                .find('>')
                .ok_or_else(|| BrowserError::HtmlParse("unclosed declaration".into()))?;
            i += end + 1;
            continue;
        }

        if bytes[i] == b'<' && bytes.get(i + 1).is_some_and(u8::is_ascii_alphabetic) {
            let (element, self_closing, next) = parse_start_tag(html, i)?;
            i = next;

            if matches!(element.tag_name.as_str(), "script" | "style" | "textarea" | "title") && !self_closing {
                let close = find_raw_end_tag(html, i, &element.tag_name)
                    .ok_or_else(|| BrowserError::HtmlParse(format!("unclosed <{}>", element.tag_name)))?;
                let mut element = element;
                let body = &html[i..close];
                if !body.is_empty() {
                    let text = if element.tag_name == "script" || element.tag_name == "style" {
                        body.to_string()
                    } else {
                        decode_entities(body)
                    };
                    element.children.push(Node::Text(text));
                }
                let (_, after_end) = parse_end_tag(html, close)?;
                i = after_end;
                push_node(&mut stack, Node::Element(element));
                continue;
            }

            if self_closing || is_void_tag(&element.tag_name) {
                push_node(&mut stack, Node::Element(element));
            } else {
                stack.push(element);
            }
            continue;
        }

        // Text run up to the next tag; a stray '<' is kept as text
        let start = i;
        i += 1;
        while i < bytes.len() && bytes[i] != b'<' {
            i += 1;
        }
        let text = decode_entities(&html[start..i]);
        if !text.is_empty() {
            push_node(&mut stack, Node::Text(text));
        }
    }

    // Unclosed elements are closed at end of input
    while stack.len() > 1 {
        if let Some(open) = stack.pop() {
            push_node(&mut stack, Node::Element(open));
        }
    }

    Ok(stack.pop().map(|fragment| fragment.children).unwrap_or_default())
}

/// Parse a fragment and return its first top-level element
pub fn parse_first_element(html: &str) -> Result<Option<ElementNode>> {
    Ok(parse_fragment(html)?.into_iter().find_map(|node| match node {
        Node::Element(element) => Some(element),
        Node::Text(_) => None,
    }))
}

fn push_node(stack: &mut [ElementNode], node: Node) {
    if let Some(parent) = stack.last_mut() {
        // Adjacent text runs are merged, as a browser would
        if let (Node::Text(text), Some(Node::Text(previous))) = (&node, parent.children.last_mut()) {
            previous.push_str(text);
            return;
        }
        parent.children.push(node);
    }
}

fn close_element(stack: &mut Vec<ElementNode>, tag: &str) {
    let Some(position) = stack.iter().rposition(|open| open.is_tag(tag)) else {
        return;
    };
    if position == 0 {
        return;
    }
    while stack.len() > position {
        if let Some(open) = stack.pop() {
            push_node(stack, Node::Element(open));
        }
    }
}

fn parse_end_tag(html: &str, start: usize) -> Result<(String, usize)> {
    let end = html[start..]
        .find('>')
        .ok_or_else(|| BrowserError::HtmlParse("unclosed end tag".into()))?;
    let tag = html[start + 2..start + end].trim().to_ascii_lowercase();
    Ok((tag, start + end + 1))
}

fn parse_start_tag(html: &str, start: usize) -> Result<(ElementNode, bool, usize)> {
    let bytes = html.as_bytes();
    let mut i = start + 1;

    let name_start = i;
    while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'>' && bytes[i] != b'/' {
        i += 1;
    }
    let mut element = ElementNode::new(&html[name_start..i]);
    let mut self_closing = false;

    loop {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() {
            return Err(BrowserError::HtmlParse(format!("unclosed start tag <{}>", element.tag_name)));
        }
        match bytes[i] {
            b'>' => {
                i += 1;
                break;
            }
            b'/' => {
                self_closing = true;
                i += 1;
                continue;
            }
            _ => {}
        }

        let key_start = i;
        while i < bytes.len() && !bytes[i].is_ascii_whitespace() && !matches!(bytes[i], b'=' | b'>' | b'/') {
            i += 1;
        }
        let key = &html[key_start..i];

        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }

        let mut value = String::new();
        if i < bytes.len() && bytes[i] == b'=' {
            i += 1;
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            if i < bytes.len() && (bytes[i] == b'"' || bytes[i] == b'\'') {
                let quote = bytes[i] as char;
                let value_start = i + 1;
                let close = html[value_start..]
                    .find(quote)
                    .ok_or_else(|| BrowserError::HtmlParse(format!("unterminated attribute value for '{}'", key)))?;
                value = decode_entities(&html[value_start..value_start + close]);
                i = value_start + close + 1;
            } else {
                let value_start = i;
                while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'>' {
                    i += 1;
                }
                value = decode_entities(&html[value_start..i]);
            }
        }

        // First occurrence wins for duplicated attributes
        if !key.is_empty() && !element.attributes.contains_key(&key.to_ascii_lowercase()) {
            element.add_attribute(key, value);
        }
        self_closing = false;
    }

    Ok((element, self_closing, i))
}

fn find_raw_end_tag(html: &str, from: usize, tag: &str) -> Option<usize> {
    let lower = html[from..].to_ascii_lowercase();
    lower.find(&format!("</{}", tag)).map(|offset| from + offset)
}

/// Decode the character references that show up in captured markup
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];

        let decoded = rest[1..].find(';').filter(|end| *end <= 10).and_then(|end| {
            let entity = &rest[1..1 + end];
            decode_entity(entity).map(|c| (c, end + 2))
        });

        match decoded {
            Some((c, consumed)) => {
                out.push(c);
                rest = &rest[consumed..];
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

fn decode_entity(entity: &str) -> Option<char> {
    if let Some(numeric) = entity.strip_prefix('#') {
        let code = match numeric.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => numeric.parse::<u32>().ok()?,
        };
        return char::from_u32(code);
    }
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_fragment() {
        let nodes = parse_fragment("<div class=\"example\" id=test><p>Hello</p><p>World</p></div>").unwrap();
        assert_eq!(nodes.len(), 1);

        let div = nodes[0].as_element().unwrap();
        assert_eq!(div.tag_name, "div");
        assert_eq!(div.get_attribute("class"), Some(&"example".to_string()));
        assert_eq!(div.get_attribute("id"), Some(&"test".to_string()));
        assert_eq!(div.elements().count(), 2);
        assert_eq!(div.text(), "HelloWorld");
    }

    #[test]
    fn test_void_and_bare_attributes() {
        let element = parse_first_element("<input type='text' value=\"Sample\" disabled>").unwrap().unwrap();
        assert_eq!(element.tag_name, "input");
        assert_eq!(element.get_attribute("type"), Some(&"text".to_string()));
        assert_eq!(element.get_attribute("disabled"), Some(&String::new()));
        assert!(element.children.is_empty());
    }

    #[test]
    fn test_comments_doctype_and_script_bodies() {
        let nodes =
            parse_fragment("<!DOCTYPE html><!-- note --><body><script>if (a < b) {}</script><p>x</p></body>").unwrap();
        let body = nodes[0].as_element().unwrap();
        let script = body.elements().next().unwrap();

        assert_eq!(script.tag_name, "script");
        assert_eq!(script.text(), "if (a < b) {}");
        assert_eq!(body.elements().nth(1).unwrap().text(), "x");
    }

    #[test]
    fn test_unclosed_and_misnested_tags() {
        let nodes = parse_fragment("<ul><li>one<li>two</span></ul>").unwrap();
        let ul = nodes[0].as_element().unwrap();
        assert_eq!(ul.text(), "onetwo");

        let nodes = parse_fragment("<div><p>open").unwrap();
        assert_eq!(nodes[0].as_element().unwrap().text(), "open");
    }

    #[test]
    fn test_decode_entities() {
        assert_eq!(decode_entities("Tom &amp; Jerry"), "Tom & Jerry");
        assert_eq!(decode_entities("&lt;b&gt; &#65;&#x42;"), "<b> AB");
        assert_eq!(decode_entities("AT&T rocks"), "AT&T rocks");
        assert_eq!(decode_entities("&unknown;"), "&unknown;");
    }

    #[test]
    fn test_unterminated_attribute_is_an_error() {
        assert!(parse_fragment("<a href=\"/x>link</a>").is_err());
    }
}
