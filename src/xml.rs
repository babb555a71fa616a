//! Helpers for navigating provider XML documents.

use roxmltree::{Document, Node};

use crate::error::{Error, Result};

/// Decode a payload as UTF-8 text.
pub fn as_text(body: &[u8]) -> Result<&str> {
    std::str::from_utf8(body).map_err(|e| Error::Parse(format!("payload is not UTF-8: {}", e)))
}

/// Parse a payload whose root must be `<yandexsearch>`.
pub fn parse(text: &str) -> Result<Document<'_>> {
    let doc = Document::parse(text)?;
    if !doc.root_element().has_tag_name("yandexsearch") {
        return Err(Error::Parse(format!(
            "unexpected root element <{}>",
            doc.root_element().tag_name().name()
        )));
    }
    Ok(doc)
}

/// First child element with the given name.
pub fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|n| n.is_element() && n.has_tag_name(name))
}

/// All child elements with the given name.
pub fn children<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    name: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children()
        .filter(move |n| n.is_element() && n.has_tag_name(name))
}

/// Follow a chain of child element names.
pub fn path<'a, 'input>(node: Node<'a, 'input>, names: &[&str]) -> Option<Node<'a, 'input>> {
    names.iter().try_fold(node, |n, name| child(n, name))
}

/// All descendant text, so highlighted fragments stay in place.
pub fn text(node: Node<'_, '_>) -> String {
    node.descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect()
}

/// Trimmed text of a named child, empty when absent.
pub fn child_text(node: Node<'_, '_>, name: &str) -> String {
    child(node, name)
        .map(|n| text(n).trim().to_string())
        .unwrap_or_default()
}

/// The `<response>` element, failing with `Error::Provider` when it
/// carries an `<error>`.
pub fn response<'a, 'input>(doc: &'a Document<'input>) -> Result<Node<'a, 'input>> {
    let response = child(doc.root_element(), "response")
        .ok_or_else(|| Error::Parse("missing <response> element".to_string()))?;

    if let Some(error) = child(response, "error") {
        return Err(Error::Provider {
            code: error.attribute("code").and_then(|c| c.trim().parse().ok()),
            message: text(error).trim().to_string(),
        });
    }

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_is_reported() {
        let body = r#"<?xml version="1.0" encoding="utf-8"?>
<yandexsearch version="1.0"><response><error code="32">Limit exceeded</error></response></yandexsearch>"#;
        let doc = parse(body).unwrap();
        match response(&doc) {
            Err(Error::Provider { code, message }) => {
                assert_eq!(code, Some(32));
                assert_eq!(message, "Limit exceeded");
            }
            other => panic!("expected provider error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_text_includes_highlighted_words() {
        let body = r#"<yandexsearch><response><title>The <hlword>Rust</hlword> book</title></response></yandexsearch>"#;
        let doc = parse(body).unwrap();
        let response = response(&doc).unwrap();
        assert_eq!(child_text(response, "title"), "The Rust book");
        assert_eq!(child_text(response, "missing"), "");
    }

    #[test]
    fn test_rejects_foreign_documents() {
        assert!(matches!(parse("<html/>"), Err(Error::Parse(_))));
        assert!(matches!(parse("not xml"), Err(Error::Parse(_))));
        assert!(matches!(as_text(&[0xff, 0xfe]), Err(Error::Parse(_))));
    }
}
