//! Search response parsing.

use chrono::{DateTime, NaiveDateTime, Utc};
use roxmltree::Node;

use crate::error::{Error, Result};
use crate::models::{SearchRecord, SearchResponse};
use crate::xml;

const MODTIME_FORMAT: &str = "%Y%m%dT%H%M%S";

fn parse_modtime(value: &str) -> Result<Option<DateTime<Utc>>> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    NaiveDateTime::parse_from_str(value, MODTIME_FORMAT)
        .map(|naive| Some(naive.and_utc()))
        .map_err(|e| Error::Parse(format!("bad modtime '{}': {}", value, e)))
}

fn parse_size(value: &str) -> Result<u64> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(0);
    }
    value
        .parse()
        .map_err(|e| Error::Parse(format!("bad document size '{}': {}", value, e)))
}

/// The `found` estimate, preferring the `priority="all"` variant.
fn found(response: Node<'_, '_>) -> Option<u64> {
    let nodes: Vec<Node<'_, '_>> = xml::children(response, "found").collect();
    nodes
        .iter()
        .find(|n| n.attribute("priority") == Some("all"))
        .or_else(|| nodes.first())
        .and_then(|n| xml::text(*n).trim().parse().ok())
}

fn record(position: usize, doc: Node<'_, '_>) -> Result<SearchRecord> {
    let snippet = xml::path(doc, &["passages", "passage"])
        .map(|p| xml::text(p).trim().to_string())
        .unwrap_or_default();

    // Some responses nest the language under <properties>.
    let mut lang = xml::child_text(doc, "lang");
    if lang.is_empty() {
        if let Some(properties) = xml::child(doc, "properties") {
            lang = xml::child_text(properties, "lang");
        }
    }

    Ok(SearchRecord {
        position,
        domain: xml::child_text(doc, "domain"),
        url: xml::child_text(doc, "url"),
        title: xml::child_text(doc, "title"),
        snippet,
        lang,
        charset: xml::child_text(doc, "charset"),
        size: parse_size(&xml::child_text(doc, "size"))?,
        modified: parse_modtime(&xml::child_text(doc, "modtime"))?,
    })
}

/// Parse a search payload into a flat record list.
///
/// One record per group, taken from the group's first document, in the
/// order the provider ranked them.
pub fn parse_search(body: &[u8]) -> Result<SearchResponse> {
    let text = xml::as_text(body)?;
    let doc = xml::parse(text)?;
    let response = xml::response(&doc)?;

    let query = xml::path(doc.root_element(), &["request", "query"])
        .map(|n| xml::text(n).trim().to_string())
        .filter(|q| !q.is_empty());
    let reqid = Some(xml::child_text(response, "reqid")).filter(|r| !r.is_empty());
    let found_human = Some(xml::child_text(response, "found-human")).filter(|h| !h.is_empty());

    let mut records = Vec::new();
    if let Some(grouping) = xml::path(response, &["results", "grouping"]) {
        for group in xml::children(grouping, "group") {
            if let Some(first) = xml::child(group, "doc") {
                records.push(record(records.len() + 1, first)?);
            }
        }
    }

    Ok(SearchResponse {
        reqid,
        query,
        found: found(response),
        found_human,
        records,
    })
}
