//! BBC News article scraper.
//!
//! Only standard `/news/articles/...` pages are supported; live pages and
//! video posts use different markup and are filtered out at the index step.
//!
//! # Markup
//!
//! | Field | Source element |
//! |-------|----------------|
//! | headline | first `<h1>` |
//! | body | `<p>` inside `div[data-component="text-block"]` |
//! | byline | strings inside `div[data-component="byline-block"]` |
//! | timestamp | `datetime` of `time[data-testid="timestamp"]` |

use super::{Extractor, IndexSource};
use crate::error::{Error, Result};
use crate::http::{HttpRetriever, Retrieval};
use crate::models::ArticleFields;
use itertools::Itertools;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Node, Selector};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

static HEADLINE: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").unwrap());
static TEXT_BLOCK: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"div[data-component="text-block"]"#).unwrap());
static PARAGRAPH: Lazy<Selector> = Lazy::new(|| Selector::parse("p").unwrap());
static BYLINE_BLOCK: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"div[data-component="byline-block"]"#).unwrap());
static TIMESTAMP: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"time[data-testid="timestamp"]"#).unwrap());
static LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());

/// Elements serialized without a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track", "wbr",
];

/// [`Extractor`] for BBC News article pages.
#[derive(Debug, Clone, Copy, Default)]
pub struct BbcExtractor;

impl Extractor for BbcExtractor {
    fn extract(&self, raw_document: &str) -> ArticleFields {
        let document = Html::parse_document(raw_document);
        let mut fields = ArticleFields::default();

        fields.headline = headline(&document);
        if fields.headline.is_none() {
            warn!("Parse error: headline");
            fields.has_parse_errors = true;
        }

        fields.body = body(&document);
        if fields.body.is_none() {
            warn!("Parse error: body text blocks");
            fields.has_parse_errors = true;
        }

        // Some articles have no byline at all, so absence is not an error
        fields.byline = byline(&document);

        fields.timestamp_text = timestamp(&document);
        if fields.timestamp_text.is_none() {
            warn!("Parse error: timestamp");
            fields.has_parse_errors = true;
        }

        debug!(parse_errors = fields.has_parse_errors, "Extracted BBC article");
        fields
    }
}

fn headline(document: &Html) -> Option<String> {
    let h1 = document.select(&HEADLINE).next()?;
    let text = h1.text().collect::<String>();
    (!text.trim().is_empty()).then_some(text)
}

/// One `<p>` per line, as HTML with class attributes removed so links and
/// emphasis still count as content.
fn body(document: &Html) -> Option<String> {
    let mut paragraphs = Vec::new();
    let mut blocks = document.select(&TEXT_BLOCK).peekable();
    blocks.peek()?;

    for block in blocks {
        let before = paragraphs.len();
        for p in block.select(&PARAGRAPH) {
            let mut html = String::new();
            write_without_classes(p, &mut html);
            paragraphs.push(html);
        }
        if paragraphs.len() == before {
            return None;
        }
    }
    Some(paragraphs.join("\n").trim_end().to_string())
}

/// Serialize `element` as HTML, dropping every `class` attribute in the subtree.
///
/// Generated CSS class names churn between deploys without any edit to the
/// text. Text nodes are escaped the way the HTML serializer escapes them, so
/// text that merely looks like an attribute is kept.
fn write_without_classes(element: ElementRef<'_>, out: &mut String) {
    let el = element.value();
    out.push('<');
    out.push_str(el.name());
    for (name, value) in el.attrs().filter(|(name, _)| *name != "class") {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        escape_into(value, true, out);
        out.push('"');
    }
    out.push('>');
    if VOID_ELEMENTS.contains(&el.name()) {
        return;
    }

    for child in element.children() {
        match child.value() {
            Node::Text(text) => escape_into(text, false, out),
            Node::Comment(comment) => {
                out.push_str("<!--");
                out.push_str(comment);
                out.push_str("-->");
            }
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    write_without_classes(child, out);
                }
            }
            _ => {}
        }
    }

    out.push_str("</");
    out.push_str(el.name());
    out.push('>');
}

fn escape_into(s: &str, attribute: bool, out: &mut String) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            '"' if attribute => out.push_str("&quot;"),
            '<' if !attribute => out.push_str("&lt;"),
            '>' if !attribute => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

fn byline(document: &Html) -> Option<String> {
    let block = document.select(&BYLINE_BLOCK).next()?;
    Some(block.text().join(", "))
}

fn timestamp(document: &Html) -> Option<String> {
    let stamps = document
        .select(&TIMESTAMP)
        .filter_map(|t| t.value().attr("datetime"))
        .collect::<Vec<_>>();
    (!stamps.is_empty()).then(|| stamps.join(", "))
}

/// Article links on a BBC index page, resolved against `base`.
///
/// Keeps `/news/articles/` links and drops their `#comments` variants.
pub fn article_links(html: &str, base: &Url) -> BTreeSet<String> {
    let document = Html::parse_document(html);
    document
        .select(&LINK)
        .filter_map(|a| a.value().attr("href"))
        .filter(|href| href.contains("/news/articles/") && !href.contains("comments"))
        .filter_map(|href| base.join(href).ok())
        .map(|resolved| resolved.to_string())
        .collect()
}

/// [`IndexSource`] reading the BBC News front page through an [`HttpRetriever`].
#[derive(Debug, Clone)]
pub struct BbcIndex<H> {
    retriever: H,
    timeout: Duration,
}

impl<H: HttpRetriever> BbcIndex<H> {
    pub fn new(retriever: H, timeout: Duration) -> Self {
        Self { retriever, timeout }
    }
}

impl<H: HttpRetriever> IndexSource for BbcIndex<H> {
    #[instrument(level = "info", skip(self))]
    async fn candidate_urls(&self, index_url: &str) -> Result<BTreeSet<String>> {
        let base = Url::parse(index_url).map_err(|e| Error::Index(format!("{index_url}: {e}")))?;

        let html = match self.retriever.fetch(index_url, self.timeout).await {
            Retrieval::Success(html) => html,
            other => return Err(Error::Index(format!("{index_url}: {}", other.outcome()))),
        };

        let urls = article_links(&html, &base);
        info!(count = urls.len(), source = index_url, "Indexed BBC article URLs");
        Ok(urls)
    }
}
