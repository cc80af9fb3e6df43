//! Source-specific scraping: finding article URLs and extracting their content.
//!
//! Each source module provides the two collaborators a monitoring cycle needs:
//!
//! 1. **Index**: an [`IndexSource`] that lists candidate article URLs from the
//!    source's front page
//! 2. **Extraction**: an [`Extractor`] that turns one raw article page into
//!    normalized [`ArticleFields`]
//!
//! # Supported Sources
//!
//! | Source | Module | Index page | Notes |
//! |--------|--------|------------|-------|
//! | BBC News | [`bbc`] | `https://www.bbc.co.uk/news` | `/news/articles/` pages only |
//!
//! Extractors must normalize text themselves (paragraph-joined, decorative
//! markup stripped) because change detection compares fields with plain
//! equality.

pub mod bbc;

use crate::error::Result;
use crate::models::ArticleFields;
use std::collections::BTreeSet;

/// Turns a raw article document into structured fields. Must be pure.
pub trait Extractor {
    fn extract(&self, raw_document: &str) -> ArticleFields;
}

/// Lists the article URLs currently linked from an index page.
pub trait IndexSource {
    /// Deduplicated candidate URLs, or an error when the page is unavailable.
    async fn candidate_urls(&self, index_url: &str) -> Result<BTreeSet<String>>;
}
