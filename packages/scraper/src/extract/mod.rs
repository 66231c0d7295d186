//! Page extractors.
//!
//! A [`PageExtractor`] turns one fetched page body into raw records and an
//! optional link to the next page. Extractors are pure and synchronous: they
//! never fetch, and a selector that matches nothing just leaves the field
//! empty. The [`crate::pagination::PaginationWalker`] does the rest
//! (canonicalizing URL fields, resolving the next link, stamping row data).

pub mod directory;
pub mod place;

use std::collections::BTreeMap;
use std::sync::Arc;

use listcrawl_crawl_models::{PageContext, SiteProfile};
use scraper::{ElementRef, Selector};

pub use directory::DirectoryExtractor;
pub use place::PlaceExtractor;

/// One record as read off the page, before row data is attached.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    /// Field values keyed by schema name. Missing keys become `""`.
    pub values: BTreeMap<String, String>,
    /// Absolute URL of the listing itself, when the page links to one.
    /// The walker falls back to the page URL.
    pub source_url: Option<String>,
}

impl RawRecord {
    /// Sets a field value. Whitespace-only values are stored as `""`.
    pub fn set(&mut self, field: &str, value: &str) {
        self.values.insert(field.to_owned(), value.trim().to_owned());
    }
}

/// Everything extracted from one page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageExtraction {
    /// Records in page order.
    pub records: Vec<RawRecord>,
    /// Raw `href` of the next page link, unresolved.
    pub next_url: Option<String>,
}

/// Extracts records from a page body.
pub trait PageExtractor: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Output field names in column order.
    fn fields(&self) -> &'static [&'static str];

    /// Fields holding outbound URLs, canonicalized by the walker.
    fn url_fields(&self) -> &'static [&'static str] {
        &[]
    }

    /// Extracts the records and next link from `body`.
    fn extract(&self, page: &PageContext<'_>, body: &str) -> PageExtraction;
}

/// Returns the built-in extractor for a site profile.
#[must_use]
pub fn extractor_for(profile: SiteProfile) -> Arc<dyn PageExtractor> {
    match profile {
        SiteProfile::Directory => Arc::new(DirectoryExtractor),
        SiteProfile::Place => Arc::new(PlaceExtractor),
    }
}

/// Parses a selector literal.
pub(crate) fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|_| unreachable!("invalid selector literal: {css}"))
}

/// Collapses runs of whitespace into single spaces and trims the ends.
pub(crate) fn normalize_space(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalized text of the first element under `scope` matching `sel`.
pub(crate) fn first_text(scope: ElementRef<'_>, sel: &Selector) -> String {
    scope
        .select(sel)
        .next()
        .map(|el| normalize_space(&el.text().collect::<String>()))
        .unwrap_or_default()
}

/// Attribute `attr` of the first element under `scope` matching `sel`.
pub(crate) fn first_attr(scope: ElementRef<'_>, sel: &Selector, attr: &str) -> String {
    scope
        .select(sel)
        .find_map(|el| el.value().attr(attr))
        .map(normalize_space)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use scraper::Html;

    use super::*;

    #[test]
    fn normalize_space_collapses_runs() {
        assert_eq!(normalize_space("  a \n\t b  c "), "a b c");
        assert_eq!(normalize_space("   "), "");
    }

    #[test]
    fn first_helpers_return_empty_when_nothing_matches() {
        let html = Html::parse_fragment("<div><span class='x'> hi  there </span></div>");
        let root = html.root_element();

        assert_eq!(first_text(root, &selector("span.x")), "hi there");
        assert_eq!(first_text(root, &selector("span.y")), "");
        assert_eq!(first_attr(root, &selector("span.x"), "title"), "");
    }

    #[test]
    fn profiles_map_to_extractors() {
        assert_eq!(extractor_for(SiteProfile::Directory).name(), "directory");
        assert_eq!(extractor_for(SiteProfile::Place).name(), "place");
    }
}
