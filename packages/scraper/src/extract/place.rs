//! Map place pages: one business per page, no pagination.

use listcrawl_crawl_models::PageContext;
use scraper::Html;

use super::{PageExtraction, PageExtractor, RawRecord, first_attr, first_text, selector};

const FIELDS: &[&str] = &[
    "company_name",
    "address",
    "website",
    "phone",
    "google_map_category",
];

/// Extractor for single place pages.
///
/// Always yields exactly one record, even when every field is empty, so each
/// input row shows up in the output.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceExtractor;

impl PageExtractor for PlaceExtractor {
    fn name(&self) -> &'static str {
        "place"
    }

    fn fields(&self) -> &'static [&'static str] {
        FIELDS
    }

    fn url_fields(&self) -> &'static [&'static str] {
        &["website"]
    }

    fn extract(&self, _page: &PageContext<'_>, body: &str) -> PageExtraction {
        let document = Html::parse_document(body);
        let root = document.root_element();

        let phone = first_attr(root, &selector("a[href^='tel:']"), "href");
        let phone = phone
            .get(..4)
            .filter(|prefix| prefix.eq_ignore_ascii_case("tel:"))
            .map_or(phone.as_str(), |_| &phone[4..]);

        let mut record = RawRecord::default();
        record.set("company_name", &first_text(root, &selector("h1")));
        record.set(
            "address",
            &first_attr(root, &selector("button[aria-label^='Address:']"), "aria-label"),
        );
        record.set(
            "website",
            &first_attr(
                root,
                &selector("a[data-item-id='authority'][href^='http']"),
                "href",
            ),
        );
        record.set("phone", phone);
        record.set(
            "google_map_category",
            &first_text(root, &selector("button.DkEaL")),
        );

        PageExtraction {
            records: vec![record],
            next_url: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use listcrawl_crawl_models::SeedRow;

    use super::*;

    fn extract(body: &str) -> RawRecord {
        let row = SeedRow::new(0, "https://maps.example/place/1");
        let page = PageContext::new(&row, &row.seed_url, 1);
        let mut extraction = PlaceExtractor.extract(&page, body);
        assert!(extraction.next_url.is_none());
        assert_eq!(extraction.records.len(), 1);
        extraction.records.remove(0)
    }

    #[test]
    fn extracts_place_details() {
        let record = extract(
            r#"
            <h1 class="DUwDvf">  Joe's   Cafe </h1>
            <button class="DkEaL ">Coffee shop</button>
            <button aria-label="Address: 1 Main St, Ottawa, ON">1 Main St</button>
            <a data-item-id="authority" href="https://joescafe.example/">joescafe.example</a>
            <a href="tel:+16135550100">Call</a>
            "#,
        );

        assert_eq!(record.values["company_name"], "Joe's Cafe");
        assert_eq!(record.values["address"], "Address: 1 Main St, Ottawa, ON");
        assert_eq!(record.values["website"], "https://joescafe.example/");
        assert_eq!(record.values["phone"], "+16135550100");
        assert_eq!(record.values["google_map_category"], "Coffee shop");
    }

    #[test]
    fn non_http_authority_links_are_ignored() {
        let record = extract(r#"<a data-item-id="authority" href="/local">x</a>"#);
        assert_eq!(record.values["website"], "");
    }

    #[test]
    fn empty_page_still_yields_one_blank_record() {
        let record = extract("<html></html>");
        assert!(record.values.values().all(String::is_empty));
        assert_eq!(record.values.len(), FIELDS.len());
    }
}
