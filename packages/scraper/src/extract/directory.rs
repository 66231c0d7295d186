//! Business directory search result pages.
//!
//! Each result page lists several businesses in `listingInfo` blocks and
//! links to the following page with a `Next` anchor (or `rel="next"`).

use listcrawl_crawl_models::PageContext;
use scraper::Html;
use url::Url;

use super::{PageExtraction, PageExtractor, RawRecord, first_attr, first_text, selector};

const FIELDS: &[&str] = &[
    "business_name",
    "street",
    "city",
    "postal_code",
    "phone",
    "website",
    "rating",
    "review",
    "logo_url",
];

/// Extractor for paginated directory listing pages.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectoryExtractor;

impl PageExtractor for DirectoryExtractor {
    fn name(&self) -> &'static str {
        "directory"
    }

    fn fields(&self) -> &'static [&'static str] {
        FIELDS
    }

    fn url_fields(&self) -> &'static [&'static str] {
        &["website"]
    }

    fn extract(&self, page: &PageContext<'_>, body: &str) -> PageExtraction {
        let document = Html::parse_document(body);
        let base = Url::parse(&page.current_url).ok();

        let listing_sel = selector("div[class*='listingInfo']");
        let name_sel = selector("a[class*='ListingName']");
        let street_sel = selector("span[class*='listing__address--full'] span[itemprop='streetAddress']");
        let city_sel = selector("span[class*='listing__address--full'] span[itemprop='addressLocality']");
        let postal_sel = selector("span[class*='listing__address--full'] span[itemprop='postalCode']");
        let phone_sel = selector("a[title*='Get the Phone Number']");
        let website_sel = selector("li[class*='website'] a");
        let rating_sel = selector("span[title*='out of 5 stars']");
        let review_sel = selector("a[class*='listing__ratings__count']");
        let logo_sel = selector("img[class*='MerchantLogo']");

        let records = document
            .select(&listing_sel)
            .map(|listing| {
                let mut record = RawRecord::default();
                record.set("business_name", &first_text(listing, &name_sel));
                record.set("street", &first_text(listing, &street_sel));
                record.set("city", &first_text(listing, &city_sel));
                record.set("postal_code", &first_text(listing, &postal_sel));
                record.set("phone", &first_attr(listing, &phone_sel, "data-phone"));
                record.set("website", &first_attr(listing, &website_sel, "href"));
                record.set("rating", &first_attr(listing, &rating_sel, "aria-label"));
                record.set("review", &first_text(listing, &review_sel));
                record.set("logo_url", &first_attr(listing, &logo_sel, "src"));

                let href = first_attr(listing, &name_sel, "href");
                if !href.is_empty() {
                    record.source_url = base
                        .as_ref()
                        .and_then(|base| base.join(&href).ok())
                        .map(String::from);
                }
                record
            })
            .collect::<Vec<_>>();

        log::debug!(
            "[{}] page {}: {} listing(s) on {}",
            page.row.index,
            page.page_number,
            records.len(),
            page.current_url,
        );

        PageExtraction {
            records,
            next_url: next_link(&document),
        }
    }
}

/// The first anchor whose text mentions `Next`, else the first
/// `rel="next"` anchor.
fn next_link(document: &Html) -> Option<String> {
    let anchor_sel = selector("a[href]");
    let rel_sel = selector("a[rel='next'][href]");

    document
        .select(&anchor_sel)
        .find(|a| a.text().any(|t| t.contains("Next")))
        .or_else(|| document.select(&rel_sel).next())
        .and_then(|a| a.value().attr("href"))
        .map(str::trim)
        .filter(|href| !href.is_empty())
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use listcrawl_crawl_models::SeedRow;

    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <div class="listing__content listingInfo">
            <a class="listing__name--link listing__link jsListingName ListingName"
               href="/bus/Ontario/Ottawa/Joes-Plumbing/123.html">Joe's
               Plumbing</a>
            <span class="listing__address listing__address--full">
              <span itemprop="streetAddress">12 Bank St</span>
              <span itemprop="addressLocality">Ottawa</span>
              <span itemprop="postalCode">K1P 5N2</span>
            </span>
            <a title="Get the Phone Number" data-phone="613-555-0100">Phone</a>
            <ul><li class="mlr__item mlr__item--website">
              <a href="/gourl/abc?redirect=https%3A%2F%2Fjoes.example%2F">Website</a>
            </li></ul>
            <span title="4.5 out of 5 stars" aria-label="4.5 out of 5 stars"></span>
            <a class="listing__ratings__count">12 reviews</a>
            <img class="MerchantLogo" src="https://cdn.example/logo.png">
          </div>
          <div class="listingInfo">
            <a class="ListingName" href="https://other.example/b/9">Bare Listing</a>
          </div>
          <nav>
            <a href="/search/si/1/plumber/Ottawa">Previous</a>
            <a href="/search/si/3/plumber/Ottawa">Next &gt;</a>
          </nav>
        </body></html>
    "#;

    fn extract(body: &str) -> PageExtraction {
        let row = SeedRow::new(4, "https://www.yellowpages.ca/search/si/2/plumber/Ottawa");
        let page = PageContext::new(&row, &row.seed_url, 2);
        DirectoryExtractor.extract(&page, body)
    }

    #[test]
    fn extracts_every_listing_block() {
        let extraction = extract(PAGE);
        assert_eq!(extraction.records.len(), 2);

        let first = &extraction.records[0];
        assert_eq!(first.values["business_name"], "Joe's Plumbing");
        assert_eq!(first.values["street"], "12 Bank St");
        assert_eq!(first.values["city"], "Ottawa");
        assert_eq!(first.values["postal_code"], "K1P 5N2");
        assert_eq!(first.values["phone"], "613-555-0100");
        assert_eq!(
            first.values["website"],
            "/gourl/abc?redirect=https%3A%2F%2Fjoes.example%2F"
        );
        assert_eq!(first.values["rating"], "4.5 out of 5 stars");
        assert_eq!(first.values["review"], "12 reviews");
        assert_eq!(first.values["logo_url"], "https://cdn.example/logo.png");
        assert_eq!(
            first.source_url.as_deref(),
            Some("https://www.yellowpages.ca/bus/Ontario/Ottawa/Joes-Plumbing/123.html")
        );
    }

    #[test]
    fn missing_fields_are_empty() {
        let extraction = extract(PAGE);
        let bare = &extraction.records[1];

        assert_eq!(bare.values["business_name"], "Bare Listing");
        assert_eq!(bare.values["phone"], "");
        assert_eq!(bare.values["website"], "");
        assert_eq!(bare.source_url.as_deref(), Some("https://other.example/b/9"));
    }

    #[test]
    fn finds_next_link_by_text() {
        assert_eq!(
            extract(PAGE).next_url.as_deref(),
            Some("/search/si/3/plumber/Ottawa")
        );
    }

    #[test]
    fn falls_back_to_rel_next() {
        let body = r#"<a href="/p/1">1</a><a rel="next" href="/p/2">&raquo;</a>"#;
        assert_eq!(extract(body).next_url.as_deref(), Some("/p/2"));
    }

    #[test]
    fn last_page_has_no_next_link() {
        let body = r#"<div class="listingInfo"><a class="ListingName">Only</a></div>"#;
        let extraction = extract(body);
        assert_eq!(extraction.records.len(), 1);
        assert_eq!(extraction.records[0].source_url, None);
        assert_eq!(extraction.next_url, None);
    }

    #[test]
    fn non_listing_page_yields_nothing() {
        let extraction = extract("<html><body><h1>Access denied</h1></body></html>");
        assert!(extraction.records.is_empty());
        assert!(extraction.next_url.is_none());
    }
}
