use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::site;

/// One listing as read from the page, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawListing {
    pub image: String,
    pub title: String,
    pub price: String,
    pub post_url: String,
    pub location: String,
}

/// Why a single listing container was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionFailure {
    /// Position of the container in document order.
    pub index: usize,
    pub field: &'static str,
    pub reason: String,
}

impl std::fmt::Display for ExtractionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "listing #{} {}: {}", self.index, self.field, self.reason)
    }
}

/// Turns rendered search-results markup into listing attempts.
///
/// The class names involved change whenever the site ships a new build, so
/// all of the markup coupling lives behind this trait.
pub trait ListingExtractor: Send + Sync {
    /// CSS selector for one listing container, used to wait for results.
    fn container_selector(&self) -> &str;

    /// One entry per container found, in document order.
    fn extract(&self, html: &str) -> Vec<Result<RawListing, ExtractionFailure>>;
}

/// An element rule: tag name plus the exact class list the element carries.
#[derive(Debug, Clone, Copy)]
struct ElementRule {
    tag: &'static str,
    classes: &'static str,
}

impl ElementRule {
    fn css(&self) -> String {
        let mut css = self.tag.to_string();
        for class in self.classes.split_whitespace() {
            css.push('.');
            css.push_str(class);
        }
        css
    }

    /// The element's class attribute must hold exactly these classes.
    fn matches_exactly(&self, element: &ElementRef<'_>) -> bool {
        let mut expected: Vec<&str> = self.classes.split_whitespace().collect();
        let mut actual: Vec<&str> = element.value().classes().collect();
        expected.sort_unstable();
        actual.sort_unstable();
        expected == actual
    }
}

const CONTAINER: ElementRule = ElementRule {
    tag: "div",
    classes: "x9f619 x78zum5 x1r8uery xdt5ytf x1iyjqo2 xs83m0k x1e558r4 x150jy0e x1iorvi4 xjkvuk6 xnpuxes x291uyu x1uepa24",
};
const IMAGE: ElementRule = ElementRule {
    tag: "img",
    classes: "xt7dq6l xl1xv1r x6ikm8r x10wlt62 xh8yej3",
};
const TITLE: ElementRule = ElementRule {
    tag: "span",
    classes: "x1lliihq x6ikm8r x10wlt62 x1n2onr6",
};
const PRICE: ElementRule = ElementRule {
    tag: "span",
    classes: "x193iq5w xeuugli x13faqbe x1vvkbs x1xmvt09 x1lliihq x1s928wv xhkezso x1gmr53x x1cpjm7i x1fgarty x1943h6x xudqn12 x676frb x1lkfr7t x1lbecb7 x1s688f xzsf02u",
};
const LINK: ElementRule = ElementRule {
    tag: "a",
    classes: "x1i10hfl xjbqb8w x6umtig x1b1mbwd xaqea5y xav7gou x9f619 x1ypdohk xt0psk2 xe8uvvx xdj266r x11i5rnm xat24cr x1mh8g0r xexx8yu x4uap5 x18d9i69 xkhd6sd x16tdsg8 x1hl2dhg xggy1nq x1a2a7pz x1heor9g x1lku1pv",
};
const LOCATION: ElementRule = ElementRule {
    tag: "span",
    classes: "x1lliihq x6ikm8r x10wlt62 x1n2onr6 xlyipyv xuxw1ft x1j85h84",
};

/// Extractor for the Facebook Marketplace search grid.
pub struct FacebookListingExtractor {
    container_css: String,
    container: Selector,
    image: Selector,
    title: Selector,
    price: Selector,
    link: Selector,
    location: Selector,
    origin: String,
}

impl FacebookListingExtractor {
    pub fn new() -> Self {
        Self::with_origin(site::ORIGIN)
    }

    /// `origin` is prefixed to relative post links.
    pub fn with_origin(origin: &str) -> Self {
        let container_css = CONTAINER.css();
        Self {
            container: compile(&container_css),
            container_css,
            image: compile(&IMAGE.css()),
            title: compile(&TITLE.css()),
            price: compile(&PRICE.css()),
            link: compile(&LINK.css()),
            location: compile(&LOCATION.css()),
            origin: origin.trim_end_matches('/').to_string(),
        }
    }

    fn extract_one(&self, index: usize, listing: ElementRef<'_>) -> Result<RawListing, ExtractionFailure> {
        let fail = |field: &'static str, reason: &str| ExtractionFailure {
            index,
            field,
            reason: reason.to_string(),
        };

        let image = find_exact(listing, &self.image, &IMAGE)
            .ok_or_else(|| fail("image", "element not found"))?
            .value()
            .attr("src")
            .ok_or_else(|| fail("image", "missing src attribute"))?
            .to_string();

        let title = find_exact(listing, &self.title, &TITLE)
            .map(text_of)
            .ok_or_else(|| fail("title", "element not found"))?;

        let price = find_exact(listing, &self.price, &PRICE)
            .map(text_of)
            .ok_or_else(|| fail("price", "element not found"))?;

        let href = find_exact(listing, &self.link, &LINK)
            .ok_or_else(|| fail("link", "element not found"))?
            .value()
            .attr("href")
            .ok_or_else(|| fail("link", "missing href attribute"))?;

        let location = find_exact(listing, &self.location, &LOCATION)
            .map(text_of)
            .ok_or_else(|| fail("location", "element not found"))?;

        Ok(RawListing {
            image,
            title,
            price,
            post_url: absolute_url(&self.origin, href),
            location,
        })
    }
}

impl Default for FacebookListingExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ListingExtractor for FacebookListingExtractor {
    fn container_selector(&self) -> &str {
        &self.container_css
    }

    fn extract(&self, html: &str) -> Vec<Result<RawListing, ExtractionFailure>> {
        let document = Html::parse_document(html);

        let results: Vec<_> = document
            .select(&self.container)
            .filter(|el| CONTAINER.matches_exactly(el))
            .enumerate()
            .map(|(index, listing)| self.extract_one(index, listing))
            .collect();

        debug!("Found {} listing containers", results.len());
        results
    }
}

fn compile(css: &str) -> Selector {
    // Rules are compile-time constants made of plain tag and class names.
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid built-in selector {}: {:?}", css, e))
}

fn find_exact<'a>(scope: ElementRef<'a>, selector: &Selector, rule: &ElementRule) -> Option<ElementRef<'a>> {
    scope.select(selector).find(|el| rule.matches_exactly(el))
}

fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Prefixes site-relative paths with `origin`; absolute URLs pass through.
pub fn absolute_url(origin: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else if href.starts_with("//") {
        format!("https:{}", href)
    } else if href.starts_with('/') {
        format!("{}{}", origin, href)
    } else {
        format!("{}/{}", origin, href)
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_extracts_complete_listing() {
        let html = search_page(&[Item::complete(
            "Macbook Pro 2019",
            "$900",
            "/marketplace/item/123/",
        )]);

        let results = FacebookListingExtractor::new().extract(&html);
        assert_eq!(results.len(), 1);

        let listing = results[0].as_ref().unwrap();
        assert_eq!(listing.title, "Macbook Pro 2019");
        assert_eq!(listing.price, "$900");
        assert_eq!(listing.location, "Miami, FL");
        assert_eq!(listing.image, "https://scontent.example/img.jpg");
        assert_eq!(
            listing.post_url,
            "https://www.facebook.com/marketplace/item/123/"
        );
    }

    #[test]
    fn test_malformed_listings_fail_individually() {
        let mut missing_price = Item::complete("B", "$2", "/marketplace/item/2/");
        missing_price.price = None;
        let mut missing_image = Item::complete("C", "$3", "/marketplace/item/3/");
        missing_image.image = None;
        let mut missing_link = Item::complete("D", "$4", "/marketplace/item/4/");
        missing_link.href = None;

        let html = search_page(&[
            Item::complete("A", "$1", "/marketplace/item/1/"),
            missing_price,
            missing_image,
            Item::complete("E", "$5", "/marketplace/item/5/"),
            missing_link,
        ]);

        let results = FacebookListingExtractor::new().extract(&html);
        assert_eq!(results.len(), 5);

        let ok: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(ok.len(), 2);
        assert_eq!(ok[0].title, "A");
        assert_eq!(ok[1].title, "E");

        let failures: Vec<_> = results.iter().filter_map(|r| r.as_ref().err()).collect();
        assert_eq!(failures[0].index, 1);
        assert_eq!(failures[0].field, "price");
        assert_eq!(failures[1].field, "image");
        assert_eq!(failures[2].field, "link");
    }

    #[test]
    fn test_title_does_not_match_location_span() {
        // The location span carries the title classes plus three more.
        let mut item = Item::complete("Desk", "$40", "/marketplace/item/9/");
        item.title = None;
        let results = FacebookListingExtractor::new().extract(&search_page(&[item]));

        let failure = results[0].as_ref().unwrap_err();
        assert_eq!(failure.field, "title");
    }

    #[test]
    fn test_container_requires_exact_classes() {
        let html = format!(
            r#"<div class="{} extra">{}</div>"#,
            CONTAINER.classes,
            "<span>not a listing</span>"
        );
        assert!(FacebookListingExtractor::new().extract(&html).is_empty());
    }

    #[test]
    fn test_no_containers() {
        let results = FacebookListingExtractor::new().extract("<html><body></body></html>");
        assert!(results.is_empty());
    }

    #[test]
    fn test_absolute_url() {
        let origin = "https://www.facebook.com";
        assert_eq!(
            absolute_url(origin, "/marketplace/item/1/"),
            "https://www.facebook.com/marketplace/item/1/"
        );
        assert_eq!(
            absolute_url(origin, "https://m.facebook.com/x"),
            "https://m.facebook.com/x"
        );
        assert_eq!(absolute_url(origin, "//cdn.example/x"), "https://cdn.example/x");
        assert_eq!(absolute_url(origin, "item/1"), "https://www.facebook.com/item/1");
    }

    #[test]
    fn test_container_selector_is_compound_class_selector() {
        let extractor = FacebookListingExtractor::new();
        assert!(extractor.container_selector().starts_with("div.x9f619.x78zum5"));
    }
}
