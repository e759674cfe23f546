//! Addresses and selectors of the marketplace site itself.

pub const ORIGIN: &str = "https://www.facebook.com";
pub const HOME_URL: &str = "https://www.facebook.com/marketplace";

/// Present when the site overlays its "log in to continue" popup.
pub const LOGIN_POPUP_SELECTOR: &str = "form#login_popup_cta_form";
pub const SEARCH_INPUT_SELECTOR: &str = r#"input[placeholder="Search Marketplace"]"#;

/// Search results for `query` in `city_slug` capped at `max_price`.
pub fn search_url(origin: &str, city_slug: &str, query: &str, max_price: u32) -> String {
    format!(
        "{}/marketplace/{}/search/?query={}&maxPrice={}",
        origin.trim_end_matches('/'),
        city_slug,
        urlencoding::encode(query),
        max_price
    )
}

/// True when `url` is the marketplace landing page, trailing slash or not.
pub fn is_home(url: &str, home: &str) -> bool {
    url.trim_end_matches('/') == home.trim_end_matches('/')
}
