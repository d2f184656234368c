//! URL parsing and classification helpers used by the policy crates.

pub mod internal;

use ns_core::PolicyError;
use ns_core::PolicyResult;
use url::Host;
use url::Url;

pub use internal::InternalUrl;
pub use internal::InternalUrlAuthorizer;
pub use internal::SessionKeyAuthorizer;

/// Schemes the web view loads itself.
pub const STANDARD_WEB_SCHEMES: &[&str] = &["http", "https", "data", "blob", "file"];

/// Calling and messaging schemes that always need a confirmation prompt.
pub const EXTERNAL_APP_SCHEMES: &[&str] = &["sms", "tel", "facetime", "facetime-audio", "mailto"];

const APPLE_MAPS_HOST: &str = "maps.apple.com";
const APP_STORE_HOST: &str = "itunes.apple.com";

/// Scheme families the policy engine distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemeFamily {
    Http,
    Https,
    Data,
    Blob,
    File,
    About,
    JavaScript,
    Other,
}

impl SchemeFamily {
    pub fn from_scheme(scheme: &str) -> Self {
        match scheme.to_ascii_lowercase().as_str() {
            "http" => Self::Http,
            "https" => Self::Https,
            "data" => Self::Data,
            "blob" => Self::Blob,
            "file" => Self::File,
            "about" => Self::About,
            "javascript" => Self::JavaScript,
            _ => Self::Other,
        }
    }

    pub fn of(url: &Url) -> Self {
        Self::from_scheme(url.scheme())
    }

    pub fn is_standard_web(self) -> bool {
        matches!(
            self,
            Self::Http | Self::Https | Self::Data | Self::Blob | Self::File
        )
    }
}

/// Parses a navigation target. Callers treat failures as ordinary navigations.
pub fn parse_navigation_url(input: &str) -> PolicyResult<Url> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(PolicyError::malformed(
            "url.empty",
            "navigation URL is empty",
        ));
    }

    Url::parse(trimmed).map_err(|error| {
        PolicyError::malformed(
            "url.invalid",
            format!("failed to parse navigation URL `{trimmed}`: {error}"),
        )
    })
}

/// True for `http`/`https`, and `data` when `include_data_uris` is set.
pub fn is_web_page(url: &Url, include_data_uris: bool) -> bool {
    match SchemeFamily::of(url) {
        SchemeFamily::Http | SchemeFamily::Https => true,
        SchemeFamily::Data => include_data_uris,
        _ => false,
    }
}

pub fn is_standard_web_scheme(scheme: &str) -> bool {
    SchemeFamily::from_scheme(scheme).is_standard_web()
}

pub fn is_external_app_scheme(scheme: &str) -> bool {
    let scheme = scheme.to_ascii_lowercase();
    EXTERNAL_APP_SCHEMES.contains(&scheme.as_str())
}

/// `javascript:` URLs run code in the page unless followed by a slash.
pub fn is_bookmarklet(raw: &str) -> bool {
    let lowered = raw.trim_start().to_ascii_lowercase();
    lowered.starts_with("javascript:") && !lowered.starts_with("javascript:/")
}

/// Map links only leave the browser when they carry a query.
pub fn is_apple_maps_url(url: &Url) -> bool {
    if !matches!(SchemeFamily::of(url), SchemeFamily::Http | SchemeFamily::Https) {
        return false;
    }

    url.host_str() == Some(APPLE_MAPS_HOST) && url.query().is_some_and(|query| !query.is_empty())
}

pub fn is_store_url(url: &Url) -> bool {
    match url.scheme() {
        "http" | "https" => url.host_str() == Some(APP_STORE_HOST),
        "itms-appss" | "itmss" => true,
        _ => false,
    }
}

/// The eTLD+1 of the URL host. Single-label hosts and IPv4 literals are returned as is.
pub fn registrable_domain(url: &Url) -> Option<String> {
    match url.host()? {
        Host::Domain(domain) => registrable_domain_of_host(domain),
        Host::Ipv4(address) => Some(address.to_string()),
        Host::Ipv6(_) => None,
    }
}

pub fn registrable_domain_of_host(host: &str) -> Option<String> {
    let normalized = host.trim().trim_end_matches('.').to_ascii_lowercase();
    if normalized.is_empty() {
        return None;
    }

    if !normalized.contains('.') {
        return Some(normalized);
    }

    match psl::domain_str(&normalized) {
        Some(domain) => Some(domain.to_owned()),
        None => Some(normalized),
    }
}

pub fn same_registrable_domain(left: &Url, right: &Url) -> bool {
    match (registrable_domain(left), registrable_domain(right)) {
        (Some(left), Some(right)) => left == right,
        _ => false,
    }
}

/// Host with a leading `www.`, `mobile.` or `m.` label removed.
pub fn normalized_host(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_ascii_lowercase();
    if host.is_empty() {
        return None;
    }

    for prefix in ["www.", "mobile.", "m."] {
        if let Some(rest) = host.strip_prefix(prefix) {
            if !rest.is_empty() {
                return Some(rest.to_owned());
            }
        }
    }

    Some(host)
}

/// Serialized URL without its `scheme://` (or `scheme:`) prefix.
pub fn schemeless(url: &Url) -> &str {
    let serialized = url.as_str();
    let rest = &serialized[url.scheme().len()..];
    rest.strip_prefix("://")
        .or_else(|| rest.strip_prefix(':'))
        .unwrap_or(rest)
}

#[cfg(test)]
mod tests {
    use super::SchemeFamily;
    use super::is_apple_maps_url;
    use super::is_bookmarklet;
    use super::is_store_url;
    use super::is_web_page;
    use super::normalized_host;
    use super::parse_navigation_url;
    use super::registrable_domain;
    use super::same_registrable_domain;
    use super::schemeless;
    use url::Url;

    fn url(input: &str) -> Url {
        match Url::parse(input) {
            Ok(value) => value,
            Err(error) => panic!("{input}: {error}"),
        }
    }

    #[test]
    fn rejects_empty_and_relative_input() {
        let empty = parse_navigation_url("   ");
        assert!(empty.is_err());
        if let Err(error) = empty {
            assert_eq!(error.code, "url.empty");
        }

        let relative = parse_navigation_url("/just/a/path");
        assert!(relative.is_err());
    }

    #[test]
    fn bookmarklet_requires_code_after_scheme() {
        assert!(is_bookmarklet("javascript:alert(1)"));
        assert!(is_bookmarklet("JavaScript:void(0)"));
        assert!(!is_bookmarklet("javascript://comment"));
        assert!(!is_bookmarklet("https://example.com/javascript:"));
    }

    #[test]
    fn maps_links_need_a_query() {
        assert!(is_apple_maps_url(&url("https://maps.apple.com/?q=coffee")));
        assert!(!is_apple_maps_url(&url("https://maps.apple.com/")));
        assert!(!is_apple_maps_url(&url("https://maps.apple.com/?")));
        assert!(!is_apple_maps_url(&url("ftp://maps.apple.com/?q=1")));
    }

    #[test]
    fn store_links_cover_http_and_store_schemes() {
        assert!(is_store_url(&url("https://itunes.apple.com/app/id1")));
        assert!(is_store_url(&url("itms-appss://apps.apple.com/app/id1")));
        assert!(is_store_url(&url("itmss://itunes.apple.com/")));
        assert!(!is_store_url(&url("https://apps.example.com/")));
        assert!(!is_store_url(&url("itms-apps://itunes.apple.com/app/id1")));
    }

    #[test]
    fn same_registrable_domain_needs_both_hosts() {
        assert!(same_registrable_domain(
            &url("https://amp.example.com/x"),
            &url("http://www.example.com/")
        ));
        assert!(!same_registrable_domain(
            &url("https://a.example.co.uk/"),
            &url("https://b.other.co.uk/")
        ));
        assert!(!same_registrable_domain(
            &url("http://[::1]/"),
            &url("http://[::1]/")
        ));
    }

    #[test]
    fn registrable_domain_uses_public_suffix_list() {
        assert_eq!(
            registrable_domain(&url("https://www.bbc.co.uk/news")).as_deref(),
            Some("bbc.co.uk")
        );
        assert_eq!(
            registrable_domain(&url("https://amp.example.com/x")).as_deref(),
            Some("example.com")
        );
        assert_eq!(
            registrable_domain(&url("http://localhost:8080/")).as_deref(),
            Some("localhost")
        );
        assert_eq!(
            registrable_domain(&url("http://192.168.1.4/")).as_deref(),
            Some("192.168.1.4")
        );
        assert_eq!(registrable_domain(&url("http://[::1]/")), None);
        assert_eq!(registrable_domain(&url("tel:+12025551234")), None);
    }

    #[test]
    fn web_page_detection_respects_data_flag() {
        let data = url("data:text/html,hello");
        assert!(is_web_page(&data, true));
        assert!(!is_web_page(&data, false));
        assert!(is_web_page(&url("http://example.com/"), false));
        assert!(!is_web_page(&url("blob:https://example.com/uuid"), true));
        assert_eq!(SchemeFamily::of(&data), SchemeFamily::Data);
    }

    #[test]
    fn schemeless_and_normalized_host() {
        assert_eq!(
            schemeless(&url("https://example.com/a?b=1")),
            "example.com/a?b=1"
        );
        assert_eq!(schemeless(&url("about:blank")), "blank");
        assert_eq!(
            normalized_host(&url("https://m.example.com/")).as_deref(),
            Some("example.com")
        );
        assert_eq!(
            normalized_host(&url("https://www.example.com/")).as_deref(),
            Some("example.com")
        );
    }
}
