//! Detection of navigations that need handling outside the web view.

use crate::request::NavigationRequest;
use ns_url::InternalUrl;
use ns_url::InternalUrlAuthorizer;
use ns_url::SchemeFamily;
use ns_url::is_apple_maps_url;
use ns_url::is_bookmarklet;
use ns_url::is_external_app_scheme;
use ns_url::is_standard_web_scheme;
use ns_url::is_store_url;
use url::Url;

const BRAVE_SCHEME_MARKER: &str = "brave";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialAction {
    AboutScheme,
    Bookmarklet,
    AppleMapsLink,
    AppStoreLink,
    ExternalAppScheme(String),
    /// The browser's own scheme, opened without a confirmation prompt.
    BraveScheme(String),
    InternalLink { privileged: bool },
    UniversalLinkBuyVpn,
    Ordinary,
}

impl SpecialAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AboutScheme => "about_scheme",
            Self::Bookmarklet => "bookmarklet",
            Self::AppleMapsLink => "apple_maps_link",
            Self::AppStoreLink => "app_store_link",
            Self::ExternalAppScheme(_) => "external_app_scheme",
            Self::BraveScheme(_) => "brave_scheme",
            Self::InternalLink { .. } => "internal_link",
            Self::UniversalLinkBuyVpn => "universal_link_buy_vpn",
            Self::Ordinary => "ordinary",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniversalLinkTarget {
    BuyVpn,
}

/// Maps a main-document URL to an in-app destination.
pub trait UniversalLinkResolver {
    fn resolve(&self, main_document_url: &Url) -> Option<UniversalLinkTarget>;
}

/// Universal links matched by host and path prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticUniversalLinks {
    links: Vec<(String, String, UniversalLinkTarget)>,
}

impl StaticUniversalLinks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_link(mut self, host: &str, path_prefix: &str, target: UniversalLinkTarget) -> Self {
        self.links
            .push((host.to_ascii_lowercase(), path_prefix.to_owned(), target));
        self
    }
}

impl UniversalLinkResolver for StaticUniversalLinks {
    fn resolve(&self, main_document_url: &Url) -> Option<UniversalLinkTarget> {
        if !matches!(
            SchemeFamily::of(main_document_url),
            SchemeFamily::Http | SchemeFamily::Https
        ) {
            return None;
        }

        let host = main_document_url.host_str()?.to_ascii_lowercase();
        let path = main_document_url.path();
        self.links
            .iter()
            .find(|(link_host, prefix, _)| *link_host == host && path.starts_with(prefix.as_str()))
            .map(|(_, _, target)| *target)
    }
}

/// First matching special action for `request`. Malformed URLs are ordinary.
pub fn classify<A, U>(request: &NavigationRequest, authorizer: &A, universal_links: &U) -> SpecialAction
where
    A: InternalUrlAuthorizer + ?Sized,
    U: UniversalLinkResolver + ?Sized,
{
    let Some(url) = request.url() else {
        return SpecialAction::Ordinary;
    };

    if let Some(internal) = InternalUrl::from_url(url) {
        return SpecialAction::InternalLink {
            privileged: authorizer.is_authorized(&internal),
        };
    }

    let scheme = url.scheme();
    if SchemeFamily::of(url) == SchemeFamily::About {
        return SpecialAction::AboutScheme;
    }

    if is_bookmarklet(request.raw_url()) {
        return SpecialAction::Bookmarklet;
    }

    if is_external_app_scheme(scheme) {
        return SpecialAction::ExternalAppScheme(scheme.to_owned());
    }

    if is_apple_maps_url(url) {
        return SpecialAction::AppleMapsLink;
    }

    if is_store_url(url) {
        return SpecialAction::AppStoreLink;
    }

    if let Some(main_document_url) = request.main_document_url() {
        match universal_links.resolve(main_document_url) {
            Some(UniversalLinkTarget::BuyVpn) => return SpecialAction::UniversalLinkBuyVpn,
            None => {}
        }
    }

    if scheme.contains(BRAVE_SCHEME_MARKER) {
        return SpecialAction::BraveScheme(scheme.to_owned());
    }

    if !is_standard_web_scheme(scheme) {
        return SpecialAction::ExternalAppScheme(scheme.to_owned());
    }

    SpecialAction::Ordinary
}
