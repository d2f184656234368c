//! Host rewrites that send a site to a lighter variant of itself.

use crate::ActiveGates;
use crate::PreferenceGate;
use ns_url::is_web_page;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebsiteRedirect {
    pub hosts: Vec<String>,
    pub to_host: String,
    pub excluded_path_prefixes: Vec<String>,
    pub gate: PreferenceGate,
}

impl WebsiteRedirect {
    pub fn new(hosts: &[&str], to_host: &str) -> Self {
        Self {
            hosts: hosts.iter().map(|host| (*host).to_owned()).collect(),
            to_host: to_host.to_owned(),
            excluded_path_prefixes: Vec::new(),
            gate: PreferenceGate::WebsiteRedirectsEnabled,
        }
    }

    pub fn excluding(mut self, prefixes: &[&str]) -> Self {
        self.excluded_path_prefixes
            .extend(prefixes.iter().map(|prefix| (*prefix).to_owned()));
        self
    }

    /// Built-in redirects, all off until the user enables website redirects.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new(&["reddit.com", "www.reddit.com", "np.reddit.com"], "old.reddit.com")
                .excluding(&["/media", "/mod", "/poll", "/settings", "/topics", "/gallery"]),
            Self::new(&["npr.org", "www.npr.org"], "text.npr.org")
                .excluding(&["/podcasts", "/music", "/about"]),
        ]
    }

    /// The rewritten URL, or `None` when this redirect does not apply.
    pub fn redirect_for(&self, url: &Url, active_gates: &ActiveGates) -> Option<Url> {
        if !active_gates.contains(&self.gate) || !is_web_page(url, false) {
            return None;
        }

        let host = url.host_str()?.to_ascii_lowercase();
        if host == self.to_host || !self.hosts.iter().any(|candidate| *candidate == host) {
            return None;
        }

        let path = url.path();
        if self
            .excluded_path_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
        {
            return None;
        }

        let mut redirected = url.clone();
        redirected.set_host(Some(&self.to_host)).ok()?;
        Some(redirected)
    }
}

/// First website redirect that applies to `url`.
pub fn apply_website_redirects(
    redirects: &[WebsiteRedirect],
    url: &Url,
    active_gates: &ActiveGates,
) -> Option<Url> {
    redirects
        .iter()
        .find_map(|redirect| redirect.redirect_for(url, active_gates))
}
