//! Navigation requests as seen by the policy engine.

use ns_url::parse_navigation_url;
use tracing::debug;
use url::Url;

pub const REFERER_HEADER: &str = "Referer";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NavigationCause {
    LinkActivated,
    FormSubmitted,
    BackForward,
    Reload,
    Other,
}

impl NavigationCause {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LinkActivated => "link_activated",
            Self::FormSubmitted => "form_submitted",
            Self::BackForward => "back_forward",
            Self::Reload => "reload",
            Self::Other => "other",
        }
    }
}

/// One navigation attempt. Built once and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationRequest {
    raw_url: String,
    url: Option<Url>,
    source_frame_is_main: bool,
    target_frame_is_main: bool,
    cause: NavigationCause,
    main_document_url: Option<Url>,
    headers: Vec<(String, String)>,
}

impl NavigationRequest {
    pub fn builder(raw_url: impl Into<String>) -> NavigationRequestBuilder {
        NavigationRequestBuilder::new(raw_url)
    }

    pub fn raw_url(&self) -> &str {
        &self.raw_url
    }

    /// Parsed target, or `None` when the raw URL is malformed.
    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    pub fn source_frame_is_main(&self) -> bool {
        self.source_frame_is_main
    }

    pub fn target_frame_is_main(&self) -> bool {
        self.target_frame_is_main
    }

    pub fn cause(&self) -> NavigationCause {
        self.cause
    }

    pub fn main_document_url(&self) -> Option<&Url> {
        self.main_document_url.as_ref()
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Headers carried over to a redirect. Only `Referer` survives.
    pub fn redirect_headers(&self) -> Vec<(String, String)> {
        self.headers
            .iter()
            .filter(|(key, _)| key.eq_ignore_ascii_case(REFERER_HEADER))
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct NavigationRequestBuilder {
    raw_url: String,
    source_frame_is_main: bool,
    target_frame_is_main: bool,
    cause: NavigationCause,
    main_document_url: Option<Url>,
    headers: Vec<(String, String)>,
}

impl NavigationRequestBuilder {
    fn new(raw_url: impl Into<String>) -> Self {
        Self {
            raw_url: raw_url.into(),
            source_frame_is_main: true,
            target_frame_is_main: true,
            cause: NavigationCause::Other,
            main_document_url: None,
            headers: Vec::new(),
        }
    }

    pub fn source_frame_is_main(mut self, value: bool) -> Self {
        self.source_frame_is_main = value;
        self
    }

    pub fn target_frame_is_main(mut self, value: bool) -> Self {
        self.target_frame_is_main = value;
        self
    }

    pub fn cause(mut self, cause: NavigationCause) -> Self {
        self.cause = cause;
        self
    }

    pub fn main_document_url(mut self, url: Url) -> Self {
        self.main_document_url = Some(url);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn build(self) -> NavigationRequest {
        let url = match parse_navigation_url(&self.raw_url) {
            Ok(url) => Some(url),
            Err(error) => {
                debug!(code = error.code, %error, "navigation target did not parse");
                None
            }
        };

        NavigationRequest {
            raw_url: self.raw_url,
            url,
            source_frame_is_main: self.source_frame_is_main,
            target_frame_is_main: self.target_frame_is_main,
            cause: self.cause,
            main_document_url: self.main_document_url,
            headers: self.headers,
        }
    }
}
