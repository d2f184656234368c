//! Browser-internal pages served under `internal://local/`.

use ns_core::PolicyError;
use ns_core::PolicyResult;
use url::Url;

pub const INTERNAL_SCHEME: &str = "internal";
pub const INTERNAL_HOST: &str = "local";
pub const AUTHORIZATION_QUERY_PARAM: &str = "uuidkey";

const SESSION_RESTORE_PATH: &str = "/sessionrestore";
const ERROR_PAGE_PATH: &str = "/errors/error.html";

/// A URL addressed to the browser's own page handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalUrl {
    url: Url,
}

impl InternalUrl {
    pub fn from_url(url: &Url) -> Option<Self> {
        if !Self::is_valid(url) {
            return None;
        }

        Some(Self { url: url.clone() })
    }

    pub fn is_valid(url: &Url) -> bool {
        url.scheme().eq_ignore_ascii_case(INTERNAL_SCHEME)
            && url
                .host_str()
                .is_some_and(|host| host.eq_ignore_ascii_case(INTERNAL_HOST))
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// Value of the `uuidkey` query parameter, if present.
    pub fn authorization_key(&self) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(name, _)| name == AUTHORIZATION_QUERY_PARAM)
            .map(|(_, value)| value.into_owned())
    }

    pub fn is_session_restore(&self) -> bool {
        self.path().starts_with(SESSION_RESTORE_PATH)
    }

    pub fn is_error_page(&self) -> bool {
        self.path() == ERROR_PAGE_PATH
    }
}

/// Decides whether an internal page may be opened by a navigation.
pub trait InternalUrlAuthorizer {
    fn is_authorized(&self, url: &InternalUrl) -> bool;
}

impl<F> InternalUrlAuthorizer for F
where
    F: Fn(&InternalUrl) -> bool,
{
    fn is_authorized(&self, url: &InternalUrl) -> bool {
        self(url)
    }
}

/// Authorizes internal pages whose `uuidkey` matches the session key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionKeyAuthorizer {
    session_key: String,
}

impl SessionKeyAuthorizer {
    pub fn new(session_key: impl Into<String>) -> PolicyResult<Self> {
        let session_key = session_key.into();
        if session_key.trim().is_empty() {
            return Err(PolicyError::invalid_config(
                "url.internal.session_key_empty",
                "internal page session key must not be empty",
            ));
        }

        Ok(Self { session_key })
    }
}

impl InternalUrlAuthorizer for SessionKeyAuthorizer {
    fn is_authorized(&self, url: &InternalUrl) -> bool {
        url.authorization_key().as_deref() == Some(self.session_key.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::InternalUrl;
    use super::InternalUrlAuthorizer;
    use super::SessionKeyAuthorizer;
    use url::Url;

    fn internal(input: &str) -> InternalUrl {
        let parsed = match Url::parse(input) {
            Ok(value) => value,
            Err(error) => panic!("{input}: {error}"),
        };
        match InternalUrl::from_url(&parsed) {
            Some(value) => value,
            None => panic!("{input} is not internal"),
        }
    }

    #[test]
    fn recognizes_internal_scheme_and_host_only() {
        let other_host = Url::parse("internal://remote/about/home");
        assert!(other_host.is_ok());
        if let Ok(url) = other_host {
            assert!(!InternalUrl::is_valid(&url));
        }

        let web = Url::parse("https://local/about/home");
        if let Ok(url) = web {
            assert!(!InternalUrl::is_valid(&url));
        }

        let page = internal("internal://local/sessionrestore?history=%5B%5D");
        assert!(page.is_session_restore());
        assert!(!page.is_error_page());
    }

    #[test]
    fn session_key_authorizer_matches_uuid_key() {
        let authorizer = match SessionKeyAuthorizer::new("abc-123") {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };

        assert!(authorizer.is_authorized(&internal("internal://local/about/home?uuidkey=abc-123")));
        assert!(!authorizer.is_authorized(&internal("internal://local/about/home?uuidkey=nope")));
        assert!(!authorizer.is_authorized(&internal("internal://local/about/home")));
    }

    #[test]
    fn empty_session_key_is_rejected() {
        let authorizer = SessionKeyAuthorizer::new("  ");
        assert!(authorizer.is_err());
        if let Err(error) = authorizer {
            assert_eq!(error.code, "url.internal.session_key_empty");
        }
    }

    #[test]
    fn closures_act_as_authorizers() {
        let allow_errors = |url: &InternalUrl| url.is_error_page();
        assert!(allow_errors.is_authorized(&internal("internal://local/errors/error.html")));
    }
}
