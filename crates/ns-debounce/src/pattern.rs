//! URL match patterns used by redirect rules.

use ns_core::PolicyError;
use ns_core::PolicyResult;
use url::Url;

/// Either one exact URL or a `*` wildcard pattern over the serialized URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlPattern {
    Exact(Url),
    Glob(String),
}

impl UrlPattern {
    /// Patterns containing `*` become globs; everything else must be a valid URL.
    pub fn parse(input: &str) -> PolicyResult<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(PolicyError::malformed(
                "debounce.pattern_empty",
                "redirect rule pattern is empty",
            ));
        }

        if trimmed.contains('*') {
            return Ok(Self::Glob(trimmed.to_owned()));
        }

        Url::parse(trimmed).map(Self::Exact).map_err(|error| {
            PolicyError::malformed(
                "debounce.pattern_invalid",
                format!("redirect rule pattern `{trimmed}` is not a URL: {error}"),
            )
        })
    }

    pub fn matches(&self, url: &Url) -> bool {
        match self {
            Self::Exact(expected) => expected == url,
            Self::Glob(pattern) => glob_matches(pattern.as_bytes(), url.as_str().as_bytes()),
        }
    }
}

/// Iterative wildcard match; `*` spans any run of bytes, including none.
fn glob_matches(pattern: &[u8], text: &[u8]) -> bool {
    let mut p = 0_usize;
    let mut t = 0_usize;
    let mut star: Option<usize> = None;
    let mut resume = 0_usize;

    while t < text.len() {
        if p < pattern.len() && pattern[p] == b'*' {
            star = Some(p);
            p += 1;
            resume = t;
        } else if p < pattern.len() && pattern[p].eq_ignore_ascii_case(&text[t]) {
            p += 1;
            t += 1;
        } else if let Some(star_at) = star {
            p = star_at + 1;
            resume += 1;
            t = resume;
        } else {
            return false;
        }
    }

    while p < pattern.len() && pattern[p] == b'*' {
        p += 1;
    }

    p == pattern.len()
}

#[cfg(test)]
mod tests {
    use super::UrlPattern;
    use url::Url;

    fn url(input: &str) -> Url {
        match Url::parse(input) {
            Ok(value) => value,
            Err(error) => panic!("{input}: {error}"),
        }
    }

    fn pattern(input: &str) -> UrlPattern {
        match UrlPattern::parse(input) {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        }
    }

    #[test]
    fn exact_patterns_compare_canonical_urls() {
        let exact = pattern("https://AMP.example.com/x");
        assert!(exact.matches(&url("https://amp.example.com/x")));
        assert!(!exact.matches(&url("https://amp.example.com/y")));
    }

    #[test]
    fn glob_patterns_span_segments() {
        let glob = pattern("*://*.doubleclick.net/*");
        assert!(glob.matches(&url("https://ad.doubleclick.net/click?u=1")));
        assert!(!glob.matches(&url("https://doubleclick.example/")));

        let suffix = pattern("https://example.com/*/amp");
        assert!(suffix.matches(&url("https://example.com/news/story/amp")));
        assert!(!suffix.matches(&url("https://example.com/news/story")));
    }

    #[test]
    fn invalid_patterns_are_errors() {
        assert!(UrlPattern::parse("").is_err());
        let invalid = UrlPattern::parse("not a url");
        assert!(invalid.is_err());
        if let Err(error) = invalid {
            assert_eq!(error.code, "debounce.pattern_invalid");
        }
    }
}
