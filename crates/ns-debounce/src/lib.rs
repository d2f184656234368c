//! Debounce rules, redirect-chain resolution, and website redirects.

pub mod chain;
pub mod pattern;
pub mod rule;
pub mod website;

use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeSet;

pub use chain::ChainResolution;
pub use chain::ChainStop;
pub use chain::DEFAULT_MAX_CHAIN_STEPS;
pub use chain::resolve_redirect_chain;
pub use chain::resolve_with_rules;
pub use pattern::UrlPattern;
pub use rule::RedirectRule;
pub use rule::RedirectRuleProvider;
pub use rule::RedirectTarget;
pub use rule::StaticRuleProvider;
pub use rule::parse_rule_list;
pub use website::WebsiteRedirect;
pub use website::apply_website_redirects;

/// User preferences a redirect may depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreferenceGate {
    /// Follow AMP pages to their canonical URL.
    DeAmpEnabled,
    /// Skip known bounce-tracking intermediaries.
    DebounceEnabled,
    /// Rewrite hosts to lighter variants of the same site.
    WebsiteRedirectsEnabled,
}

impl PreferenceGate {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DeAmpEnabled => "de_amp_enabled",
            Self::DebounceEnabled => "debounce_enabled",
            Self::WebsiteRedirectsEnabled => "website_redirects_enabled",
        }
    }
}

/// Gates currently switched on by the user.
pub type ActiveGates = BTreeSet<PreferenceGate>;
