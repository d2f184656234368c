//! Redirect rules and the JSON rule-list format.

use crate::ActiveGates;
use crate::PreferenceGate;
use crate::pattern::UrlPattern;
use ns_core::PolicyError;
use ns_core::PolicyResult;
use ns_url::is_web_page;
use serde::Deserialize;
use std::collections::BTreeSet;
use tracing::debug;
use tracing::warn;
use url::Url;

/// Where a matching rule sends the navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectTarget {
    /// A fixed destination.
    Url(Url),
    /// The URL carried in the named query parameter of the matched URL.
    QueryParam(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectRule {
    pub include: Vec<UrlPattern>,
    pub exclude: Vec<UrlPattern>,
    pub target: RedirectTarget,
    pub gates: BTreeSet<PreferenceGate>,
}

impl RedirectRule {
    pub fn new(include: UrlPattern, target: RedirectTarget) -> Self {
        Self {
            include: vec![include],
            exclude: Vec::new(),
            target,
            gates: BTreeSet::new(),
        }
    }

    pub fn with_exclude(mut self, pattern: UrlPattern) -> Self {
        self.exclude.push(pattern);
        self
    }

    pub fn with_gate(mut self, gate: PreferenceGate) -> Self {
        self.gates.insert(gate);
        self
    }

    pub fn matches(&self, url: &Url) -> bool {
        self.include.iter().any(|pattern| pattern.matches(url))
            && !self.exclude.iter().any(|pattern| pattern.matches(url))
    }

    /// Destination for `url`, or `None` when the target cannot be derived from it.
    pub fn destination(&self, url: &Url) -> Option<Url> {
        match &self.target {
            RedirectTarget::Url(destination) => Some(destination.clone()),
            RedirectTarget::QueryParam(name) => {
                let (_, value) = url.query_pairs().find(|(key, _)| key == name.as_str())?;
                let destination = Url::parse(&value).ok()?;
                is_web_page(&destination, false).then_some(destination)
            }
        }
    }

    /// First gate of this rule that `active` does not satisfy.
    pub fn unsatisfied_gate(&self, active: &ActiveGates) -> Option<PreferenceGate> {
        self.gates.iter().copied().find(|gate| !active.contains(gate))
    }
}

/// Source of redirect rules for a URL.
pub trait RedirectRuleProvider {
    /// Candidate rules for `url`, in priority order.
    fn rules_matching(&self, url: &Url) -> PolicyResult<Vec<RedirectRule>>;
}

impl RedirectRuleProvider for [RedirectRule] {
    fn rules_matching(&self, url: &Url) -> PolicyResult<Vec<RedirectRule>> {
        Ok(self.iter().filter(|rule| rule.matches(url)).cloned().collect())
    }
}

impl<T> RedirectRuleProvider for std::sync::Arc<T>
where
    T: RedirectRuleProvider + ?Sized,
{
    fn rules_matching(&self, url: &Url) -> PolicyResult<Vec<RedirectRule>> {
        (**self).rules_matching(url)
    }
}

/// Fixed rule set loaded once, typically from a downloaded rule list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticRuleProvider {
    rules: Vec<RedirectRule>,
}

impl StaticRuleProvider {
    pub fn new(rules: Vec<RedirectRule>) -> Self {
        Self { rules }
    }

    pub fn from_json(json: &str) -> PolicyResult<Self> {
        parse_rule_list(json).map(Self::new)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl RedirectRuleProvider for StaticRuleProvider {
    fn rules_matching(&self, url: &Url) -> PolicyResult<Vec<RedirectRule>> {
        self.rules.as_slice().rules_matching(url)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum RawAction {
    Redirect,
    Rewrite,
}

#[derive(Debug, Deserialize)]
struct RawRule {
    include: Vec<String>,
    #[serde(default)]
    exclude: Vec<String>,
    action: RawAction,
    #[serde(default)]
    param: Option<String>,
    #[serde(default)]
    destination: Option<String>,
    #[serde(default)]
    prefs: Vec<PreferenceGate>,
}

impl RawRule {
    fn into_rule(self) -> PolicyResult<RedirectRule> {
        if self.include.is_empty() {
            return Err(PolicyError::malformed(
                "debounce.rule_include_empty",
                "rule has no include patterns",
            ));
        }

        let include = self
            .include
            .iter()
            .map(|pattern| UrlPattern::parse(pattern))
            .collect::<PolicyResult<Vec<_>>>()?;
        let exclude = self
            .exclude
            .iter()
            .map(|pattern| UrlPattern::parse(pattern))
            .collect::<PolicyResult<Vec<_>>>()?;

        let target = match (self.action, self.param, self.destination) {
            (RawAction::Redirect, Some(param), _) if !param.is_empty() => {
                RedirectTarget::QueryParam(param)
            }
            (RawAction::Rewrite, _, Some(destination)) => {
                let url = Url::parse(&destination).map_err(|error| {
                    PolicyError::malformed(
                        "debounce.rule_destination_invalid",
                        format!("rewrite destination `{destination}` is not a URL: {error}"),
                    )
                })?;
                RedirectTarget::Url(url)
            }
            (RawAction::Redirect, _, _) => {
                return Err(PolicyError::malformed(
                    "debounce.rule_param_missing",
                    "redirect rule needs a `param`",
                ));
            }
            (RawAction::Rewrite, _, None) => {
                return Err(PolicyError::malformed(
                    "debounce.rule_destination_missing",
                    "rewrite rule needs a `destination`",
                ));
            }
        };

        Ok(RedirectRule {
            include,
            exclude,
            target,
            gates: self.prefs.into_iter().collect(),
        })
    }
}

/// Parses a JSON rule list. Entries that fail to parse are skipped.
///
/// Only a document that is not a JSON array is an error.
pub fn parse_rule_list(json: &str) -> PolicyResult<Vec<RedirectRule>> {
    let entries: Vec<serde_json::Value> = serde_json::from_str(json).map_err(|error| {
        PolicyError::malformed(
            "debounce.rule_list_invalid",
            format!("rule list is not a JSON array: {error}"),
        )
    })?;

    let total = entries.len();
    let mut rules = Vec::with_capacity(total);
    for (index, entry) in entries.into_iter().enumerate() {
        let raw = match serde_json::from_value::<RawRule>(entry) {
            Ok(raw) => raw,
            Err(error) => {
                warn!(index, %error, "skipping malformed redirect rule");
                continue;
            }
        };

        match raw.into_rule() {
            Ok(rule) => rules.push(rule),
            Err(error) => warn!(index, code = error.code, %error, "skipping invalid redirect rule"),
        }
    }

    debug!(total, loaded = rules.len(), "parsed redirect rule list");
    Ok(rules)
}
