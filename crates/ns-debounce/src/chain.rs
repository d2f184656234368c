//! Bounded walk over redirect rules.

use crate::ActiveGates;
use crate::PreferenceGate;
use crate::rule::RedirectRule;
use crate::rule::RedirectRuleProvider;
use std::collections::HashSet;
use tracing::debug;
use tracing::trace;
use tracing::warn;
use url::Url;

pub const DEFAULT_MAX_CHAIN_STEPS: usize = 20;

/// Why a chain walk stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainStop {
    NoMatchingRule,
    GateUnsatisfied(PreferenceGate),
    IterationCapReached,
    AlreadyVisited,
    ProviderUnavailable,
}

impl ChainStop {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoMatchingRule => "no_matching_rule",
            Self::GateUnsatisfied(_) => "gate_unsatisfied",
            Self::IterationCapReached => "iteration_cap_reached",
            Self::AlreadyVisited => "already_visited",
            Self::ProviderUnavailable => "provider_unavailable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainResolution {
    pub terminal: Url,
    /// Every URL advanced to, in order. Empty when the walk never moved.
    pub hops: Vec<Url>,
    pub stop: ChainStop,
}

impl ChainResolution {
    pub fn redirected(&self) -> bool {
        !self.hops.is_empty()
    }
}

/// Walks the rules from `from` for at most `max_steps` hops.
///
/// The walk never fails. Provider errors and the cap stop at the last URL that
/// was reached. A cycle makes the whole chain malformed: the walk reports `from`
/// with no hops, so every URL on a cycle resolves to itself.
///
/// Re-resolving a terminal is a no-op except after `IterationCapReached`, where
/// the next walk picks up from the terminal and advances at most `max_steps`
/// further.
pub fn resolve_redirect_chain<P>(
    from: &Url,
    provider: &P,
    active_gates: &ActiveGates,
    max_steps: usize,
) -> ChainResolution
where
    P: RedirectRuleProvider + ?Sized,
{
    let mut current = from.clone();
    let mut hops = Vec::new();
    let mut visited = HashSet::new();
    visited.insert(from.as_str().to_owned());

    let stop = loop {
        let rules = match provider.rules_matching(&current) {
            Ok(rules) => rules,
            Err(error) => {
                warn!(url = %current, code = error.code, kind = error.kind.as_str(), %error, "redirect rules unavailable");
                break ChainStop::ProviderUnavailable;
            }
        };

        let Some((rule, destination)) = first_applicable(&rules, &current) else {
            break ChainStop::NoMatchingRule;
        };

        if let Some(gate) = rule.unsatisfied_gate(active_gates) {
            trace!(url = %current, gate = gate.as_str(), "redirect gated off");
            break ChainStop::GateUnsatisfied(gate);
        }

        if hops.len() >= max_steps {
            break ChainStop::IterationCapReached;
        }

        if !visited.insert(destination.as_str().to_owned()) {
            debug!(from = %from, revisited = %destination, "redirect cycle, chain ignored");
            return ChainResolution {
                terminal: from.clone(),
                hops: Vec::new(),
                stop: ChainStop::AlreadyVisited,
            };
        }

        trace!(from = %current, to = %destination, step = hops.len() + 1, "redirect hop");
        hops.push(destination.clone());
        current = destination;
    };

    ChainResolution {
        terminal: current,
        hops,
        stop,
    }
}

pub fn resolve_with_rules(
    from: &Url,
    rules: &[RedirectRule],
    active_gates: &ActiveGates,
    max_steps: usize,
) -> ChainResolution {
    resolve_redirect_chain(from, rules, active_gates, max_steps)
}

fn first_applicable<'a>(rules: &'a [RedirectRule], url: &Url) -> Option<(&'a RedirectRule, Url)> {
    rules
        .iter()
        .filter(|rule| rule.matches(url))
        .find_map(|rule| rule.destination(url).map(|destination| (rule, destination)))
}

#[cfg(test)]
mod tests {
    use super::ChainStop;
    use super::resolve_redirect_chain;
    use super::resolve_with_rules;
    use crate::ActiveGates;
    use crate::PreferenceGate;
    use crate::pattern::UrlPattern;
    use crate::rule::RedirectRule;
    use crate::rule::RedirectRuleProvider;
    use crate::rule::RedirectTarget;
    use ns_core::PolicyError;
    use ns_core::PolicyResult;
    use url::Url;

    fn url(input: &str) -> Url {
        match Url::parse(input) {
            Ok(value) => value,
            Err(error) => panic!("{input}: {error}"),
        }
    }

    fn rewrite(from: &str, to: &str) -> RedirectRule {
        let include = match UrlPattern::parse(from) {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };
        RedirectRule::new(include, RedirectTarget::Url(url(to)))
    }

    fn gates(active: &[PreferenceGate]) -> ActiveGates {
        active.iter().copied().collect()
    }

    struct FailingProvider;

    impl RedirectRuleProvider for FailingProvider {
        fn rules_matching(&self, _url: &Url) -> PolicyResult<Vec<RedirectRule>> {
            Err(PolicyError::unavailable("debounce.test_offline", "offline"))
        }
    }

    #[test]
    fn gated_rule_advances_only_when_gate_is_active() {
        let rules = vec![
            rewrite("https://amp.example.com/x", "https://example.com/x")
                .with_gate(PreferenceGate::DeAmpEnabled),
        ];
        let from = url("https://amp.example.com/x");

        let active = resolve_with_rules(&from, &rules, &gates(&[PreferenceGate::DeAmpEnabled]), 20);
        assert_eq!(active.terminal, url("https://example.com/x"));
        assert_eq!(active.stop, ChainStop::NoMatchingRule);
        assert!(active.redirected());

        let inactive = resolve_with_rules(&from, &rules, &gates(&[]), 20);
        assert_eq!(inactive.terminal, from);
        assert_eq!(
            inactive.stop,
            ChainStop::GateUnsatisfied(PreferenceGate::DeAmpEnabled)
        );
        assert!(!inactive.redirected());
    }

    #[test]
    fn gate_failure_mid_chain_keeps_current_url() {
        let rules = vec![
            rewrite("https://a.example/", "https://b.example/"),
            rewrite("https://b.example/", "https://c.example/")
                .with_gate(PreferenceGate::DebounceEnabled),
        ];

        let resolution = resolve_with_rules(&url("https://a.example/"), &rules, &gates(&[]), 20);
        assert_eq!(resolution.terminal, url("https://b.example/"));
        assert_eq!(resolution.hops.len(), 1);
    }

    #[test]
    fn cycles_terminate() {
        let rules = vec![
            rewrite("https://a.example/", "https://b.example/"),
            rewrite("https://b.example/", "https://a.example/"),
        ];

        for start in ["https://a.example/", "https://b.example/"] {
            let resolution = resolve_with_rules(&url(start), &rules, &gates(&[]), 20);
            assert_eq!(resolution.terminal, url(start));
            assert!(!resolution.redirected());
            assert_eq!(resolution.stop, ChainStop::AlreadyVisited);
        }
    }

    #[test]
    fn cycle_reached_from_a_tail_keeps_the_start() {
        let rules = vec![
            rewrite("https://t.example/", "https://a.example/"),
            rewrite("https://a.example/", "https://b.example/"),
            rewrite("https://b.example/", "https://a.example/"),
        ];
        let from = url("https://t.example/");

        let first = resolve_with_rules(&from, &rules, &gates(&[]), 20);
        let second = resolve_with_rules(&first.terminal, &rules, &gates(&[]), 20);
        assert_eq!(first.terminal, from);
        assert_eq!(second.terminal, first.terminal);
        assert!(!second.redirected());
    }

    #[test]
    fn cap_stops_at_last_valid_url() {
        let rules: Vec<_> = (0..10)
            .map(|step| {
                rewrite(
                    &format!("https://hop{step}.example/"),
                    &format!("https://hop{}.example/", step + 1),
                )
            })
            .collect();

        let resolution = resolve_with_rules(&url("https://hop0.example/"), &rules, &gates(&[]), 3);
        assert_eq!(resolution.terminal, url("https://hop3.example/"));
        assert_eq!(resolution.hops.len(), 3);
        assert_eq!(resolution.stop, ChainStop::IterationCapReached);
    }

    #[test]
    fn capped_walk_resumes_from_its_terminal() {
        let rules: Vec<_> = (0..5)
            .map(|step| {
                rewrite(
                    &format!("https://hop{step}.example/"),
                    &format!("https://hop{}.example/", step + 1),
                )
            })
            .collect();
        let active = gates(&[]);

        let first = resolve_with_rules(&url("https://hop0.example/"), &rules, &active, 3);
        assert_eq!(first.stop, ChainStop::IterationCapReached);

        let second = resolve_with_rules(&first.terminal, &rules, &active, 3);
        assert_eq!(second.terminal, url("https://hop5.example/"));
        assert_eq!(second.stop, ChainStop::NoMatchingRule);

        let third = resolve_with_rules(&second.terminal, &rules, &active, 3);
        assert_eq!(third.terminal, second.terminal);
        assert!(!third.redirected());
    }

    #[test]
    fn resolving_the_terminal_again_is_a_no_op() {
        let rules = vec![
            rewrite("https://a.example/", "https://b.example/"),
            rewrite("https://b.example/", "https://c.example/")
                .with_gate(PreferenceGate::DeAmpEnabled),
            rewrite("https://c.example/", "https://d.example/")
                .with_gate(PreferenceGate::DebounceEnabled),
        ];
        let active = gates(&[PreferenceGate::DeAmpEnabled]);

        let first = resolve_with_rules(&url("https://a.example/"), &rules, &active, 20);
        let second = resolve_with_rules(&first.terminal, &rules, &active, 20);
        assert_eq!(first.terminal, url("https://c.example/"));
        assert_eq!(second.terminal, first.terminal);
        assert!(!second.redirected());
    }

    #[test]
    fn provider_failure_keeps_the_original_url() {
        let from = url("https://a.example/");
        let resolution = resolve_redirect_chain(&from, &FailingProvider, &gates(&[]), 20);
        assert_eq!(resolution.terminal, from);
        assert_eq!(resolution.stop, ChainStop::ProviderUnavailable);
    }
}
