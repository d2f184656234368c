//! Events reported alongside policy decisions.

use crate::engine::CancelReason;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelemetryEvent {
    HttpsUpgradeApplied { host: String },
    NavigationBlocked { reason: CancelReason },
    RedirectApplied { from: Url, to: Url, hops: usize },
    StaleDecisionDiscarded { generation: u64 },
    /// Ad-block rules were not ready in time, or their signal went away.
    ReadinessTimedOut { waited: Option<Duration> },
    ResolverUnavailable { resolver: &'static str, code: &'static str },
}

impl TelemetryEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::HttpsUpgradeApplied { .. } => "https_upgrade_applied",
            Self::NavigationBlocked { .. } => "navigation_blocked",
            Self::RedirectApplied { .. } => "redirect_applied",
            Self::StaleDecisionDiscarded { .. } => "stale_decision_discarded",
            Self::ReadinessTimedOut { .. } => "readiness_timed_out",
            Self::ResolverUnavailable { .. } => "resolver_unavailable",
        }
    }
}
