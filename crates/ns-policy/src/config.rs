//! Preference snapshots and engine configuration.

use ns_core::PolicyError;
use ns_core::PolicyResult;
use ns_debounce::ActiveGates;
use ns_debounce::DEFAULT_MAX_CHAIN_STEPS;
use ns_debounce::PreferenceGate;
use ns_shields::ShieldDefaults;
use serde::Deserialize;
use std::time::Duration;

pub const MAX_REDIRECT_CHAIN_ENV: &str = "NAVSHIELD_MAX_REDIRECT_CHAIN";
pub const READINESS_TIMEOUT_ENV: &str = "NAVSHIELD_READINESS_TIMEOUT_MS";

const MAX_REDIRECT_CHAIN_LIMIT: usize = 64;
const DEFAULT_READINESS_TIMEOUT: Duration = Duration::from_secs(10);

/// Snapshot of the global preference store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub block_ads_and_tracking: bool,
    pub https_upgrade: bool,
    pub safe_browsing: bool,
    pub block_scripts: bool,
    pub auto_redirect_amp: bool,
    pub block_all_cookies: bool,
    pub debounce: bool,
    pub website_redirects: bool,
    pub private_browsing: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        let shields = ShieldDefaults::default();
        Self {
            block_ads_and_tracking: shields.block_ads_and_tracking,
            https_upgrade: shields.https_upgrade,
            safe_browsing: shields.safe_browsing,
            block_scripts: shields.block_scripts,
            auto_redirect_amp: true,
            block_all_cookies: false,
            debounce: true,
            website_redirects: false,
            private_browsing: false,
        }
    }
}

impl Preferences {
    /// Missing keys keep their defaults.
    pub fn from_json(json: &str) -> PolicyResult<Self> {
        serde_json::from_str(json).map_err(|error| {
            PolicyError::invalid_config(
                "config.preferences_invalid",
                format!("failed to parse preferences: {error}"),
            )
        })
    }
}

/// Per-decision view of the preferences, built once at the engine boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyConfiguration {
    pub shield_defaults: ShieldDefaults,
    pub active_gates: ActiveGates,
    pub de_amp_enabled: bool,
    pub block_all_cookies: bool,
    pub private_browsing: bool,
}

impl PolicyConfiguration {
    pub fn snapshot(preferences: &Preferences) -> Self {
        let mut active_gates = ActiveGates::new();
        if preferences.auto_redirect_amp {
            active_gates.insert(PreferenceGate::DeAmpEnabled);
        }
        if preferences.debounce {
            active_gates.insert(PreferenceGate::DebounceEnabled);
        }
        if preferences.website_redirects {
            active_gates.insert(PreferenceGate::WebsiteRedirectsEnabled);
        }

        Self {
            shield_defaults: ShieldDefaults {
                block_ads_and_tracking: preferences.block_ads_and_tracking,
                https_upgrade: preferences.https_upgrade,
                safe_browsing: preferences.safe_browsing,
                block_scripts: preferences.block_scripts,
            },
            active_gates,
            de_amp_enabled: preferences.auto_redirect_amp,
            block_all_cookies: preferences.block_all_cookies,
            private_browsing: preferences.private_browsing,
        }
    }
}

impl Default for PolicyConfiguration {
    fn default() -> Self {
        Self::snapshot(&Preferences::default())
    }
}

/// Limits applied by the navigation engine itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub max_redirect_chain: usize,
    /// `None` waits for ad-block readiness indefinitely.
    pub readiness_timeout: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_redirect_chain: DEFAULT_MAX_CHAIN_STEPS,
            readiness_timeout: Some(DEFAULT_READINESS_TIMEOUT),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> PolicyResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> PolicyResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(MAX_REDIRECT_CHAIN_ENV) {
            config.max_redirect_chain = raw.trim().parse().map_err(|error| {
                PolicyError::invalid_config(
                    "config.max_redirect_chain_invalid",
                    format!("{MAX_REDIRECT_CHAIN_ENV}=`{raw}` is not a number: {error}"),
                )
            })?;
        }

        if let Some(raw) = lookup(READINESS_TIMEOUT_ENV) {
            let millis: u64 = raw.trim().parse().map_err(|error| {
                PolicyError::invalid_config(
                    "config.readiness_timeout_invalid",
                    format!("{READINESS_TIMEOUT_ENV}=`{raw}` is not a number: {error}"),
                )
            })?;
            config.readiness_timeout = (millis > 0).then(|| Duration::from_millis(millis));
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PolicyResult<()> {
        if !(1..=MAX_REDIRECT_CHAIN_LIMIT).contains(&self.max_redirect_chain) {
            return Err(PolicyError::invalid_config(
                "config.max_redirect_chain_out_of_range",
                format!(
                    "max redirect chain must be between 1 and {MAX_REDIRECT_CHAIN_LIMIT}, got {}",
                    self.max_redirect_chain
                ),
            ));
        }

        if self.readiness_timeout == Some(Duration::ZERO) {
            return Err(PolicyError::invalid_config(
                "config.readiness_timeout_zero",
                "use no timeout instead of a zero readiness timeout",
            ));
        }

        Ok(())
    }
}
