//! Per-domain shield settings and their resolution against global defaults.

mod store;

use ns_core::PolicyResult;
use serde::Deserialize;
use serde::Serialize;
use tracing::warn;

pub use store::InMemoryShieldStore;

/// Individual shield toggles a domain may override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shield {
    AllOff,
    AdblockAndTrackingProtection,
    HttpsUpgrade,
    SafeBrowsing,
    NoScript,
}

/// Global shield preferences applied when a domain has no override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShieldDefaults {
    pub block_ads_and_tracking: bool,
    pub https_upgrade: bool,
    pub safe_browsing: bool,
    pub block_scripts: bool,
}

impl Default for ShieldDefaults {
    fn default() -> Self {
        Self {
            block_ads_and_tracking: true,
            https_upgrade: true,
            safe_browsing: true,
            block_scripts: false,
        }
    }
}

/// Stored per-domain overrides. `None` inherits the global default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShieldOverrides {
    pub all_off: Option<bool>,
    pub ad_block_and_tracking: Option<bool>,
    pub https_upgrade: Option<bool>,
    pub safe_browsing: Option<bool>,
    pub no_script: Option<bool>,
}

impl ShieldOverrides {
    pub fn get(&self, shield: Shield) -> Option<bool> {
        match shield {
            Shield::AllOff => self.all_off,
            Shield::AdblockAndTrackingProtection => self.ad_block_and_tracking,
            Shield::HttpsUpgrade => self.https_upgrade,
            Shield::SafeBrowsing => self.safe_browsing,
            Shield::NoScript => self.no_script,
        }
    }

    pub fn with(mut self, shield: Shield, value: Option<bool>) -> Self {
        match shield {
            Shield::AllOff => self.all_off = value,
            Shield::AdblockAndTrackingProtection => self.ad_block_and_tracking = value,
            Shield::HttpsUpgrade => self.https_upgrade = value,
            Shield::SafeBrowsing => self.safe_browsing = value,
            Shield::NoScript => self.no_script = value,
        }
        self
    }

    /// Per-flag layering: values set here win over `base`.
    pub fn layered_over(self, base: Self) -> Self {
        Self {
            all_off: self.all_off.or(base.all_off),
            ad_block_and_tracking: self.ad_block_and_tracking.or(base.ad_block_and_tracking),
            https_upgrade: self.https_upgrade.or(base.https_upgrade),
            safe_browsing: self.safe_browsing.or(base.safe_browsing),
            no_script: self.no_script.or(base.no_script),
        }
    }
}

/// Effective shield configuration for one registrable domain.
///
/// The stored flags are kept as they were resolved; every accessor applies the
/// `all_shields_off` override at read time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShieldSettings {
    all_shields_off: bool,
    ad_block_and_tracking_protection: bool,
    no_script: bool,
    safe_browsing: bool,
    https_upgrade: bool,
}

impl ShieldSettings {
    pub fn from_defaults(defaults: &ShieldDefaults) -> Self {
        Self::from_overrides(ShieldOverrides::default(), defaults)
    }

    pub fn from_overrides(overrides: ShieldOverrides, defaults: &ShieldDefaults) -> Self {
        Self {
            all_shields_off: overrides.all_off.unwrap_or(false),
            ad_block_and_tracking_protection: overrides
                .ad_block_and_tracking
                .unwrap_or(defaults.block_ads_and_tracking),
            no_script: overrides.no_script.unwrap_or(defaults.block_scripts),
            safe_browsing: overrides.safe_browsing.unwrap_or(defaults.safe_browsing),
            https_upgrade: overrides.https_upgrade.unwrap_or(defaults.https_upgrade),
        }
    }

    pub fn all_shields_off(&self) -> bool {
        self.all_shields_off
    }

    pub fn ad_block_and_tracking_protection_on(&self) -> bool {
        !self.all_shields_off && self.ad_block_and_tracking_protection
    }

    pub fn no_script_on(&self) -> bool {
        !self.all_shields_off && self.no_script
    }

    pub fn safe_browsing_on(&self) -> bool {
        !self.all_shields_off && self.safe_browsing
    }

    pub fn https_upgrade_on(&self) -> bool {
        !self.all_shields_off && self.https_upgrade
    }

    /// Whether `shield` is expected to be active, with the all-off override applied.
    pub fn is_shield_expected(&self, shield: Shield) -> bool {
        match shield {
            Shield::AllOff => self.all_shields_off,
            Shield::AdblockAndTrackingProtection => self.ad_block_and_tracking_protection_on(),
            Shield::HttpsUpgrade => self.https_upgrade_on(),
            Shield::SafeBrowsing => self.safe_browsing_on(),
            Shield::NoScript => self.no_script_on(),
        }
    }
}

/// Read access to persisted per-domain overrides.
pub trait ShieldSettingsStore {
    fn get(&self, domain: &str) -> PolicyResult<Option<ShieldOverrides>>;

    /// Overrides made during the current private session.
    fn get_private(&self, _domain: &str) -> PolicyResult<Option<ShieldOverrides>> {
        Ok(None)
    }
}

impl<T> ShieldSettingsStore for std::sync::Arc<T>
where
    T: ShieldSettingsStore + ?Sized,
{
    fn get(&self, domain: &str) -> PolicyResult<Option<ShieldOverrides>> {
        (**self).get(domain)
    }

    fn get_private(&self, domain: &str) -> PolicyResult<Option<ShieldOverrides>> {
        (**self).get_private(domain)
    }
}

/// Resolves the effective settings for `domain`.
///
/// A store failure falls back to `defaults`; it never fails the navigation.
pub fn resolve<S>(
    store: &S,
    domain: &str,
    is_private_browsing: bool,
    defaults: &ShieldDefaults,
) -> ShieldSettings
where
    S: ShieldSettingsStore + ?Sized,
{
    try_resolve(store, domain, is_private_browsing, defaults).unwrap_or_else(|error| {
        warn!(domain, code = error.code, %error, "shield store unavailable, using defaults");
        ShieldSettings::from_defaults(defaults)
    })
}

/// Like [`resolve`], but reports a failed persistent lookup to the caller.
///
/// Private overrides are best effort: a failure there is logged and the
/// persistent settings are used.
pub fn try_resolve<S>(
    store: &S,
    domain: &str,
    is_private_browsing: bool,
    defaults: &ShieldDefaults,
) -> PolicyResult<ShieldSettings>
where
    S: ShieldSettingsStore + ?Sized,
{
    let persistent = store.get(domain)?.unwrap_or_default();

    let effective = if is_private_browsing {
        match store.get_private(domain) {
            Ok(Some(private)) => private.layered_over(persistent),
            Ok(None) => persistent,
            Err(error) => {
                warn!(domain, code = error.code, %error, "private shield overrides unavailable");
                persistent
            }
        }
    } else {
        persistent
    };

    Ok(ShieldSettings::from_overrides(effective, defaults))
}

#[cfg(test)]
mod tests {
    use super::InMemoryShieldStore;
    use super::Shield;
    use super::ShieldDefaults;
    use super::ShieldOverrides;
    use super::ShieldSettingsStore;
    use super::resolve;
    use super::try_resolve;
    use ns_core::PolicyError;
    use ns_core::PolicyResult;

    struct UnavailableStore;

    impl ShieldSettingsStore for UnavailableStore {
        fn get(&self, _domain: &str) -> PolicyResult<Option<ShieldOverrides>> {
            Err(PolicyError::unavailable("shields.test_unavailable", "offline"))
        }
    }

    #[test]
    fn missing_record_uses_defaults() {
        let store = InMemoryShieldStore::new();
        let settings = resolve(&store, "example.com", false, &ShieldDefaults::default());
        assert!(settings.ad_block_and_tracking_protection_on());
        assert!(settings.https_upgrade_on());
        assert!(settings.safe_browsing_on());
        assert!(!settings.no_script_on());
        assert!(!settings.all_shields_off());
    }

    #[test]
    fn all_off_forces_every_flag_off() {
        let store = InMemoryShieldStore::new();
        let overrides = ShieldOverrides {
            all_off: Some(true),
            ad_block_and_tracking: Some(true),
            https_upgrade: Some(true),
            safe_browsing: Some(true),
            no_script: Some(true),
        };
        assert!(store.set("example.com", overrides).is_ok());

        let settings = resolve(&store, "example.com", false, &ShieldDefaults::default());
        assert!(settings.all_shields_off());
        assert!(!settings.ad_block_and_tracking_protection_on());
        assert!(!settings.no_script_on());
        assert!(!settings.safe_browsing_on());
        assert!(!settings.https_upgrade_on());
        assert!(!settings.is_shield_expected(Shield::AdblockAndTrackingProtection));
    }

    #[test]
    fn store_failure_falls_back_to_defaults() {
        let defaults = ShieldDefaults {
            block_scripts: true,
            ..ShieldDefaults::default()
        };
        let settings = resolve(&UnavailableStore, "example.com", false, &defaults);
        assert!(settings.no_script_on());
        assert!(settings.ad_block_and_tracking_protection_on());

        let reported = try_resolve(&UnavailableStore, "example.com", false, &defaults);
        assert!(reported.is_err());
    }

    #[test]
    fn private_overrides_only_apply_in_private_mode() {
        let store = InMemoryShieldStore::new();
        let persistent = ShieldOverrides::default().with(Shield::NoScript, Some(true));
        let private = ShieldOverrides::default()
            .with(Shield::AdblockAndTrackingProtection, Some(false));
        assert!(store.set("example.com", persistent).is_ok());
        assert!(store.set_private("example.com", private).is_ok());

        let normal = resolve(&store, "example.com", false, &ShieldDefaults::default());
        assert!(normal.ad_block_and_tracking_protection_on());
        assert!(normal.no_script_on());

        let private_mode = resolve(&store, "example.com", true, &ShieldDefaults::default());
        assert!(!private_mode.ad_block_and_tracking_protection_on());
        assert!(private_mode.no_script_on());
    }
}
