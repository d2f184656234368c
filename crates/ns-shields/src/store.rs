//! In-memory settings store with separate private-session overrides.

use crate::ShieldOverrides;
use crate::ShieldSettingsStore;
use ns_core::PolicyError;
use ns_core::PolicyResult;
use std::collections::HashMap;
use std::sync::RwLock;

/// Settings store keyed by normalized registrable domain.
#[derive(Debug, Default)]
pub struct InMemoryShieldStore {
    persistent: RwLock<HashMap<String, ShieldOverrides>>,
    private: RwLock<HashMap<String, ShieldOverrides>>,
}

impl InMemoryShieldStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_domain(self, domain: &str, overrides: ShieldOverrides) -> PolicyResult<Self> {
        self.set(domain, overrides)?;
        Ok(self)
    }

    pub fn set(&self, domain: &str, overrides: ShieldOverrides) -> PolicyResult<()> {
        write_entry(&self.persistent, domain, Some(overrides))
    }

    pub fn remove(&self, domain: &str) -> PolicyResult<()> {
        write_entry(&self.persistent, domain, None)
    }

    pub fn set_private(&self, domain: &str, overrides: ShieldOverrides) -> PolicyResult<()> {
        write_entry(&self.private, domain, Some(overrides))
    }

    /// Drops every private-session override, e.g. when the last private tab closes.
    pub fn clear_private_overrides(&self) -> PolicyResult<()> {
        let mut map = self.private.write().map_err(|_| poisoned())?;
        map.clear();
        Ok(())
    }
}

impl ShieldSettingsStore for InMemoryShieldStore {
    fn get(&self, domain: &str) -> PolicyResult<Option<ShieldOverrides>> {
        read_entry(&self.persistent, domain)
    }

    fn get_private(&self, domain: &str) -> PolicyResult<Option<ShieldOverrides>> {
        read_entry(&self.private, domain)
    }
}

fn normalize_domain(domain: &str) -> String {
    domain.trim().trim_end_matches('.').to_ascii_lowercase()
}

fn read_entry(
    map: &RwLock<HashMap<String, ShieldOverrides>>,
    domain: &str,
) -> PolicyResult<Option<ShieldOverrides>> {
    let map = map.read().map_err(|_| poisoned())?;
    Ok(map.get(&normalize_domain(domain)).copied())
}

fn write_entry(
    map: &RwLock<HashMap<String, ShieldOverrides>>,
    domain: &str,
    overrides: Option<ShieldOverrides>,
) -> PolicyResult<()> {
    let key = normalize_domain(domain);
    if key.is_empty() {
        return Err(PolicyError::malformed(
            "shields.domain_empty",
            "shield overrides need a non-empty domain",
        ));
    }

    let mut map = map.write().map_err(|_| poisoned())?;
    match overrides {
        Some(overrides) => {
            map.insert(key, overrides);
        }
        None => {
            map.remove(&key);
        }
    }
    Ok(())
}

fn poisoned() -> PolicyError {
    PolicyError::unavailable(
        "shields.store_poisoned",
        "shield settings store lock was poisoned",
    )
}
