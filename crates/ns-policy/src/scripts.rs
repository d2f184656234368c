//! Page scripts toggled per navigation.

use crate::config::PolicyConfiguration;
use ns_shields::ShieldSettings;
use ns_url::is_web_page;
use std::collections::BTreeSet;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScriptKind {
    DeAmp,
    CookieBlocking,
    RequestBlocking,
    TrackerProtectionStats,
}

impl ScriptKind {
    pub const ALL: [ScriptKind; 4] = [
        Self::DeAmp,
        Self::CookieBlocking,
        Self::RequestBlocking,
        Self::TrackerProtectionStats,
    ];
}

pub type ScriptSet = BTreeSet<ScriptKind>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptToggleInstruction {
    pub kind: ScriptKind,
    pub enabled: bool,
}

/// Scripts that should run in the main frame of `url`.
pub fn desired_scripts(
    url: &Url,
    shields: &ShieldSettings,
    config: &PolicyConfiguration,
    adblock_ready: bool,
) -> ScriptSet {
    let mut scripts = ScriptSet::new();
    if config.de_amp_enabled {
        scripts.insert(ScriptKind::DeAmp);
    }
    if config.block_all_cookies {
        scripts.insert(ScriptKind::CookieBlocking);
    }
    if shields.ad_block_and_tracking_protection_on() && is_web_page(url, false) && adblock_ready {
        scripts.insert(ScriptKind::RequestBlocking);
        scripts.insert(ScriptKind::TrackerProtectionStats);
    }
    scripts
}

/// Toggle instructions that move `active` to `desired`.
///
/// With `synced == false` nothing has been applied yet, so every kind is emitted.
pub fn diff_scripts(active: &ScriptSet, synced: bool, desired: &ScriptSet) -> Vec<ScriptToggleInstruction> {
    ScriptKind::ALL
        .iter()
        .copied()
        .filter(|kind| !synced || active.contains(kind) != desired.contains(kind))
        .map(|kind| ScriptToggleInstruction {
            kind,
            enabled: desired.contains(&kind),
        })
        .collect()
}
