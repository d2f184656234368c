//! Per-tab navigation state and the session that guards it.

use crate::config::PolicyConfiguration;
use crate::scripts::ScriptSet;
use crate::scripts::ScriptToggleInstruction;
use crate::scripts::desired_scripts;
use crate::scripts::diff_scripts;
use ns_core::ErrorKind;
use ns_core::PolicyError;
use ns_core::PolicyResult;
use ns_shields::ShieldSettings;
use ns_url::SchemeFamily;
use ns_url::schemeless;
use std::collections::BTreeSet;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use tracing::debug;
use tracing::trace;
use url::Url;

/// What is known about the document currently loading in a tab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageData {
    main_frame_url: Url,
    subframe_urls: BTreeSet<Url>,
    active_scripts: ScriptSet,
    scripts_synced: bool,
}

impl PageData {
    pub fn new(main_frame_url: Url) -> Self {
        Self {
            main_frame_url,
            subframe_urls: BTreeSet::new(),
            active_scripts: ScriptSet::new(),
            scripts_synced: false,
        }
    }

    pub fn main_frame_url(&self) -> &Url {
        &self.main_frame_url
    }

    pub fn subframe_urls(&self) -> &BTreeSet<Url> {
        &self.subframe_urls
    }

    pub fn active_scripts(&self) -> &ScriptSet {
        &self.active_scripts
    }

    pub fn scripts_synced(&self) -> bool {
        self.scripts_synced
    }

    pub fn diff_scripts(&self, desired: &ScriptSet) -> Vec<ScriptToggleInstruction> {
        diff_scripts(&self.active_scripts, self.scripts_synced, desired)
    }

    fn record_scripts(&mut self, scripts: ScriptSet) {
        self.active_scripts = scripts;
        self.scripts_synced = true;
    }
}

/// State changes produced by a decision, applied under the session lock.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatePatch {
    pub navigation_start: Option<Url>,
    pub frame_seen: Option<(Url, bool)>,
    pub active_scripts: Option<ScriptSet>,
    pub pending_https_upgrade: Option<String>,
}

impl StatePatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TabNavigationState {
    current_page_data: Option<PageData>,
    redirect_history: Vec<Url>,
    pending_download: bool,
    committed_url: Option<Url>,
    pending_https_upgrades: BTreeSet<String>,
    is_child_tab: bool,
    generation: u64,
}

impl TabNavigationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// State for a tab opened by another tab.
    pub fn child() -> Self {
        Self {
            is_child_tab: true,
            ..Self::default()
        }
    }

    pub fn current_page_data(&self) -> Option<&PageData> {
        self.current_page_data.as_ref()
    }

    pub fn redirect_history(&self) -> &[Url] {
        &self.redirect_history
    }

    pub fn pending_download(&self) -> bool {
        self.pending_download
    }

    pub fn committed_url(&self) -> Option<&Url> {
        self.committed_url.as_ref()
    }

    pub fn pending_https_upgrades(&self) -> &BTreeSet<String> {
        &self.pending_https_upgrades
    }

    pub fn is_child_tab(&self) -> bool {
        self.is_child_tab
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether a navigation to `main_document_url` would start from fresh page data.
    pub fn would_reset(&self, main_document_url: &Url) -> bool {
        self.current_page_data
            .as_ref()
            .is_none_or(|page| page.main_frame_url != *main_document_url)
    }

    /// Resets page data when the main document changes. Returns true on reset.
    pub fn on_navigation_start(&mut self, main_document_url: &Url) -> bool {
        if !self.would_reset(main_document_url) {
            return false;
        }

        self.current_page_data = Some(PageData::new(main_document_url.clone()));
        self.bump_generation();
        trace!(url = %main_document_url, generation = self.generation, "page data reset");
        true
    }

    pub fn on_subresource_seen(&mut self, url: &Url, is_main_frame: bool) {
        if is_main_frame {
            if let Some(page) = self.current_page_data.as_mut() {
                page.main_frame_url = url.clone();
                return;
            }
            self.current_page_data = Some(PageData::new(url.clone()));
            return;
        }

        match self.current_page_data.as_mut() {
            Some(page) => {
                page.subframe_urls.insert(url.clone());
            }
            None => trace!(url = %url, "sub-frame seen before any main document"),
        }
    }

    /// Follows an `http` to `https` upgrade of a tracked frame.
    ///
    /// Returns the script changes for the main frame; sub-frame upgrades only
    /// rewrite the tracked URL.
    pub fn on_response_upgraded(
        &mut self,
        response_url: &Url,
        shields: &ShieldSettings,
        config: &PolicyConfiguration,
        adblock_ready: bool,
    ) -> Vec<ScriptToggleInstruction> {
        if SchemeFamily::of(response_url) != SchemeFamily::Https {
            return Vec::new();
        }

        let Some(page) = self.current_page_data.as_mut() else {
            return Vec::new();
        };

        let downgraded = page
            .subframe_urls
            .iter()
            .find(|url| is_upgrade_of(url, response_url))
            .cloned();
        if let Some(previous) = downgraded {
            page.subframe_urls.remove(&previous);
            page.subframe_urls.insert(response_url.clone());
        }

        if !is_upgrade_of(&page.main_frame_url, response_url) {
            return Vec::new();
        }

        page.main_frame_url = response_url.clone();
        let desired = desired_scripts(response_url, shields, config, adblock_ready);
        let instructions = page.diff_scripts(&desired);
        page.record_scripts(desired);
        debug!(url = %response_url, changed = instructions.len(), "main frame upgraded to https");
        instructions
    }

    pub fn apply(&mut self, patch: StatePatch) {
        if let Some(url) = &patch.navigation_start {
            self.on_navigation_start(url);
        }
        if let Some((url, is_main_frame)) = &patch.frame_seen {
            self.on_subresource_seen(url, *is_main_frame);
        }
        if let Some(scripts) = patch.active_scripts {
            if let Some(page) = self.current_page_data.as_mut() {
                page.record_scripts(scripts);
            }
        }
        if let Some(host) = patch.pending_https_upgrade {
            self.pending_https_upgrades.insert(host);
        }
    }

    /// Removes a pending upgrade for `host`. Returns whether one was pending.
    pub fn take_pending_https_upgrade(&mut self, host: &str) -> bool {
        self.pending_https_upgrades.remove(host)
    }

    pub fn take_pending_download(&mut self) -> bool {
        std::mem::take(&mut self.pending_download)
    }

    fn bump_generation(&mut self) -> u64 {
        self.generation = self.generation.wrapping_add(1);
        self.generation
    }
}

fn is_upgrade_of(tracked: &Url, upgraded: &Url) -> bool {
    SchemeFamily::of(tracked) == SchemeFamily::Http && schemeless(tracked) == schemeless(upgraded)
}

/// A tab's navigation state, shared between concurrent decisions.
///
/// The lock is never held across an await point.
#[derive(Debug, Default)]
pub struct TabSession {
    state: Mutex<TabNavigationState>,
}

impl TabSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn child() -> Self {
        Self::with_state(TabNavigationState::child())
    }

    pub fn with_state(state: TabNavigationState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn snapshot(&self) -> TabNavigationState {
        self.lock().clone()
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Starts a decision and returns the generation it belongs to.
    ///
    /// Main-frame decisions supersede everything issued before them.
    pub fn begin_decision(&self, is_main_frame: bool) -> u64 {
        let mut state = self.lock();
        if is_main_frame {
            state.bump_generation()
        } else {
            state.generation
        }
    }

    /// Runs `f` on the state if no newer decision or page reset happened since
    /// `generation` was captured.
    pub fn with_generation<R, F>(&self, generation: u64, f: F) -> PolicyResult<R>
    where
        F: FnOnce(&mut TabNavigationState) -> R,
    {
        let mut state = self.lock();
        if state.generation != generation {
            return Err(PolicyError::new(
                "policy.decision_stale",
                ErrorKind::StaleDecision,
                format!(
                    "decision from generation {generation} superseded by generation {}",
                    state.generation
                ),
            ));
        }
        Ok(f(&mut *state))
    }

    pub fn update<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&mut TabNavigationState) -> R,
    {
        f(&mut *self.lock())
    }

    pub fn on_navigation_start(&self, main_document_url: &Url) -> bool {
        self.lock().on_navigation_start(main_document_url)
    }

    pub fn on_subresource_seen(&self, url: &Url, is_main_frame: bool) {
        self.lock().on_subresource_seen(url, is_main_frame);
    }

    pub fn did_receive_server_redirect(&self, url: &Url) {
        self.lock().redirect_history.push(url.clone());
    }

    pub fn did_commit(&self, url: &Url) {
        let mut state = self.lock();
        state.committed_url = Some(url.clone());
        trace!(url = %url, "navigation committed");
    }

    /// Ends the provisional load and hands back its server redirects.
    pub fn did_finish(&self) -> Vec<Url> {
        std::mem::take(&mut self.lock().redirect_history)
    }

    /// Like [`TabSession::did_finish`]; pending HTTPS upgrades are dropped too.
    pub fn did_fail(&self) -> Vec<Url> {
        let mut state = self.lock();
        state.pending_https_upgrades.clear();
        std::mem::take(&mut state.redirect_history)
    }

    /// The next response on this tab is downloaded instead of shown.
    pub fn mark_pending_download(&self) {
        self.lock().pending_download = true;
    }

    fn lock(&self) -> MutexGuard<'_, TabNavigationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::StatePatch;
    use super::TabNavigationState;
    use super::TabSession;
    use crate::config::PolicyConfiguration;
    use crate::scripts::ScriptKind;
    use crate::scripts::ScriptSet;
    use ns_core::ErrorKind;
    use ns_shields::ShieldDefaults;
    use ns_shields::ShieldSettings;
    use url::Url;

    fn url(input: &str) -> Url {
        match Url::parse(input) {
            Ok(value) => value,
            Err(error) => panic!("{input}: {error}"),
        }
    }

    fn subframe_count(state: &TabNavigationState) -> usize {
        state
            .current_page_data()
            .map_or(0, |page| page.subframe_urls().len())
    }

    #[test]
    fn same_main_document_keeps_subframes() {
        let mut state = TabNavigationState::new();
        let page = url("https://example.com/");
        assert!(state.on_navigation_start(&page));
        state.on_subresource_seen(&url("https://ads.example.net/frame"), false);
        let generation = state.generation();

        assert!(!state.on_navigation_start(&page));
        assert_eq!(subframe_count(&state), 1);
        assert_eq!(state.generation(), generation);

        assert!(state.on_navigation_start(&url("https://other.example/")));
        assert_eq!(subframe_count(&state), 0);
        assert!(state.generation() > generation);
    }

    #[test]
    fn patch_records_scripts_on_fresh_page() {
        let mut state = TabNavigationState::new();
        let page = url("http://example.com/");
        let scripts: ScriptSet = [ScriptKind::DeAmp].into_iter().collect();
        state.apply(StatePatch {
            navigation_start: Some(page.clone()),
            frame_seen: Some((page.clone(), true)),
            active_scripts: Some(scripts.clone()),
            pending_https_upgrade: Some("example.com".to_owned()),
        });

        let Some(data) = state.current_page_data() else {
            panic!("page data missing");
        };
        assert!(data.scripts_synced());
        assert_eq!(data.active_scripts(), &scripts);
        assert!(state.pending_https_upgrades().contains("example.com"));
        assert!(StatePatch::default().is_empty());
    }

    #[test]
    fn upgraded_main_frame_recomputes_scripts() {
        let mut state = TabNavigationState::new();
        let page = url("http://example.com/a");
        state.apply(StatePatch {
            navigation_start: Some(page.clone()),
            frame_seen: Some((page, true)),
            active_scripts: Some(ScriptSet::new()),
            pending_https_upgrade: None,
        });

        let shields = ShieldSettings::from_defaults(&ShieldDefaults::default());
        let config = PolicyConfiguration::default();
        let instructions =
            state.on_response_upgraded(&url("https://example.com/a"), &shields, &config, true);

        assert!(
            instructions
                .iter()
                .any(|instruction| instruction.kind == ScriptKind::RequestBlocking
                    && instruction.enabled)
        );
        assert_eq!(
            state.current_page_data().map(|page| page.main_frame_url().as_str()),
            Some("https://example.com/a")
        );

        let unrelated =
            state.on_response_upgraded(&url("https://example.com/b"), &shields, &config, true);
        assert!(unrelated.is_empty());
    }

    #[test]
    fn stale_generation_is_rejected() {
        let session = TabSession::new();
        let first = session.begin_decision(true);
        let second = session.begin_decision(true);
        assert!(second > first);

        let stale = session.with_generation(first, |_| ());
        assert!(stale.is_err());
        if let Err(error) = stale {
            assert_eq!(error.kind, ErrorKind::StaleDecision);
        }
        assert!(session.with_generation(second, |_| ()).is_ok());

        let sub_frame = session.begin_decision(false);
        assert_eq!(sub_frame, second);
    }

    #[test]
    fn lifecycle_hands_back_redirects() {
        let session = TabSession::child();
        session.did_receive_server_redirect(&url("https://a.example/"));
        session.did_receive_server_redirect(&url("https://b.example/"));
        assert_eq!(session.did_finish().len(), 2);
        assert!(session.did_fail().is_empty());

        session.did_commit(&url("https://b.example/"));
        session.mark_pending_download();
        let snapshot = session.snapshot();
        assert!(snapshot.is_child_tab());
        assert!(snapshot.pending_download());
        assert_eq!(
            snapshot.committed_url().map(Url::as_str),
            Some("https://b.example/")
        );
    }
}
