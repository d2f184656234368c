//! Navigation decision engine.
//!
//! Every outbound navigation passes through [`NavigationEngine::decide_policy`]:
//! it waits for ad-block readiness, then evaluates the request against the
//! tab's state in a single critical section. Evaluation itself is pure: it
//! returns a [`StatePatch`] that the caller applies.


use crate::classify::SpecialAction;
use crate::classify::StaticUniversalLinks;
use crate::classify::UniversalLinkResolver;
use crate::classify::classify;
use crate::config::EngineConfig;
use crate::config::PolicyConfiguration;
use crate::page_state::StatePatch;
use crate::page_state::TabNavigationState;
use crate::page_state::TabSession;
use crate::readiness::Readiness;
use crate::readiness::ReadinessGate;
use crate::request::NavigationCause;
use crate::request::NavigationRequest;
use crate::response::NavigationResponse;
use crate::response::ResponseDisposition;
use crate::response::resolve_response;
use crate::scripts::ScriptToggleInstruction;
use crate::scripts::desired_scripts;
use crate::scripts::diff_scripts;
use crate::telemetry::TelemetryEvent;
use ns_core::PolicyResult;
use ns_debounce::ChainResolution;
use ns_debounce::ChainStop;
use ns_debounce::RedirectRuleProvider;
use ns_debounce::StaticRuleProvider;
use ns_debounce::WebsiteRedirect;
use ns_debounce::apply_website_redirects;
use ns_debounce::resolve_redirect_chain;
use ns_shields::InMemoryShieldStore;
use ns_shields::ShieldSettings;
use ns_shields::ShieldSettingsStore;
use ns_shields::try_resolve;
use ns_url::InternalUrl;
use ns_url::InternalUrlAuthorizer;
use ns_url::SchemeFamily;
use ns_url::SessionKeyAuthorizer;
use ns_url::is_standard_web_scheme;
use ns_url::is_web_page;
use ns_url::normalized_host;
use ns_url::registrable_domain;
use ns_url::same_registrable_domain;
use ns_url::schemeless;
use tracing::debug;
use tracing::trace;
use tracing::warn;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelReason {
    /// Internal page opened without authorization.
    Unprivileged,
    Bookmarklet,
    /// The browser took over, e.g. to show the VPN purchase screen.
    HandledExternally,
    ExternalApp { scheme: String },
    AppScheme { scheme: String },
    /// A newer navigation on the same tab replaced this one.
    Superseded,
}

impl CancelReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unprivileged => "unprivileged",
            Self::Bookmarklet => "bookmarklet",
            Self::HandledExternally => "handled_externally",
            Self::ExternalApp { .. } => "external_app",
            Self::AppScheme { .. } => "app_scheme",
            Self::Superseded => "superseded",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowDirectives {
    pub scripts: Vec<ScriptToggleInstruction>,
    /// Set for main-document loads only.
    pub javascript_enabled: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationDisposition {
    Allow(AllowDirectives),
    Cancel(CancelReason),
    Redirect {
        to: Url,
        headers: Vec<(String, String)>,
    },
}

impl NavigationDisposition {
    pub fn allow() -> Self {
        Self::Allow(AllowDirectives::default())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Allow(_) => "allow",
            Self::Cancel(_) => "cancel",
            Self::Redirect { .. } => "redirect",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptReason {
    ExternalAppScheme,
    AppleMaps,
    AppStore,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalPromptInstruction {
    pub url: Url,
    pub reason: PromptReason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideEffect {
    PromptExternalApp(ExternalPromptInstruction),
    PresentVpnScreen,
    /// Open the URL in the app without confirmation.
    OpenInApp { url: Url, report_failure: bool },
}

/// Result of one navigation decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationDecision {
    pub disposition: NavigationDisposition,
    pub effects: Vec<SideEffect>,
    pub telemetry: Vec<TelemetryEvent>,
}

impl NavigationDecision {
    fn new(disposition: NavigationDisposition) -> Self {
        Self {
            disposition,
            effects: Vec::new(),
            telemetry: Vec::new(),
        }
    }

    fn cancel(reason: CancelReason) -> Self {
        debug!(reason = reason.as_str(), "navigation cancelled");
        let mut decision = Self::new(NavigationDisposition::Cancel(reason.clone()));
        decision
            .telemetry
            .push(TelemetryEvent::NavigationBlocked { reason });
        decision
    }

    fn with_effect(mut self, effect: SideEffect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn prompt(&self) -> Option<&ExternalPromptInstruction> {
        self.effects.iter().find_map(|effect| match effect {
            SideEffect::PromptExternalApp(prompt) => Some(prompt),
            _ => None,
        })
    }
}

/// Output of [`NavigationEngine::evaluate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub decision: NavigationDecision,
    pub patch: StatePatch,
}

impl From<NavigationDecision> for Evaluation {
    fn from(decision: NavigationDecision) -> Self {
        Self {
            decision,
            patch: StatePatch::default(),
        }
    }
}

/// Inputs fixed at the start of a decision.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationContext<'a> {
    pub config: &'a PolicyConfiguration,
    pub adblock_ready: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseDecision {
    pub disposition: ResponseDisposition,
    pub scripts: Vec<ScriptToggleInstruction>,
    pub telemetry: Vec<TelemetryEvent>,
}

/// Policy engine with pluggable settings store, rule provider, internal-page
/// authorizer and universal-link resolver.
pub struct NavigationEngine<
    S = InMemoryShieldStore,
    P = StaticRuleProvider,
    A = SessionKeyAuthorizer,
    U = StaticUniversalLinks,
> where
    S: ShieldSettingsStore,
    P: RedirectRuleProvider,
    A: InternalUrlAuthorizer,
    U: UniversalLinkResolver,
{
    shields: S,
    rules: P,
    authorizer: A,
    universal_links: U,
    readiness: ReadinessGate,
    website_redirects: Vec<WebsiteRedirect>,
    config: EngineConfig,
}

impl NavigationEngine {
    pub fn new(authorizer: SessionKeyAuthorizer, readiness: ReadinessGate) -> PolicyResult<Self> {
        Self::with_parts(
            InMemoryShieldStore::new(),
            StaticRuleProvider::default(),
            authorizer,
            StaticUniversalLinks::new(),
            readiness,
            EngineConfig::default(),
        )
    }
}

impl<S, P, A, U> NavigationEngine<S, P, A, U>
where
    S: ShieldSettingsStore,
    P: RedirectRuleProvider,
    A: InternalUrlAuthorizer,
    U: UniversalLinkResolver,
{
    pub fn with_parts(
        shields: S,
        rules: P,
        authorizer: A,
        universal_links: U,
        readiness: ReadinessGate,
        config: EngineConfig,
    ) -> PolicyResult<Self> {
        config.validate()?;
        Ok(Self {
            shields,
            rules,
            authorizer,
            universal_links,
            readiness,
            website_redirects: WebsiteRedirect::defaults(),
            config,
        })
    }

    pub fn set_website_redirects(&mut self, redirects: Vec<WebsiteRedirect>) {
        self.website_redirects = redirects;
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Decides the policy for `request` on the tab behind `session`.
    ///
    /// Suspends until ad-block rules are ready (or the configured timeout
    /// passes). A decision overtaken by a newer main-frame navigation or page
    /// reset on the same tab is discarded.
    pub async fn decide_policy(
        &self,
        request: &NavigationRequest,
        session: &TabSession,
        config: &PolicyConfiguration,
    ) -> NavigationDecision {
        let generation = session.begin_decision(request.target_frame_is_main());
        trace!(
            stage = "received",
            url = request.raw_url(),
            main_frame = request.target_frame_is_main(),
            cause = request.cause().as_str(),
            generation,
            "navigation received"
        );

        let mut telemetry = Vec::new();
        let waited = self.config.readiness_timeout;
        let adblock_ready = match self.readiness.wait(waited).await {
            Readiness::Ready => true,
            outcome => {
                let closed = outcome == Readiness::Closed;
                warn!(
                    url = request.raw_url(),
                    closed,
                    "ad-block rules not ready, continuing without request blocking"
                );
                telemetry.push(TelemetryEvent::ReadinessTimedOut { waited });
                false
            }
        };

        let context = EvaluationContext {
            config,
            adblock_ready,
        };
        let outcome = session.with_generation(generation, |state| {
            let evaluation = self.evaluate(request, state, &context);
            state.apply(evaluation.patch);
            evaluation.decision
        });

        match outcome {
            Ok(mut decision) => {
                telemetry.append(&mut decision.telemetry);
                decision.telemetry = telemetry;
                debug!(
                    url = request.raw_url(),
                    disposition = decision.disposition.kind(),
                    effects = decision.effects.len(),
                    "navigation decided"
                );
                decision
            }
            Err(error) => {
                debug!(url = request.raw_url(), code = error.code, %error, "discarding stale decision");
                telemetry.push(TelemetryEvent::StaleDecisionDiscarded { generation });
                NavigationDecision {
                    disposition: NavigationDisposition::Cancel(CancelReason::Superseded),
                    effects: Vec::new(),
                    telemetry,
                }
            }
        }
    }

    /// Pure decision for `request` against a snapshot of the tab state.
    pub fn evaluate(
        &self,
        request: &NavigationRequest,
        state: &TabNavigationState,
        context: &EvaluationContext<'_>,
    ) -> Evaluation {
        let action = classify(request, &self.authorizer, &self.universal_links);
        trace!(stage = "classified", url = request.raw_url(), action = action.as_str());

        let evaluation: Evaluation = match action {
            SpecialAction::InternalLink { privileged: false }
                if request.cause() != NavigationCause::BackForward =>
            {
                NavigationDecision::cancel(CancelReason::Unprivileged).into()
            }
            SpecialAction::InternalLink { .. } => match request.url() {
                Some(url) => self.allow_internal(request, url, context),
                None => NavigationDecision::new(NavigationDisposition::allow()).into(),
            },
            SpecialAction::AboutScheme => NavigationDecision::new(NavigationDisposition::allow()).into(),
            SpecialAction::Bookmarklet => NavigationDecision::cancel(CancelReason::Bookmarklet).into(),
            SpecialAction::UniversalLinkBuyVpn => {
                NavigationDecision::cancel(CancelReason::HandledExternally)
                    .with_effect(SideEffect::PresentVpnScreen)
                    .into()
            }
            SpecialAction::ExternalAppScheme(_) => {
                self.external(request, state, PromptReason::ExternalAppScheme)
            }
            SpecialAction::AppleMapsLink => self.external(request, state, PromptReason::AppleMaps),
            SpecialAction::AppStoreLink => self.external(request, state, PromptReason::AppStore),
            SpecialAction::BraveScheme(scheme) => match request.url() {
                Some(url) => NavigationDecision::cancel(CancelReason::AppScheme { scheme })
                    .with_effect(SideEffect::OpenInApp {
                        url: url.clone(),
                        report_failure: request.cause() == NavigationCause::LinkActivated,
                    })
                    .into(),
                None => NavigationDecision::cancel(CancelReason::AppScheme { scheme }).into(),
            },
            SpecialAction::Ordinary => match request.url() {
                Some(url) => self.evaluate_ordinary(request, url, state, context),
                None => NavigationDecision::new(NavigationDisposition::allow()).into(),
            },
        };

        trace!(
            stage = "decided",
            url = request.raw_url(),
            disposition = evaluation.decision.disposition.kind(),
            telemetry = ?evaluation.decision.telemetry.iter().map(TelemetryEvent::name).collect::<Vec<_>>(),
            "navigation evaluated"
        );
        evaluation
    }

    /// Authorized internal pages load like ordinary documents, minus scripts and redirects.
    fn allow_internal(
        &self,
        request: &NavigationRequest,
        url: &Url,
        context: &EvaluationContext<'_>,
    ) -> Evaluation {
        let mut telemetry = Vec::new();
        let shields = self.shields_for(url, context.config, &mut telemetry);
        NavigationDecision {
            disposition: NavigationDisposition::Allow(AllowDirectives {
                scripts: Vec::new(),
                javascript_enabled: javascript_directive(request, url, &shields),
            }),
            effects: Vec::new(),
            telemetry,
        }
        .into()
    }

    fn external(
        &self,
        request: &NavigationRequest,
        state: &TabNavigationState,
        reason: PromptReason,
    ) -> Evaluation {
        let scheme = request
            .url()
            .map_or_else(String::new, |url| url.scheme().to_owned());
        let decision = NavigationDecision::cancel(CancelReason::ExternalApp { scheme });

        let suppressed = request.cause() != NavigationCause::LinkActivated
            && (state.is_child_tab() || !request.source_frame_is_main());
        let decision = match request.url() {
            Some(url) if !suppressed => {
                decision.with_effect(SideEffect::PromptExternalApp(ExternalPromptInstruction {
                    url: url.clone(),
                    reason,
                }))
            }
            _ => {
                trace!(url = request.raw_url(), "external app prompt suppressed");
                decision
            }
        };
        decision.into()
    }

    fn evaluate_ordinary(
        &self,
        request: &NavigationRequest,
        url: &Url,
        state: &TabNavigationState,
        context: &EvaluationContext<'_>,
    ) -> Evaluation {
        if !is_standard_web_scheme(url.scheme()) {
            return self.external(request, state, PromptReason::ExternalAppScheme);
        }

        let mut telemetry = Vec::new();
        let document_url = request.main_document_url().unwrap_or(url);
        let shields = self.shields_for(document_url, context.config, &mut telemetry);
        trace!(
            stage = "policy_applied",
            url = %url,
            all_off = shields.all_shields_off(),
            ad_block = shields.ad_block_and_tracking_protection_on(),
            "shields resolved"
        );

        if request.target_frame_is_main() && is_web_page(url, false) {
            if let Some(redirect) = self.redirect_for(request, url, state, &shields, context, &mut telemetry) {
                return redirect;
            }
        }

        let mut patch = StatePatch {
            navigation_start: request.main_document_url().cloned(),
            frame_seen: Some((url.clone(), request.target_frame_is_main())),
            ..StatePatch::default()
        };

        let mut directives = AllowDirectives::default();
        if request.target_frame_is_main() {
            let desired = desired_scripts(url, &shields, context.config, context.adblock_ready);
            let resets = request
                .main_document_url()
                .is_some_and(|main| state.would_reset(main));
            directives.scripts = match state.current_page_data() {
                Some(page) if !resets => page.diff_scripts(&desired),
                _ => diff_scripts(&Default::default(), false, &desired),
            };
            patch.active_scripts = Some(desired);

            if SchemeFamily::of(url) == SchemeFamily::Http && shields.https_upgrade_on() {
                patch.pending_https_upgrade = normalized_host(url);
            }
        }

        directives.javascript_enabled = javascript_directive(request, url, &shields);

        Evaluation {
            decision: NavigationDecision {
                disposition: NavigationDisposition::Allow(directives),
                effects: Vec::new(),
                telemetry,
            },
            patch,
        }
    }

    /// Website redirects first, then debounce.
    fn redirect_for(
        &self,
        request: &NavigationRequest,
        url: &Url,
        state: &TabNavigationState,
        shields: &ShieldSettings,
        context: &EvaluationContext<'_>,
        telemetry: &mut Vec<TelemetryEvent>,
    ) -> Option<Evaluation> {
        if let Some(to) = apply_website_redirects(&self.website_redirects, url, &context.config.active_gates) {
            debug!(from = %url, to = %to, "website redirect");
            telemetry.push(TelemetryEvent::RedirectApplied {
                from: url.clone(),
                to: to.clone(),
                hops: 1,
            });
            return Some(redirect_evaluation(to, Vec::new(), std::mem::take(telemetry)));
        }

        let resolution = self.debounce(url, state, shields, context, telemetry)?;
        debug!(from = %url, to = %resolution.terminal, hops = resolution.hops.len(), "debounced");
        telemetry.push(TelemetryEvent::RedirectApplied {
            from: url.clone(),
            to: resolution.terminal.clone(),
            hops: resolution.hops.len(),
        });
        Some(redirect_evaluation(
            resolution.terminal,
            request.redirect_headers(),
            std::mem::take(telemetry),
        ))
    }

    fn debounce(
        &self,
        url: &Url,
        state: &TabNavigationState,
        shields: &ShieldSettings,
        context: &EvaluationContext<'_>,
        telemetry: &mut Vec<TelemetryEvent>,
    ) -> Option<ChainResolution> {
        if !shields.ad_block_and_tracking_protection_on() {
            trace!(url = %url, "debounce skipped, ad-block off");
            return None;
        }

        let Some(committed_url) = state.committed_url() else {
            trace!(url = %url, "debounce skipped, nothing committed in tab");
            return None;
        };
        if same_registrable_domain(url, committed_url) {
            trace!(url = %url, "debounce skipped, same site as committed page");
            return None;
        }

        let resolution = resolve_redirect_chain(
            url,
            &self.rules,
            &context.config.active_gates,
            self.config.max_redirect_chain,
        );
        if resolution.stop == ChainStop::ProviderUnavailable {
            telemetry.push(TelemetryEvent::ResolverUnavailable {
                resolver: "redirect_rules",
                code: "debounce.provider_unavailable",
            });
        }

        if !resolution.redirected() || resolution.terminal == *url {
            trace!(url = %url, stop = resolution.stop.as_str(), "debounce resolved in place");
            return None;
        }

        if same_registrable_domain(&resolution.terminal, committed_url) {
            trace!(to = %resolution.terminal, "debounce skipped, destination is the committed site");
            return None;
        }

        Some(resolution)
    }

    fn shields_for(
        &self,
        url: &Url,
        config: &PolicyConfiguration,
        telemetry: &mut Vec<TelemetryEvent>,
    ) -> ShieldSettings {
        let Some(domain) = registrable_domain(url) else {
            return ShieldSettings::from_defaults(&config.shield_defaults);
        };

        match try_resolve(&self.shields, &domain, config.private_browsing, &config.shield_defaults) {
            Ok(settings) => settings,
            Err(error) => {
                warn!(domain, code = error.code, %error, "shield settings unavailable, using defaults");
                telemetry.push(TelemetryEvent::ResolverUnavailable {
                    resolver: "shield_settings",
                    code: error.code,
                });
                ShieldSettings::from_defaults(&config.shield_defaults)
            }
        }
    }

    /// Response-phase policy: download handling and HTTPS upgrade bookkeeping.
    pub fn decide_policy_for_response(
        &self,
        response: &NavigationResponse,
        session: &TabSession,
        config: &PolicyConfiguration,
    ) -> ResponseDecision {
        let mut telemetry = Vec::new();
        let shields = response
            .url
            .as_ref()
            .map(|url| self.shields_for(url, config, &mut telemetry));
        let adblock_ready = self.readiness.is_ready();

        session.update(|state| {
            let pending_download = response.is_for_main_frame && state.take_pending_download();
            let disposition = resolve_response(response, pending_download);

            let mut scripts = Vec::new();
            if let (Some(url), Some(shields)) = (response.url.as_ref(), shields.as_ref()) {
                if response.is_for_main_frame {
                    if let Some(host) = normalized_host(url) {
                        if state.take_pending_https_upgrade(&host)
                            && SchemeFamily::of(url) == SchemeFamily::Https
                        {
                            telemetry.push(TelemetryEvent::HttpsUpgradeApplied { host });
                        }
                    }
                }
                scripts = state.on_response_upgraded(url, shields, config, adblock_ready);
            }

            debug!(
                url = ?response.url.as_ref().map(Url::as_str),
                disposition = ?disposition,
                pending_download,
                "response decided"
            );
            ResponseDecision {
                disposition,
                scripts,
                telemetry,
            }
        })
    }
}

/// Page JavaScript follows the no-script shield when `url` is the main document.
///
/// Session-restore pages keep whatever the restored page had.
fn javascript_directive(request: &NavigationRequest, url: &Url, shields: &ShieldSettings) -> Option<bool> {
    let main = request.main_document_url()?;
    if !(request.source_frame_is_main() || request.target_frame_is_main()) {
        return None;
    }

    let session_restore = InternalUrl::from_url(url).is_some_and(|page| page.is_session_restore());
    if schemeless(main) != schemeless(url) || session_restore {
        return None;
    }

    Some(!shields.no_script_on())
}

fn redirect_evaluation(to: Url, headers: Vec<(String, String)>, telemetry: Vec<TelemetryEvent>) -> Evaluation {
    Evaluation {
        decision: NavigationDecision {
            disposition: NavigationDisposition::Redirect { to, headers },
            effects: Vec::new(),
            telemetry,
        },
        patch: StatePatch::default(),
    }
}
