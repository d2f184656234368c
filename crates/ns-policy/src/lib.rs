//! Navigation policy: classification, page state, and the decision engine.

pub mod classify;
pub mod config;
pub mod engine;
pub mod page_state;
pub mod readiness;
pub mod request;
pub mod response;
pub mod scripts;
pub mod telemetry;

pub use classify::SpecialAction;
pub use classify::StaticUniversalLinks;
pub use classify::UniversalLinkResolver;
pub use classify::UniversalLinkTarget;
pub use classify::classify;
pub use config::EngineConfig;
pub use config::PolicyConfiguration;
pub use config::Preferences;
pub use engine::AllowDirectives;
pub use engine::CancelReason;
pub use engine::EvaluationContext;
pub use engine::ExternalPromptInstruction;
pub use engine::NavigationDecision;
pub use engine::NavigationDisposition;
pub use engine::NavigationEngine;
pub use engine::PromptReason;
pub use engine::ResponseDecision;
pub use engine::SideEffect;
pub use page_state::PageData;
pub use page_state::StatePatch;
pub use page_state::TabNavigationState;
pub use page_state::TabSession;
pub use readiness::Readiness;
pub use readiness::ReadinessGate;
pub use readiness::ReadinessSignal;
pub use readiness::readiness_channel;
pub use request::NavigationCause;
pub use request::NavigationRequest;
pub use response::NavigationResponse;
pub use response::ResponseDisposition;
pub use response::resolve_response;
pub use scripts::ScriptKind;
pub use scripts::ScriptToggleInstruction;
pub use telemetry::TelemetryEvent;
