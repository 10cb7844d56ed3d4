use std::sync::Arc;

use crate::browser::ChromeEngine;
use crate::clock::{Clock, TokioClock};
use crate::config::ProbeSettings;
use crate::context::{AutomationRequest, RunContext, RunStatus};
use crate::driver::{LoginDriver, LoginOutcome};
use crate::providers::UrlClassifier;
use crate::selectors::hint::GeminiHint;
use crate::selectors::{SelectorResolution, SelectorResolver};
use crate::storage::{ArtifactStore, DirStore};
use crate::validate::{ValidationOutcome, Validator};

/// Where a run is in the validate -> find_selectors -> login sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Validate,
    FindSelectors,
    Login,
    Fail,
    Done,
}

impl PipelineState {
    /// The state that follows `self` once its stage has left `status` behind.
    pub fn next(self, status: RunStatus) -> Self {
        match self {
            Self::Validate if status == RunStatus::Validated => Self::FindSelectors,
            Self::Validate => Self::Fail,
            Self::FindSelectors if status == RunStatus::SelectorsFound => Self::Login,
            Self::FindSelectors => Self::Fail,
            Self::Login | Self::Fail | Self::Done => Self::Done,
        }
    }
}

/// Wires validator, resolver and driver into a single login test.
pub struct Pipeline {
    validator: Validator,
    resolver: SelectorResolver,
    driver: LoginDriver,
}

impl Pipeline {
    pub fn new(validator: Validator, resolver: SelectorResolver, driver: LoginDriver) -> Self {
        Self {
            validator,
            resolver,
            driver,
        }
    }

    /// Production wiring: reqwest validation, Chrome, artifacts on disk.
    pub fn chrome(settings: &ProbeSettings) -> Self {
        Self::chrome_with_store(settings, Arc::new(DirStore::new(settings.artifacts_dir.clone())))
    }

    pub fn chrome_with_store(settings: &ProbeSettings, store: Arc<dyn ArtifactStore>) -> Self {
        let classifier = Arc::new(UrlClassifier::default());
        let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());

        let mut resolver =
            SelectorResolver::new(classifier.clone()).with_settings(settings.resolver.clone());
        if settings.use_hint {
            match GeminiHint::from_env() {
                Ok(hint) => resolver = resolver.with_hint(Arc::new(hint)),
                Err(e) => tracing::debug!("Selector hints disabled: {}", e),
            }
        }

        let driver = LoginDriver::new(Arc::new(ChromeEngine), store, clock, classifier)
            .with_profile(settings.session.clone())
            .with_settings(settings.driver.clone());

        Self::new(Validator::http(&settings.validator), resolver, driver)
    }

    /// Run one login test to completion. Always returns a context whose
    /// status is terminal.
    pub async fn run_login_flow(&self, request: &AutomationRequest) -> RunContext {
        let mut ctx = RunContext::new(request);
        let mut state = PipelineState::Validate;

        loop {
            match state {
                PipelineState::Validate => {
                    let outcome = self.validator.validate(&ctx.url).await;
                    merge_validation(&mut ctx, outcome);
                }
                PipelineState::FindSelectors => {
                    let resolution = self.resolver.resolve(&ctx.url, &ctx.markup).await;
                    merge_resolution(&mut ctx, resolution);
                }
                PipelineState::Login => {
                    let outcome = self
                        .driver
                        .login(&ctx.url, &ctx.identifier, &ctx.secret, &ctx.selectors)
                        .await;
                    merge_login(&mut ctx, outcome);
                }
                PipelineState::Fail => {
                    tracing::info!(
                        "Run stopped with status {}: {}",
                        ctx.status,
                        ctx.error_message.as_deref().unwrap_or("no error message")
                    );
                }
                PipelineState::Done => {
                    debug_assert!(ctx.status.is_terminal(), "run ended at {}", ctx.status);
                    break;
                }
            }

            let next = state.next(ctx.status);
            tracing::debug!("Pipeline {:?} -> {:?} (status: {})", state, next, ctx.status);
            state = next;
        }

        ctx
    }
}

fn merge_validation(ctx: &mut RunContext, outcome: ValidationOutcome) {
    if let Some(markup) = outcome.markup {
        ctx.markup = markup;
    }
    ctx.status = outcome.status;
    ctx.error_message = outcome.error_message;
}

fn merge_resolution(ctx: &mut RunContext, resolution: SelectorResolution) {
    ctx.selectors = resolution.selectors;
    ctx.status = resolution.status;
}

fn merge_login(ctx: &mut RunContext, outcome: LoginOutcome) {
    ctx.final_url = outcome.final_url;
    ctx.screenshot_handle = outcome.screenshot_handle;
    ctx.markup_handle = outcome.markup_handle;
    ctx.logs.extend(outcome.logs);
    ctx.status = outcome.status;
    ctx.error_message = outcome.error_message;
}
