use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;

use crate::browser::{BrowserEngine, PageSession, SessionProfile, WaitCondition};
use crate::clock::{poll_until, Clock};
use crate::config::DriverSettings;
use crate::context::{LogEntry, RunLog, RunStatus};
use crate::error::InteractionError;
use crate::providers::{sanitize_url, FederatedProvider, LoginStrategy, UrlClassifier};
use crate::selectors::SelectorSet;
use crate::storage::{ArtifactHandle, ArtifactKind, ArtifactStore};

/// Extra time granted on top of a wait's own timeout so the wait reports
/// its own, more specific error.
const WAIT_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub final_url: Option<String>,
    pub screenshot_handle: Option<ArtifactHandle>,
    pub markup_handle: Option<ArtifactHandle>,
    pub logs: Vec<LogEntry>,
    pub status: RunStatus,
    pub error_message: Option<String>,
}

/// What a finished interaction leaves behind.
struct Evidence {
    final_url: String,
    screenshot: ArtifactHandle,
    markup: ArtifactHandle,
}

/// Drives one browser session through a login attempt.
pub struct LoginDriver {
    engine: Arc<dyn BrowserEngine>,
    store: Arc<dyn ArtifactStore>,
    clock: Arc<dyn Clock>,
    classifier: Arc<UrlClassifier>,
    profile: SessionProfile,
    settings: DriverSettings,
}

impl LoginDriver {
    pub fn new(
        engine: Arc<dyn BrowserEngine>,
        store: Arc<dyn ArtifactStore>,
        clock: Arc<dyn Clock>,
        classifier: Arc<UrlClassifier>,
    ) -> Self {
        Self {
            engine,
            store,
            clock,
            classifier,
            profile: SessionProfile::default(),
            settings: DriverSettings::default(),
        }
    }

    pub fn with_profile(mut self, profile: SessionProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_settings(mut self, settings: DriverSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Attempt a login and collect evidence.
    ///
    /// Never returns an error: every failure ends up in the outcome's
    /// `error_message` and logs, with status `login_failed`. The browser
    /// session is closed exactly once whenever one was opened.
    pub async fn login(
        &self,
        url: &str,
        identifier: &str,
        secret: &str,
        selectors: &SelectorSet,
    ) -> LoginOutcome {
        let log = RunLog::new(self.clock.clone());
        let url = sanitize_url(url);

        let acquired = AssertUnwindSafe(self.acquire())
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(InteractionError::Panicked(panic_message(panic))));

        let result = match acquired {
            Ok(session) => {
                let attempt = AssertUnwindSafe(self.drive(
                    session.as_ref(),
                    &log,
                    &url,
                    identifier,
                    secret,
                    selectors,
                ))
                .catch_unwind()
                .await;

                self.release(session.as_ref()).await;

                attempt.unwrap_or_else(|panic| Err(InteractionError::Panicked(panic_message(panic))))
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(evidence) => LoginOutcome {
                final_url: Some(evidence.final_url),
                screenshot_handle: Some(evidence.screenshot),
                markup_handle: Some(evidence.markup),
                logs: log.into_entries(),
                status: RunStatus::LoginAttempted,
                error_message: None,
            },
            Err(e) => {
                log.push(format!("Exception: {}", e));
                LoginOutcome {
                    final_url: None,
                    screenshot_handle: None,
                    markup_handle: None,
                    logs: log.into_entries(),
                    status: RunStatus::LoginFailed,
                    error_message: Some(e.to_string()),
                }
            }
        }
    }

    async fn acquire(&self) -> Result<Box<dyn PageSession>, InteractionError> {
        self.bounded(
            "open browser",
            self.settings.operation_timeout,
            self.engine.open(&self.profile),
        )
        .await
    }

    /// Close the session. Close failures and panics are logged; the
    /// outcome of the attempt stands.
    async fn release(&self, session: &dyn PageSession) {
        let closing = self.bounded("close browser", self.settings.operation_timeout, session.close());
        match AssertUnwindSafe(closing).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("Browser did not close cleanly: {}", e),
            Err(panic) => tracing::warn!("Browser close panicked: {}", panic_message(panic)),
        }
    }

    async fn drive(
        &self,
        session: &dyn PageSession,
        log: &RunLog,
        url: &str,
        identifier: &str,
        secret: &str,
        selectors: &SelectorSet,
    ) -> Result<Evidence, InteractionError> {
        let op = self.settings.operation_timeout;

        self.bounded("navigate", op, session.navigate(url)).await?;
        log.push(format!("Visited {}", url));

        let fell_through = match self.classifier.classify(url) {
            LoginStrategy::Federated(provider) => {
                if let Some(evidence) = self
                    .federated(session, log, provider, identifier, secret)
                    .await?
                {
                    return Ok(evidence);
                }
                true
            }
            LoginStrategy::Generic => false,
        };

        self.generic(session, log, selectors, identifier, secret, fell_through)
            .await
    }

    /// Two-step identifier/password flow. `None` means the provider's app was
    /// not reached and the generic branch should take over.
    async fn federated(
        &self,
        session: &dyn PageSession,
        log: &RunLog,
        provider: &FederatedProvider,
        identifier: &str,
        secret: &str,
    ) -> Result<Option<Evidence>, InteractionError> {
        let op = self.settings.operation_timeout;

        self.wait_for(session, "wait for identifier field", &provider.identifier_selector)
            .await?;
        self.bounded("fill identifier", op, session.fill(&provider.identifier_selector, identifier))
            .await?;
        log.push(format!("Entered {} identifier", provider.id));
        self.bounded("click identifier next", op, session.click(&provider.identifier_next))
            .await?;
        log.push(format!("Submitted {} identifier step", provider.id));

        self.clock.sleep(self.settings.provider_step_delay).await;

        self.wait_for(session, "wait for password field", &provider.password_selector)
            .await?;
        self.bounded("fill password", op, session.fill(&provider.password_selector, secret))
            .await?;
        log.push(format!("Entered {} password", provider.id));
        self.bounded("click password next", op, session.click(&provider.password_next))
            .await?;
        log.push(format!("Submitted {} password step", provider.id));

        let idle = self.settings.network_idle_timeout;
        match self
            .bounded(
                "wait for network idle",
                idle + WAIT_GRACE,
                session.wait_for_condition(WaitCondition::NetworkIdle, idle),
            )
            .await
        {
            Ok(()) => log.push("Network idle"),
            Err(e) => log.push(format!("Network did not settle, continuing: {}", e)),
        }

        let current = self.bounded("read URL", op, session.current_url()).await?;
        if provider.is_app_url(&current) {
            log.push(format!("Reached {} application: {}", provider.id, current));
            return self.capture(session, log).await.map(Some);
        }

        log.push(format!(
            "{} sign-in inconclusive at {}; continuing with generic form",
            provider.id, current
        ));
        Ok(None)
    }

    async fn generic(
        &self,
        session: &dyn PageSession,
        log: &RunLog,
        selectors: &SelectorSet,
        identifier: &str,
        secret: &str,
        fell_through: bool,
    ) -> Result<Evidence, InteractionError> {
        let op = self.settings.operation_timeout;

        let Some(username) = selectors.username.as_deref() else {
            if fell_through {
                log.push("No generic form selectors, skipping form fill");
                return self.settle_and_capture(session, log).await;
            }
            return Err(InteractionError::MissingSelector("username"));
        };
        let password = selectors
            .password
            .as_deref()
            .ok_or(InteractionError::MissingSelector("password"))?;
        let submit = selectors
            .submit
            .as_deref()
            .ok_or(InteractionError::MissingSelector("submit"))?;

        self.wait_for(session, "wait for username field", username).await?;
        self.bounded("fill username", op, session.fill(username, identifier))
            .await?;
        log.push("Filled username");

        self.wait_for(session, "wait for password field", password).await?;
        self.bounded("fill password", op, session.fill(password, secret))
            .await?;
        log.push("Filled password");

        self.wait_for(session, "wait for submit button", submit).await?;
        let old_url = self.bounded("read URL", op, session.current_url()).await?;
        self.bounded("click submit", op, session.click(submit)).await?;
        log.push("Clicked submit");

        self.await_url_change(session, log, &old_url).await;
        self.settle_and_capture(session, log).await
    }

    /// Poll the page URL after submit. Every outcome is logged; none is fatal.
    async fn await_url_change(&self, session: &dyn PageSession, log: &RunLog, old_url: &str) {
        let op = self.settings.operation_timeout;
        let max = self.settings.poll_attempts;

        let detected = poll_until(
            self.clock.as_ref(),
            self.settings.poll_interval,
            max,
            move |attempt| async move {
                let url = match self.bounded("read URL", op, session.current_url()).await {
                    Ok(url) => url,
                    Err(e) => {
                        log.push(format!("Could not read URL (attempt {}/{}): {}", attempt, max, e));
                        return None;
                    }
                };
                if url == old_url {
                    log.push(format!("URL not changed yet (attempt {}/{})", attempt, max));
                    return None;
                }
                log.push(format!("URL changed: {}", url));
                if self.settings.matches_post_login(&url) {
                    log.push(format!("Post-login page detected: {}", url));
                    Some(url)
                } else {
                    log.push("URL changed but post-login pattern not matched yet");
                    None
                }
            },
        )
        .await;

        if detected.is_some() {
            return;
        }
        match self.bounded("read URL", op, session.current_url()).await {
            Ok(url) if url != old_url => log.push("No post-login pattern matched within timeout"),
            _ => log.push("URL did not change within timeout"),
        }
    }

    async fn settle_and_capture(
        &self,
        session: &dyn PageSession,
        log: &RunLog,
    ) -> Result<Evidence, InteractionError> {
        if let Some(marker) = self.settings.post_login_marker.as_deref() {
            let timeout = self.settings.marker_timeout;
            match self
                .bounded(
                    "wait for post-login marker",
                    timeout + WAIT_GRACE,
                    session.wait_for_selector(marker, timeout),
                )
                .await
            {
                Ok(()) => log.push(format!("Post-login marker found: {}", marker)),
                Err(e) => log.push(format!("Post-login marker not found: {}", e)),
            }
        }

        self.clock.sleep(self.settings.settle_delay).await;
        self.capture(session, log).await
    }

    async fn capture(
        &self,
        session: &dyn PageSession,
        log: &RunLog,
    ) -> Result<Evidence, InteractionError> {
        let op = self.settings.operation_timeout;
        let png = self.bounded("capture screenshot", op, session.screenshot()).await?;
        let html = self.bounded("capture markup", op, session.markup()).await?;
        let final_url = self.bounded("read URL", op, session.current_url()).await?;

        let screenshot = self.store.save(png, ArtifactKind::Screenshot).await?;
        let markup = self.store.save(html.into_bytes(), ArtifactKind::Markup).await?;
        log.push(format!("Captured screenshot and page markup at {}", final_url));

        Ok(Evidence {
            final_url,
            screenshot,
            markup,
        })
    }

    async fn wait_for(
        &self,
        session: &dyn PageSession,
        step: &'static str,
        selector: &str,
    ) -> Result<(), InteractionError> {
        let timeout = self.settings.operation_timeout;
        self.bounded(step, timeout + WAIT_GRACE, session.wait_for_selector(selector, timeout))
            .await
    }

    /// Run one browser call under a time budget, tagging failures with `step`.
    async fn bounded<T>(
        &self,
        step: &'static str,
        budget: Duration,
        call: impl Future<Output = anyhow::Result<T>>,
    ) -> Result<T, InteractionError> {
        match tokio::time::timeout(budget, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(InteractionError::step(step, e)),
            Err(_) => Err(InteractionError::Timeout {
                step,
                timeout: budget,
            }),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}
