pub mod hint;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::context::RunStatus;
use crate::providers::{LoginStrategy, UrlClassifier};

use self::hint::{SelectorHint, SelectorHints};

pub const DEFAULT_USERNAME: &str = "#username";
pub const DEFAULT_PASSWORD: &str = "#password";
pub const DEFAULT_SUBMIT: &str = "button[type=submit], input[type=submit]";

/// CSS selectors for the fields of a login form.
///
/// Empty for targets whose provider flow uses its own selectors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorSet {
    pub username: Option<String>,
    pub password: Option<String>,
    pub submit: Option<String>,
}

impl SelectorSet {
    pub fn generic() -> Self {
        Self {
            username: Some(DEFAULT_USERNAME.into()),
            password: Some(DEFAULT_PASSWORD.into()),
            submit: Some(DEFAULT_SUBMIT.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.password.is_none() && self.submit.is_none()
    }

    /// Override every field the hints provide.
    fn apply(&mut self, hints: SelectorHints) {
        let SelectorHints {
            username,
            password,
            submit,
        } = hints;
        if username.is_some() {
            self.username = username;
        }
        if password.is_some() {
            self.password = password;
        }
        if submit.is_some() {
            self.submit = submit;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorResolution {
    pub selectors: SelectorSet,
    pub status: RunStatus,
}

#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub hint_timeout: Duration,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            hint_timeout: Duration::from_secs(10),
        }
    }
}

pub struct SelectorResolver {
    classifier: Arc<UrlClassifier>,
    hint: Option<Arc<dyn SelectorHint>>,
    settings: ResolverSettings,
}

impl SelectorResolver {
    pub fn new(classifier: Arc<UrlClassifier>) -> Self {
        Self {
            classifier,
            hint: None,
            settings: ResolverSettings::default(),
        }
    }

    pub fn with_hint(mut self, hint: Arc<dyn SelectorHint>) -> Self {
        self.hint = Some(hint);
        self
    }

    pub fn with_settings(mut self, settings: ResolverSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Work out which selectors the driver should use for `url`.
    ///
    /// Never fails: hint problems fall back to the generic defaults.
    pub async fn resolve(&self, url: &str, markup: &str) -> SelectorResolution {
        let selectors = match self.classifier.classify(url) {
            LoginStrategy::Federated(provider) => {
                tracing::info!("{} matches provider '{}', using its flow", url, provider.id);
                SelectorSet::default()
            }
            LoginStrategy::Generic => {
                let mut selectors = SelectorSet::generic();
                if let Some(hints) = self.consult_hint(markup).await {
                    tracing::info!("Applying selector hints: {:?}", hints);
                    selectors.apply(hints);
                }
                selectors
            }
        };

        SelectorResolution {
            selectors,
            status: RunStatus::SelectorsFound,
        }
    }

    async fn consult_hint(&self, markup: &str) -> Option<SelectorHints> {
        let hint = self.hint.as_ref()?;
        if markup.trim().is_empty() {
            return None;
        }

        match tokio::time::timeout(self.settings.hint_timeout, hint.suggest(markup)).await {
            Ok(Ok(Some(hints))) if !hints.is_empty() => Some(hints),
            Ok(Ok(_)) => {
                tracing::debug!("Selector hint had no suggestions");
                None
            }
            Ok(Err(e)) => {
                tracing::warn!("Selector hint failed, keeping defaults: {}", e);
                None
            }
            Err(_) => {
                tracing::warn!(
                    "Selector hint timed out after {:?}, keeping defaults",
                    self.settings.hint_timeout
                );
                None
            }
        }
    }
}
