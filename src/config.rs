use std::path::PathBuf;
use std::time::Duration;

use regex::Regex;

use crate::browser::SessionProfile;
use crate::selectors::ResolverSettings;
use crate::validate::ValidatorSettings;

/// Salesforce Lightning home/app pages.
pub const DEFAULT_POST_LOGIN_PATTERN: &str = r"\.lightning\.force\.com/lightning/";
pub const DEFAULT_POST_LOGIN_MARKER: &str = "one-appnav, .slds-global-header";

/// Timings and completion signals for the login driver.
#[derive(Debug, Clone)]
pub struct DriverSettings {
    /// Upper bound for any single browser call.
    pub operation_timeout: Duration,
    pub poll_interval: Duration,
    pub poll_attempts: u32,
    pub marker_timeout: Duration,
    pub settle_delay: Duration,
    /// Pause between a provider's identifier and password steps.
    pub provider_step_delay: Duration,
    pub network_idle_timeout: Duration,
    pub post_login_patterns: Vec<Regex>,
    pub post_login_marker: Option<String>,
}

impl DriverSettings {
    pub fn matches_post_login(&self, url: &str) -> bool {
        self.post_login_patterns.iter().any(|p| p.is_match(url))
    }
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            operation_timeout: Duration::from_secs(150),
            poll_interval: Duration::from_secs(2),
            poll_attempts: 60,
            marker_timeout: Duration::from_secs(90),
            settle_delay: Duration::from_secs(8),
            provider_step_delay: Duration::from_secs(2),
            network_idle_timeout: Duration::from_secs(30),
            post_login_patterns: vec![Regex::new(DEFAULT_POST_LOGIN_PATTERN).expect("valid regex")],
            post_login_marker: Some(DEFAULT_POST_LOGIN_MARKER.into()),
        }
    }
}

/// Everything needed to wire a production pipeline.
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    pub session: SessionProfile,
    pub driver: DriverSettings,
    pub validator: ValidatorSettings,
    pub resolver: ResolverSettings,
    pub artifacts_dir: PathBuf,
    /// Consult the Gemini selector hint when an API key is present.
    pub use_hint: bool,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            session: SessionProfile::default(),
            driver: DriverSettings::default(),
            validator: ValidatorSettings::default(),
            resolver: ResolverSettings::default(),
            artifacts_dir: PathBuf::from("artifacts"),
            use_hint: true,
        }
    }
}
