pub mod launcher;
pub mod session;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

pub use session::{ChromeEngine, ChromeSession};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Page-level conditions a session can wait for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitCondition {
    /// Load finished and no resource fetch started for a short quiet window.
    NetworkIdle,
}

/// How a browser session is launched and presented to sites.
#[derive(Debug, Clone)]
pub struct SessionProfile {
    pub headless: bool,
    pub chrome_path: Option<PathBuf>,
    pub user_agent: String,
    pub viewport: (u32, u32),
    pub locale: String,
    pub timezone: String,
    /// Budget for any single CDP request, navigation included.
    pub operation_timeout: Duration,
    /// Appended to the launch arguments, e.g. `--no-sandbox` in containers.
    pub extra_args: Vec<String>,
}

impl Default for SessionProfile {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_path: None,
            user_agent: DEFAULT_USER_AGENT.into(),
            viewport: (1280, 720),
            locale: "en-US".into(),
            timezone: "America/New_York".into(),
            operation_timeout: Duration::from_secs(150),
            extra_args: Vec::new(),
        }
    }
}

/// Starts browser sessions.
#[async_trait]
pub trait BrowserEngine: Send + Sync {
    async fn open(&self, profile: &SessionProfile) -> Result<Box<dyn PageSession>>;
}

/// A single browser page owned by one login run.
#[async_trait]
pub trait PageSession: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<()>;

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()>;

    /// Replace the value of the matched field with `text`.
    async fn fill(&self, selector: &str, text: &str) -> Result<()>;

    async fn click(&self, selector: &str) -> Result<()>;

    async fn wait_for_condition(&self, condition: WaitCondition, timeout: Duration) -> Result<()>;

    async fn current_url(&self) -> Result<String>;

    /// PNG bytes of the viewport.
    async fn screenshot(&self) -> Result<Vec<u8>>;

    async fn markup(&self) -> Result<String>;

    /// Release the browser. Called exactly once per opened session.
    async fn close(&self) -> Result<()>;
}
