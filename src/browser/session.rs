use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetTimezoneOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, CaptureScreenshotFormat, CaptureScreenshotParams,
};
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::launcher::{login_chrome_args, resolve_chrome_binary};
use super::{BrowserEngine, PageSession, SessionProfile, WaitCondition};
use crate::interaction::{click, fill, wait};

/// Hides the most common `navigator` automation tells before any page script runs.
const STEALTH_SCRIPT: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });
window.chrome = window.chrome || { runtime: {} };
"#;

/// Launches a fresh headless Chrome for every session.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChromeEngine;

#[async_trait]
impl BrowserEngine for ChromeEngine {
    async fn open(&self, profile: &SessionProfile) -> Result<Box<dyn PageSession>> {
        Ok(Box::new(ChromeSession::launch(profile).await?))
    }
}

/// One Chrome process with a single page, torn down by [`PageSession::close`].
pub struct ChromeSession {
    browser: Mutex<Option<Browser>>,
    page: Page,
    handler_task: HandlerTask,
    _profile_dir: tempfile::TempDir,
}

/// CDP event loop task, aborted when dropped so an interrupted close
/// cannot leave it running.
struct HandlerTask(JoinHandle<()>);

impl HandlerTask {
    fn abort(&self) {
        self.0.abort();
    }
}

impl Drop for HandlerTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl ChromeSession {
    /// Launch a new browser and establish CDP connection.
    pub async fn launch(profile: &SessionProfile) -> Result<Self> {
        let chrome = resolve_chrome_binary(profile)?;
        let profile_dir = tempfile::tempdir().context("Failed to create Chrome profile dir")?;
        let (width, height) = profile.viewport;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome)
            .args(login_chrome_args(profile, profile_dir.path()))
            .request_timeout(profile.operation_timeout)
            .window_size(width, height)
            .viewport(Some(Viewport {
                width,
                height,
                ..Default::default()
            }));

        if !profile.headless {
            builder = builder.with_head();
        }

        let config = builder.build().map_err(|e| anyhow::anyhow!("{}", e))?;

        let (browser, mut handler) =
            Browser::launch(config).await.context("Failed to launch Chrome")?;

        let handler_task = HandlerTask(tokio::spawn(async move {
            while let Some(_event) = handler.next().await {
                // Process browser events
            }
        }));

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler_task.abort();
                return Err(anyhow::Error::from(e).context("Failed to create initial page"));
            }
        };

        let session = Self {
            browser: Mutex::new(Some(browser)),
            page,
            handler_task,
            _profile_dir: profile_dir,
        };

        if let Err(e) = session.apply_profile(profile).await {
            let _ = session.close().await;
            return Err(e);
        }

        tracing::info!(
            "Browser session started (headless: {})",
            profile.headless
        );
        Ok(session)
    }

    async fn apply_profile(&self, profile: &SessionProfile) -> Result<()> {
        let mut user_agent = SetUserAgentOverrideParams::new(profile.user_agent.clone());
        user_agent.accept_language = Some(profile.locale.clone());
        self.page
            .execute(user_agent)
            .await
            .context("Failed to override user agent")?;

        self.page
            .execute(SetTimezoneOverrideParams::new(profile.timezone.clone()))
            .await
            .context("Failed to override timezone")?;

        self.page
            .execute(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_SCRIPT))
            .await
            .context("Failed to install stealth script")?;
        Ok(())
    }
}

#[async_trait]
impl PageSession for ChromeSession {
    async fn navigate(&self, url: &str) -> Result<()> {
        tracing::info!("Navigating to: {}", url);
        self.page
            .goto(url)
            .await
            .with_context(|| format!("Failed to navigate to {}", url))?;
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()> {
        wait::wait_for_selector(&self.page, selector, timeout).await
    }

    async fn fill(&self, selector: &str, text: &str) -> Result<()> {
        fill::fill_field(&self.page, selector, text).await
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let method = click::hybrid_click(&self.page, selector).await?;
        tracing::debug!("Clicked {} via {:?}", selector, method);
        Ok(())
    }

    async fn wait_for_condition(&self, condition: WaitCondition, timeout: Duration) -> Result<()> {
        wait::wait_for_condition(&self.page, condition, timeout).await
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self
            .page
            .url()
            .await
            .context("Failed to read page URL")?
            .unwrap_or_default())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        self.page
            .screenshot(
                CaptureScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .build(),
            )
            .await
            .context("Failed to take screenshot")
    }

    async fn markup(&self) -> Result<String> {
        self.page.content().await.context("Failed to read page HTML")
    }

    async fn close(&self) -> Result<()> {
        let browser = self.browser.lock().await.take();
        let result = match browser {
            Some(mut browser) => {
                let closed = browser.close().await.context("Failed to close Chrome");
                self.handler_task.abort();
                let _ = browser.wait().await;
                closed.map(|_| ())
            }
            None => Ok(()),
        };
        self.handler_task.abort();
        tracing::info!("Browser session closed");
        result
    }
}
