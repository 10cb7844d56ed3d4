#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use login_probe::browser::{BrowserEngine, PageSession, SessionProfile, WaitCondition};
use login_probe::clock::VirtualClock;
use login_probe::driver::LoginDriver;
use login_probe::error::{ReachabilityError, StorageError};
use login_probe::pipeline::Pipeline;
use login_probe::providers::UrlClassifier;
use login_probe::selectors::SelectorResolver;
use login_probe::storage::{ArtifactHandle, ArtifactKind, ArtifactStore, MemoryStore};
use login_probe::validate::{Fetcher, Validator};

pub const PNG_MAGIC: [u8; 4] = [0x89, 0x50, 0x4E, 0x47];

/// How the fake site reacts to the driver.
#[derive(Clone, Default)]
pub struct Script {
    /// Selectors that never show up on the page.
    pub missing: HashSet<String>,
    /// Clicking `selector` moves to `url` after `delay` further URL reads.
    pub redirects: Vec<Redirect>,
    pub panic_on_fill: bool,
    pub panic_on_open: bool,
    pub panic_on_close: bool,
    pub fail_open: bool,
}

#[derive(Clone)]
pub struct Redirect {
    pub selector: String,
    pub url: String,
    pub delay: u32,
}

impl Script {
    pub fn missing(mut self, selector: &str) -> Self {
        self.missing.insert(selector.to_string());
        self
    }

    pub fn redirect(mut self, selector: &str, url: &str, delay: u32) -> Self {
        self.redirects.push(Redirect {
            selector: selector.to_string(),
            url: url.to_string(),
            delay,
        });
        self
    }
}

#[derive(Default)]
struct PageState {
    url: String,
    pending: Option<(String, u32)>,
}

#[derive(Clone, Default)]
pub struct FakeEngine {
    script: Script,
    pub opens: Arc<AtomicUsize>,
    pub closes: Arc<AtomicUsize>,
    /// Every session call, in order, e.g. `fill #username=u`.
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl FakeEngine {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            ..Default::default()
        }
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrowserEngine for FakeEngine {
    async fn open(&self, _profile: &SessionProfile) -> anyhow::Result<Box<dyn PageSession>> {
        if self.script.panic_on_open {
            panic!("chrome crashed during launch");
        }
        if self.script.fail_open {
            anyhow::bail!("Could not find Chrome or Chromium");
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            script: self.script.clone(),
            state: Mutex::new(PageState::default()),
            closes: self.closes.clone(),
            calls: self.calls.clone(),
        }))
    }
}

pub struct FakeSession {
    script: Script,
    state: Mutex<PageState>,
    closes: Arc<AtomicUsize>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl FakeSession {
    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl PageSession for FakeSession {
    async fn navigate(&self, url: &str) -> anyhow::Result<()> {
        self.record(format!("navigate {}", url));
        self.state.lock().unwrap().url = url.to_string();
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> anyhow::Result<()> {
        self.record(format!("wait {}", selector));
        if self.script.missing.contains(selector) {
            anyhow::bail!(
                "Timed out after {}ms waiting for element: {}",
                timeout.as_millis(),
                selector
            );
        }
        Ok(())
    }

    async fn fill(&self, selector: &str, text: &str) -> anyhow::Result<()> {
        if self.script.panic_on_fill {
            panic!("renderer crashed");
        }
        self.record(format!("fill {}={}", selector, text));
        Ok(())
    }

    async fn click(&self, selector: &str) -> anyhow::Result<()> {
        self.record(format!("click {}", selector));
        if let Some(r) = self.script.redirects.iter().find(|r| r.selector == selector) {
            let mut state = self.state.lock().unwrap();
            if r.delay == 0 {
                state.url = r.url.clone();
            } else {
                state.pending = Some((r.url.clone(), r.delay));
            }
        }
        Ok(())
    }

    async fn wait_for_condition(
        &self,
        condition: WaitCondition,
        _timeout: Duration,
    ) -> anyhow::Result<()> {
        self.record(format!("condition {:?}", condition));
        Ok(())
    }

    async fn current_url(&self) -> anyhow::Result<String> {
        let mut state = self.state.lock().unwrap();
        let current = state.url.clone();
        match state.pending.take() {
            Some((url, remaining)) if remaining <= 1 => state.url = url,
            Some((url, remaining)) => state.pending = Some((url, remaining - 1)),
            None => {}
        }
        Ok(current)
    }

    async fn screenshot(&self) -> anyhow::Result<Vec<u8>> {
        self.record("screenshot".into());
        Ok(PNG_MAGIC.to_vec())
    }

    async fn markup(&self) -> anyhow::Result<String> {
        Ok(format!("<html><body>{}</body></html>", self.state.lock().unwrap().url))
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.record("close".into());
        self.closes.fetch_add(1, Ordering::SeqCst);
        if self.script.panic_on_close {
            panic!("browser process vanished");
        }
        Ok(())
    }
}

/// Fetcher that either serves fixed markup or refuses every connection.
pub struct FakeFetcher {
    markup: Option<String>,
}

impl FakeFetcher {
    pub fn serving(markup: &str) -> Self {
        Self {
            markup: Some(markup.to_string()),
        }
    }

    pub fn unreachable() -> Self {
        Self { markup: None }
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<String, ReachabilityError> {
        self.markup.clone().ok_or_else(|| ReachabilityError::Connect {
            url: url.to_string(),
            message: "dns error: failed to lookup address information".into(),
        })
    }
}

pub struct FailingStore;

#[async_trait]
impl ArtifactStore for FailingStore {
    async fn save(&self, _data: Vec<u8>, _kind: ArtifactKind) -> Result<ArtifactHandle, StorageError> {
        Err(StorageError::Io {
            path: "/read-only/screenshot.png".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
        })
    }
}

pub struct Harness {
    pub engine: FakeEngine,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<VirtualClock>,
    pub pipeline: Pipeline,
}

pub fn harness(fetcher: FakeFetcher, script: Script) -> Harness {
    let engine = FakeEngine::new(script);
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(VirtualClock::new());
    let driver = driver_with(engine.clone(), store.clone(), clock.clone());
    let classifier = Arc::new(UrlClassifier::default());

    let pipeline = Pipeline::new(
        Validator::new(Arc::new(fetcher)),
        SelectorResolver::new(classifier),
        driver,
    );

    Harness {
        engine,
        store,
        clock,
        pipeline,
    }
}

pub fn driver_with(
    engine: FakeEngine,
    store: Arc<dyn ArtifactStore>,
    clock: Arc<VirtualClock>,
) -> LoginDriver {
    LoginDriver::new(
        Arc::new(engine),
        store,
        clock,
        Arc::new(UrlClassifier::default()),
    )
}
