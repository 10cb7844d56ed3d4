use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::selectors::SelectorSet;
use crate::storage::ArtifactHandle;

/// One login test: where to go and what to type.
#[derive(Clone, Deserialize, schemars::JsonSchema)]
pub struct AutomationRequest {
    #[schemars(description = "Login page URL (https:// is assumed when no scheme is given)")]
    pub url: String,
    #[schemars(description = "Username or email to submit")]
    pub identifier: String,
    #[schemars(description = "Password to submit")]
    pub secret: String,
}

impl AutomationRequest {
    pub fn new(
        url: impl Into<String>,
        identifier: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            identifier: identifier.into(),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for AutomationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutomationRequest")
            .field("url", &self.url)
            .field("identifier", &self.identifier)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Pending,
    Validated,
    Failed,
    SelectorsFound,
    LoginAttempted,
    LoginFailed,
}

impl RunStatus {
    /// Whether the pipeline can stop at this status.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::LoginAttempted | Self::LoginFailed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Validated => "validated",
            Self::Failed => "failed",
            Self::SelectorsFound => "selectors_found",
            Self::LoginAttempted => "login_attempted",
            Self::LoginFailed => "login_failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    /// Offset from the run clock's origin.
    #[serde(rename = "at_ms", serialize_with = "serialize_millis")]
    pub at: Duration,
    pub message: String,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// Append-only, timestamped log for a single driver run.
pub struct RunLog {
    clock: Arc<dyn Clock>,
    entries: Mutex<Vec<LogEntry>>,
}

impl RunLog {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("{}", message);
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.push(LogEntry {
            at: self.clock.elapsed(),
            message,
        });
    }

    pub fn into_entries(self) -> Vec<LogEntry> {
        self.entries.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

/// The aggregate a pipeline run accumulates and hands back to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct RunContext {
    pub url: String,
    pub identifier: String,
    #[serde(skip)]
    pub secret: String,
    #[serde(skip)]
    pub markup: String,
    pub selectors: SelectorSet,
    pub status: RunStatus,
    pub final_url: Option<String>,
    pub logs: Vec<LogEntry>,
    pub screenshot_handle: Option<ArtifactHandle>,
    pub markup_handle: Option<ArtifactHandle>,
    pub error_message: Option<String>,
}

impl RunContext {
    pub fn new(request: &AutomationRequest) -> Self {
        Self {
            url: request.url.clone(),
            identifier: request.identifier.clone(),
            secret: request.secret.clone(),
            markup: String::new(),
            selectors: SelectorSet::default(),
            status: RunStatus::Pending,
            final_url: None,
            logs: Vec::new(),
            screenshot_handle: None,
            markup_handle: None,
            error_message: None,
        }
    }

    pub fn log_messages(&self) -> impl Iterator<Item = &str> {
        self.logs.iter().map(|entry| entry.message.as_str())
    }

    pub fn has_log(&self, needle: &str) -> bool {
        self.log_messages().any(|m| m.contains(needle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::VirtualClock;

    #[test]
    fn test_request_debug_redacts_secret() {
        let req = AutomationRequest::new("https://example.test", "alice", "hunter2");
        let dbg = format!("{:?}", req);
        assert!(dbg.contains("alice"));
        assert!(!dbg.contains("hunter2"));
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&RunStatus::SelectorsFound).unwrap();
        assert_eq!(json, r#""selectors_found""#);
        assert_eq!(RunStatus::LoginFailed.to_string(), "login_failed");
        assert!(RunStatus::Failed.is_terminal());
        assert!(!RunStatus::Validated.is_terminal());
    }

    #[test]
    fn test_run_log_timestamps_follow_clock() {
        let clock = Arc::new(VirtualClock::new());
        let log = RunLog::new(clock.clone());
        log.push("first");
        clock.advance(Duration::from_secs(2));
        log.push("second");

        let entries = log.into_entries();
        assert_eq!(entries[0].at, Duration::ZERO);
        assert_eq!(entries[1].at, Duration::from_secs(2));
        assert_eq!(entries[1].message, "second");
    }

    #[test]
    fn test_context_json_omits_secret_and_markup() {
        let req = AutomationRequest::new("https://example.test", "alice", "hunter2");
        let mut ctx = RunContext::new(&req);
        ctx.markup = "<html>page</html>".into();
        let json = serde_json::to_string(&ctx).unwrap();
        assert!(!json.contains("hunter2"));
        assert!(!json.contains("<html>"));
        assert!(json.contains(r#""status":"pending""#));
    }
}
