use base64::Engine;
use rmcp::model::*;
use rmcp::tool;
use rmcp::{Error as McpError, ServerHandler};
use std::sync::Arc;

use crate::config::ProbeSettings;
use crate::context::{AutomationRequest, RunContext};
use crate::pipeline::Pipeline;
use crate::storage::MemoryStore;

/// MCP server exposing the login pipeline as a single tool.
#[derive(Clone)]
pub struct LoginProbeServer {
    settings: Arc<ProbeSettings>,
}

impl LoginProbeServer {
    pub fn new(settings: ProbeSettings) -> Self {
        Self {
            settings: Arc::new(settings),
        }
    }

    /// Run one request with artifacts kept in memory so they can be returned inline.
    pub async fn run(&self, request: &AutomationRequest) -> (RunContext, Option<Vec<u8>>) {
        let store = Arc::new(MemoryStore::new());
        let pipeline = Pipeline::chrome_with_store(&self.settings, store.clone());
        let ctx = pipeline.run_login_flow(request).await;
        let screenshot = ctx
            .screenshot_handle
            .as_ref()
            .and_then(|handle| store.get(handle));
        (ctx, screenshot)
    }

    fn report(ctx: &RunContext, screenshot: Option<Vec<u8>>) -> Result<CallToolResult, McpError> {
        let text = serde_json::to_string_pretty(ctx)
            .map_err(|e| McpError::internal_error(format!("JSON error: {}", e), None))?;
        let mut content = vec![Content::text(text)];
        if let Some(png) = screenshot {
            let data = base64::engine::general_purpose::STANDARD.encode(&png);
            content.push(Content::image(data, "image/png"));
        }
        Ok(CallToolResult::success(content))
    }
}

#[tool(tool_box)]
impl ServerHandler for LoginProbeServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "login-probe: Tests a web login form in headless Chrome. \
                 Call `test_login` with a URL and credentials; the result holds \
                 the final URL, step logs and a screenshot."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

#[tool(tool_box)]
impl LoginProbeServer {
    #[tool(description = "Validate a login URL, fill and submit its form in headless Chrome, \
                          and report status, final URL, logs and a screenshot.")]
    async fn test_login(
        &self,
        #[tool(aggr)] params: AutomationRequest,
    ) -> Result<CallToolResult, McpError> {
        tracing::info!("test_login requested for {}", params.url);
        let (ctx, screenshot) = self.run(&params).await;
        Self::report(&ctx, screenshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_includes_json_and_image() {
        let req = AutomationRequest::new("https://example.test", "u", "p");
        let ctx = RunContext::new(&req);
        let result = LoginProbeServer::report(&ctx, Some(vec![0x89, 0x50, 0x4E, 0x47])).unwrap();
        assert_eq!(result.content.len(), 2);
    }

    #[tokio::test]
    async fn test_unreachable_run_has_no_screenshot() {
        let server = LoginProbeServer::new(ProbeSettings {
            use_hint: false,
            ..Default::default()
        });
        let req = AutomationRequest::new("http://127.0.0.1:1/", "u", "p");
        let (ctx, screenshot) = server.run(&req).await;
        assert_eq!(ctx.status, crate::context::RunStatus::Failed);
        assert!(screenshot.is_none());
    }
}
