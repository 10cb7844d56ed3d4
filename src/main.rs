use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use rmcp::transport::stdio;
use rmcp::ServiceExt;

use login_probe::config::ProbeSettings;
use login_probe::{AutomationRequest, Pipeline, RunStatus};

const PASSWORD_VAR: &str = "LOGIN_PROBE_PASSWORD";

/// login-probe: Automated login-flow tester for headless Chrome
#[derive(Parser)]
#[command(name = "login-probe", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Test one login and print the run report as JSON
    Run {
        /// Login page URL
        #[arg(long)]
        url: String,
        /// Username or email to submit
        #[arg(long)]
        username: String,
        /// Password to submit (default: $LOGIN_PROBE_PASSWORD)
        #[arg(long)]
        password: Option<String>,
        #[command(flatten)]
        browser: BrowserArgs,
    },
    /// Serve the `test_login` tool over MCP stdio
    Serve {
        #[command(flatten)]
        browser: BrowserArgs,
    },
}

#[derive(Args)]
struct BrowserArgs {
    /// Run Chrome with a visible window (default: headless)
    #[arg(long)]
    headed: bool,
    /// Chrome/Chromium binary to use instead of searching for one
    #[arg(long)]
    chrome_path: Option<PathBuf>,
    /// Directory for screenshots and page markup
    #[arg(long, default_value = "artifacts")]
    artifacts_dir: PathBuf,
    /// Never ask the selector hint service, even with GEMINI_API_KEY set
    #[arg(long)]
    no_hint: bool,
    /// Launch Chrome without its sandbox (needed as root in containers)
    #[arg(long)]
    no_sandbox: bool,
}

impl BrowserArgs {
    fn settings(self) -> ProbeSettings {
        let mut settings = ProbeSettings {
            artifacts_dir: self.artifacts_dir,
            use_hint: !self.no_hint,
            ..Default::default()
        };
        settings.session.headless = !self.headed;
        settings.session.chrome_path = self.chrome_path;
        if self.no_sandbox {
            settings.session.extra_args.push("--no-sandbox".into());
        }
        settings
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Log to stderr only: stdout carries the JSON report or the MCP transport
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .without_time()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            url,
            username,
            password,
            browser,
        } => {
            let password = match password.or_else(|| std::env::var(PASSWORD_VAR).ok()) {
                Some(p) => p,
                None => anyhow::bail!("No password given: pass --password or set {}", PASSWORD_VAR),
            };
            if !url.starts_with("http://") && !url.starts_with("https://") {
                tracing::warn!("URL missing protocol, automatically adding https://");
            }

            let pipeline = Pipeline::chrome(&browser.settings());
            let ctx = pipeline
                .run_login_flow(&AutomationRequest::new(url, username, password))
                .await;

            println!("{}", serde_json::to_string_pretty(&ctx)?);
            if let Some(err) = &ctx.error_message {
                tracing::error!("{}", err);
            }

            Ok(if ctx.status == RunStatus::LoginAttempted {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Serve { browser } => {
            let settings = browser.settings();
            tracing::info!(
                "Starting login-probe MCP server (headless: {})",
                settings.session.headless
            );

            let server = login_probe::server::LoginProbeServer::new(settings);
            let service = server.serve(stdio()).await?;

            // Wait for the MCP service to finish or a termination signal
            tokio::select! {
                result = service.waiting() => { result?; }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received interrupt signal, shutting down");
                }
            }

            tracing::info!("login-probe MCP server shut down");
            Ok(ExitCode::SUCCESS)
        }
    }
}
