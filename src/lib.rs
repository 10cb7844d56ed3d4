// rmcp's #[tool] macros generate code that calls the server's tool methods,
// but rustc/clippy can't trace through the macro-generated dispatching.
#![allow(dead_code)]

pub mod browser;
pub mod clock;
pub mod config;
pub mod context;
pub mod driver;
pub mod error;
pub mod interaction;
pub mod pipeline;
pub mod providers;
pub mod selectors;
pub mod server;
pub mod storage;
pub mod validate;

pub use context::{AutomationRequest, RunContext, RunStatus};
pub use pipeline::Pipeline;
