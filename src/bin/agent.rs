//! devsync-agent: syncs local source files with a remote devsync hub.
//!
//! Usage:
//!   devsync-agent sb-337r61t9jnic               # wss://sb-337r61t9jnic.vercel.run/remy
//!   devsync-agent ws://localhost:4387/remy      # explicit URL
//!   devsync-agent                               # prompts for a target

use clap::Parser;
use devsync::agent::target::prompt_target;
use devsync::agent::{self, AgentError};
use devsync::cli::AgentArgs;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = AgentArgs::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let target = match args.target.clone() {
        Some(target) => target,
        None => prompt_target().await.map_err(AgentError::from)?,
    };
    if target.trim().is_empty() {
        return Err(AgentError::MissingTarget.into());
    }

    let config = args.into_config(&target).map_err(AgentError::from)?;
    let exit = agent::run(config).await;
    std::process::exit(exit.code());
}
