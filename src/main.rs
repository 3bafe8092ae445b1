// Loads the proxy configuration and previews model resolution for client keys

use anyhow::{Context, Result};
use clap::Parser;

use claude_proxy_config::{config, init_tracing, proxy::context, ModelManager};

#[derive(Debug, Parser)]
#[command(name = "claude-proxy-config", version, about)]
struct Cli {
    /// Client API key to resolve models for
    #[arg(long, env = "CLIENT_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Exit with an error when the upstream API key looks invalid
    #[arg(long)]
    check: bool,

    /// Claude model names to resolve, e.g. claude-3-5-sonnet-20241022
    models: Vec<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Settings are not loaded yet, so read LOG_LEVEL directly for the subscriber
    init_tracing(&std::env::var("LOG_LEVEL").unwrap_or_default());

    let settings = config::init_config()
        .inspect_err(|e| tracing::error!("Configuration error: {}", e))
        .context("Configuration error")?;

    if cli.check && !settings.validate_upstream_key() {
        anyhow::bail!("Upstream API key validation failed");
    }

    if let Some(key) = cli.api_key.as_deref() {
        if !settings.validate_client_key(Some(key)) {
            tracing::warn!(
                "Client key {} would be rejected by the proxy",
                config::mask_api_key(Some(key))
            );
        }
    }

    let manager = ModelManager::new(settings);
    context::sync_scope(cli.api_key.clone(), || -> Result<()> {
        for model in &cli.models {
            let resolution = manager.resolve_current(model);
            println!("{}", serde_json::to_string(&resolution)?);
        }
        Ok(())
    })
}
