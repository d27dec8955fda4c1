mod config;

use concierge_agent::{
    build_provider, ChatService, CurrentTimeTool, FallbackInvoker, ToolRegistry,
};
use concierge_core::{ConciergeError, Message};
use concierge_security::RateLimiter;
use clap::{Parser, Subcommand};
use config::ConciergeConfig;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "concierge", about = "Concierge: multi-tenant customer-service assistant")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "concierge.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one customer message and print the reply
    Ask {
        /// Tenant the message belongs to
        #[arg(long)]
        tenant: String,
        /// The customer message
        message: String,
    },
    /// List providers in fallback order
    Providers,
    /// Validate the config file and resolve API keys
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; keys may come from the real environment.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();
    let config = ConciergeConfig::load(&cli.config).await?;

    match cli.command {
        Commands::Ask { tenant, message } => ask(config, &tenant, message).await?,
        Commands::Providers => {
            println!("Providers (fallback order):");
            for (i, provider) in config.providers.iter().enumerate() {
                println!(
                    "  {}. {} ({} {}, timeout {}s)",
                    i + 1,
                    provider.display_name(),
                    provider.provider.as_str(),
                    provider.base_url(),
                    provider.timeout_secs
                );
            }
            match config.rate_limit.limit_per_minute {
                0 => println!("\nRate limit: unlimited"),
                n => println!("\nRate limit: {n} request(s) per tenant per minute"),
            }
        }
        Commands::CheckConfig => {
            let mut missing = 0;
            for provider in &config.providers {
                if let Err(e) = provider.resolve_api_key() {
                    eprintln!("  {e}");
                    missing += 1;
                }
            }
            if missing > 0 {
                anyhow::bail!("{missing} provider(s) have no usable API key");
            }
            println!(
                "Configuration OK: {} provider(s), {} request(s)/min per tenant",
                config.providers.len(),
                config.rate_limit.limit_per_minute
            );
        }
    }

    Ok(())
}

async fn ask(config: ConciergeConfig, tenant: &str, message: String) -> anyhow::Result<()> {
    let providers = config
        .providers
        .iter()
        .cloned()
        .map(build_provider)
        .collect::<Result<Vec<_>, _>>()?;
    let invoker = FallbackInvoker::new(providers)?;
    info!(providers = ?invoker.provider_names(), "Provider fallback order");

    let mut tools = ToolRegistry::new();
    tools.register(Arc::new(CurrentTimeTool::new()));

    let mut service = ChatService::new(
        Arc::new(RateLimiter::from_config(&config.rate_limit)),
        invoker,
        Arc::new(tools),
    )
    .with_max_history(config.max_history);
    if let Some(prompt) = &config.system_prompt {
        service = service.with_system_prompt(prompt.clone());
    }
    if let Some(timeout) = config.request_timeout() {
        service = service.with_request_timeout(timeout);
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling request");
            on_interrupt.cancel();
        }
    });

    match service
        .reply(tenant, &[Message::user(message)], &cancel)
        .await
    {
        Ok(reply) => {
            println!("{}", reply.text);
            if !reply.failed_attempts.is_empty() {
                eprintln!(
                    "(answered by {} after {} failed attempt(s))",
                    reply.provider,
                    reply.failed_attempts.len()
                );
            }
            Ok(())
        }
        Err(ConciergeError::RateLimited { retry_after_secs }) => {
            anyhow::bail!("Tenant '{tenant}' is over its quota, retry in {retry_after_secs}s")
        }
        Err(ConciergeError::Exhausted(exhausted)) => {
            if exhausted.all_non_retryable() {
                eprintln!("Every provider rejected the request; check API keys and model ids.");
            }
            Err(exhausted.into())
        }
        Err(e) => Err(e.into()),
    }
}
