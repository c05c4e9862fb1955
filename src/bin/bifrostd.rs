//! bifrostd: Bifrost domain resolution daemon.
//!
//! Checks the control plane and resolves hostnames through the domain
//! cache, the same way request handling does.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use bifrost::config::{Config, Secrets};
use bifrost::resolver::poll_status;
use bifrost::routing::resolve_request;
use bifrost::{ApiResolver, Cache, ResponseClass};

/// Bifrost daemon: cached hostname resolution for pages serving.
#[derive(Parser)]
#[command(name = "bifrostd")]
#[command(version = bifrost::PKG_VERSION)]
#[command(about = "Bifrost domain resolution daemon")]
struct Args {
    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Poll the control-plane status endpoint until it answers.
    Check,
    /// Resolve a hostname and print the project serving a path.
    Resolve {
        /// Hostname to resolve.
        #[arg(long)]
        host: String,
        /// Request path to match.
        #[arg(long, default_value = "/")]
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = Config::load(args.config.as_deref())?;
    let secret = Secrets::load()?.api_secret()?;
    let resolver = Arc::new(ApiResolver::new(config.api_config(secret))?);

    info!(version = bifrost::version_string(), base_url = %config.api.base_url, "bifrostd starting");

    match args.command {
        Command::Check => {
            poll_status(
                resolver.as_ref(),
                config.api.status_poll_retries,
                config.status_poll_interval(),
            )
            .await?;
            println!("ok");
        }
        Command::Resolve { host, path } => {
            let cache = Cache::new(resolver, config.cache_config());
            let lookup = cache.resolve(&host).await;

            match lookup.response_class() {
                ResponseClass::Serve => {
                    let Some(domain) = lookup.domain() else {
                        return Err("resolved lookup without a domain".into());
                    };
                    match resolve_request(domain, &path) {
                        Some(request) => {
                            println!("{}", serde_json::to_string_pretty(&request.lookup_path)?);
                            info!(
                                hostname = %lookup.name,
                                project_id = request.lookup_path.project_id,
                                sub_path = %request.sub_path,
                                "request matched"
                            );
                        }
                        None => {
                            println!("not found: no project serves {path} on {}", lookup.name);
                            std::process::exit(1);
                        }
                    }
                }
                ResponseClass::NotFound => {
                    println!("not found: {}", lookup.name);
                    std::process::exit(1);
                }
                ResponseClass::BadGateway => {
                    let error = lookup.error().map(|e| e.to_string()).unwrap_or_default();
                    warn!(hostname = %lookup.name, error = %error, "resolution failed");
                    println!("gateway error: {error}");
                    std::process::exit(2);
                }
            }
        }
    }

    Ok(())
}
