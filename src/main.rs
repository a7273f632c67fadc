use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use pr_reviewer::config::{DispatcherConfig, ServerConfig};
use pr_reviewer::server::Server;
use pr_reviewer::shutdown::cancel_on_signal;
use pr_reviewer::storage::InMemoryStorage;

#[derive(Parser, Debug)]
#[command(name = "pr-reviewer")]
#[command(version)]
#[command(about = "Pull request reviewer assignment service")]
struct Args {
    /// HTTP port
    #[arg(long, env = "PORT", default_value_t = 8080)]
    port: u16,

    /// Number of dispatcher workers
    #[arg(long, env = "WORKERS", default_value_t = pr_reviewer::config::DEFAULT_WORKERS)]
    workers: usize,

    /// Maximum number of queued jobs
    #[arg(long, env = "QUEUE_CAPACITY", default_value_t = pr_reviewer::config::DEFAULT_QUEUE_CAPACITY)]
    queue_capacity: usize,

    /// How long a request waits for its job, in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value_t = pr_reviewer::config::DEFAULT_REQUEST_TIMEOUT_MS)]
    request_timeout_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if args.workers == 0 {
        return Err("--workers must be at least 1".into());
    }

    let listen_addr: SocketAddr = format!("0.0.0.0:{}", args.port).parse()?;
    let config = ServerConfig::new(listen_addr)
        .with_request_timeout_ms(args.request_timeout_ms)
        .with_dispatcher(
            DispatcherConfig::default()
                .with_workers(args.workers)
                .with_queue_capacity(args.queue_capacity),
        );

    tracing::info!(
        addr = %config.listen_addr,
        workers = config.dispatcher.workers,
        queue_capacity = config.dispatcher.queue_capacity,
        "Starting pr-reviewer"
    );

    let shutdown = CancellationToken::new();
    cancel_on_signal(shutdown.clone())?;

    let server = Server::new(config, Arc::new(InMemoryStorage::new()));
    server.run(shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
