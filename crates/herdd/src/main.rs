//! HerdCache node daemon

mod client;
mod handler;
mod pool;
mod protocol;
mod server;
mod source;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use herdcache::{Group, Registry, DEFAULT_REPLICAS};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Handle;
use tracing::info;

use crate::handler::CommandHandler;
use crate::pool::PeerPool;
use crate::source::JsonSource;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Bind address
    #[arg(short, long, default_value = "127.0.0.1:7001")]
    bind: String,

    /// Member identifier other nodes use to reach this one (defaults to --bind)
    #[arg(long)]
    advertise: Option<String>,

    /// Comma separated cluster members, this node included
    #[arg(short, long, value_delimiter = ',')]
    peers: Vec<String>,

    /// Name of the group served by this node
    #[arg(short, long, default_value = "scores")]
    group: String,

    /// Byte budget of the local store (0 = unbounded)
    #[arg(short, long, default_value_t = 64 << 20)]
    cache_bytes: i64,

    /// JSON object file backing the loader (built-in demo data if omitted)
    #[arg(short, long)]
    source: Option<PathBuf>,

    /// Virtual nodes per member on the hash ring
    #[arg(long, default_value_t = DEFAULT_REPLICAS)]
    replicas: usize,

    /// Timeout for a single peer fetch, in milliseconds
    #[arg(long, default_value_t = 2000)]
    peer_timeout_ms: u64,

    /// Populate the local store with values fetched from peers
    #[arg(long)]
    populate_from_peers: bool,

    /// Health check mode (for Docker)
    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    if args.health {
        match TcpStream::connect(&args.bind).await {
            Ok(_) => {
                println!("OK");
                std::process::exit(0);
            }
            Err(_) => {
                eprintln!("FAILED");
                std::process::exit(1);
            }
        }
    }

    let self_addr = args.advertise.clone().unwrap_or_else(|| args.bind.clone());
    info!("Starting HerdCache node v{}", env!("CARGO_PKG_VERSION"));
    info!("Binding to {} as {}", args.bind, self_addr);

    let source = match &args.source {
        Some(path) => JsonSource::open(path)?,
        None => {
            info!("No --source given, serving built-in demo data");
            JsonSource::demo()
        }
    };

    info!("Data source holds {} keys", source.len());

    let registry = Arc::new(Registry::new());
    let group = registry.insert(
        Group::builder(args.group.as_str())
            .cache_bytes(args.cache_bytes)
            .loader(source)
            .populate_from_peers(args.populate_from_peers)
            .build(),
    )?;
    info!("Group {} ready, cache budget {} bytes", group.name(), args.cache_bytes);

    let pool = Arc::new(PeerPool::new(
        self_addr.clone(),
        args.replicas,
        Duration::from_millis(args.peer_timeout_ms),
        Handle::current(),
    ));
    if args.peers.is_empty() {
        pool.set([self_addr]);
    } else {
        pool.set(args.peers.iter().cloned());
    }
    group.register_peers(pool.clone());

    let listener = TcpListener::bind(&args.bind).await?;
    info!("Server listening on {}", args.bind);

    server::serve(listener, CommandHandler::new(registry, pool)).await
}
