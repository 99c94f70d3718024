use std::net::{IpAddr, SocketAddr};
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use stash::proxy::{self, ProxyConfig};

#[derive(Parser)]
#[command(name = "stash")]
#[command(about = "Caching DNS forwarding resolver", long_about = None)]
struct Args {
    /// Local port to listen on
    #[arg(short, long, default_value = "8053")]
    port: u16,

    /// Bind address
    #[arg(short, long, default_value = "127.0.0.1")]
    bind: IpAddr,

    /// Upstream DNS server (ip:port)
    #[arg(short, long, default_value = "8.8.8.8:53")]
    upstream: SocketAddr,

    /// Upstream timeout in milliseconds
    #[arg(long, default_value = "2000")]
    timeout_ms: u64,

    /// Maximum number of queries handled concurrently
    #[arg(long, default_value = "256")]
    max_in_flight: usize,

    /// Maximum number of cached records (unbounded if omitted)
    #[arg(long)]
    cache_capacity: Option<usize>,

    /// Answer SERVFAIL when the upstream fails instead of dropping the query
    #[arg(long)]
    servfail: bool,

    /// Seconds between stats log lines (0 disables)
    #[arg(long, default_value = "60")]
    stats_interval_secs: u64,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn into_config(self) -> ProxyConfig {
        ProxyConfig {
            bind_addr: SocketAddr::new(self.bind, self.port),
            upstream: self.upstream,
            upstream_timeout: Duration::from_millis(self.timeout_ms),
            max_in_flight: self.max_in_flight,
            cache_capacity: self.cache_capacity,
            servfail_on_upstream_error: self.servfail,
            stats_interval: (self.stats_interval_secs > 0)
                .then(|| Duration::from_secs(self.stats_interval_secs)),
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| args.log_level.as_str().into()),
        )
        .init();

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(err) => {
            error!(%err, "failed to start runtime");
            return ExitCode::FAILURE;
        }
    };

    match rt.block_on(proxy::run(args.into_config())) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "resolver stopped");
            ExitCode::FAILURE
        }
    }
}
