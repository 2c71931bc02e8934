// ABOUTME: Livealive binary: watches a list of TCP endpoints and logs up/down transitions
// ABOUTME: Standalone companion to the reflector; shares its event bus and logging conventions

use argh::FromArgs;
use reflec::events::EventBus;
use reflec::liveness::{MonitorClient, PortMonitor};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Polls a list of `host:port` endpoints on an interval and logs liveness
/// transitions; does not touch the streaming path.
#[derive(FromArgs)]
struct CliArgs {
    /// watched endpoints, as `host:port` or `scheme://host:port[/path]`
    #[argh(positional)]
    addresses: Vec<String>,

    /// seconds between checks of a given endpoint
    #[argh(option, default = "30")]
    interval: u64,

    /// seconds to stagger between starting each endpoint's first check
    #[argh(option, default = "1")]
    delay: u64,

    /// per-connect timeout in seconds
    #[argh(option, default = "5")]
    timeout: u64,

    /// only log warnings and errors
    #[argh(switch)]
    quiet: bool,

    /// log at debug level
    #[argh(switch)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli: CliArgs = argh::from_env();

    let level = if cli.quiet {
        Level::WARN
    } else if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    if cli.addresses.is_empty() {
        eprintln!("no addresses given to watch");
        return ExitCode::FAILURE;
    }

    let timeout = Duration::from_secs(cli.timeout);
    let mut clients = Vec::with_capacity(cli.addresses.len());
    for address in &cli.addresses {
        match MonitorClient::new(address, timeout) {
            Ok(client) => clients.push(client),
            Err(e) => {
                eprintln!("bad address {address:?}: {e}");
                return ExitCode::FAILURE;
            }
        }
    }

    let events = Arc::new(EventBus::new());
    let monitor = Arc::new(PortMonitor::new(
        events,
        Duration::from_secs(cli.interval),
        Duration::from_secs(cli.delay),
    ));
    for client in clients {
        monitor.append(client);
    }

    info!(count = cli.addresses.len(), "starting liveness monitor");
    monitor.clone().start().await;

    tokio::signal::ctrl_c().await.ok();
    info!("received interrupt, stopping");
    monitor.terminate();

    ExitCode::SUCCESS
}
