// ABOUTME: Reflec binary: parses CLI + INI config, starts the upstream client and downstream server
// ABOUTME: Supervises both until the client finishes or the operator quits, then drains connections

use argh::FromArgs;
use reflec::config::{self, Options};
use reflec::events::EventBus;
use reflec::{Ring, Server, UpstreamClient};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// MMS-over-HTTP streaming reflector: buffers one upstream session and fans it
/// out to many downstream players.
#[derive(FromArgs)]
struct CliArgs {
    /// positional host/port/path, given as `host port [path]`, `host:port[path]`,
    /// or a `scheme://host[:port][/path]` URL
    #[argh(positional)]
    target: Vec<String>,

    /// path to an INI config file (sections [logging]/[client]/[server])
    #[argh(option)]
    config: Option<String>,

    /// local bind address, e.g. "0.0.0.0:8080"
    #[argh(option)]
    bindings: Option<String>,

    /// hard cap on concurrent downstream clients
    #[argh(option, long = "client-max")]
    client_max: Option<usize>,

    /// ring buffer capacity in packets
    #[argh(option, long = "buffer-size")]
    buffer_size: Option<usize>,

    /// upstream socket timeout in seconds
    #[argh(option)]
    timeout: Option<u64>,

    /// number of upstream reconnect attempts on socket failure
    #[argh(option)]
    retry: Option<u32>,

    /// only log warnings and errors
    #[argh(switch)]
    quiet: bool,

    /// log at debug level
    #[argh(switch)]
    verbose: bool,

    /// directory for rolling log files (implies file logging)
    #[argh(option)]
    logdir: Option<String>,

    /// log file name within --logdir
    #[argh(option)]
    logfile: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli: CliArgs = argh::from_env();

    let (host, port, path) = match config::parse_positional(&cli.target) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let mut options = match Options::load(cli.config.as_deref().map(Path::new)) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("bad config: {e}");
            return ExitCode::FAILURE;
        }
    };

    options.client.host = host;
    if let Some(port) = port {
        options.client.port = port;
    }
    options.client.path = path;
    if let Some(v) = cli.bindings {
        options.server.bindings = v;
    }
    if let Some(v) = cli.client_max {
        options.server.client_max = v;
    }
    if let Some(v) = cli.buffer_size {
        options.client.bufsize = v;
    }
    if let Some(v) = cli.timeout {
        options.client.timeout = v;
    }
    if let Some(v) = cli.retry {
        options.client.retry = v;
    }
    options.logging.quiet = cli.quiet;
    options.logging.verbose = cli.verbose;
    if let Some(v) = cli.logdir {
        options.logging.logdir = Some(v);
    }
    if let Some(v) = cli.logfile {
        options.logging.logfile = Some(v);
    }

    let _log_guard = init_logging(&options.logging);

    info!(host = %options.client.host, port = options.client.port, "starting reflector");

    let events = Arc::new(EventBus::new());
    reflec::plugin::install_defaults(&events);

    let ring = Arc::new(Ring::new(options.client.bufsize));
    let (client, client_state) = UpstreamClient::new(options.client.clone(), ring.clone(), events.clone());
    let (server, bind_host, bind_port) = Server::new(&options.server, ring, client_state, events);

    let listener = match TcpListener::bind((bind_host.as_str(), bind_port)).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("could not bind {bind_host}:{bind_port}: {e}");
            return ExitCode::FAILURE;
        }
    };

    let server = Arc::new(server);
    let client_task = tokio::spawn(async move { client.run().await });
    let server_for_run = server.clone();
    tokio::spawn(async move { server_for_run.run(listener).await });

    tokio::select! {
        _ = client_task => info!("upstream client finished, shutting down"),
        _ = tokio::signal::ctrl_c() => info!("received interrupt, shutting down"),
    }

    server.shutdown().await;
    ExitCode::SUCCESS
}

fn init_logging(logging: &reflec::config::LoggingOptions) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let level = if logging.quiet {
        Level::WARN
    } else if logging.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    if let Some(dir) = &logging.logdir {
        let file_name = logging.logfile.clone().unwrap_or_else(|| "reflec.log".to_string());
        let appender = tracing_appender::rolling::daily(dir, file_name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let subscriber = FmtSubscriber::builder().with_max_level(level).with_writer(writer).finish();
        tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
        Some(guard)
    } else {
        let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
        tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
        None
    }
}
