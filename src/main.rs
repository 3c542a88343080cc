mod collectors;
mod config;
mod display;
mod extract;
mod format;
mod http;
mod metrics;
mod poller;
mod state;

use axum::serve;
use clap::Parser;
use collectors::executor::SshTransport;
use config::Config;
use display::tui::Tui;
use display::{ChannelDisplay, HeadlessDisplay, StatusDisplay};
use extract::LogExtractor;
use metrics::Metrics;
use poller::Poller;
use state::{now_unix, State};
use std::fs::OpenOptions;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "nodeboard")]
#[command(version)]
struct Cli {
    /// YAML config, or JSON when the file ends in `.json`.
    #[arg(long, default_value = "./config.yaml")]
    config: String,
    #[arg(long)]
    print_default_config: bool,
    /// Print panels to stdout instead of drawing the terminal grid.
    #[arg(long)]
    headless: bool,
    /// Run a single poll cycle, print it and exit.
    #[arg(long)]
    once: bool,
    /// Log destination while the terminal grid owns the screen.
    #[arg(long, default_value = "nodeboard.log")]
    log_file: PathBuf,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let use_tui = !(cli.headless || cli.once);
    init_tracing(use_tui.then_some(cli.log_file.as_path()));

    let cfg = match Config::load_from_file(&cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(error = %err, "failed to load config");
            eprintln!("nodeboard: {err}");
            std::process::exit(1);
        }
    };

    info!(
        nodes = cfg.nodes.len(),
        interval_secs = cfg.interval_secs,
        log_reader = cfg.log_reader.kind(),
        "starting nodeboard"
    );

    let now = now_unix();
    let shared_state = Arc::new(RwLock::new(State::new(now, &cfg.nodes)));
    let metrics = match Metrics::new(now) {
        Ok(m) => m,
        Err(err) => {
            error!(error = %err, "failed to initialise metrics");
            std::process::exit(1);
        }
    };
    metrics.set_nodes_configured(cfg.nodes.len());

    let addresses: Vec<String> = cfg.nodes.iter().map(|n| n.address.clone()).collect();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let (display, tui_updates): (Arc<dyn StatusDisplay>, _) = if use_tui {
        let (display, rx) = ChannelDisplay::new();
        let display: Arc<dyn StatusDisplay> = Arc::new(display);
        (display, Some(rx))
    } else {
        let display: Arc<dyn StatusDisplay> = Arc::new(HeadlessDisplay::new(addresses.clone()));
        (display, None)
    };

    let poller = Arc::new(Poller::new(
        cfg.nodes.clone(),
        Arc::new(SshTransport::new(cfg.connect_timeout_secs).await),
        cfg.log_reader.clone(),
        LogExtractor::new(cfg.watched_messages.clone(), cfg.noise_fields.clone()),
        cfg.node_timeout_secs.map(Duration::from_secs),
        display,
        shared_state.clone(),
        metrics.clone(),
    ));

    if cli.once {
        let summary = poller.run_cycle().await;
        if summary.failed > 0 {
            std::process::exit(2);
        }
        return;
    }

    let http_task = cfg.listen.clone().map(|listen| {
        spawn_http(
            listen,
            metrics.clone(),
            shared_state.clone(),
            shutdown_rx.clone(),
        )
    });

    let poller_task = {
        let poller = poller.clone();
        let shutdown = shutdown_rx.clone();
        let interval = Duration::from_secs(cfg.interval_secs);
        tokio::spawn(async move { poller.run(interval, shutdown).await })
    };

    match tui_updates {
        Some(updates) => {
            let mut tui = match Tui::new(addresses, updates) {
                Ok(tui) => tui,
                Err(err) => {
                    error!(error = %err, "failed to initialise terminal");
                    eprintln!("nodeboard: cannot start terminal UI: {err} (try --headless)");
                    std::process::exit(1);
                }
            };
            let tui_shutdown = shutdown_tx.clone();
            let ui = tokio::task::spawn_blocking(move || tui.run(&tui_shutdown));
            let mut ui_done = shutdown_rx.clone();
            tokio::select! {
                _ = ui_done.changed() => info!("quit requested, shutting down"),
                res = tokio::signal::ctrl_c() => {
                    if let Err(err) = res {
                        error!(error = %err, "failed to listen for Ctrl+C");
                    }
                    info!("received Ctrl+C, shutting down");
                }
            }
            let _ = shutdown_tx.send(true);
            match ui.await {
                Ok(Err(err)) => warn!(error = %err, "terminal restore failed"),
                Err(err) => error!(error = %err, "terminal thread aborted"),
                Ok(Ok(())) => {}
            }
        }
        None => {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!(error = %err, "failed to listen for Ctrl+C");
            }
            info!("received Ctrl+C, shutting down");
            let _ = shutdown_tx.send(true);
        }
    }

    let _ = poller_task.await;
    if let Some(task) = http_task {
        let _ = task.await;
    }
}

fn spawn_http(
    listen: String,
    metrics: Arc<Metrics>,
    state: Arc<RwLock<State>>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let app = http::build_router(metrics, state);
        let addr: SocketAddr = match listen.parse() {
            Ok(addr) => addr,
            Err(err) => {
                error!(error = %err, listen = %listen, "invalid listen address");
                return;
            }
        };

        let listener = match TcpListener::bind(addr).await {
            Ok(l) => l,
            Err(err) => {
                error!(error = %err, "failed to start HTTP server");
                return;
            }
        };
        info!(%addr, "HTTP server listening");

        let server = serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
        });

        if let Err(err) = server.await {
            error!(error = %err, "HTTP server error");
        }
    })
}

fn init_tracing(log_file: Option<&std::path::Path>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let Some(path) = log_file else {
        builder.with_writer(std::io::stderr).init();
        return;
    };
    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => builder
            .with_ansi(false)
            .with_writer(std::sync::Mutex::new(file))
            .init(),
        Err(err) => {
            eprintln!(
                "nodeboard: cannot open log file {}: {err}; logging disabled",
                path.display()
            );
            builder.with_writer(std::io::sink).init();
        }
    }
}
