mod activity;
mod config;
mod discord;
mod http;
mod locale;
mod metrics;
mod model;
mod nicehash;
mod publisher;
mod refresh;
mod selector;
mod state;

use axum::serve;
use clap::Parser;
use config::{Config, ConfigError};
use discord::IpcConnector;
use locale::Language;
use metrics::Metrics;
use nicehash::NiceHashClient;
use publisher::Publisher;
use state::SharedState;
use std::net::SocketAddr;
use std::time::{Duration, SystemTime};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "nicehash-presence")]
#[command(version)]
struct Cli {
    #[arg(long, default_value = "./config.yaml")]
    config: String,
    #[arg(long)]
    print_default_config: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let cfg = match Config::load_from_file(&cli.config) {
        Ok(cfg) => cfg,
        Err(ConfigError::MissingCredentials { missing, language }) => {
            exit_missing_credentials(&missing, language)
        }
        Err(err) => {
            error!(error = %err, path = %cli.config, "failed to load configuration");
            std::process::exit(1);
        }
    };

    let account = match cfg.account() {
        Ok(account) => account,
        Err(ConfigError::MissingCredentials { missing, language }) => {
            exit_missing_credentials(&missing, language)
        }
        Err(err) => {
            error!(error = %err, "invalid configuration");
            std::process::exit(1);
        }
    };

    info!(
        brand = %account.device_brand,
        refresh_interval_secs = cfg.refresh_interval_secs,
        publish_interval_secs = cfg.publish_interval_secs,
        "starting nicehash-presence"
    );
    if cfg.discord.client_id.trim().is_empty() {
        warn!("discord.client_id is empty and no built-in id was compiled in; presence will not connect");
    }

    let shared_state = SharedState::new(SystemTime::now());
    let metrics = match Metrics::new() {
        Ok(m) => m,
        Err(err) => {
            error!(error = %err, "failed to initialize metrics");
            std::process::exit(1);
        }
    };

    let client = match NiceHashClient::new(
        &cfg.nicehash.base_url,
        Duration::from_secs(cfg.nicehash.timeout_secs),
        account.credentials,
    ) {
        Ok(client) => client,
        Err(err) => {
            error!(error = %err, "failed to build NiceHash client");
            std::process::exit(1);
        }
    };

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let signal_task = tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to wait for Ctrl+C");
        }
        info!("received Ctrl+C, shutting down");
        let _ = shutdown_tx.send(true);
    });

    let ready = refresh::initial_refresh(
        &client,
        &account.device_brand,
        &shared_state,
        &metrics,
        Duration::from_secs(cfg.publish_interval_secs),
        &mut shutdown_rx,
    )
    .await;
    if !ready {
        let _ = signal_task.await;
        return;
    }

    let refresh_task = tokio::spawn(refresh::run_refresh_loop(
        client,
        account.device_brand,
        shared_state.clone(),
        metrics.clone(),
        Duration::from_secs(cfg.refresh_interval_secs),
        shutdown_rx.clone(),
    ));

    let http_task = cfg.listen.clone().map(|listen| {
        let metrics = metrics.clone();
        let http_state = shared_state.clone();
        let mut shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            let app = http::build_router(metrics, http_state);
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
                    error!(error = %err, "failed to start status server");
                    return;
                }
            };
            info!(%addr, "status server listening");

            let server = serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.changed().await;
            });

            if let Err(err) = server.await {
                error!(error = %err, "status server error");
            }
        })
    });

    let publisher = Publisher::new(
        IpcConnector::new(cfg.discord.client_id.clone()),
        shared_state.clone(),
        metrics.clone(),
        cfg.branding(),
        cfg.language,
        Duration::from_secs(cfg.discord.reconnect_interval_secs),
    );
    let publisher_task = tokio::spawn(publisher.run(
        Duration::from_secs(cfg.publish_interval_secs),
        shutdown_rx,
    ));

    let _ = signal_task.await;

    let _ = publisher_task.await;
    let _ = refresh_task.await;
    if let Some(task) = http_task {
        let _ = task.await;
    }
}

fn exit_missing_credentials(missing: &[&str], language: Language) -> ! {
    error!(missing = %missing.join(", "), "required settings are missing");
    eprintln!("{}: {}", language.error_title(), language.missing_credentials());
    std::process::exit(0);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
