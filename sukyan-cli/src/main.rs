//! Command-line entry point for the sukyan scan core.
//!
//! Wires configuration loading, logging, and the MITM proxy -- the one
//! standalone network service this workspace owns -- together with the
//! phase-sequencing orchestrator running against a pluggable `Store` and
//! `Scheduler`. Production deployments supply their own `Store`/`Scheduler`
//! implementations (spec §6 treats both as external contracts); this binary
//! falls back to an in-memory store and a scheduler that logs dispatches so
//! `start` is useful standalone.

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use sukyan_config::SukyanConfig;
use sukyan_orchestrator::{Integrations, Orchestrator};
use sukyan_proxy::ProxyServer;
use sukyan_store::memory::MemoryStore;
use tokio::signal;

mod logging_scheduler;

use logging_scheduler::LoggingScheduler;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let matches = create_cli().get_matches();

    let config_path = matches
        .get_one::<String>("config")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("sukyan.toml"));

    let config = load_config(&config_path)
        .with_context(|| format!("failed to load configuration from {}", config_path.display()))?;

    match matches.subcommand() {
        Some(("start", sub_matches)) => start(config, sub_matches).await?,
        Some(("validate", _)) => validate(&config)?,
        Some(("init", sub_matches)) => init_ca(&config, sub_matches).await?,
        _ => start(config, &matches).await?,
    }

    Ok(())
}

fn create_cli() -> Command {
    Command::new("sukyan")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Dynamic web application security scan core")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("sukyan.toml"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .help("Increase verbosity level"),
        )
        .arg(
            Arg::new("bind")
                .short('b')
                .long("bind")
                .value_name("ADDRESS")
                .help("Override the proxy's bind address"),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .help("Override the proxy's port")
                .value_parser(clap::value_parser!(u16)),
        )
        .subcommand(Command::new("start").about("Start the proxy and orchestrator (default action)"))
        .subcommand(Command::new("validate").about("Validate configuration and exit"))
        .subcommand(
            Command::new("init")
                .about("Generate the root certificate authority and write it to a file")
                .arg(
                    Arg::new("out")
                        .short('o')
                        .long("out")
                        .value_name("FILE")
                        .help("Path to write the CA certificate (DER)")
                        .default_value("sukyan-ca.crt"),
                )
                .arg(
                    Arg::new("organization")
                        .long("organization")
                        .value_name("NAME")
                        .help("CA subject organization name")
                        .default_value("Sukyan"),
                ),
        )
}

fn init_logging() {
    let default_filter = match std::env::var("RUST_LOG") {
        Ok(_) => return,
        Err(_) => "sukyan_cli=info,sukyan_proxy=info,sukyan_orchestrator=info",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_secs()
        .init();
}

fn load_config(config_path: &PathBuf) -> Result<SukyanConfig> {
    if !config_path.exists() {
        info!("no configuration file at {}, using defaults", config_path.display());
        return Ok(SukyanConfig::default());
    }

    let config = SukyanConfig::from_file(config_path).map_err(|e| anyhow::anyhow!("configuration error: {e}"))?;
    info!("configuration loaded from: {}", config_path.display());
    Ok(config)
}

async fn start(mut config: SukyanConfig, matches: &ArgMatches) -> Result<()> {
    if let Some(bind) = matches.get_one::<String>("bind") {
        config.proxy.bind_address = bind.clone();
    }
    if let Some(port) = matches.get_one::<u16>("port") {
        config.proxy.port = *port;
    }

    let store = Arc::new(MemoryStore::new());
    let scheduler = Arc::new(LoggingScheduler::default());

    let proxy = ProxyServer::new(config.proxy.clone(), store.clone(), "Sukyan", 365, None, None)
        .with_context(|| "failed to initialize the MITM proxy")?;
    info!("proxy listening on {}:{} (vhost={})", config.proxy.bind_address, config.proxy.port, config.proxy.vhost);
    info!("fetch the root CA from http://{}/ca", config.proxy.vhost);

    let orchestrator = Arc::new(Orchestrator::new(
        store,
        scheduler,
        config.orchestrator.clone(),
        Integrations::default(),
    ));
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let orchestrator_task = tokio::spawn(orchestrator.run(shutdown_rx));

    tokio::select! {
        result = proxy.run() => {
            if let Err(e) = result {
                warn!("proxy exited: {e}");
            }
        }
        _ = wait_for_shutdown() => {
            info!("shutdown signal received, stopping");
        }
    }

    let _ = shutdown_tx.send(());
    let _ = orchestrator_task.await;
    info!("sukyan stopped");
    Ok(())
}

fn validate(config: &SukyanConfig) -> Result<()> {
    config.validate().map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    info!("configuration is valid");
    println!("template_scanner.worker_pool_size: {}", config.template_scanner.worker_pool_size);
    println!("websocket_scanner.worker_pool_size: {}", config.websocket_scanner.worker_pool_size);
    println!("orchestrator.poll_interval_seconds: {}", config.orchestrator.poll_interval_seconds);
    println!("proxy: {}:{} (vhost={})", config.proxy.bind_address, config.proxy.port, config.proxy.vhost);
    Ok(())
}

async fn init_ca(_config: &SukyanConfig, matches: &ArgMatches) -> Result<()> {
    let organization = matches.get_one::<String>("organization").expect("has a default");
    let out = matches.get_one::<String>("out").expect("has a default");

    let ca = sukyan_proxy::CertAuthority::generate(organization, 365)
        .with_context(|| "failed to generate the root certificate authority")?;
    std::fs::write(out, ca.ca_cert_der()).with_context(|| format!("failed to write CA certificate to {out}"))?;
    info!("wrote root CA certificate to {out}");
    Ok(())
}

async fn wait_for_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
