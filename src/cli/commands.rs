use crate::dispatcher::Dispatcher;
use crate::echo::register_builtin_handlers;
use crate::handlers::HandlerTable;
use crate::middleware::{MetricsMiddleware, Middleware, TracingMiddleware};
use crate::registry::Registry;
use crate::runtime_config::{RuntimeConfig, ServiceConfig};
use crate::server::{AppService, HttpServer, ServerHandle};
use crate::spec::load_endpoint_dir;
use crate::throttle::InMemoryThrottleStore;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Command-line interface for autoroute
#[derive(Parser, Debug)]
#[command(name = "autoroute", version)]
#[command(about = "Serve YAML-declared HTTP endpoints", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load the endpoint directory and serve it
    Serve {
        /// Directory of endpoint YAML files
        #[arg(short, long, env = "AUTOROUTE_CONFIG_DIR")]
        config_dir: PathBuf,

        /// Service settings file (YAML)
        #[arg(short, long, env = "AUTOROUTE_SETTINGS")]
        settings: Option<PathBuf>,

        /// Bind address, overrides `http.addr` from the settings file
        #[arg(long)]
        addr: Option<String>,
    },
    /// Load and resolve the endpoint directory, then exit
    Check {
        #[arg(short, long, env = "AUTOROUTE_CONFIG_DIR")]
        config_dir: PathBuf,
    },
    /// Print the routing table
    Routes {
        #[arg(short, long, env = "AUTOROUTE_CONFIG_DIR")]
        config_dir: PathBuf,

        /// Emit JSON instead of a text table
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

/// Handler table available to the binary
pub fn default_handlers() -> HandlerTable {
    let mut table = HandlerTable::new();
    register_builtin_handlers(&mut table);
    table
}

/// Load, resolve and index an endpoint directory
pub fn load_registry(config_dir: &Path, handlers: &HandlerTable) -> Result<Registry> {
    let specs = load_endpoint_dir(config_dir)
        .with_context(|| format!("failed to load endpoints from {}", config_dir.display()))?;
    Registry::build(specs, handlers).context("failed to build endpoint registry")
}

/// Wire a registry into a ready-to-start service
///
/// The returned service records metrics and tracing for every dispatched
/// request and enforces the settings' body ceiling.
pub fn build_service(registry: Registry, settings: &ServiceConfig) -> AppService {
    let metrics = Arc::new(MetricsMiddleware::new());
    let store = InMemoryThrottleStore::new().sweep_every(settings.throttle.sweep_every);
    let mut dispatcher = Dispatcher::new(Arc::new(registry))
        .with_identity_provider(settings.identity_provider())
        .with_throttle_store(Arc::new(store))
        .with_trusted_forwarding(settings.throttle.trust_forwarded_headers);
    dispatcher.add_middleware(Arc::new(TracingMiddleware));
    dispatcher.add_middleware(Arc::clone(&metrics) as Arc<dyn Middleware>);

    let mut service = AppService::new(Arc::new(dispatcher)).with_max_body_bytes(settings.http.max_body_bytes);
    service.set_metrics_middleware(metrics);
    service
}

/// One line of `autoroute routes`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
pub struct RouteRow {
    pub path: String,
    pub method: String,
    pub name: String,
    pub handler: String,
    pub auth_required: bool,
}

/// Routing table sorted by path, then method
pub fn routes_table(registry: &Registry) -> Vec<RouteRow> {
    let mut rows: Vec<_> = registry
        .endpoints()
        .map(|e| RouteRow {
            path: e.spec.path.clone(),
            method: e.spec.method.to_string(),
            name: e.spec.name.clone(),
            handler: e.spec.handler_ref.clone(),
            auth_required: e.spec.auth_required,
        })
        .collect();
    rows.sort();
    rows
}

#[cfg(unix)]
fn wait_for_shutdown(handle: ServerHandle) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM]).context("failed to install signal handlers")?;
    if let Some(signal) = signals.forever().next() {
        info!(signal, "Shutdown signal received");
    }
    handle.stop();
    Ok(())
}

#[cfg(not(unix))]
fn wait_for_shutdown(handle: ServerHandle) -> Result<()> {
    handle
        .join()
        .map_err(|e| anyhow::anyhow!("server coroutine panicked: {e:?}"))
}

/// Parse arguments and run the chosen command
pub fn run_cli() -> Result<()> {
    run(Cli::parse())
}

pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Serve {
            config_dir,
            settings,
            addr,
        } => {
            let settings = match settings {
                Some(path) => ServiceConfig::load(&path)?,
                None => ServiceConfig::default(),
            };
            let runtime = RuntimeConfig::from_env();
            runtime.apply();

            let registry = load_registry(&config_dir, &default_handlers())?;
            info!(
                endpoints = registry.len(),
                config_dir = %config_dir.display(),
                stack_size = runtime.stack_size,
                "Endpoint registry ready"
            );
            let addr = addr.unwrap_or_else(|| settings.http.addr.clone());
            let service = build_service(registry, &settings);
            let handle = HttpServer(service)
                .start(addr.as_str())
                .with_context(|| format!("failed to bind {addr}"))?;
            wait_for_shutdown(handle)
        }
        Commands::Check { config_dir } => {
            let registry = load_registry(&config_dir, &default_handlers())?;
            println!("ok: {} endpoints", registry.len());
            Ok(())
        }
        Commands::Routes { config_dir, json } => {
            let registry = load_registry(&config_dir, &default_handlers())?;
            let rows = routes_table(&registry);
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                for row in rows {
                    let auth = if row.auth_required { "auth" } else { "public" };
                    println!(
                        "{:<8}{:<40}{:<28}{:<32}{}",
                        row.method, row.path, row.name, row.handler, auth
                    );
                }
            }
            Ok(())
        }
    }
}
