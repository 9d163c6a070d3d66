//! # CLI Module
//!
//! The `autoroute` binary's commands.
//!
//! ### `serve`
//!
//! ```bash
//! autoroute serve --config-dir config/endpoints --settings config/settings.yaml
//! ```
//!
//! Loads every `*.yaml`/`*.yml` file in the directory, resolves handlers,
//! and serves until SIGINT/SIGTERM. `--addr` overrides `http.addr`.
//!
//! ### `check`
//!
//! ```bash
//! autoroute check --config-dir config/endpoints
//! ```
//!
//! Fails with the first configuration or handler-resolution error.
//!
//! ### `routes`
//!
//! ```bash
//! autoroute routes --config-dir config/endpoints [--json]
//! ```

mod commands;


pub use commands::{
    build_service, default_handlers, load_registry, routes_table, run, run_cli, Cli, Commands,
    RouteRow,
};
