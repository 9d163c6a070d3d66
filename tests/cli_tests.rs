mod common;

use autoroute::cli::{default_handlers, load_registry, routes_table, run, Cli};
use clap::Parser;
use common::config_dir::with_files;
use std::path::Path;

fn shipped_config() -> &'static Path {
    Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/config/endpoints"))
}

#[test]
fn test_shipped_endpoints_load_with_builtin_handlers() {
    let registry = load_registry(shipped_config(), &default_handlers()).unwrap();
    let rows = routes_table(&registry);
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r.handler == "builtin.echo"));
    assert!(rows.iter().any(|r| r.path == "/echo/{channel}" && r.auth_required));
}

#[test]
fn test_check_command() {
    let dir = shipped_config().to_string_lossy().into_owned();
    let cli = Cli::try_parse_from(["autoroute", "check", "--config-dir", &dir]).unwrap();
    assert!(run(cli).is_ok());
}

#[test]
fn test_check_reports_broken_configuration() {
    let dir = with_files(&[("bad.yaml", "broken:\n  path: /x\n  method: FETCH\n  handler: builtin.echo\n")]);
    let path = dir.path().to_string_lossy().into_owned();
    let cli = Cli::try_parse_from(["autoroute", "check", "-c", &path]).unwrap();
    let err = run(cli).unwrap_err();
    assert!(format!("{err:#}").contains("broken"));
}
