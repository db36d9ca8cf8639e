mod availability;
mod booking;
mod calendar;
mod config;
mod db;
mod documents;
mod error;
mod insights;
mod ipc;
mod metrics;
mod model;
mod payments;
mod scheduling;
mod store;

use std::io::{self, BufRead, Write};

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn write_line(stdout: &mut impl Write, value: &serde_json::Value) {
    let _ = writeln!(
        stdout,
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{\"ok\":false}".to_string())
    );
}

fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    // stdout carries the protocol; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cfg = config::Config::from_env().context("loading configuration")?;
    config::validate(&cfg)?;

    let mut state = ipc::AppState::new(cfg);
    match (state.config.mode, state.config.workspace.clone()) {
        (config::StoreMode::Demo, _) => state.open_demo(),
        (config::StoreMode::Workspace, Some(path)) => state
            .open_workspace(&path)
            .with_context(|| format!("opening workspace {}", path.display()))?,
        (config::StoreMode::Workspace, None) => {}
    }
    info!(version = env!("CARGO_PKG_VERSION"), "educatord ready");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "stdin closed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // No id to answer to.
                write_line(&mut stdout, &ipc::bad_json(e.to_string()));
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        write_line(&mut stdout, &resp);
        for event in state.events.drain(..) {
            write_line(&mut stdout, &event);
        }
        let _ = stdout.flush();
    }

    info!("stdin closed, exiting");
    Ok(())
}
