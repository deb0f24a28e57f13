mod backup;
mod config;
mod conflicts;
mod db;
mod duplicates;
mod error;
mod fields;
mod ipc;
mod mutation;
mod presets;
mod store;
mod template;
mod validation;

use std::io::{self, BufRead, Write};
use tracing_subscriber::EnvFilter;

/// Stdout carries the IPC stream, so logs go to stderr. `ASSETD_LOG` takes
/// the usual filter directives.
fn init_logging() {
    let filter = EnvFilter::try_from_env("ASSETD_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(io::stderr)
        .init();
}

fn main() {
    init_logging();

    let validator = match validation::AssetValidator::new() {
        Ok(v) => v,
        Err(e) => {
            eprintln!("assetd: failed to build validation patterns: {}", e);
            std::process::exit(1);
        }
    };
    let mut state = ipc::AppState::new(validator);

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "stdin closed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id.
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() },
                });
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        tracing::debug!(id = %req.id, method = %req.method, "request");
        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
}
