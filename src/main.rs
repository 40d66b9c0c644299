mod db;
mod ipc;
mod roster;
mod stats;

use std::io::{self, BufRead, Write};

fn init_logging() -> Option<flexi_logger::LoggerHandle> {
    // stdout carries the protocol; diagnostics go to stderr.
    let spec = std::env::var("ATTENDD_LOG").unwrap_or_else(|_| "info".to_string());
    match flexi_logger::Logger::try_with_str(&spec) {
        Ok(logger) => match logger.start() {
            Ok(handle) => Some(handle),
            Err(e) => {
                eprintln!("attendd: logger start failed: {e}");
                None
            }
        },
        Err(e) => {
            eprintln!("attendd: bad ATTENDD_LOG spec `{spec}`: {e}");
            None
        }
    }
}

fn main() {
    let _logger = init_logging();
    log::info!("attendd {} starting", env!("CARGO_PKG_VERSION"));

    let mut state = ipc::AppState {
        workspace: None,
        db: None,
        auth: None,
        sheet: None,
        sheet_seq: 0,
    };

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id; ignore.
                log::warn!("unparseable request line: {e}");
                let _ = writeln!(
                    stdout,
                    "{{\"ok\":false,\"error\":{{\"code\":\"bad_json\",\"message\":\"{}\"}}}}",
                    e
                );
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }

    log::info!("attendd exiting");
}
