use capstoned::{ipc, logging};
use log::{error, info};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

fn main() {
    let level = std::env::var(logging::LOG_LEVEL_ENV)
        .unwrap_or_else(|_| logging::default_log_level().to_string());
    let log_dir = std::env::var_os(logging::LOG_DIR_ENV).map(PathBuf::from);
    if let Err(e) = logging::init_logging(&level, log_dir.as_deref()) {
        eprintln!("capstoned: logging disabled: {e}");
    }

    let mut state = ipc::AppState::default();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                error!("event=stdin_read status=error error={e}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let resp = match serde_json::from_str::<ipc::Request>(&line) {
            Ok(req) => ipc::handle_request(&mut state, req),
            Err(e) => ipc::bad_json(e.to_string()),
        };
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }

    info!("event=shutdown status=ok");
}
