use std::process::Stdio;

use tokio::process::Command as Process;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::command::Command;

/// Hand `url` to the platform opener in the background.
///
/// A failed launch is reported on the bus so the dashboard can show it in the
/// status line.
pub fn open_url(url: String, tx: broadcast::Sender<Command>) {
    tokio::spawn(async move {
        info!(%url, "opening external page");
        let outcome = opener(&url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        let failure = match outcome {
            Ok(status) if status.success() => None,
            Ok(status) => Some(format!("Could not open {url}: opener exited with {status}")),
            Err(err) => Some(format!("Could not open {url}: {err}")),
        };
        if let Some(message) = failure {
            warn!(%message, "failed to open external page");
            let _ = tx.send(Command::Error(message));
        }
    });
}

#[cfg(target_os = "macos")]
fn opener(url: &str) -> Process {
    let mut process = Process::new("open");
    process.arg(url);
    process
}

#[cfg(target_os = "windows")]
fn opener(url: &str) -> Process {
    let mut process = Process::new("cmd");
    process.args(["/C", "start", "", url]);
    process
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn opener(url: &str) -> Process {
    let mut process = Process::new("xdg-open");
    process.arg(url);
    process
}
