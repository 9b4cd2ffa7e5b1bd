//! Auxiliary application control on simulation-rate crossings.
//!
//! Some companion tools misbehave while time is accelerated. When the rate goes
//! above 1x the tool is terminated; when it comes back to 1x or below it is
//! started again from its own directory.

use std::path::Path;
use std::process::Command;
use std::thread;

use tracing::debug;

use crate::memory::find_process_id;
use crate::state::SharedState;

/// Called by the synchronization loop on the first tick and whenever the rate
/// crosses the 1x boundary. Implementations must not block the caller.
pub trait RateCrossingHook: Send + Sync {
    fn on_crossing(&self, rate: f64, app: &Path, shared: &SharedState);
}

/// Whether a rate change from `previous` to `current` crosses the 1x boundary.
///
/// A zero rate on either side (paused or slewing) never counts as a crossing.
pub fn crosses_real_time(previous: f64, current: f64) -> bool {
    previous != 0.0 && current != 0.0 && ((current <= 1.0) == (previous > 1.0))
}

/// Starts or terminates the auxiliary executable on a background thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoAppLauncher;

impl RateCrossingHook for AutoAppLauncher {
    fn on_crossing(&self, rate: f64, app: &Path, shared: &SharedState) {
        if !app.exists() {
            debug!("Auxiliary application {} does not exist", app.display());
            return;
        }

        let app = app.to_path_buf();
        let shared = shared.clone();
        thread::spawn(move || {
            if let Err(e) = apply(rate, &app, &shared) {
                shared.warn(format!("Auxiliary application {}: {e}", app.display()));
            }
        });
    }
}

fn apply(rate: f64, app: &Path, shared: &SharedState) -> anyhow::Result<()> {
    let exe_name = app
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow::anyhow!("path has no file name"))?;

    if rate > 1.0 {
        if is_running(&exe_name)? {
            let status = hidden(Command::new("taskkill").args(["/f", "/im", &exe_name]))
                .status()
                .map_err(|e| anyhow::anyhow!("Failed to run taskkill: {e}"))?;
            if status.success() && !is_running(&exe_name)? {
                shared.info(format!("{exe_name} killed."));
            }
        }
    } else if !is_running(&exe_name)? {
        let mut command = Command::new(app);
        if let Some(dir) = app.parent() {
            command.current_dir(dir);
        }
        detached(&mut command)
            .spawn()
            .map_err(|e| anyhow::anyhow!("Failed to start: {e}"))?;
        if is_running(&exe_name)? {
            shared.info(format!("{exe_name} started."));
        }
    }
    Ok(())
}

fn is_running(exe_name: &str) -> anyhow::Result<bool> {
    Ok(find_process_id(exe_name)?.is_some())
}

#[cfg(target_os = "windows")]
fn hidden(command: &mut Command) -> &mut Command {
    use std::os::windows::process::CommandExt;
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    command.creation_flags(CREATE_NO_WINDOW)
}

#[cfg(not(target_os = "windows"))]
fn hidden(command: &mut Command) -> &mut Command {
    command
}

#[cfg(target_os = "windows")]
fn detached(command: &mut Command) -> &mut Command {
    use std::os::windows::process::CommandExt;
    const DETACHED_PROCESS: u32 = 0x0000_0008;
    command.creation_flags(DETACHED_PROCESS)
}

#[cfg(not(target_os = "windows"))]
fn detached(command: &mut Command) -> &mut Command {
    command
}
