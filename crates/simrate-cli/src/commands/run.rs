//! Main synchronization mode.

use std::io::{IsTerminal, stdout};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Result, bail};
use chrono::Utc;
use simrate::{
    AutoAppLauncher, SharedState, SimConnectConnector, StatusSnapshot, StopToken, Supervisor,
    SystemClock, Win32ProcessProvider,
};
use tracing::{debug, info};

use crate::commands::Options;
use crate::input;

const REFRESH_INTERVAL: Duration = Duration::from_millis(200);

/// Run the supervisor in the background and the console in the foreground.
pub fn run(options: &Options) -> Result<()> {
    let stop = Arc::new(StopToken::new());
    let stop_ctrlc = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        info!("Received shutdown signal, stopping...");
        stop_ctrlc.stop();
    })?;

    let config = options.sync_config(true);
    let profiles = options.offset_profiles()?;

    let shared = SharedState::new();
    if let Some(path) = &options.autoapp {
        if !path.exists() {
            shared.warn(format!("Auxiliary application {} does not exist", path.display()));
        }
        shared.set_autoapp(true, Some(path.clone()));
    }

    let backend = {
        let shared = shared.clone();
        let stop = Arc::clone(&stop);
        thread::Builder::new()
            .name("supervisor".to_string())
            .spawn(move || {
                let clock = SystemClock::stoppable(Arc::clone(&stop));
                let mut supervisor = Supervisor::new(
                    config,
                    profiles,
                    Win32ProcessProvider,
                    SimConnectConnector::default(),
                    clock,
                    shared,
                )
                .with_stop_token(stop)
                .with_hook(Arc::new(AutoAppLauncher));
                supervisor.run()
            })?
    };

    let keyboard = input::spawn_keyboard_monitor(Arc::clone(&stop), shared.clone());

    println!("p: pause | r: resume | l: reset to live time | q/Esc: quit");
    let color = stdout().is_terminal();
    let mut last_shown: Option<StatusSnapshot> = None;

    while !stop.is_stopped() && !backend.is_finished() {
        print_logs(&shared);

        let snapshot = shared.snapshot();
        if last_shown
            .as_ref()
            .is_none_or(|shown| status_changed(shown, &snapshot))
        {
            println!("{}", snapshot.status_line(Utc::now(), color));
            last_shown = Some(snapshot);
        }

        stop.sleep(REFRESH_INTERVAL);
    }

    stop.stop();
    let result = backend.join();
    let _ = keyboard.join();
    print_logs(&shared);

    match result {
        Ok(Ok(())) => {
            debug!("Supervisor stopped");
            Ok(())
        }
        Ok(Err(e)) => Err(e.into()),
        Err(_) => bail!("Supervisor thread panicked"),
    }
}

fn print_logs(shared: &SharedState) {
    for line in shared.drain_logs() {
        println!("{line}");
    }
}

/// The reported absolute time moves every tick, so it does not count as a change.
fn status_changed(shown: &StatusSnapshot, current: &StatusSnapshot) -> bool {
    shown.status != current.status
        || shown.status_detail != current.status_detail
        || shown.rate_display != current.rate_display
        || shown.seconds_offset != current.seconds_offset
        || shown.bridge_status != current.bridge_status
}
