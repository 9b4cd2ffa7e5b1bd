use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use simrate::{ControlCommand, SharedState, StopToken};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyAction {
    Quit,
    Command(ControlCommand),
}

/// Spawn a thread that turns key presses into control commands.
///
/// - `p` pauses, `r` resumes, `l` resets the clock to live time
/// - Esc, `q` or Ctrl+C stops the program
pub fn spawn_keyboard_monitor(stop: Arc<StopToken>, shared: SharedState) -> JoinHandle<()> {
    thread::spawn(move || {
        debug!("Keyboard monitor started");

        while !stop.is_stopped() {
            // Poll with a timeout so the stop flag is rechecked
            if event::poll(Duration::from_millis(100)).unwrap_or(false)
                && let Ok(Event::Key(key_event)) = event::read()
                && let Some(action) = action_for(&key_event)
            {
                match action {
                    KeyAction::Quit => {
                        debug!("Shutdown key pressed: {:?}", key_event.code);
                        stop.stop();
                        break;
                    }
                    KeyAction::Command(command) => {
                        shared.info(format!("{command} requested"));
                        shared.submit_command(command);
                    }
                }
            }
        }

        debug!("Keyboard monitor stopped");
    })
}

fn action_for(event: &KeyEvent) -> Option<KeyAction> {
    if event.kind == KeyEventKind::Release {
        return None;
    }
    match event.code {
        KeyCode::Esc => Some(KeyAction::Quit),
        KeyCode::Char('q') | KeyCode::Char('Q') => Some(KeyAction::Quit),
        KeyCode::Char('c') if event.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(KeyAction::Quit)
        }
        KeyCode::Char('p') | KeyCode::Char('P') => Some(KeyAction::Command(ControlCommand::Pause)),
        KeyCode::Char('r') | KeyCode::Char('R') => Some(KeyAction::Command(ControlCommand::Resume)),
        KeyCode::Char('l') | KeyCode::Char('L') => {
            Some(KeyAction::Command(ControlCommand::ResetToLiveTime))
        }
        _ => None,
    }
}
