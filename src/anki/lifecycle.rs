use std::{
    process::{
        Child,
        Command,
        Stdio,
    },
    thread,
    time::{
        Duration,
        Instant,
    },
};

use super::api::AnkiConnect;
use crate::core::WordToAnkiError;

pub const ANKI_BINARY: &str = "anki";

const EXIT_GRACE: Duration = Duration::from_secs(15);
const EXIT_POLL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppStatus {
    AlreadyRunning, // Or running under someone else's control; still worth polling
    Started,
    Unreachable,
}

/// Start/stop control over the application behind the flashcard backend.
pub trait AppLifecycle {
    fn ensure_running(&mut self) -> Result<AppStatus, WordToAnkiError>;
    fn shutdown(&mut self) -> Result<(), WordToAnkiError>;
}

/// Leaves the application alone. It may still be starting up, so the caller keeps polling.
#[derive(Debug, Default)]
pub struct ExternallyManaged;

impl AppLifecycle for ExternallyManaged {
    fn ensure_running(&mut self) -> Result<AppStatus, WordToAnkiError> {
        Ok(AppStatus::AlreadyRunning)
    }

    fn shutdown(&mut self) -> Result<(), WordToAnkiError> {
        Ok(())
    }
}

/// Launches the Anki desktop app when needed and closes only the instance it launched.
pub struct AnkiProcess {
    program: String,
    api: Option<AnkiConnect>,
    child: Option<Child>,
}

impl AnkiProcess {
    pub fn new(program: &str) -> Self {
        Self { program: program.to_string(), api: None, child: None }
    }

    /// Closes Anki through AnkiConnect before resorting to killing the process.
    pub fn with_api(mut self, api: AnkiConnect) -> Self {
        self.api = Some(api);
        self
    }
}

impl Default for AnkiProcess {
    fn default() -> Self {
        Self::new(ANKI_BINARY)
    }
}

impl AppLifecycle for AnkiProcess {
    fn ensure_running(&mut self) -> Result<AppStatus, WordToAnkiError> {
        if let Some(child) = self.child.as_mut() {
            if child.try_wait()?.is_none() {
                return Ok(AppStatus::AlreadyRunning);
            }
            self.child = None;
        }

        match Command::new(&self.program)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => {
                log::info!("[Anki] started {} (pid {})", self.program, child.id());
                self.child = Some(child);
                Ok(AppStatus::Started)
            }
            Err(e) => {
                log::warn!("[Anki] could not start {}: {}", self.program, e);
                Ok(AppStatus::Unreachable)
            }
        }
    }

    fn shutdown(&mut self) -> Result<(), WordToAnkiError> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        if child.try_wait()?.is_none() {
            log::info!("[Anki] closing {} (pid {})", self.program, child.id());
            if let Some(api) = &self.api {
                if let Err(e) = api.gui_exit_anki() {
                    log::warn!("[Anki] AnkiConnect could not close Anki: {}", e);
                }
            }
            if !wait_or_kill(&mut child, EXIT_GRACE)? {
                log::warn!("[Anki] {} did not exit within {:?}, killed it", self.program, EXIT_GRACE);
            }
        }
        child.wait()?;
        Ok(())
    }
}

/// Waits up to `grace` for the child to exit on its own, then kills it.
/// Returns whether it exited without being killed.
fn wait_or_kill(child: &mut Child, grace: Duration) -> Result<bool, WordToAnkiError> {
    let deadline = Instant::now() + grace;
    loop {
        if child.try_wait()?.is_some() {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            break;
        }
        thread::sleep(EXIT_POLL.min(grace));
    }

    child.kill()?;
    Ok(false)
}
