use super::{Desktop, DesktopError};
use crate::config::Config;
use arboard::Clipboard;
use async_trait::async_trait;
use log::{debug, warn};
use std::process::Stdio;
use tokio::process::Command;
use tokio::task;

/// [`Desktop`] backed by the system clipboard and the platform's helpers.
pub struct SystemDesktop {
    notify: String,
}

impl SystemDesktop {
    pub fn new(notify: impl Into<String>) -> Self {
        Self {
            notify: notify.into(),
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.notify_command.clone())
    }
}

fn set_clipboard_text(text: String) -> Result<(), DesktopError> {
    let mut clipboard = Clipboard::new()?;
    clipboard.set_text(text)?;
    Ok(())
}

fn browser_command(url: &str) -> Option<Command> {
    let mut cmd = if cfg!(target_os = "linux") {
        Command::new("xdg-open")
    } else if cfg!(target_os = "macos") {
        Command::new("open")
    } else if cfg!(target_os = "windows") {
        let mut cmd = Command::new("rundll32");
        cmd.arg("url.dll,FileProtocolHandler");
        cmd
    } else {
        return None;
    };
    cmd.arg(url);
    Some(cmd)
}

#[async_trait]
impl Desktop for SystemDesktop {
    async fn notify(&self, title: &str, body: &str) {
        debug!("Notification: {}: {}", title, body);
        let result = Command::new(&self.notify)
            .arg(title)
            .arg(body)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        match result {
            Ok(status) if status.success() => {}
            Ok(status) => warn!("{} exited with {}", self.notify, status),
            Err(e) => warn!("Failed to run {}: {}", self.notify, e),
        }
    }

    async fn copy_to_clipboard(&self, text: &str) -> Result<(), DesktopError> {
        let text = text.to_string();
        task::spawn_blocking(move || set_clipboard_text(text))
            .await
            .map_err(|e| DesktopError::Failed {
                program: "clipboard".into(),
                output: e.to_string(),
            })?
    }

    async fn open_url(&self, url: &str) -> Result<(), DesktopError> {
        let mut cmd = browser_command(url).ok_or(DesktopError::Unsupported("browser"))?;
        cmd.spawn().map_err(|source| DesktopError::Spawn {
            program: "browser".into(),
            source,
        })?;
        Ok(())
    }
}
