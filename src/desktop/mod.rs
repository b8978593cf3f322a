//! Desktop services used by the interaction handlers: notifications, the
//! clipboard and the default browser.

use async_trait::async_trait;
use thiserror::Error;

pub mod system;
pub use system::SystemDesktop;

#[derive(Debug, Error)]
pub enum DesktopError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} failed: {output}")]
    Failed { program: String, output: String },

    #[error("clipboard unavailable: {0}")]
    Clipboard(#[from] arboard::Error),

    #[error("no {0} helper configured for this platform")]
    Unsupported(&'static str),
}

#[async_trait]
pub trait Desktop: Send + Sync {
    /// Show a notification.  Delivery failures are logged, never returned.
    async fn notify(&self, title: &str, body: &str);

    async fn copy_to_clipboard(&self, text: &str) -> Result<(), DesktopError>;

    /// Hand the URL to the platform browser without waiting for it.
    async fn open_url(&self, url: &str) -> Result<(), DesktopError>;
}
