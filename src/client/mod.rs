//! Boundary to the `tailscale` command line client.
//!
//! Every query and every mutation the agent performs goes through
//! [`NetworkClient`].  Queries are all-or-nothing: either a fully decoded
//! value comes back or a [`FetchError`], never a partial result.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{Snapshot, ToggleState};

pub mod cli;
pub use cli::CliClient;

/// A status or DNS query failed.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {output}")]
    Exit {
        program: String,
        status: std::process::ExitStatus,
        output: String,
    },

    #[error("malformed status output: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A mutating command failed.  The display form is the command's own output.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{output}")]
    Failed { output: String },
}

/// Mutations understood by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    Up,
    Down,
    AcceptDns(bool),
    AcceptRoutes(bool),
    /// `None` clears the exit node.
    ExitNode(Option<String>),
}

impl ClientCommand {
    /// Arguments passed to the client binary.
    pub fn args(&self) -> Vec<String> {
        match self {
            ClientCommand::Up => vec!["up".into()],
            ClientCommand::Down => vec!["down".into()],
            ClientCommand::AcceptDns(enable) => {
                vec!["set".into(), format!("--accept-dns={}", enable)]
            }
            ClientCommand::AcceptRoutes(enable) => {
                vec!["set".into(), format!("--accept-routes={}", enable)]
            }
            ClientCommand::ExitNode(node) => vec![
                "set".into(),
                "--exit-node".into(),
                node.clone().unwrap_or_default(),
            ],
        }
    }

    /// Whether the command must run through the elevation helper.
    pub fn is_privileged(&self) -> bool {
        matches!(self, ClientCommand::Up | ClientCommand::Down)
    }
}

impl fmt::Display for ClientCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.args().join(" "))
    }
}

#[async_trait]
pub trait NetworkClient: Send + Sync {
    /// Fetch and decode the full status document.
    async fn status(&self) -> Result<Snapshot, FetchError>;

    /// Query whether the client currently uses the tailnet DNS settings.
    async fn dns_status(&self) -> Result<ToggleState, FetchError>;

    /// Execute one mutating command and wait for it to exit.
    async fn run(&self, command: ClientCommand) -> Result<(), CommandError>;
}
