use super::{ClientCommand, CommandError, FetchError, NetworkClient};
use crate::types::{parse_dns_status, Snapshot, ToggleState};
use async_trait::async_trait;
use log::debug;
use std::process::{Output, Stdio};
use tokio::process::Command;

/// [`NetworkClient`] backed by the `tailscale` binary.
pub struct CliClient {
    cli_path: String,
    elevate_path: String,
}

impl CliClient {
    pub fn new(cli_path: impl Into<String>, elevate_path: impl Into<String>) -> Self {
        Self {
            cli_path: cli_path.into(),
            elevate_path: elevate_path.into(),
        }
    }

    async fn query(&self, args: &[&str]) -> Result<Output, FetchError> {
        debug!("Running {} {}", self.cli_path, args.join(" "));
        let output = Command::new(&self.cli_path)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| FetchError::Spawn {
                program: self.cli_path.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(FetchError::Exit {
                program: self.cli_path.clone(),
                status: output.status,
                output: combined_output(&output),
            });
        }
        Ok(output)
    }
}

#[async_trait]
impl NetworkClient for CliClient {
    async fn status(&self) -> Result<Snapshot, FetchError> {
        let output = self.query(&["status", "--json"]).await?;
        Ok(Snapshot::from_json(&output.stdout)?)
    }

    async fn dns_status(&self) -> Result<ToggleState, FetchError> {
        let output = self.query(&["dns", "status"]).await?;
        Ok(parse_dns_status(&combined_output(&output)))
    }

    async fn run(&self, command: ClientCommand) -> Result<(), CommandError> {
        let mut cmd = if command.is_privileged() {
            let mut cmd = Command::new(&self.elevate_path);
            cmd.arg(&self.cli_path);
            cmd
        } else {
            Command::new(&self.cli_path)
        };
        let program = if command.is_privileged() {
            &self.elevate_path
        } else {
            &self.cli_path
        };

        debug!("Running {} {}", program, command);
        let output = cmd
            .args(command.args())
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| CommandError::Spawn {
                program: program.clone(),
                source,
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(CommandError::Failed {
                output: combined_output(&output),
            })
        }
    }
}

fn combined_output(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    text
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_status_nonzero_exit() {
        let client = CliClient::new("false", "true");
        let err = client.status().await.unwrap_err();
        assert!(matches!(err, FetchError::Exit { .. }), "{err}");
    }

    #[tokio::test]
    async fn test_status_malformed_output() {
        // `echo status --json` succeeds but prints something that is not JSON
        let client = CliClient::new("echo", "true");
        let err = client.status().await.unwrap_err();
        assert!(matches!(err, FetchError::Parse(_)), "{err}");
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let client = CliClient::new("/nonexistent/tailscale", "true");
        assert!(matches!(
            client.dns_status().await,
            Err(FetchError::Spawn { .. })
        ));
        assert!(matches!(
            client.run(ClientCommand::AcceptDns(true)).await,
            Err(CommandError::Spawn { .. })
        ));
    }

    #[tokio::test]
    async fn test_dns_status_without_state_line() {
        let client = CliClient::new("echo", "true");
        assert_eq!(client.dns_status().await.unwrap(), ToggleState::Disabled);
    }

    #[tokio::test]
    async fn test_privileged_command_uses_helper() {
        // the helper runs `<cli> up`; with `echo` as helper this always succeeds
        let client = CliClient::new("/nonexistent/tailscale", "echo");
        client.run(ClientCommand::Up).await.unwrap();

        let client = CliClient::new("echo", "false");
        let err = client.run(ClientCommand::Down).await.unwrap_err();
        assert!(matches!(err, CommandError::Failed { .. }));
    }
}
