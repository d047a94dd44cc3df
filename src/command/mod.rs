//! Remote command execution.
//!
//! `remotecmd` requests carry a JSON [`RemoteCommand`]; the [`CommandExecutor`]
//! runs it through the host shell and answers with a [`RemoteCommandResult`].

pub mod executor;

pub use executor::CommandExecutor;

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 60_000;

/// Command descriptor sent in the `remotecmd` request body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCommand {
    #[serde(default, alias = "CmdLabel")]
    pub label: String,
    #[serde(alias = "CmdObject")]
    pub command: String,
    #[serde(default, alias = "CmdArgs")]
    pub args: Option<String>,
    /// Milliseconds to wait before the process is killed; the executor's
    /// default applies when absent.
    #[serde(default, alias = "CmdWaitTicks")]
    pub wait_timeout: Option<u64>,
}

impl RemoteCommand {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            label: String::new(),
            command: command.into(),
            args: None,
            wait_timeout: None,
        }
    }

    pub fn wait_timeout_or(&self, default: Duration) -> Duration {
        self.wait_timeout.map(Duration::from_millis).unwrap_or(default)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCommandResult {
    pub stdout: String,
    pub stderr: String,
    pub return_code: i32,
}

impl RemoteCommandResult {
    pub fn is_success(&self) -> bool {
        self.return_code == 0
    }
}
