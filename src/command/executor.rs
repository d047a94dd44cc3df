use encoding_rs::Encoding;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{RemoteCommand, RemoteCommandResult, DEFAULT_WAIT_TIMEOUT_MS};
use crate::error::{HostBoxError, Result};

/// Runs shell command lines on the host with a wall-clock limit.
///
/// The command text is handed to the shell as-is. Only admin callers can
/// reach this, so nothing is escaped here.
#[derive(Clone)]
pub struct CommandExecutor {
    encoding: &'static Encoding,
    default_timeout: Duration,
    cancel: CancellationToken,
}

enum Outcome {
    Exited(std::process::ExitStatus),
    TimedOut,
    Cancelled,
}

impl CommandExecutor {
    /// `encoding_label` names the console code page child output is decoded
    /// with (for example `ibm866` or `utf-8`).
    pub fn new(encoding_label: &str, cancel: CancellationToken) -> Result<Self> {
        let encoding = Encoding::for_label(encoding_label.as_bytes()).ok_or_else(|| {
            HostBoxError::config(format!("Unknown console encoding: {encoding_label}"))
        })?;
        Ok(Self {
            encoding,
            default_timeout: Duration::from_millis(DEFAULT_WAIT_TIMEOUT_MS),
            cancel,
        })
    }

    /// Limit used for requests that do not carry their own `waitTimeout`.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn encoding_name(&self) -> &'static str {
        self.encoding.name()
    }

    /// Join the command and its optional arguments into one command line.
    pub fn command_line(command: &str, args: Option<&str>) -> String {
        match args.filter(|a| !a.is_empty()) {
            Some(args) => format!("{command} {args}"),
            None => command.to_string(),
        }
    }

    pub async fn execute(&self, request: &RemoteCommand) -> Result<RemoteCommandResult> {
        if !request.label.is_empty() {
            info!("Running remote command '{}'", request.label);
        }
        let timeout = request.wait_timeout_or(self.default_timeout);
        self.run(&request.command, request.args.as_deref(), timeout)
            .await
    }

    /// Run `command` (plus `args`) through the shell and collect its output.
    ///
    /// On timeout or cancellation the whole process group is killed and no
    /// partial output is returned.
    pub async fn run(
        &self,
        command: &str,
        args: Option<&str>,
        timeout: Duration,
    ) -> Result<RemoteCommandResult> {
        if command.trim().is_empty() {
            return Err(HostBoxError::invalid("Command has not been received"));
        }

        let line = Self::command_line(command, args);
        let deadline = Instant::now() + timeout;

        let mut child = shell(&line)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| HostBoxError::command(format!("Failed to spawn shell: {e}")))?;

        debug!("Spawned pid {:?} for: {}", child.id(), line);

        let stdout = child.stdout.take().map(collect);
        let stderr = child.stderr.take().map(collect);

        let outcome = tokio::select! {
            status = child.wait() => Outcome::Exited(status?),
            _ = tokio::time::sleep_until(deadline) => Outcome::TimedOut,
            _ = self.cancel.cancelled() => Outcome::Cancelled,
        };

        let status = match outcome {
            Outcome::Exited(status) => status,
            Outcome::TimedOut => {
                warn!("Command exceeded {} ms, killing: {}", timeout.as_millis(), line);
                terminate(&mut child, [stdout, stderr]).await;
                return Err(HostBoxError::Timeout(timeout));
            }
            Outcome::Cancelled => {
                warn!("Command cancelled by shutdown: {}", line);
                terminate(&mut child, [stdout, stderr]).await;
                return Err(HostBoxError::Cancelled);
            }
        };

        // Background children may keep the pipes open after the shell exits.
        let output = tokio::time::timeout_at(deadline, async {
            let stdout = join_output(stdout).await?;
            let stderr = join_output(stderr).await?;
            Ok::<_, HostBoxError>((stdout, stderr))
        })
        .await;

        let (stdout, stderr) = match output {
            Ok(output) => output?,
            Err(_) => {
                warn!("Output of '{}' still open at deadline", line);
                terminate(&mut child, [None, None]).await;
                return Err(HostBoxError::Timeout(timeout));
            }
        };

        Ok(RemoteCommandResult {
            stdout: self.decode(&stdout),
            stderr: self.decode(&stderr),
            return_code: status.code().unwrap_or(-1),
        })
    }

    fn decode(&self, bytes: &[u8]) -> String {
        let (text, _, _) = self.encoding.decode(bytes);
        text.into_owned()
    }
}

#[cfg(unix)]
fn shell(line: &str) -> Command {
    let mut command = Command::new("sh");
    command.arg("-c").arg(line).process_group(0);
    command
}

#[cfg(windows)]
fn shell(line: &str) -> Command {
    let mut command = Command::new("cmd.exe");
    command.raw_arg(format!("/C \"{line}\""));
    command
}

fn collect<R>(mut reader: R) -> JoinHandle<std::io::Result<Vec<u8>>>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buffer = Vec::new();
        reader.read_to_end(&mut buffer).await?;
        Ok(buffer)
    })
}

async fn join_output(handle: Option<JoinHandle<std::io::Result<Vec<u8>>>>) -> Result<Vec<u8>> {
    match handle {
        Some(handle) => handle
            .await
            .map_err(|e| HostBoxError::internal(format!("Output reader failed: {e}")))?
            .map_err(HostBoxError::from),
        None => Ok(Vec::new()),
    }
}

/// Kill the child and everything it started, then reap it.
async fn terminate(child: &mut Child, readers: [Option<JoinHandle<std::io::Result<Vec<u8>>>>; 2]) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // The shell leads its own process group (see `shell`).
        unsafe {
            libc::killpg(pid as libc::pid_t, libc::SIGKILL);
        }
    }

    #[cfg(windows)]
    if let Some(pid) = child.id() {
        let _ = Command::new("taskkill")
            .args(["/PID", &pid.to_string(), "/T", "/F"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
    }

    if let Err(e) = child.kill().await {
        debug!("Child already gone: {}", e);
    }

    for reader in readers.into_iter().flatten() {
        reader.abort();
    }
}
