use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{LogonSessionInfo, SessionRegistry};
use crate::error::{HostBoxError, Result};

/// Session registry backed by the host's own tooling: `loginctl` on Unix,
/// `query session` and `logoff` on Windows.
#[derive(Debug, Clone, Default)]
pub struct SystemSessionRegistry;

impl SystemSessionRegistry {
    pub fn new() -> Self {
        Self
    }
}

async fn run_tool(program: &str, args: &[&str]) -> Result<String> {
    debug!("Running {} {:?}", program, args);
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|e| HostBoxError::session(format!("Failed to run {program}: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(HostBoxError::session(format!(
            "{program} exited with {}: {}",
            output.status.code().unwrap_or(-1),
            stderr.trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(unix)]
#[async_trait]
impl SessionRegistry for SystemSessionRegistry {
    async fn sessions(&self) -> Result<Vec<LogonSessionInfo>> {
        let listing = run_tool("loginctl", &["list-sessions", "--no-legend", "--no-pager"]).await?;

        let mut sessions = Vec::new();
        for id in parse_loginctl_ids(&listing) {
            let properties = run_tool(
                "loginctl",
                &[
                    "show-session",
                    &id,
                    "--no-pager",
                    "-p",
                    "Name",
                    "-p",
                    "RemoteHost",
                    "-p",
                    "State",
                    "-p",
                    "TTY",
                    "-p",
                    "Seat",
                ],
            )
            .await;

            // Sessions can close between the two calls.
            match properties {
                Ok(properties) => sessions.push(parse_loginctl_session(&id, &properties)),
                Err(e) => debug!("Session {} vanished: {}", id, e),
            }
        }
        Ok(sessions)
    }

    async fn logoff(&self, session_id: &str) -> Result<()> {
        run_tool("loginctl", &["terminate-session", session_id]).await?;
        Ok(())
    }
}

#[cfg(windows)]
#[async_trait]
impl SessionRegistry for SystemSessionRegistry {
    async fn sessions(&self) -> Result<Vec<LogonSessionInfo>> {
        let table = run_tool("query", &["session"]).await?;
        Ok(parse_query_session(&table))
    }

    async fn logoff(&self, session_id: &str) -> Result<()> {
        run_tool("logoff", &[session_id]).await?;
        Ok(())
    }
}

/// Session ids from `loginctl list-sessions --no-legend`.
pub fn parse_loginctl_ids(listing: &str) -> Vec<String> {
    listing
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

/// Build a session from `loginctl show-session` `Key=Value` output.
pub fn parse_loginctl_session(id: &str, properties: &str) -> LogonSessionInfo {
    let mut session = LogonSessionInfo {
        session_id: id.to_string(),
        user_name: String::new(),
        client_name: String::new(),
        client_ip: None,
        connection_state: String::new(),
    };
    let mut seat = String::new();

    for line in properties.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim();
        match key {
            "Name" => session.user_name = value.to_string(),
            "RemoteHost" if !value.is_empty() => session.client_ip = Some(value.to_string()),
            "State" => session.connection_state = value.to_string(),
            "TTY" => session.client_name = value.to_string(),
            "Seat" => seat = value.to_string(),
            _ => {}
        }
    }

    if session.client_name.is_empty() {
        session.client_name = seat;
    }
    session
}

/// Parse the fixed-width table printed by `query session`.
///
/// Column starts come from the header; the id is right-aligned and may spill
/// left into the user name column, so the tail of each row is tokenized.
pub fn parse_query_session(table: &str) -> Vec<LogonSessionInfo> {
    let mut lines = table.lines();
    let Some(header) = lines.next() else {
        return Vec::new();
    };
    let header: Vec<char> = header.chars().collect();
    let header_text: String = header.iter().collect();
    let Some(user_col) = header_text
        .find("USERNAME")
        .map(|byte| header_text[..byte].chars().count())
    else {
        return Vec::new();
    };

    let mut sessions = Vec::new();
    for line in lines {
        let chars: Vec<char> = line.chars().collect();
        if chars.len() <= user_col {
            continue;
        }

        // First column holds the '>' marker for the current session.
        let session_name: String = chars[1.min(chars.len())..user_col].iter().collect();
        let rest: String = chars[user_col..].iter().collect();
        let tokens: Vec<&str> = rest.split_whitespace().collect();

        let Some(id_index) = tokens
            .iter()
            .position(|t| t.chars().all(|c| c.is_ascii_digit()))
        else {
            continue;
        };

        sessions.push(LogonSessionInfo {
            session_id: tokens[id_index].to_string(),
            user_name: tokens[..id_index].join(" "),
            client_name: session_name.trim().to_string(),
            client_ip: None,
            connection_state: tokens.get(id_index + 1).unwrap_or(&"").to_string(),
        });
    }
    sessions
}
