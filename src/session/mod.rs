//! Interactive logon sessions on the host.

pub mod system;

pub use system::SystemSessionRegistry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{HostBoxError, Result};

/// One row of the host session table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogonSessionInfo {
    pub session_id: String,
    pub user_name: String,
    pub client_name: String,
    pub client_ip: Option<String>,
    pub connection_state: String,
}

/// Source of session information and forced logoff.
#[async_trait]
pub trait SessionRegistry: Send + Sync {
    /// Every session currently known to the host, including ones without a user.
    async fn sessions(&self) -> Result<Vec<LogonSessionInfo>>;

    /// Force the session to log off and wait until the host reports completion.
    async fn logoff(&self, session_id: &str) -> Result<()>;
}

/// Active sessions that have a user name.
pub async fn list_sessions(registry: &dyn SessionRegistry) -> Result<Vec<LogonSessionInfo>> {
    let sessions = registry.sessions().await?;
    Ok(sessions
        .into_iter()
        .filter(|session| !session.user_name.is_empty())
        .collect())
}

/// Log off every session owned by `username` and return the last one logged
/// off. A failed logoff does not stop the walk; the error surfaces only when
/// no matching session could be logged off at all.
pub async fn kick(registry: &dyn SessionRegistry, username: &str) -> Result<LogonSessionInfo> {
    if username.is_empty() {
        return Err(HostBoxError::invalid("Undefined username"));
    }

    let mut last = None;
    let mut failure = None;
    for session in registry.sessions().await? {
        if session.user_name != username {
            continue;
        }
        info!("Logging off session {} of {}", session.session_id, username);
        match registry.logoff(&session.session_id).await {
            Ok(()) => last = Some(session),
            Err(e) => {
                warn!("Logoff of session {} failed: {}", session.session_id, e);
                failure = Some(e);
            }
        }
    }

    match (last, failure) {
        (Some(session), _) => Ok(session),
        (None, Some(e)) => Err(e),
        (None, None) => Err(HostBoxError::not_found(format!(
            "Active session has not been found ( {username} )"
        ))),
    }
}
