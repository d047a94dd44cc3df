use axum::{
    body::Body,
    extract::{rejection::PathRejection, Path, Query, State},
    http::Uri,
};
use futures_util::FutureExt;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use tracing::{debug, error, warn};

use super::envelope::{Reply, ResponseEnvelope};
use super::handlers;
use crate::audit::AuditRecord;
use crate::auth::{Caller, Capabilities};
use crate::error::{HostBoxError, Result};
use crate::server::AppState;

pub const LACK_PERMISSIONS: &str = "Lack permissions";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Check,
    Permissions,
    Version,
    IsoTime,
    HostName,
    ServerName,
    PathInfo,
    List,
    RootList,
    ListDisks,
    GetFile,
    Logon,
    Reboot,
    Mkdir,
    Upload,
    Copy,
    Move,
    Remove,
    RemoteCmd,
    KickUser,
}

/// Role an action demands beyond having any role at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Authenticated,
    Admin,
}

impl Action {
    pub const ALL: [Action; 20] = [
        Action::Check,
        Action::Permissions,
        Action::Version,
        Action::IsoTime,
        Action::HostName,
        Action::ServerName,
        Action::PathInfo,
        Action::List,
        Action::RootList,
        Action::ListDisks,
        Action::GetFile,
        Action::Logon,
        Action::Reboot,
        Action::Mkdir,
        Action::Upload,
        Action::Copy,
        Action::Move,
        Action::Remove,
        Action::RemoteCmd,
        Action::KickUser,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Check => "check",
            Action::Permissions => "permissions",
            Action::Version => "version",
            Action::IsoTime => "isotime",
            Action::HostName => "hostname",
            Action::ServerName => "servername",
            Action::PathInfo => "pathinfo",
            Action::List => "list",
            Action::RootList => "rootlist",
            Action::ListDisks => "listdisks",
            Action::GetFile => "getfile",
            Action::Logon => "logon",
            Action::Reboot => "reboot",
            Action::Mkdir => "mkdir",
            Action::Upload => "upload",
            Action::Copy => "copy",
            Action::Move => "move",
            Action::Remove => "remove",
            Action::RemoteCmd => "remotecmd",
            Action::KickUser => "kickuser",
        }
    }

    pub fn requirement(&self) -> Requirement {
        match self {
            Action::RemoteCmd
            | Action::Mkdir
            | Action::Upload
            | Action::Copy
            | Action::Move
            | Action::Remove
            | Action::KickUser => Requirement::Admin,
            _ => Requirement::Authenticated,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = HostBoxError;

    /// Action names are matched exactly; `List` is not `list`.
    fn from_str(name: &str) -> Result<Self> {
        Action::ALL
            .into_iter()
            .find(|action| action.as_str() == name)
            .ok_or_else(|| HostBoxError::invalid(format!("Incorrect method: {name}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    /// The caller holds no role; nothing is dispatched or audited.
    Reject,
    /// The action needs the admin role the caller lacks.
    Denied(Action),
    Allowed(Action),
    /// Any role holder may ask, but the name matches no action.
    Undefined,
}

pub fn authorize(action: &str, capabilities: Capabilities) -> Authorization {
    if !capabilities.any() {
        return Authorization::Reject;
    }
    match action.parse::<Action>() {
        Ok(action) if action.requirement() == Requirement::Admin && !capabilities.admin => {
            Authorization::Denied(action)
        }
        Ok(action) => Authorization::Allowed(action),
        Err(_) => Authorization::Undefined,
    }
}

/// Decoded query string parameters.
#[derive(Debug, Clone, Default)]
pub struct Params(HashMap<String, String>);

impl Params {
    /// Malformed query strings decode to no parameters rather than failing the
    /// request.
    pub fn from_uri(uri: &Uri) -> Self {
        Query::<HashMap<String, String>>::try_from_uri(uri)
            .map(|Query(params)| Self(params))
            .unwrap_or_default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Non-empty value of `name`, or an `InvalidRequest` carrying `message`.
    pub fn require(&self, name: &str, message: &str) -> Result<&str> {
        self.get(name)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| HostBoxError::invalid(message))
    }

    /// Boolean flag; absent means false, otherwise `true`/`false` in any case.
    pub fn flag(&self, name: &str) -> Result<bool> {
        match self.get(name) {
            None => Ok(false),
            Some(value) => parse_bool(value),
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

pub fn parse_bool(value: &str) -> Result<bool> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if value.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(HostBoxError::invalid("String was not recognized as a valid Boolean"))
    }
}

/// Request data shared by every handler. The body travels separately since
/// only `upload` and `remotecmd` consume it.
pub struct ActionRequest {
    pub caller: Caller,
    pub params: Params,
    /// Request body text kept for the verbose audit log. Only handlers that
    /// read the body as text fill it.
    pub body_text: Option<String>,
}

impl ActionRequest {
    pub fn new(caller: Caller, params: Params) -> Self {
        Self {
            caller,
            params,
            body_text: None,
        }
    }
}

/// Entry point for `ANY /:action`.
pub async fn dispatch(
    State(state): State<AppState>,
    action: std::result::Result<Path<String>, PathRejection>,
    caller: Caller,
    uri: Uri,
    body: Body,
) -> Reply {
    let action = match action {
        Ok(Path(action)) => action,
        Err(rejection) => {
            debug!("Unreadable action segment in {}: {}", uri.path(), rejection);
            return undefined_path(&state, caller, &uri).await;
        }
    };

    let authorization = authorize(&action, caller.capabilities);
    if authorization == Authorization::Reject {
        debug!("Caller {} holds no role, rejecting {}", caller.name, action);
        return lack_permissions(&caller);
    }

    let mut request = ActionRequest::new(caller, Params::from_uri(&uri));

    let reply = match authorization {
        Authorization::Allowed(action) => {
            let caller_name = request.caller.name.clone();
            let handled = handlers::handle(action, &state, &mut request, body);
            guarded(action, &caller_name, handled).await
        }
        Authorization::Denied(action) => ResponseEnvelope::exception(
            LACK_PERMISSIONS,
            format!(
                "User: {} (action '{}' requires the administrator role)",
                request.caller.name, action
            ),
        )
        .into(),
        Authorization::Undefined | Authorization::Reject => {
            ResponseEnvelope::exception("Undefined action", format!("Incorrect method: {action}"))
                .into()
        }
    };

    let record = audit_record(&state, &request, &action, uri.query(), &reply);
    state.audit.submit(record).await;
    reply
}

/// Paths that do not name exactly one action segment (`/`, `/a/b`).
pub async fn fallback(State(state): State<AppState>, caller: Caller, uri: Uri) -> Reply {
    undefined_path(&state, caller, &uri).await
}

async fn undefined_path(state: &AppState, caller: Caller, uri: &Uri) -> Reply {
    if !caller.capabilities.any() {
        return lack_permissions(&caller);
    }

    let path = uri.path();
    let reply: Reply =
        ResponseEnvelope::exception("Undefined action", format!("Incorrect method: {path}")).into();
    let request = ActionRequest::new(caller, Params::from_uri(uri));
    let record = audit_record(state, &request, path.trim_start_matches('/'), uri.query(), &reply);
    state.audit.submit(record).await;
    reply
}

fn lack_permissions(caller: &Caller) -> Reply {
    ResponseEnvelope::exception(LACK_PERMISSIONS, format!("User: {}", caller.name)).into()
}

/// Drive a handler to completion, turning its error or panic into an
/// exception envelope so the outcome can still be audited.
async fn guarded<F>(action: Action, caller: &str, handled: F) -> Reply
where
    F: Future<Output = Result<Reply>>,
{
    match AssertUnwindSafe(handled).catch_unwind().await {
        Ok(Ok(reply)) => reply,
        Ok(Err(err)) => {
            warn!("{} failed for {}: {}", action, caller, err);
            ResponseEnvelope::from_error(&err).into()
        }
        Err(panic) => {
            let envelope = ResponseEnvelope::from_panic(panic);
            error!("{} panicked for {}: {}", action, caller, envelope.additional_information);
            envelope.into()
        }
    }
}

fn audit_record(
    state: &AppState,
    request: &ActionRequest,
    action: &str,
    query: Option<&str>,
    reply: &Reply,
) -> AuditRecord {
    let verbose = state.audit.verbose();
    let description = match reply.envelope() {
        Some(envelope) if verbose => serde_json::to_string(envelope)
            .unwrap_or_else(|_| format!("State = {}", envelope.state)),
        _ => format!("State = {}", reply.state_label()),
    };
    let body = if verbose { request.body_text.clone() } else { None };

    AuditRecord::new(description, &request.caller.name)
        .with_request(action, query)
        .with_body(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_names_round_trip() {
        for action in Action::ALL {
            assert_eq!(action.as_str().parse::<Action>().unwrap(), action);
        }
        assert!("List".parse::<Action>().is_err());
        assert!("".parse::<Action>().is_err());
    }

    #[test]
    fn test_admin_table() {
        let admin_only: Vec<&str> = Action::ALL
            .iter()
            .filter(|a| a.requirement() == Requirement::Admin)
            .map(|a| a.as_str())
            .collect();
        assert_eq!(
            admin_only,
            vec!["mkdir", "upload", "copy", "move", "remove", "remotecmd", "kickuser"]
        );
        assert_eq!(Action::Reboot.requirement(), Requirement::Authenticated);
    }

    #[test]
    fn test_authorize_without_roles_rejects_everything() {
        assert_eq!(authorize("check", Capabilities::none()), Authorization::Reject);
        assert_eq!(authorize("bogus", Capabilities::none()), Authorization::Reject);
    }

    #[test]
    fn test_authorize_user_role() {
        let user = Capabilities::user();
        assert_eq!(authorize("list", user), Authorization::Allowed(Action::List));
        assert_eq!(authorize("reboot", user), Authorization::Allowed(Action::Reboot));
        assert_eq!(authorize("remove", user), Authorization::Denied(Action::Remove));
        assert_eq!(authorize("bogus", user), Authorization::Undefined);
    }

    #[test]
    fn test_authorize_admin_role() {
        let admin = Capabilities::admin();
        for action in Action::ALL {
            assert_eq!(authorize(action.as_str(), admin), Authorization::Allowed(action));
        }
    }

    #[test]
    fn test_params_from_uri_decodes_values() {
        let uri: Uri = "/list?path=C%3A%5Cdata&calchash=TRUE&nodirsize=false"
            .parse()
            .unwrap();
        let params = Params::from_uri(&uri);

        assert_eq!(params.get("path"), Some("C:\\data"));
        assert!(params.flag("calchash").unwrap());
        assert!(!params.flag("nodirsize").unwrap());
        assert!(!params.flag("overwrite").unwrap());
    }

    #[test]
    fn test_flag_rejects_non_boolean_text() {
        let params: Params = [("overwrite", "yes"), ("calchash", "")].into_iter().collect();
        for name in ["overwrite", "calchash"] {
            let err = params.flag(name).unwrap_err();
            assert_eq!(err.to_string(), "String was not recognized as a valid Boolean");
        }
    }

    #[test]
    fn test_require_rejects_missing_and_empty() {
        let params: Params = [("path", "")].into_iter().collect();
        let err = params.require("path", "Undefined destination path").unwrap_err();
        assert_eq!(err.to_string(), "Undefined destination path");
        assert!(params.require("src", "Undefined source path").is_err());
    }

    #[tokio::test]
    async fn test_guarded_turns_handler_panic_into_exception() {
        let reply = guarded(Action::List, "alice", async {
            if Action::List.requirement() == Requirement::Authenticated {
                panic!("listing exploded");
            }
            Ok(ResponseEnvelope::success("unreachable", "").into())
        })
        .await;

        let envelope = reply.envelope().unwrap();
        assert!(!envelope.is_success());
        assert_eq!(envelope.message, "Internal error");
        assert_eq!(envelope.additional_information, "Panic: listing exploded");
    }

    #[tokio::test]
    async fn test_guarded_turns_handler_error_into_exception() {
        let reply = guarded(Action::Remove, "alice", async {
            Err(HostBoxError::not_found("Object not found: /gone"))
        })
        .await;

        let envelope = reply.envelope().unwrap();
        assert_eq!(envelope.message, "Object not found: /gone");
    }
}
