use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::Response,
};
use chrono::Local;
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

use super::dispatcher::{Action, ActionRequest};
use super::envelope::{Reply, ResponseEnvelope};
use crate::command::RemoteCommand;
use crate::error::{HostBoxError, Result};
use crate::filesystem::{self, DescribeOptions, FilesystemObject, ObjectType};
use crate::server::AppState;
use crate::session;

pub fn version_string() -> String {
    format!("HostBox v{}", env!("CARGO_PKG_VERSION"))
}

pub fn host_name() -> String {
    sysinfo::System::host_name().unwrap_or_else(|| "localhost".to_string())
}

/// Run blocking filesystem work off the async workers.
async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| HostBoxError::internal(format!("Blocking task failed: {e}")))?
}

pub async fn handle(
    action: Action,
    state: &AppState,
    request: &mut ActionRequest,
    body: Body,
) -> Result<Reply> {
    let envelope = match action {
        Action::Check => check(),
        Action::Permissions => permissions(request),
        Action::Version => ResponseEnvelope::success("Service version extracted", version_string()),
        Action::IsoTime => ResponseEnvelope::success(
            "Server time extracted",
            Local::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
        ),
        Action::HostName | Action::ServerName => ResponseEnvelope::success(host_name(), ""),
        Action::PathInfo => path_info(request).await?,
        Action::List => list(request).await?,
        Action::RootList => {
            let roots = blocking(|| Ok(filesystem::root_objects())).await?;
            ResponseEnvelope::success_json("Object list extracted", &roots)
        }
        Action::ListDisks => {
            let disks = blocking(|| Ok(filesystem::local_disks())).await?;
            ResponseEnvelope::success_json("Disks info extracted", &disks)
        }
        Action::GetFile => return get_file(request).await,
        Action::Logon => {
            let sessions = session::list_sessions(state.sessions.as_ref()).await?;
            ResponseEnvelope::success_json("Active sessions list extracted", &sessions)
        }
        Action::Reboot => reboot(state)?,
        Action::Mkdir => mkdir(request).await?,
        Action::Upload => upload(request, body).await?,
        Action::Copy => copy(state, request).await?,
        Action::Move => move_object(request).await?,
        Action::Remove => remove(state, request).await?,
        Action::RemoteCmd => remote_cmd(state, request, body).await?,
        Action::KickUser => kick_user(state, request).await?,
    };
    Ok(envelope.into())
}

fn check() -> ResponseEnvelope {
    ResponseEnvelope::success("Access granted", format!("{} ({})", version_string(), host_name()))
}

/// Only reached by callers holding at least one role.
fn permissions(request: &ActionRequest) -> ResponseEnvelope {
    if request.caller.is_admin() {
        ResponseEnvelope::success("HostBox Admin", "admin")
    } else {
        ResponseEnvelope::success("HostBox", "user")
    }
}

async fn path_info(request: &ActionRequest) -> Result<ResponseEnvelope> {
    let path = request.params.require("path", "Undefined path")?.to_string();
    let compute_hash = request.params.flag("calchash")?;

    let object = blocking(move || Ok(FilesystemObject::describe(&path, compute_hash))).await?;
    Ok(ResponseEnvelope::success_json("Path info extracted", &object))
}

async fn list(request: &ActionRequest) -> Result<ResponseEnvelope> {
    let path = request.params.require("path", "Undefined path")?.to_string();
    let options = DescribeOptions {
        compute_hash: request.params.flag("calchash")?,
        dir_size: !request.params.flag("nodirsize")?,
    };

    let objects = blocking(move || filesystem::list_directory(&path, options)).await?;
    Ok(ResponseEnvelope::success_json("Object list extracted", &objects))
}

async fn get_file(request: &ActionRequest) -> Result<Reply> {
    let path = request.params.require("path", "Undefined path")?.to_string();

    let object = {
        let path = path.clone();
        blocking(move || Ok(FilesystemObject::describe_file(&path, false))).await?
    };
    if object.object_type != ObjectType::File {
        return Err(HostBoxError::not_found(format!("Object not found: {path}")));
    }

    let file = tokio::fs::File::open(&object.full_path)
        .await
        .map_err(|e| HostBoxError::at(&object.full_path, e))?;

    let disposition = format!(
        "attachment; filename=\"{}\"",
        object.name.replace('"', "\\\"")
    );
    let disposition = HeaderValue::from_bytes(disposition.as_bytes())
        .map_err(|e| HostBoxError::internal(format!("Invalid file name header: {e}")))?;

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, object.size)
        .header("Content-Description", "File Transfer")
        .header(header::CACHE_CONTROL, "no-cache, must-revalidate")
        .header(header::EXPIRES, "0")
        .header(header::CONTENT_DISPOSITION, disposition)
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|e| HostBoxError::internal(format!("Failed to build file response: {e}")))?;

    info!("Sending {} ({} bytes)", object.full_path.display(), object.size);
    Ok(Reply::Raw(response))
}

fn reboot(state: &AppState) -> Result<ResponseEnvelope> {
    let argv = &state.config.host.reboot_command;
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| HostBoxError::config("Reboot command cannot be empty"))?;

    warn!("Host reboot requested: {:?}", argv);
    // Not awaited: the host is expected to go down underneath us.
    tokio::process::Command::new(program)
        .args(args)
        .spawn()
        .map_err(|e| HostBoxError::command(format!("Failed to start {program}: {e}")))?;

    Ok(ResponseEnvelope::success("Reboot initiated", ""))
}

async fn mkdir(request: &ActionRequest) -> Result<ResponseEnvelope> {
    let path = request.params.require("path", "Undefined path")?.to_string();

    let object = blocking(move || {
        std::fs::create_dir_all(&path).map_err(|e| HostBoxError::at(&path, e))?;
        Ok(FilesystemObject::describe_dir(&path, true))
    })
    .await?;
    Ok(ResponseEnvelope::success_json("Directory created", &object))
}

async fn upload(request: &ActionRequest, body: Body) -> Result<ResponseEnvelope> {
    let path = request
        .params
        .require("path", "Undefined destination path")?
        .to_string();

    let mut file = tokio::fs::File::create(&path)
        .await
        .map_err(|e| HostBoxError::at(&path, e))?;

    let mut stream = body.into_data_stream();
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| HostBoxError::internal(format!("Upload interrupted: {e}")))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| HostBoxError::at(&path, e))?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(|e| HostBoxError::at(&path, e))?;
    drop(file);

    info!("Accepted {} bytes into {}", written, path);
    let object = blocking(move || Ok(FilesystemObject::describe_file(&path, false))).await?;
    Ok(ResponseEnvelope::success_json("File accepted", &object))
}

async fn copy(state: &AppState, request: &ActionRequest) -> Result<ResponseEnvelope> {
    let src = request.params.require("src", "Undefined source path")?.to_string();
    let dest = request.params.require("dest", "Undefined destination path")?.to_string();
    let overwrite = request.params.flag("overwrite")?;
    let cancel = state.cancel.clone();

    let detail = format!("Source path: {src}\nDestination path: {dest}");
    blocking(move || {
        let object = FilesystemObject::describe_with(&src, DescribeOptions::default());
        object.copy_to(&dest, overwrite, &cancel)
    })
    .await?;

    info!("{}", detail.replace('\n', ", "));
    Ok(ResponseEnvelope::success("Object copied", detail))
}

async fn move_object(request: &ActionRequest) -> Result<ResponseEnvelope> {
    let src = request.params.require("src", "Undefined source path")?.to_string();
    let dest = request.params.require("dest", "Undefined destination path")?.to_string();

    let object = blocking(move || {
        let mut object = FilesystemObject::describe_with(&src, DescribeOptions::default());
        object.move_to(&dest)?;
        Ok(object)
    })
    .await?;
    Ok(ResponseEnvelope::success_json("Object moved", &object))
}

async fn remove(state: &AppState, request: &ActionRequest) -> Result<ResponseEnvelope> {
    let path = request.params.require("path", "Undefined path")?.to_string();
    let cancel = state.cancel.clone();

    let (path, removed_type) = blocking(move || {
        let mut object = FilesystemObject::describe_with(&path, DescribeOptions::default());
        if !object.exists() {
            return Err(HostBoxError::not_found(format!("Object not found: {path}")));
        }
        let removed_type = object.object_type;
        object.remove(&cancel)?;
        Ok((path, removed_type))
    })
    .await?;

    info!("Removed {:?} {}", removed_type, path);
    Ok(ResponseEnvelope::success(
        "Object removed",
        format!("Path: {path}\nObject type: {removed_type:?}"),
    ))
}

async fn remote_cmd(
    state: &AppState,
    request: &mut ActionRequest,
    body: Body,
) -> Result<ResponseEnvelope> {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|e| HostBoxError::internal(format!("Failed to read request body: {e}")))?;
    let text = String::from_utf8_lossy(&bytes).into_owned();
    request.body_text = Some(text.clone());

    let command: RemoteCommand = serde_json::from_str(&text)
        .ok()
        .filter(|c: &RemoteCommand| !c.command.trim().is_empty())
        .ok_or_else(|| HostBoxError::invalid("Command has not been received"))?;

    let result = state.executor.execute(&command).await?;
    Ok(ResponseEnvelope::success_json("Command executed", &result))
}

async fn kick_user(state: &AppState, request: &ActionRequest) -> Result<ResponseEnvelope> {
    let username = request.params.get("username").unwrap_or_default();

    let last = session::kick(state.sessions.as_ref(), username).await?;
    Ok(ResponseEnvelope::success_json(
        format!("User {} logoff success", last.user_name),
        &last,
    ))
}
