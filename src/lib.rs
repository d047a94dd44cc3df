pub mod api;
pub mod audit;
pub mod auth;
pub mod command;
pub mod config;
pub mod error;
pub mod filesystem;
pub mod server;
pub mod session;

pub use api::{Reply, ResponseEnvelope};
pub use audit::{AuditRecord, AuditService, AuditSink, FileAuditSink, MemoryAuditSink};
pub use auth::{Authenticator, Caller, Capabilities};
pub use command::{CommandExecutor, RemoteCommand, RemoteCommandResult};
pub use config::Config;
pub use error::{HostBoxError, Result};
pub use filesystem::{FilesystemObject, ObjectType};
pub use server::{create_app, AppState, Server};
pub use session::{LogonSessionInfo, SessionRegistry, SystemSessionRegistry};
