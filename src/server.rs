use axum::{
    extract::{DefaultBodyLimit, Request},
    middleware,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower::ServiceBuilder;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::{error, info, info_span};
use uuid::Uuid;

use crate::api::{dispatch, fallback, ResponseEnvelope};
use crate::audit::{AuditService, AuditSink};
use crate::auth::{authenticate, Authenticator};
use crate::command::CommandExecutor;
use crate::config::Config;
use crate::error::{HostBoxError, Result};
use crate::session::SessionRegistry;

/// Process-wide state shared by every request. Read-only after startup apart
/// from the audit sink, which serializes its own writers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub audit: AuditService,
    pub executor: CommandExecutor,
    pub sessions: Arc<dyn SessionRegistry>,
    pub authenticator: Arc<Authenticator>,
    pub cancel: CancellationToken,
}

impl AppState {
    pub fn new(
        config: Config,
        audit_sink: Arc<dyn AuditSink>,
        sessions: Arc<dyn SessionRegistry>,
    ) -> Result<Self> {
        let cancel = CancellationToken::new();
        let executor = CommandExecutor::new(&config.command.console_encoding, cancel.clone())?
            .with_default_timeout(Duration::from_millis(config.command.default_timeout_ms));

        Ok(Self {
            audit: AuditService::new(audit_sink, config.audit.verbose),
            authenticator: Arc::new(Authenticator::from_config(&config.auth)),
            executor,
            sessions,
            cancel,
            config: Arc::new(config),
        })
    }
}

pub struct Server {
    state: AppState,
    app: Router,
}

impl Server {
    pub fn new(state: AppState) -> Self {
        let app = create_app(state.clone());
        Self { state, app }
    }

    /// Token that stops the listener and running commands when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.state.cancel.clone()
    }

    pub async fn run(self) -> Result<()> {
        let server = &self.state.config.server;
        let addr = format!("{}:{}", server.host, server.port);

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| HostBoxError::config(format!("Failed to bind {addr}: {e}")))?;
        info!("HostBox {} listening on {}", env!("CARGO_PKG_VERSION"), addr);

        let cancel = self.state.cancel.clone();
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal(cancel))
            .await?;

        info!("HostBox stopped");
        Ok(())
    }
}

pub fn create_app(state: AppState) -> Router {
    let router = Router::new()
        .route("/:action", any(dispatch))
        .fallback(fallback)
        .layer(middleware::from_fn_with_state(
            state.authenticator.clone(),
            authenticate,
        ))
        .layer(DefaultBodyLimit::disable())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
                    info_span!(
                        "request",
                        id = %Uuid::new_v4(),
                        method = %request.method(),
                        uri = %request.uri(),
                    )
                }))
                .layer(CatchPanicLayer::custom(panic_envelope)),
        );

    let router = match state.config.server.max_concurrent_requests {
        Some(limit) => router.layer(GlobalConcurrencyLimitLayer::new(limit)),
        None => router,
    };

    router.with_state(state)
}

/// Resolves on Ctrl-C or when the token is cancelled elsewhere; either way the
/// token ends up cancelled so running commands are killed.
async fn shutdown_signal(cancel: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            match result {
                Ok(()) => info!("Shutdown signal received"),
                Err(e) => error!("Failed to listen for shutdown signal: {}", e),
            }
            cancel.cancel();
        }
        _ = cancel.cancelled() => info!("Shutdown requested"),
    }
}

fn panic_envelope(panic: Box<dyn Any + Send + 'static>) -> Response {
    let envelope = ResponseEnvelope::from_panic(panic);
    error!("Request panicked outside a handler: {}", envelope.additional_information);
    envelope.into_response()
}
