//! `HsmServer` builder and serve loop.
//!
//! This is the entry point for running hsm as a service. It ties the
//! layers together: auth gate → handlers → tenant sessions → session
//! cache → token client.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use hsm_auth::{AuthGate, Authenticator, JwtAuthenticator, require_subject};
use hsm_client::TokenClient;
use hsm_session::SessionCache;
use hsm_tenant::TenantSessions;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::HsmError;
use crate::handler::{self, AppState};

/// Reported by `/health` and `/ready`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Builder for configuring and starting an hsm server.
///
/// Installing an [`Authenticator`] switches the server to multi-tenant
/// mode; without one it serves the single process-wide account.
///
/// # Example
///
/// ```rust,ignore
/// let server = HsmServer::builder()
///     .bind("0.0.0.0:8080")
///     .authenticator(JwtAuthenticator::new(keys))
///     .public_paths(["/download"])
///     .build(cache)
///     .await?;
/// server.run(shutdown_signal()).await
/// ```
pub struct HsmServerBuilder<A = JwtAuthenticator> {
    bind_addr: String,
    public_paths: Vec<String>,
    authenticator: Option<A>,
}

impl HsmServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            public_paths: Vec::new(),
            authenticator: None,
        }
    }
}

impl Default for HsmServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Authenticator> HsmServerBuilder<A> {
    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = addr.into();
        self
    }

    /// Paths served without a token in multi-tenant mode. `/health` and
    /// `/ready` are always public.
    pub fn public_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.public_paths.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Enables multi-tenant mode.
    pub fn authenticator<B: Authenticator>(self, authenticator: B) -> HsmServerBuilder<B> {
        HsmServerBuilder {
            bind_addr: self.bind_addr,
            public_paths: self.public_paths,
            authenticator: Some(authenticator),
        }
    }

    pub fn is_multi_tenant(&self) -> bool {
        self.authenticator.is_some()
    }

    /// The full application router, without binding anything.
    pub fn into_router<C: TokenClient>(self, cache: Arc<SessionCache<C>>) -> Router {
        let tenants = self
            .authenticator
            .is_some()
            .then(|| TenantSessions::new(Arc::clone(&cache)));
        let state = Arc::new(AppState {
            cache,
            tenants,
            version: VERSION,
        });

        let mut sessions = Router::new()
            .route(
                "/session",
                post(handler::create_session::<C>)
                    .get(handler::get_session::<C>)
                    .delete(handler::delete_session::<C>),
            )
            .route("/session/env", post(handler::create_session_env::<C>))
            .route("/session/refresh", post(handler::refresh_session::<C>))
            .route("/download", get(handler::download_url::<C>));

        if let Some(authenticator) = self.authenticator {
            let gate = Arc::new(AuthGate::new(authenticator).with_public_paths(self.public_paths));
            sessions = sessions.route_layer(middleware::from_fn_with_state(gate, require_subject::<A>));
        }

        let probes = Router::new()
            .route("/health", get(handler::health::<C>))
            .route("/ready", get(handler::ready::<C>));

        probes
            .merge(sessions)
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Binds the listener and assembles the router.
    pub async fn build<C: TokenClient>(
        self,
        cache: Arc<SessionCache<C>>,
    ) -> Result<HsmServer, HsmError> {
        let listener = TcpListener::bind(&self.bind_addr).await?;
        let multi_tenant = self.is_multi_tenant();
        let router = self.into_router(cache);

        Ok(HsmServer {
            listener,
            router,
            multi_tenant,
        })
    }
}

/// A bound hsm server.
///
/// Call [`run()`](Self::run) to start serving.
pub struct HsmServer {
    listener: TcpListener,
    router: Router,
    multi_tenant: bool,
}

impl HsmServer {
    /// Creates a new builder.
    pub fn builder() -> HsmServerBuilder {
        HsmServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn is_multi_tenant(&self) -> bool {
        self.multi_tenant
    }

    /// Serves until `shutdown` resolves, then stops accepting and lets
    /// in-flight requests finish.
    ///
    /// Stopping the session cache's refresh task is the caller's job, after
    /// this returns.
    pub async fn run<F>(self, shutdown: F) -> Result<(), HsmError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::info!(
            addr = ?self.listener.local_addr().ok(),
            multi_tenant = self.multi_tenant,
            "hsm server running"
        );

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("hsm server stopped");
        Ok(())
    }
}
