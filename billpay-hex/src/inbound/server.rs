//! HTTP Server configuration and startup.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use billpay_types::{BillingProvider, LedgerRepository, PaymentChannel};

use super::auth::auth_middleware;
use super::handlers::{self, AppState};
use super::rate_limit::{RateLimiterState, rate_limit_middleware};
use crate::WalletService;

/// HTTP Server for the wallet API.
pub struct HttpServer<R, P, C>
where
    R: LedgerRepository,
    P: BillingProvider,
    C: PaymentChannel,
{
    state: Arc<AppState<R, P, C>>,
    rate_limiter: Arc<RateLimiterState>,
}

impl<R, P, C> HttpServer<R, P, C>
where
    R: LedgerRepository,
    P: BillingProvider,
    C: PaymentChannel,
{
    /// Creates a new HTTP server with the default limit of 100 requests per minute.
    pub fn new(service: WalletService<R, P, C>) -> Self {
        Self {
            state: Arc::new(AppState { service }),
            rate_limiter: Arc::new(RateLimiterState::default()),
        }
    }

    /// Creates a new HTTP server with custom rate limiting.
    pub fn with_rate_limit(service: WalletService<R, P, C>, requests_per_minute: u32) -> Self {
        Self {
            state: Arc::new(AppState { service }),
            rate_limiter: Arc::new(RateLimiterState::new(
                requests_per_minute,
                Duration::from_secs(60),
            )),
        }
    }

    /// Builds the Axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(handlers::health))
            .route("/api/register", post(handlers::register::<R, P, C>))
            .route("/api/pin", post(handlers::set_pin::<R, P, C>))
            .route("/api/balance", get(handlers::balance::<R, P, C>))
            .route(
                "/api/services/{service_type}",
                get(handlers::services::<R, P, C>),
            )
            .route(
                "/api/variations/{service_id}",
                get(handlers::variations::<R, P, C>),
            )
            .route("/api/purchase", post(handlers::purchase::<R, P, C>))
            .route(
                "/api/transactions",
                get(handlers::list_transactions::<R, P, C>),
            )
            .route(
                "/api/transactions/{request_id}/status",
                get(handlers::transaction_status::<R, P, C>),
            )
            .route("/api/dashboard", get(handlers::dashboard::<R, P, C>))
            .route("/api/wallet/fund", post(handlers::fund_wallet::<R, P, C>))
            .route(
                "/api/wallet/payments/{reference}",
                get(handlers::payment_status::<R, P, C>),
            )
            .layer(middleware::from_fn_with_state(
                self.rate_limiter.clone(),
                rate_limit_middleware,
            ))
            .layer(middleware::from_fn_with_state(
                self.state.clone(),
                auth_middleware::<R, P, C>,
            ))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Runs the server on the given address with graceful shutdown.
    pub async fn run(self, addr: &str) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Server listening on {}", listener.local_addr()?);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown...");
}
