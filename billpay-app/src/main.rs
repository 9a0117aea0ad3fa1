//! # Billpay Application
//!
//! Binary that wires together all the components:
//! - Load configuration from environment
//! - Initialize the ledger repository
//! - Build the billing provider client and wallet service
//! - Start the HTTP server

mod config;

use opentelemetry::global;
use opentelemetry_sdk::{propagation::TraceContextPropagator, trace as sdktrace};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use billpay_hex::{WalletService, inbound::HttpServer, service::SimulatedChannel};
use billpay_provider::{HttpBillingProvider, ProviderConfig, RetryPolicy};
use billpay_repo::build_repo;

fn init_tracer(
    endpoint: &str,
) -> anyhow::Result<(sdktrace::Tracer, sdktrace::SdkTracerProvider)> {
    use opentelemetry_otlp::WithExportConfig;

    global::set_text_map_propagator(TraceContextPropagator::new());

    // gRPC exporter with batch processing (non-blocking)
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;

    let provider = sdktrace::SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .build();

    global::set_tracer_provider(provider.clone());

    use opentelemetry::trace::TracerProvider as _;
    Ok((provider.tracer("billpay-service"), provider))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = config::Config::from_env()?;

    let otel = config
        .otlp_endpoint
        .as_deref()
        .map(init_tracer)
        .transpose()?;
    let telemetry = otel
        .as_ref()
        .map(|(tracer, _)| tracing_opentelemetry::layer().with_tracer(tracer.clone()));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,billpay_app=debug,billpay_hex=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(telemetry)
        .init();

    tracing::info!("Starting billpay server on port {}", config.port);

    // Handles connection and migration
    let repo = build_repo(&config.database_url).await?;
    tracing::info!("Using {} ledger", repo.backend());

    let settings = &config.provider;
    let provider = HttpBillingProvider::new(
        ProviderConfig::new(settings.base_url.as_str())
            .with_credentials(
                settings.api_key.as_str(),
                settings.public_key.as_str(),
                settings.secret_key.as_str(),
            )
            .with_timeout(settings.timeout)
            .with_retry(RetryPolicy::with_base_delay(settings.retry_base)),
    )?;
    tracing::info!(base_url = %settings.base_url, "billing provider configured");

    let service = WalletService::new(repo, provider, SimulatedChannel);

    let server = HttpServer::with_rate_limit(service, config.rate_limit_per_minute);
    let addr = format!("0.0.0.0:{}", config.port);

    server.run(&addr).await?;

    // Flush traces before exit
    if let Some((_, provider)) = otel {
        let _ = provider.shutdown();
    }
    Ok(())
}
