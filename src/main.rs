use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use intake_core::{ConfigFile, Orchestrator, RegistryClient};
use registry_client::FhirRegistryClient;

mod api;

/// Main entry point for the intake REST service
///
/// # Environment Variables
/// - `INTAKE_REST_ADDR`: listen address (default: "0.0.0.0:3000")
/// - `INTAKE_CONFIG`: optional YAML configuration file
/// - `INTAKE_REGISTRY_URL` and the other `INTAKE_*` overrides read by [`ConfigFile`]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("intake_run=info".parse()?)
                .add_directive("intake_core=info".parse()?)
                .add_directive("registry_client=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::var("INTAKE_CONFIG").ok().map(PathBuf::from);
    let config = ConfigFile::resolve(config_path.as_deref(), |var| std::env::var(var).ok())
        .context("failed to load configuration")?;
    let rest_addr = std::env::var("INTAKE_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    let client = FhirRegistryClient::new(&config).context("failed to build registry client")?;
    let registry: Arc<dyn RegistryClient> = Arc::new(client);
    let orchestrator = Orchestrator::new(registry, Arc::new(config));

    tracing::info!(
        registry = %orchestrator.config().registry_base_url(),
        "++ Starting intake REST on {}",
        rest_addr
    );

    let app = api::router(api::AppState::new(Arc::new(orchestrator)));
    let listener = tokio::net::TcpListener::bind(&rest_addr)
        .await
        .with_context(|| format!("failed to bind {rest_addr}"))?;
    axum::serve(listener, app).await?;

    Ok(())
}
