use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{router, AppState};
use hie_core::{core_config_from_env_values, Collaborators, HealthInformationService, LocalExchange};

/// Main entry point for the HIE document service
///
/// Serves the REST API (with Swagger UI) backed by a directory-based local exchange.
///
/// # Environment Variables
/// - `HIE_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `HIE_EXCHANGE_DIR`: Local exchange directory (default: "exchange")
/// - `HIE_REPOSITORY_UNIQUE_ID`: Repository unique id used for retrieval
/// - `HIE_HOME_COMMUNITY_ID`: Home community id attached to published documents
/// - `HIE_TEMPLATE_ROOT`: Template id root documents must carry (default: the CCD template)
///
/// # Returns
/// * `Ok(())` - If the server starts and runs successfully
/// * `Err(anyhow::Error)` - If configuration, binding or serving fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("hie_run=info".parse()?)
                .add_directive("hie_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = std::env::var("HIE_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let exchange_dir = std::env::var("HIE_EXCHANGE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(hie_core::DEFAULT_EXCHANGE_DIR));

    let cfg = Arc::new(core_config_from_env_values(
        std::env::var("HIE_REPOSITORY_UNIQUE_ID").ok(),
        std::env::var("HIE_HOME_COMMUNITY_ID").ok(),
        std::env::var("HIE_TEMPLATE_ROOT").ok(),
    )?);

    let exchange = LocalExchange::open(&exchange_dir, cfg.repository_unique_id().clone())?;
    tracing::info!("++ Using local exchange at {}", exchange.root().display());

    let service = HealthInformationService::new(cfg, Collaborators::from_exchange(Arc::new(exchange)))?;
    let app = router(AppState::new(Arc::new(service)));

    tracing::info!("++ Starting HIE REST on {}", rest_addr);
    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
