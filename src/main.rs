//! OpenSASE Checkout - cart, checkout, order ledger and payment reconciliation service

use anyhow::{Context, Result};
use opensase_checkout::api::{self, AppState};
use opensase_checkout::config::Config;
use opensase_checkout::infrastructure::{EventBus, HttpGateway, MemoryCatalog, MemorySeed, MemoryStore, PgStore, UnconfiguredGateway};
use opensase_checkout::services::{Backends, Engine, PaymentGateway};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();
    let config = Config::from_env()?;

    let backends = match &config.database_url {
        Some(url) => {
            if config.seed_file.is_some() {
                warn!("SEED_FILE ignored when DATABASE_URL is set");
            }
            let db = PgPoolOptions::new().max_connections(10).connect(url).await?;
            sqlx::migrate!("./migrations").run(&db).await?;
            Backends::postgres(Arc::new(PgStore::new(db)))
        }
        None => {
            warn!("DATABASE_URL not set, carts and orders live in memory only");
            let (catalog, store) = (Arc::new(MemoryCatalog::new()), Arc::new(MemoryStore::new()));
            match &config.seed_file {
                Some(path) => {
                    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
                    let seed = MemorySeed::from_json(&raw).with_context(|| format!("parsing {}", path.display()))?;
                    info!(products = seed.products.len(), zones = seed.zones.len(), coupons = seed.coupons.len(), "reference data seeded");
                    seed.apply(&catalog, &store)?;
                }
                None => warn!("SEED_FILE not set, the catalog is empty and no checkout can succeed"),
            }
            Backends::memory(catalog, store)
        }
    };
    let gateway: Arc<dyn PaymentGateway> = match &config.gateway_url {
        Some(url) => Arc::new(HttpGateway::new(url.as_str(), config.gateway_timeout)?),
        None => {
            warn!("GATEWAY_URL not set, payment verification will report the gateway as unavailable");
            Arc::new(UnconfiguredGateway)
        }
    };
    let events = EventBus::connect(config.nats_url.as_deref()).await;
    if events.is_connected() {
        info!("publishing domain events to NATS");
    }

    let engine = Engine::new(config.engine_settings(), backends, gateway, events);
    let app = api::router(AppState::new(engine), config.request_timeout);

    let addr = format!("0.0.0.0:{}", config.port);
    info!("🚀 OpenSASE Checkout listening on {}", addr);
    axum::serve(tokio::net::TcpListener::bind(&addr).await?, app).await?;
    Ok(())
}
