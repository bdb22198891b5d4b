use std::sync::Arc;

use anyhow::Context;
use bookstore_app::modules::books::store::{BookStore, InMemoryBookStore, MongoBookStore};
use bookstore_kernel::settings::{Settings, StoreBackend};
use bookstore_kernel::{InitCtx, ModuleRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("failed to load bookstore settings")?;
    bookstore_telemetry::init(&settings.telemetry).context("failed to initialize telemetry")?;

    tracing::info!(
        env = ?settings.environment,
        backend = ?settings.database.backend,
        "bookstore-app bootstrap starting"
    );

    let media = bookstore_media::from_settings(&settings.media)?;

    // Modules need their store before registration, so migrations are
    // collected from a registry built over the chosen backend.
    let mut registry = ModuleRegistry::new();
    match settings.database.backend {
        StoreBackend::Mongo => {
            let database = bookstore_db::connect(&settings.database).await?;
            let store: Arc<dyn BookStore> = Arc::new(MongoBookStore::new(&database));
            bookstore_app::register_all(&mut registry, store, media);
            bookstore_db::apply_migrations(&database, &registry.collect_migrations()).await?;
        }
        StoreBackend::Memory => {
            tracing::warn!("using the in-memory store; data is lost on shutdown");
            let store: Arc<dyn BookStore> = Arc::new(InMemoryBookStore::new());
            bookstore_app::register_all(&mut registry, store, media);
        }
    }

    let ctx = InitCtx {
        settings: &settings,
    };
    registry.init_modules(&ctx).await?;
    registry.start_modules(&ctx).await?;

    tracing::info!(modules = registry.module_count(), "bookstore-app bootstrap complete");

    let served = bookstore_http::start_server(&registry, &settings).await;
    registry.stop_modules().await?;
    served
}
