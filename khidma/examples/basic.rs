//! Registers one service of each lifecycle, then walks them through
//! resolution, health checks and shutdown.
//!
//! ```text
//! RUST_LOG=debug cargo run -p khidma --example basic
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use khidma::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

struct Settings {
    database_url: String,
}

struct Database {
    url: String,
}

impl HealthCheck for Database {
    fn health_check(&self) -> HookResult {
        if self.url.is_empty() {
            return Err("no database url".into());
        }
        Ok(())
    }
}

#[async_trait]
impl ShutdownWithContextAndError for Database {
    async fn shutdown(&self, ctx: &Context) -> HookResult {
        if let Some(err) = ctx.err() {
            return Err(err.into());
        }
        info!(url = %self.url, "Closing database pool");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let container = Container::builder()
        .health_check_timeout(Duration::from_secs(1))
        .shutdown_timeout(Duration::from_secs(5))
        .build();

    container.provide_value(Arc::new(Settings {
        database_url: "postgres://localhost/app".into(),
    }))?;

    // Database's health and shutdown protocols are picked up from its impls.
    provide!(container, lazy "database" => |i| {
        let settings: Arc<Settings> = invoke(i)?;
        Ok(Arc::new(Database {
            url: settings.database_url.clone(),
        }))
    })?;

    let counter = Arc::new(AtomicU64::new(0));
    container.provide_transient("request_id", move |_| {
        Ok(format!("req-{}", counter.fetch_add(1, Ordering::Relaxed)))
    })?;

    println!("Before first use:\n{}", container.describe());

    let db: Arc<Database> = container.invoke_named("database")?;
    info!(url = %db.url, "Resolved database");

    for _ in 0..2 {
        let id: String = container.invoke_named("request_id")?;
        info!(%id, "New request");
    }

    println!("After first use:\n{}", container.describe());
    for service in container.list_provided_services() {
        println!("{service}");
    }

    let ctx = Context::background();
    for (name, result) in container.health_check(&ctx).await {
        match result {
            Ok(()) => info!(service = %name, "healthy"),
            Err(err) => info!(service = %name, error = %err, "unhealthy"),
        }
    }

    container.shutdown(&ctx).await
}
