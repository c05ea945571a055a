use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use tokio::{signal, sync::mpsc};
use tracing::{error, info};

use warehouse_api as api;
use warehouse_api::fulfillment::{
    DisabledFulfillmentPlatform, FulfillmentPlatform, HttpFulfillmentPlatform,
};
use warehouse_api::notifications::{
    LogNotificationService, NotificationService, RedisNotificationService,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = api::config::load_config().context("failed to load configuration")?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    // Init DB
    let db_pool = api::db::establish_connection_from_app_config(&cfg)
        .await
        .context("failed to connect to database")?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool)
            .await
            .context("failed running migrations")?;
    }
    let db_arc = Arc::new(db_pool);

    // Init events
    let (event_tx, event_rx) = mpsc::channel(cfg.event_channel_capacity);
    let event_sender = api::events::EventSender::new(event_tx);
    tokio::spawn(api::events::process_events(event_rx));

    // Collaborators
    let notifications: Arc<dyn NotificationService> =
        match cfg.notification_backend.to_ascii_lowercase().as_str() {
            "redis" => Arc::new(
                RedisNotificationService::new(&cfg.redis_url)
                    .context("failed to create redis notification client")?,
            ),
            _ => Arc::new(LogNotificationService),
        };

    let fulfillment: Arc<dyn FulfillmentPlatform> = match &cfg.fulfillment_platform_url {
        Some(url) => {
            info!(%url, "fulfillment platform sync enabled");
            Arc::new(HttpFulfillmentPlatform::new(
                url.clone(),
                cfg.fulfillment_platform_token.clone(),
                Duration::from_secs(cfg.fulfillment_timeout_secs),
            )
            .context("failed to build fulfillment client")?)
        }
        None => {
            info!("fulfillment platform URL not configured; sync disabled");
            Arc::new(DisabledFulfillmentPlatform)
        }
    };

    let auth_service = Arc::new(api::auth::AuthService::new(api::auth::AuthConfig::from(
        &cfg,
    )));

    api::metrics::register_metrics();

    // Compose shared app state
    let app_state = api::AppState::new(
        db_arc,
        cfg.clone(),
        event_sender,
        notifications,
        fulfillment,
    );
    let app = api::build_router(app_state, auth_service);

    // Bind and serve
    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .context("invalid host/port")?;
    info!("warehouse-api listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {}", e);
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
}
