use poise::{api, Config, DataSource, PolymarketDataSource, RefreshScheduler};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;

#[tokio::main]
async fn main() {
    // A missing .env file is fine; the environment may already be set.
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let port = config.port;

    let datasource: Arc<dyn DataSource> = Arc::new(PolymarketDataSource::new(
        config.data_api_url.clone(),
        config.gamma_api_url.clone(),
    ));
    let scheduler = Arc::new(RefreshScheduler::from_config(&config, datasource));

    // Create router
    let app = api::create_router(api::AppState::new(
        scheduler.reader(),
        scheduler.trigger(),
        config.dust_threshold,
    ));

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let refresh_task = scheduler.spawn(async move {
        let _ = stop_rx.await;
    });

    // Bind to address
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!(
        "Server listening on {} for wallet {}",
        addr,
        config.wallet_address
    );

    // Run server
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await;

    let _ = stop_tx.send(());
    let _ = refresh_task.await;

    if let Err(e) = served {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }
}
