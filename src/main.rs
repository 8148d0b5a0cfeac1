use rolegate::{
    AppState,
    config::{AppConfig, Env},
    create_router,
    matrix::{MatrixHandle, MatrixLoader, MatrixScope},
    repository::{PostgresRepository, RepositoryState},
    salt::{SaltRotator, SaltStore},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Startup order: configuration, logging, database and migrations, signing secrets,
/// permission matrix, then the HTTP listener. Any failure before the listener binds
/// is fatal, so the service never accepts traffic with an empty matrix.
#[tokio::main]
async fn main() {
    // 1. Configuration & Environment Loading (Fail-Fast)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging Filter Setup
    // RUST_LOG wins; otherwise a verbose default for local development.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "rolegate=debug,tower_http=info,axum=trace".into());

    // 3. Initialize Logging based on Environment
    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            // JSON lines for the log aggregator.
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 4. Database Initialization (Postgres)
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.db_url)
        .await
        .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("FATAL: Failed to run database migrations.");

    let repo = Arc::new(PostgresRepository::new(pool)) as RepositoryState;

    // 5. Signing Secrets
    // Creates the singleton record on first start, otherwise adopts the stored pair
    // so every instance signs with the same secret.
    let pair = SaltRotator::provision(&repo)
        .await
        .expect("FATAL: Failed to provision signing secrets.");
    let salts = Arc::new(SaltStore::new(pair));

    // 6. Permission Matrix
    // Must be loaded before the listener binds.
    let matrix = MatrixLoader::new(repo.clone())
        .load(MatrixScope::Global)
        .await
        .expect("FATAL: Failed to load permission matrix.");
    let matrix = MatrixHandle::new(matrix);

    // 7. Background Rotation
    let rotator = Arc::new(SaltRotator::new(
        repo.clone(),
        salts.clone(),
        config.salt_rotation_interval(),
    ));
    let rotation_task = rotator.spawn();

    // 8. Unified State Assembly
    let http_port = config.http_port;
    let app_state = AppState::new(repo, config, salts, matrix);

    // 9. Router and Server Startup
    let app = create_router(app_state);

    let addr = format!("0.0.0.0:{http_port}");
    let listener = TcpListener::bind(&addr)
        .await
        .expect("FATAL: Failed to bind HTTP listener.");

    tracing::info!("Listening on {}", addr);
    tracing::info!(
        "API Documentation (Swagger UI) available at: http://localhost:{}/docs",
        http_port
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("FATAL: HTTP server error.");

    rotation_task.abort();
    tracing::info!("Server stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, draining connections");
}
