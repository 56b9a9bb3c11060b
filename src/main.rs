use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Result, anyhow};
use axum::http::header::STRICT_TRANSPORT_SECURITY;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware,
    routing::{get, post},
};
use sqlx::{PgPool, postgres::PgPoolOptions};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};

use librent_api::{AppState, Config, accounts, build_rate_limiter, handlers, middleware_auth};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,librent_api=debug,sqlx=warn".into()),
        )
        .json()
        .init();

    info!("Starting LibRent API v{}", env!("CARGO_PKG_VERSION"));

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tokio::fs::create_dir_all(config.covers_dir()).await?;
    tokio::fs::create_dir_all(config.pdfs_dir()).await?;

    let db = connect_with_retry(&config.database_url)
        .await
        .map_err(|e| anyhow!("Failed to connect to PostgreSQL after retries: {e}"))?;

    info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&db)
        .await
        .map_err(|e| anyhow!("Migration failed: {e}"))?;
    info!("Database migrations completed successfully");

    accounts::ensure_admin_account(&db, &config)
        .await
        .map_err(|e| anyhow!("Admin account seeding failed: {e}"))?;

    let rate_limiter = build_rate_limiter();

    let state = Arc::new(AppState {
        db,
        config: config.clone(),
        rate_limiter,
    });

    let public_routes = Router::new()
        .route("/", get(handlers::home))
        .route("/health", get(handlers::health_check))
        .route("/register", post(handlers::register))
        .route("/login", post(handlers::login))
        .route("/refresh", post(handlers::refresh_token))
        .route("/genre/{genre}", get(handlers::books_by_genre))
        .route("/book/{book_id}", get(handlers::book_details))
        .route("/search-authors", get(handlers::search_authors));

    let customer_routes = Router::new()
        .route("/activate_plan/{plan_duration}", post(handlers::activate_plan))
        .route("/payment", post(handlers::pay_and_subscribe))
        .route("/rent", get(handlers::rentable_books))
        .route("/rent/{book_id}", post(handlers::rent_this_book))
        .route("/profile", get(handlers::view_profile))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            middleware_auth::auth_middleware,
        ));

    let admin_routes = Router::new()
        .route("/books-catalog", get(handlers::books_catalog))
        .route("/add-to-collections", post(handlers::add_to_collections))
        .route("/edit/{id}", post(handlers::edit_book))
        .route("/delete/{id}", post(handlers::delete_book))
        .route("/authors", post(handlers::create_author))
        .route("/users", get(handlers::user_records))
        .route("/overdue-books", get(handlers::overdue_books))
        .route("/borrowed_books", get(handlers::borrowed_books))
        .route_layer(middleware::from_fn(middleware_auth::require_admin))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            middleware_auth::auth_middleware,
        ));

    let hsts_value: HeaderValue =
        HeaderValue::from_static("max-age=63072000; includeSubDomains; preload");

    let app = Router::new()
        .merge(public_routes)
        .merge(customer_routes)
        .merge(admin_routes)
        .with_state(state.clone())
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024)) // 10 MB upload limit
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(
            tower_http::set_header::SetResponseHeaderLayer::if_not_present(
                STRICT_TRANSPORT_SECURITY,
                hsts_value,
            ),
        );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow!("Server error: {e}"))?;

    info!("Server shut down gracefully");
    Ok(())
}

async fn connect_with_retry(database_url: &str) -> Result<PgPool, sqlx::Error> {
    let mut delay = Duration::from_millis(500);
    let max_attempts = 30;

    for attempt in 1..=max_attempts {
        match PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
        {
            Ok(pool) => {
                info!("Connected to PostgreSQL on attempt {attempt}");
                return Ok(pool);
            }
            Err(e) => {
                warn!(
                    "Database connection failed (attempt {}/{}): {e} — retrying in {:?}",
                    attempt, max_attempts, delay
                );
                if attempt == max_attempts {
                    error!("All connection attempts failed");
                    return Err(e);
                }
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(Duration::from_secs(5));
            }
        }
    }
    unreachable!()
}

// ───── Graceful shutdown on Ctrl+C (SIGINT) or Docker SIGTERM ─────
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("Received Ctrl+C"); }
        () = terminate => { info!("Received SIGTERM"); }
    }

    info!("Shutdown signal received — closing server...");
}
