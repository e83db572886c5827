use brightdesk::{AppState, Store, router};
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "brightdesk=debug,info".into()),
        )
        .init();

    let database_url = dotenv::var("DATABASE_URL").unwrap_or_else(|_| "sqlite::memory:".to_owned());
    let store = Store::connect(&database_url).await?;

    let app = router()
        .with_state(AppState::new(store))
        .layer(CorsLayer::permissive());

    let addr = dotenv::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_owned());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
