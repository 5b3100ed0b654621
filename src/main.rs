use anyhow::Context;
use axum::http::{header, HeaderValue, Method};
use nexus::{auth, db, realtime, AppState, Config, Rules};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tower_sessions::{cookie::SameSite, Expiry, MemoryStore, SessionManagerLayer};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=info")))
        .init();

    let config = Config::from_env()?;

    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(config.session_idle_minutes)));

    let db_pool = db::connect(&config.database_url)
        .await
        .with_context(|| format!("opening {}", config.database_url))?;

    let secrets = std::fs::read_to_string(&config.client_secrets)
        .with_context(|| format!("reading {}", config.client_secrets))?;
    let clients = auth::Clients::from_json(serde_json::from_str(&secrets)?, &config.public_url)
        .map_err(|err| err.0)?;

    let app_state = AppState {
        db_pool,
        clients,
        tx: realtime::hub(),
        rules: Rules::from_config(&config),
    };

    // the client app lives on its own origin and sends the session cookie
    let cors = CorsLayer::new()
        .allow_origin(config.public_url.parse::<HeaderValue>()?)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true);

    let app = nexus::router()
        .with_state(app_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(session_layer);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
