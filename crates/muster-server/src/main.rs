use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{delete, get, post, put},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use muster_api::auth::{self, AppState, AppStateInner};
use muster_api::middleware::require_auth;
use muster_api::{events, health, messages, recipients, users};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "muster=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("MUSTER_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let token_ttl_hours: i64 = std::env::var("MUSTER_TOKEN_TTL_HOURS")
        .unwrap_or_else(|_| "24".into())
        .parse()?;
    let db_path = std::env::var("MUSTER_DB_PATH").unwrap_or_else(|_| "muster.db".into());
    let host = std::env::var("MUSTER_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("MUSTER_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    // Init database
    let db = muster_db::Database::open(&PathBuf::from(&db_path))?;

    // Shared state
    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret,
        token_ttl_hours,
    });

    // Routes
    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/auth/me", get(auth::me))
        .route(
            "/users/me",
            put(users::update_profile).delete(users::delete_account),
        )
        .route("/users/me/password", put(users::change_password))
        .route("/users/me/deactivate", post(users::deactivate))
        .route("/events", post(events::create_event).get(events::list_events))
        .route("/events/search", get(events::search_events))
        .route("/events/upcoming", get(events::upcoming_events))
        .route("/events/stats", get(events::event_stats))
        .route(
            "/events/{id}",
            get(events::get_event)
                .put(events::update_event)
                .delete(events::delete_event),
        )
        .route(
            "/events/{id}/participants",
            get(events::list_participants).post(events::add_participant),
        )
        .route(
            "/events/{id}/participants/{recipient_id}",
            delete(events::remove_participant),
        )
        .route(
            "/recipients",
            post(recipients::create_recipient).get(recipients::list_recipients),
        )
        .route("/recipients/bulk", post(recipients::bulk_create_recipients))
        .route("/recipients/search", get(recipients::search_recipients))
        .route("/recipients/tags", get(recipients::recipient_tags))
        .route("/recipients/stats", get(recipients::recipient_stats))
        .route(
            "/recipients/{id}",
            get(recipients::get_recipient)
                .put(recipients::update_recipient)
                .delete(recipients::delete_recipient),
        )
        .route("/recipients/{id}/opt-out", post(recipients::opt_out))
        .route("/recipients/{id}/opt-in", post(recipients::opt_in))
        .route(
            "/messages",
            post(messages::create_message).get(messages::list_messages),
        )
        .route(
            "/messages/{id}",
            get(messages::get_message)
                .put(messages::update_message)
                .delete(messages::delete_message),
        )
        .route("/messages/{id}/schedule", post(messages::schedule_message))
        .route("/messages/{id}/send", post(messages::send_message))
        .route("/messages/{id}/sends", get(messages::list_sends))
        .route("/sends/{id}/status", put(messages::update_send_status))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Muster server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
