use time::OffsetDateTime;
use tokio::time::{interval, Duration};

mod app;
mod auth;
mod config;
mod state;
mod users;

use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "townsq=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let app_state = AppState::init().await?;

    // Run migrations if present
    if let Err(e) = sqlx::migrate!("./migrations").run(&app_state.db).await {
        tracing::warn!(error = %e, "migrations folder not found or migration failed; continuing");
    }

    auth::service::warn_if_no_admin(&app_state).await;

    // Periodic sweep of expired reset tokens; resets also sweep
    // opportunistically, this catches tokens that were never used.
    let reset_tokens = app_state.reset_tokens.clone();
    tokio::spawn(async move {
        let mut tick = interval(Duration::from_secs(300));
        loop {
            tick.tick().await;
            reset_tokens.delete_expired(OffsetDateTime::now_utc());
        }
    });

    let app = app::build_app(app_state);
    app::serve(app).await
}
