use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

mod clock;
mod config;
mod db;
mod dto;
mod error;
mod handlers;
mod models;
mod services;
mod store;

use clock::{Clock, SystemClock};
use config::{Config, StorageBackend};
use db::Database;
use services::analytics::MoodAnalytics;
use services::medications::{spawn_past_due_worker, MedicationService};
use services::reminders::{BroadcastNotifier, ReminderScheduler};
use store::{MemoryStore, PgStore, Stores};

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Arc<Config>,
    pub clock: Arc<dyn Clock>,
    pub stores: Stores,
    pub medications: MedicationService,
    pub analytics: MoodAnalytics,
    pub ws_tx: broadcast::Sender<String>,
}

impl AppState {
    pub fn new(config: Arc<Config>, db: Database, stores: Stores, clock: Arc<dyn Clock>) -> Self {
        // WebSocket broadcast channel for fired reminders
        let (ws_tx, _) = broadcast::channel::<String>(256);

        let scheduler = ReminderScheduler::new(
            clock.clone(),
            Arc::new(BroadcastNotifier::new(ws_tx.clone())),
            chrono::Duration::seconds(config.past_due_check_interval_secs),
        );
        let medications = MedicationService::new(
            stores.medications.clone(),
            stores.reminder_log.clone(),
            scheduler,
            clock.clone(),
        );
        let analytics = MoodAnalytics::new(stores.mood.clone(), clock.clone());

        Self {
            db,
            config,
            clock,
            stores,
            medications,
            analytics,
            ws_tx,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let health_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/readyz", get(handlers::health::readyz))
        .route("/ws", get(handlers::ws::ws_handler));

    let mood_routes = Router::new()
        .route(
            "/mood",
            get(handlers::mood::list_mood)
                .post(handlers::mood::create_mood)
                .delete(handlers::mood::clear_mood),
        )
        .route(
            "/mood/:id",
            put(handlers::mood::update_mood).delete(handlers::mood::delete_mood),
        )
        .route("/mood-types", get(handlers::mood::list_mood_types))
        // Analytics
        .route("/mood/stats", get(handlers::mood::mood_stats))
        .route("/mood/daily", get(handlers::mood::mood_daily))
        .route("/mood/streak", get(handlers::mood::mood_streak))
        .route("/mood/insights", get(handlers::mood::mood_insights))
        .route("/mood/context", get(handlers::mood::mood_context));

    let user_routes = Router::new()
        .route("/user", post(handlers::users::create_user))
        .route("/user/:clerk_id", get(handlers::users::get_user));

    let medication_routes = Router::new()
        .route(
            "/medications",
            get(handlers::medications::list_medications)
                .post(handlers::medications::create_medication)
                .delete(handlers::medications::clear_medications),
        )
        .route(
            "/medications/today",
            get(handlers::medications::todays_medications),
        )
        .route(
            "/medications/progress",
            get(handlers::medications::todays_progress),
        )
        .route(
            "/medications/:id",
            put(handlers::medications::update_medication),
        )
        .route(
            "/medications/:id/doses",
            post(handlers::medications::record_dose),
        )
        .route(
            "/medications/:id/refill",
            post(handlers::medications::refill_medication),
        )
        .route("/doses/today", get(handlers::medications::todays_doses))
        // Reminders
        .route("/reminders", get(handlers::medications::list_reminders))
        .route(
            "/reminders/past-due-check",
            post(handlers::medications::sweep_past_due),
        )
        .route(
            "/reminders/resync",
            post(handlers::medications::resync_reminders),
        );

    Router::new()
        .merge(health_routes)
        .merge(mood_routes)
        .merge(user_routes)
        .merge(medication_routes)
        .with_state(state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    let allowed_origins: Vec<axum::http::HeaderValue> = {
        let mut origins = Vec::new();
        match config.frontend_url.parse::<axum::http::HeaderValue>() {
            Ok(hv) => origins.push(hv),
            Err(_) => tracing::warn!(url = %config.frontend_url, "Ignoring invalid FRONTEND_URL"),
        }
        // In dev, also allow LAN access (e.g. testing from a phone)
        if let Ok(extra) = std::env::var("CORS_EXTRA_ORIGINS") {
            for o in extra.split(',') {
                if let Ok(hv) = o.trim().parse::<axum::http::HeaderValue>() {
                    origins.push(hv);
                }
            }
        }
        origins
    };

    CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::ACCEPT,
        ])
        .allow_credentials(true)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mindful_api=debug,tower_http=debug".into()),
        )
        .json()
        .init();

    let config = Arc::new(Config::from_env());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let (db, stores) = match config.storage_backend {
        StorageBackend::Postgres => {
            let db = db::connect(config.database_url.as_deref()).await;
            let stores = Stores::postgres(PgStore::new(db.clone()));
            (db, stores)
        }
        StorageBackend::Memory => {
            tracing::info!("Using in-memory storage; data is lost on restart");
            (
                Database::unavailable(),
                Stores::memory(MemoryStore::new(clock.clone())),
            )
        }
    };

    let state = AppState::new(config.clone(), db, stores, clock);

    // Re-arm timers for everything already on record
    if let Err(e) = state.medications.resync_reminders().await {
        tracing::error!(error = %e, "Failed to resync medication reminders");
    }

    if let Err(e) = state.medications.restore_past_due_state().await {
        tracing::error!(error = %e, "Failed to restore past-due reminder state");
    }

    // Past-due sweep worker (the scheduler limits real sweeps to once per interval)
    let sweeper = spawn_past_due_worker(
        state.medications.clone(),
        std::time::Duration::from_secs(config.past_due_sweep_tick_secs.max(1)),
    );

    let scheduler = state.medications.scheduler().clone();
    let app = router(state)
        .layer(cors_layer(&config))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http());

    let addr = config.listen_addr();
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    scheduler.shutdown();
    tracing::info!("Server stopped");
    Ok(())
}
