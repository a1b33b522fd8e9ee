use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use edutrack_core::assistant::{AssistantConfig, GeminiClient};
use sqlx::postgres::PgPoolOptions;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod auth;
mod chats;
mod error;
mod extract;
mod mailer;
mod middleware;
mod routes;
mod state;
mod store;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "EduTrack API",
        version = "0.1.0",
        description = "Accounts, role dashboards and the learning assistant for students, parents and schools."
    ),
    paths(
        routes::health::health_check,
        routes::auth::register,
        routes::auth::login,
        routes::auth::token,
        routes::auth::logout,
        routes::auth::request_password_reset,
        routes::auth::confirm_password_reset,
        routes::session::get_session,
        routes::session::resolve_page,
        routes::dashboard::my_dashboard,
        routes::dashboard::role_dashboard,
        routes::profile::get_profile,
        routes::profile::update_profile,
        routes::feedback::submit_feedback,
        routes::chat::start_chat,
        routes::chat::get_chat,
        routes::chat::send_message,
    ),
    components(schemas(
        edutrack_core::error::ApiError,
        edutrack_core::profile::Role,
        edutrack_core::profile::UserProfile,
        edutrack_core::session::Session,
        edutrack_core::session::SessionPhase,
        edutrack_core::guard::GuardDecision,
        edutrack_core::chat::ChatMessage,
        edutrack_core::chat::Sender,
        edutrack_core::assistant::AssistantMode,
        edutrack_core::assistant::DegradeReason,
        routes::health::HealthResponse,
        routes::auth::RegisterRequest,
        routes::auth::RegisterResponse,
        routes::auth::LoginRequest,
        routes::auth::TokenRequest,
        routes::auth::TokenResponse,
        routes::auth::StatusResponse,
        routes::auth::PasswordResetRequest,
        routes::auth::PasswordResetConfirm,
        routes::session::SessionResponse,
        routes::session::PageDecisionResponse,
        routes::dashboard::DashboardView,
        routes::dashboard::StudentSummary,
        store::ProfileUpdate,
        routes::feedback::FeedbackRequest,
        routes::feedback::FeedbackResponse,
        routes::chat::ChatSessionResponse,
        routes::chat::SendMessageRequest,
        routes::chat::SendMessageResponse,
    )),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            utoipa::openapi::security::SecurityScheme::Http(
                utoipa::openapi::security::Http::new(
                    utoipa::openapi::security::HttpAuthScheme::Bearer,
                ),
            ),
        );
    }
}

#[tokio::main]
async fn main() {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();

    // Structured JSON logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "edutrack_api=debug,edutrack_core=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&database_url)
        .await
        .expect("Failed to connect to database");

    sqlx::migrate!("../migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    let assistant_config = AssistantConfig::from_env();
    if !assistant_config.is_configured() {
        tracing::warn!("GEMINI_API_KEY not set, the assistant will answer with a configuration notice");
    }
    let assistant =
        GeminiClient::new(assistant_config).expect("Failed to build assistant HTTP client");

    let app_state = state::AppState {
        db: pool,
        assistant: Arc::new(assistant),
        chats: chats::ChatRegistry::default(),
        app_url: state::AppUrl::from_env(),
    };

    // HTTPS enforcement (only when EDUTRACK_REQUIRE_HTTPS=true)
    let require_https = std::env::var("EDUTRACK_REQUIRE_HTTPS")
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let app = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .merge(routes::health::router())
        .merge(routes::auth::register_router().layer(middleware::rate_limit::auth_layer()))
        .merge(routes::auth::login_router().layer(middleware::rate_limit::auth_layer()))
        .merge(routes::auth::token_router().layer(middleware::rate_limit::token_layer()))
        .merge(routes::session::router().layer(middleware::rate_limit::default_layer()))
        .merge(routes::dashboard::router().layer(middleware::rate_limit::default_layer()))
        .merge(routes::profile::router().layer(middleware::rate_limit::default_layer()))
        .merge(routes::feedback::router().layer(middleware::rate_limit::auth_layer()))
        .merge(routes::chat::router().layer(middleware::rate_limit::default_layer()))
        .merge(routes::chat::send_router().layer(middleware::rate_limit::chat_layer()))
        .layer(auth::InjectAuthLayer::new(app_state.db.clone()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .option_layer(require_https.then(|| {
                    axum::middleware::from_fn(middleware::https::require_https)
                }))
                .layer(axum::middleware::from_fn(middleware::security_headers::apply))
                .layer(middleware::cors::build_cors_layer()),
        )
        .with_state(app_state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "EduTrack API listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Server error");
}
