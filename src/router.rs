use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    middleware,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, get_service},
};
use axum_login::{
    AuthManagerLayerBuilder,
    tower_sessions::{
        Expiry, SessionManagerLayer, SessionStore,
        cookie::{SameSite, time},
    },
};
use minijinja::{Environment, UndefinedBehavior, Value, context};
use sea_orm::DatabaseConnection;
use tokio::{signal, task::AbortHandle};
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{error, info};

use crate::{
    auth::{AuthSession, Backend, router as auth_router},
    communication::Mailer,
    config::Config,
    core::{export::format_cents, middleware::request_context},
    error::{AppError, PageError},
    routes,
    util::asset_loader::AssetLoader,
};

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub templates: Arc<Environment<'static>>,
    pub config: Arc<Config>,
    pub mailer: Mailer,
}

impl AppState {
    pub fn new(db: DatabaseConnection, config: Config, mailer: Mailer) -> Self {
        let templates = setup_templates(&config);
        Self {
            db,
            templates: Arc::new(templates),
            config: Arc::new(config),
            mailer,
        }
    }

    pub fn render(&self, name: &str, ctx: Value) -> Result<Html<String>, AppError> {
        let tmpl = self.templates.get_template(name)?;
        Ok(Html(tmpl.render(ctx)?))
    }
}

pub fn create_router<S>(state: AppState, session_store: S) -> Router
where
    S: SessionStore + Clone,
{
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(state.config.secure_cookies)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::days(1)));

    let backend = Backend::new(state.db.clone());
    let auth_layer = AuthManagerLayerBuilder::new(backend, session_layer).build();

    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .merge(auth_router::router())
        .merge(routes::router())
        .with_state(state)
        .nest_service("/static", get_service(ServeDir::new("static")))
        .layer(auth_layer)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_context))
}

fn setup_templates(config: &Config) -> Environment<'static> {
    let mut env = Environment::new();
    env.set_loader(minijinja::path_loader("templates"));
    // Shared forms read fields off a record that is absent when creating.
    env.set_undefined_behavior(UndefinedBehavior::Chainable);
    env.add_global("church_name", config.church_name.clone());
    env.add_filter("cents", |cents: i64| format_cents(cents));
    let asset_loader = AssetLoader::new("static");
    asset_loader.register(&mut env);
    env
}

async fn index(
    State(state): State<AppState>,
    auth_session: AuthSession,
) -> Result<Response, PageError> {
    if auth_session.user.is_some() {
        return Ok(Redirect::to("/dashboard").into_response());
    }
    let events = crate::events::public_upcoming(&state.db, 5).await?;
    Ok(state
        .render("index.html", context! { events => events })?
        .into_response())
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.ping().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(e) => {
            error!(error = %e, "database ping failed");
            (StatusCode::SERVICE_UNAVAILABLE, "database unavailable")
        }
    }
}

/// Resolves on Ctrl+C or SIGTERM, aborting the background tasks first.
pub async fn shutdown_signal(background: Vec<AbortHandle>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
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
    info!("shutting down");
    for handle in background {
        handle.abort();
    }
}
