use axum::{
    Form, Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
};
use minijinja::context;
use serde_json::json;
use tracing::warn;

use super::page;
use crate::{
    auth::{PageViewer, Viewer},
    error::{AppError, FieldErrors, PageError},
    payments::{self, IntentInput, SIGNATURE_HEADER, WebhookEvent},
    router::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/give", post(give))
        .route("/api/v1/payments", get(mine).post(create_intent))
        .route("/webhooks/payments", post(webhook))
}

async fn give(
    State(state): State<AppState>,
    viewer: PageViewer,
    Form(input): Form<IntentInput>,
) -> Result<impl IntoResponse, PageError> {
    let payment = payments::create_intent(&state.db, &viewer, input).await?;
    page(
        &state,
        &viewer,
        "donations/checkout.html",
        context! { active => "giving", payment => payment },
    )
}

async fn mine(
    State(state): State<AppState>,
    viewer: Viewer,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(payments::for_viewer(&state.db, &viewer).await?))
}

async fn create_intent(
    State(state): State<AppState>,
    viewer: Viewer,
    Json(input): Json<IntentInput>,
) -> Result<impl IntoResponse, AppError> {
    let payment = payments::create_intent(&state.db, &viewer, input).await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

/// Provider callback. Authenticated by the body signature, not a session.
async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());
    if let Err(e) = payments::verify_signature(&state.config.payment_webhook_secret, &body, signature) {
        warn!("rejected payment webhook with a bad signature");
        return Err(e);
    }
    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| FieldErrors::single("body", e.to_string()))?;
    let outcome = payments::apply_event(&state.db, event).await?;
    Ok(Json(json!({ "outcome": outcome })))
}
