use axum::{
    Json, Router,
    extract::State,
    response::IntoResponse,
    routing::get,
};
use minijinja::context;

use super::page;
use crate::{
    auth::{PageViewer, Viewer},
    error::{AppError, PageError},
    reports,
    router::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(dashboard))
        .route("/reports", get(staff_reports))
        .route("/api/v1/dashboard", get(api_dashboard))
        .route("/api/v1/reports", get(api_reports))
}

pub async fn dashboard(
    State(state): State<AppState>,
    viewer: PageViewer,
) -> Result<impl IntoResponse, PageError> {
    let personal = reports::personal_dashboard(&state.db, &viewer).await?;
    page(
        &state,
        &viewer,
        "dashboard.html",
        context! { active => "dashboard", personal => personal },
    )
}

pub async fn staff_reports(
    State(state): State<AppState>,
    viewer: PageViewer,
) -> Result<impl IntoResponse, PageError> {
    let report = reports::staff_dashboard(&state.db, &viewer).await?;
    page(
        &state,
        &viewer,
        "reports.html",
        context! { active => "reports", report => report },
    )
}

async fn api_dashboard(
    State(state): State<AppState>,
    viewer: Viewer,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(reports::personal_dashboard(&state.db, &viewer).await?))
}

async fn api_reports(
    State(state): State<AppState>,
    viewer: Viewer,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(reports::staff_dashboard(&state.db, &viewer).await?))
}
