use axum::{
    Form, Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect},
    routing::{get, post},
};
use minijinja::context;
use serde::Deserialize;

use super::page;
use crate::{
    attendance::{self, CheckInInput},
    auth::{PageViewer, Viewer},
    core::{export::CsvExport, now},
    entities::sea_orm_active_enums::Role,
    error::{AppError, PageError},
    events,
    router::AppState,
};

#[derive(Debug, Deserialize)]
pub struct TokenInput {
    pub token: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/events/{id}/check-in",
            get(self::get::desk).post(self::post::check_in),
        )
        .route("/events/{id}/attendance.csv", get(self::get::export))
        .route("/attendance", get(|| async { Redirect::to("/me/qr") }))
        .route("/me/qr", get(self::get::my_code))
        .route("/me/qr/regenerate", post(self::post::regenerate))
        .route("/members/{id}/attendance", get(self::get::history))
        .route(
            "/api/v1/events/{id}/check-ins",
            get(api::for_event).post(api::check_in),
        )
        .route("/api/v1/check-in/validate", post(api::validate))
        .route("/api/v1/members/{id}/qr", get(api::qr_code))
        .route("/api/v1/members/{id}/qr/regenerate", post(api::regenerate))
        .route("/api/v1/members/{id}/attendance", get(api::history))
}

mod get {
    use super::*;

    pub async fn desk(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
    ) -> Result<impl IntoResponse, PageError> {
        let checked_in = attendance::for_event(&state.db, &viewer, id).await?;
        let detail = events::get(&state.db, &viewer, id).await?;
        let expected = events::attendees(&state.db, &viewer, id).await?;
        page(
            &state,
            &viewer,
            "attendance/desk.html",
            context! {
                active => "events",
                event => detail.event,
                summary => detail.summary,
                checked_in => checked_in,
                expected => expected,
            },
        )
    }

    pub async fn export(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
    ) -> Result<impl IntoResponse, PageError> {
        let bytes = attendance::export_csv(&state.db, &viewer, id).await?;
        Ok(CsvExport::new(&format!("attendance-event-{id}"), now().date(), bytes))
    }

    pub async fn my_code(
        State(state): State<AppState>,
        viewer: PageViewer,
    ) -> Result<impl IntoResponse, PageError> {
        let member_id = viewer.member_id()?;
        let code =
            attendance::qr_code(&state.db, &viewer, &state.config.secret_key, member_id).await?;
        page(
            &state,
            &viewer,
            "attendance/qr.html",
            context! { active => "qr", code => code },
        )
    }

    pub async fn history(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
    ) -> Result<impl IntoResponse, PageError> {
        let visits = attendance::history(&state.db, &viewer, id).await?;
        let member = crate::members::get(&state.db, &viewer, id).await?;
        page(
            &state,
            &viewer,
            "attendance/history.html",
            context! { active => "members", member => member, visits => visits },
        )
    }
}

mod post {
    use super::*;

    pub async fn check_in(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
        Form(input): Form<CheckInInput>,
    ) -> Result<Redirect, PageError> {
        attendance::check_in(&state.db, &viewer, &state.config.secret_key, id, input).await?;
        Ok(Redirect::to(&format!("/events/{id}/check-in")))
    }

    pub async fn regenerate(
        State(state): State<AppState>,
        viewer: PageViewer,
    ) -> Result<Redirect, PageError> {
        let member_id = viewer.member_id()?;
        attendance::regenerate(&state.db, &viewer, &state.config.secret_key, member_id).await?;
        Ok(Redirect::to("/me/qr"))
    }
}

mod api {
    use super::*;

    pub async fn for_event(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(attendance::for_event(&state.db, &viewer, id).await?))
    }

    pub async fn check_in(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
        Json(input): Json<CheckInInput>,
    ) -> Result<impl IntoResponse, AppError> {
        let record =
            attendance::check_in(&state.db, &viewer, &state.config.secret_key, id, input).await?;
        Ok((StatusCode::CREATED, Json(record)))
    }

    /// Lets a scanner confirm who a code belongs to before checking in.
    pub async fn validate(
        State(state): State<AppState>,
        viewer: Viewer,
        Json(input): Json<TokenInput>,
    ) -> Result<impl IntoResponse, AppError> {
        viewer.require(
            Role::can_check_in,
            "check people in",
        )?;
        let member =
            attendance::validate(&state.db, &state.config.secret_key, &input.token).await?;
        Ok(Json(crate::members::redact(&viewer, member)))
    }

    pub async fn qr_code(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(
            attendance::qr_code(&state.db, &viewer, &state.config.secret_key, id).await?,
        ))
    }

    pub async fn regenerate(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(
            attendance::regenerate(&state.db, &viewer, &state.config.secret_key, id).await?,
        ))
    }

    pub async fn history(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(attendance::history(&state.db, &viewer, id).await?))
    }
}
