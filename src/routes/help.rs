use axum::{
    Form, Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect},
    routing::{get, post},
};
use minijinja::context;
use sea_orm::Iterable;

use super::page;
use crate::{
    auth::{PageViewer, Viewer, accounts},
    entities::sea_orm_active_enums::{HelpCategory, HelpStatus, Urgency},
    error::{AppError, PageError},
    help_requests::{
        self, AssignInput, CommentInput, HelpFilter, HelpRequestInput, StatusInput,
    },
    router::AppState,
    util::pagination::PageParams,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/help", get(self::get::list).post(self::post::create))
        .route("/help/new", get(self::get::new_request))
        .route("/help/{id}", get(self::get::detail).post(self::post::update))
        .route("/help/{id}/assign", post(self::post::assign))
        .route("/help/{id}/status", post(self::post::status))
        .route("/help/{id}/comments", post(self::post::comment))
        .route("/api/v1/help-requests", get(api::list).post(api::create))
        .route("/api/v1/help-requests/{id}", get(api::get).put(api::update))
        .route("/api/v1/help-requests/{id}/assign", post(api::assign))
        .route("/api/v1/help-requests/{id}/status", post(api::status))
        .route("/api/v1/help-requests/{id}/comments", post(api::comment))
}

fn choices() -> minijinja::Value {
    context! {
        categories => HelpCategory::iter().collect::<Vec<_>>(),
        urgencies => Urgency::iter().collect::<Vec<_>>(),
        statuses => HelpStatus::iter().collect::<Vec<_>>(),
    }
}

mod get {
    use super::*;

    pub async fn list(
        State(state): State<AppState>,
        viewer: PageViewer,
        Query(filter): Query<HelpFilter>,
        Query(params): Query<PageParams>,
    ) -> Result<impl IntoResponse, PageError> {
        let requests = help_requests::list(&state.db, &viewer, &filter, params).await?;
        page(
            &state,
            &viewer,
            "help/list.html",
            context! {
                active => "help",
                requests => requests,
                status => filter.status,
                category => filter.category,
                urgency => filter.urgency,
                ..choices()
            },
        )
    }

    pub async fn new_request(
        State(state): State<AppState>,
        viewer: PageViewer,
    ) -> Result<impl IntoResponse, PageError> {
        page(&state, &viewer, "help/form.html", context! { active => "help", ..choices() })
    }

    pub async fn detail(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
    ) -> Result<impl IntoResponse, PageError> {
        let detail = help_requests::get(&state.db, &viewer, id).await?;
        let staff = if viewer.role().can_manage_help_requests() {
            accounts::staff(&state.db).await?
        } else {
            Vec::new()
        };
        let next: Vec<HelpStatus> = HelpStatus::iter()
            .filter(|to| help_requests::allowed(detail.request.status, *to))
            .collect();
        page(
            &state,
            &viewer,
            "help/show.html",
            context! {
                active => "help",
                detail => detail,
                staff => staff,
                next_statuses => next,
                ..choices()
            },
        )
    }
}

mod post {
    use super::*;

    pub async fn create(
        State(state): State<AppState>,
        viewer: PageViewer,
        Form(input): Form<HelpRequestInput>,
    ) -> Result<Redirect, PageError> {
        let request = help_requests::create(&state.db, &viewer, input).await?;
        Ok(Redirect::to(&format!("/help/{}", request.id)))
    }

    pub async fn update(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
        Form(input): Form<HelpRequestInput>,
    ) -> Result<Redirect, PageError> {
        help_requests::update(&state.db, &viewer, id, input).await?;
        Ok(Redirect::to(&format!("/help/{id}")))
    }

    pub async fn assign(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
        Form(input): Form<AssignInput>,
    ) -> Result<Redirect, PageError> {
        help_requests::assign(&state.db, &viewer, id, input).await?;
        Ok(Redirect::to(&format!("/help/{id}")))
    }

    pub async fn status(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
        Form(input): Form<StatusInput>,
    ) -> Result<Redirect, PageError> {
        help_requests::change_status(&state.db, &viewer, id, input.status).await?;
        Ok(Redirect::to(&format!("/help/{id}")))
    }

    pub async fn comment(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
        Form(input): Form<CommentInput>,
    ) -> Result<Redirect, PageError> {
        help_requests::comment(&state.db, &viewer, id, input).await?;
        Ok(Redirect::to(&format!("/help/{id}")))
    }
}

mod api {
    use super::*;

    pub async fn list(
        State(state): State<AppState>,
        viewer: Viewer,
        Query(filter): Query<HelpFilter>,
        Query(params): Query<PageParams>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(help_requests::list(&state.db, &viewer, &filter, params).await?))
    }

    pub async fn get(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(help_requests::get(&state.db, &viewer, id).await?))
    }

    pub async fn create(
        State(state): State<AppState>,
        viewer: Viewer,
        Json(input): Json<HelpRequestInput>,
    ) -> Result<impl IntoResponse, AppError> {
        let request = help_requests::create(&state.db, &viewer, input).await?;
        Ok((StatusCode::CREATED, Json(request)))
    }

    pub async fn update(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
        Json(input): Json<HelpRequestInput>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(help_requests::update(&state.db, &viewer, id, input).await?))
    }

    pub async fn assign(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
        Json(input): Json<AssignInput>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(help_requests::assign(&state.db, &viewer, id, input).await?))
    }

    pub async fn status(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
        Json(input): Json<StatusInput>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(help_requests::change_status(&state.db, &viewer, id, input.status).await?))
    }

    pub async fn comment(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
        Json(input): Json<CommentInput>,
    ) -> Result<impl IntoResponse, AppError> {
        let comment = help_requests::comment(&state.db, &viewer, id, input).await?;
        Ok((StatusCode::CREATED, Json(comment)))
    }
}
