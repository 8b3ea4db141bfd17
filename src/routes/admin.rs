//! Login accounts and the signed-in user's own password.

use axum::{
    Form, Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect},
    routing::{get, post, put},
};
use minijinja::context;
use sea_orm::Iterable;
use serde::Deserialize;

use super::page;
use crate::{
    auth::{
        PageViewer, Viewer,
        accounts::{self, NewUser, PasswordChange},
    },
    entities::sea_orm_active_enums::Role,
    error::{AppError, PageError},
    router::AppState,
    util::form::checkbox,
};

#[derive(Debug, Deserialize)]
pub struct RoleInput {
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct ActiveInput {
    #[serde(default, deserialize_with = "checkbox")]
    pub active: bool,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/admin/users", get(self::get::users).post(self::post::create))
        .route("/admin/users/{id}/role", post(self::post::role))
        .route("/admin/users/{id}/active", post(self::post::active))
        .route("/me", get(self::get::me))
        .route("/me/password", post(self::post::password))
        .route("/api/v1/me", get(api::me))
        .route("/api/v1/me/password", post(api::password))
        .route("/api/v1/users", get(api::users).post(api::create))
        .route("/api/v1/users/{id}/role", put(api::role))
        .route("/api/v1/users/{id}/active", put(api::active))
}

mod get {
    use super::*;

    pub async fn users(
        State(state): State<AppState>,
        viewer: PageViewer,
    ) -> Result<impl IntoResponse, PageError> {
        let users = accounts::list(&state.db, &viewer).await?;
        page(
            &state,
            &viewer,
            "admin/users.html",
            context! {
                active => "admin",
                users => users,
                roles => Role::iter().collect::<Vec<_>>(),
            },
        )
    }

    pub async fn me(
        State(state): State<AppState>,
        viewer: PageViewer,
    ) -> Result<impl IntoResponse, PageError> {
        page(
            &state,
            &viewer,
            "me.html",
            context! {
                active => "me",
                member => viewer.member.clone().map(|m| crate::members::redact(&viewer, m)),
            },
        )
    }
}

mod post {
    use super::*;

    pub async fn create(
        State(state): State<AppState>,
        viewer: PageViewer,
        Form(input): Form<NewUser>,
    ) -> Result<Redirect, PageError> {
        accounts::create(&state.db, &viewer, input).await?;
        Ok(Redirect::to("/admin/users"))
    }

    pub async fn role(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
        Form(input): Form<RoleInput>,
    ) -> Result<Redirect, PageError> {
        accounts::change_role(&state.db, &viewer, id, input.role).await?;
        Ok(Redirect::to("/admin/users"))
    }

    pub async fn active(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
        Form(input): Form<ActiveInput>,
    ) -> Result<Redirect, PageError> {
        accounts::set_active(&state.db, &viewer, id, input.active).await?;
        Ok(Redirect::to("/admin/users"))
    }

    pub async fn password(
        State(state): State<AppState>,
        viewer: PageViewer,
        Form(change): Form<PasswordChange>,
    ) -> Result<Redirect, PageError> {
        accounts::change_password(&state.db, &viewer, change).await?;
        // The session hash changed with the password, so sign in again.
        Ok(Redirect::to("/login?next=/me"))
    }
}

mod api {
    use super::*;

    pub async fn me(viewer: Viewer) -> impl IntoResponse {
        Json(viewer.context())
    }

    pub async fn password(
        State(state): State<AppState>,
        viewer: Viewer,
        Json(change): Json<PasswordChange>,
    ) -> Result<impl IntoResponse, AppError> {
        accounts::change_password(&state.db, &viewer, change).await?;
        Ok(StatusCode::NO_CONTENT)
    }

    pub async fn users(
        State(state): State<AppState>,
        viewer: Viewer,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(accounts::list(&state.db, &viewer).await?))
    }

    pub async fn create(
        State(state): State<AppState>,
        viewer: Viewer,
        Json(input): Json<NewUser>,
    ) -> Result<impl IntoResponse, AppError> {
        let user = accounts::create(&state.db, &viewer, input).await?;
        Ok((StatusCode::CREATED, Json(user)))
    }

    pub async fn role(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
        Json(input): Json<RoleInput>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(accounts::change_role(&state.db, &viewer, id, input.role).await?))
    }

    pub async fn active(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
        Json(input): Json<ActiveInput>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(accounts::set_active(&state.db, &viewer, id, input.active).await?))
    }
}
