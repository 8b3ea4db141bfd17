use axum::{
    Form, Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect},
    routing::{get, post},
};
use minijinja::context;
use serde_json::json;

use super::page;
use crate::{
    auth::{PageViewer, Viewer},
    communication::{
        newsletters::{self, NewsletterInput, ScheduleInput},
        notifications::{self, NotificationFilter},
        preferences::{self, Preferences},
    },
    entities::sea_orm_active_enums::Role,
    error::{AppError, PageError},
    router::AppState,
    util::pagination::PageParams,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/newsletters", get(self::get::newsletters).post(self::post::create))
        .route("/newsletters/new", get(self::get::new_newsletter))
        .route("/newsletters/{id}", get(self::get::newsletter).post(self::post::update))
        .route("/newsletters/{id}/delete", post(self::post::delete))
        .route("/newsletters/{id}/schedule", post(self::post::schedule))
        .route("/newsletters/{id}/unschedule", post(self::post::unschedule))
        .route("/newsletters/{id}/send", post(self::post::send))
        .route("/communication", get(|| async { Redirect::to("/notifications") }))
        .route("/notifications", get(self::get::notifications))
        .route("/notifications/read-all", post(self::post::read_all))
        .route("/notifications/{id}/read", post(self::post::read))
        .route("/preferences", get(self::get::preferences).post(self::post::preferences))
        .route("/api/v1/newsletters", get(api::newsletters).post(api::create))
        .route(
            "/api/v1/newsletters/{id}",
            get(api::newsletter).put(api::update).delete(api::delete),
        )
        .route(
            "/api/v1/newsletters/{id}/schedule",
            post(api::schedule).delete(api::unschedule),
        )
        .route("/api/v1/newsletters/{id}/send", post(api::send))
        .route("/api/v1/notifications", get(api::notifications))
        .route("/api/v1/notifications/unread-count", get(api::unread_count))
        .route("/api/v1/notifications/read-all", post(api::read_all))
        .route("/api/v1/notifications/{id}/read", post(api::read))
        .route(
            "/api/v1/preferences",
            get(api::preferences).put(api::save_preferences),
        )
}

mod get {
    use super::*;

    pub async fn newsletters(
        State(state): State<AppState>,
        viewer: PageViewer,
        Query(params): Query<PageParams>,
    ) -> Result<impl IntoResponse, PageError> {
        let newsletters = newsletters::list(&state.db, &viewer, params).await?;
        page(
            &state,
            &viewer,
            "newsletters/list.html",
            context! { active => "newsletters", newsletters => newsletters },
        )
    }

    pub async fn new_newsletter(
        State(state): State<AppState>,
        viewer: PageViewer,
    ) -> Result<impl IntoResponse, PageError> {
        viewer.require(
            Role::can_send_communications,
            "manage newsletters",
        )?;
        page(&state, &viewer, "newsletters/form.html", context! { active => "newsletters" })
    }

    pub async fn newsletter(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
    ) -> Result<impl IntoResponse, PageError> {
        let newsletter = newsletters::get(&state.db, &viewer, id).await?;
        page(
            &state,
            &viewer,
            "newsletters/form.html",
            context! { active => "newsletters", newsletter => newsletter },
        )
    }

    pub async fn notifications(
        State(state): State<AppState>,
        viewer: PageViewer,
        Query(filter): Query<NotificationFilter>,
        Query(params): Query<PageParams>,
    ) -> Result<impl IntoResponse, PageError> {
        let member_id = viewer.member_id()?;
        let notifications = notifications::list_for(&state.db, member_id, &filter, params).await?;
        let unread = notifications::unread_count(&state.db, member_id).await?;
        page(
            &state,
            &viewer,
            "notifications.html",
            context! {
                active => "notifications",
                notifications => notifications,
                unread => unread,
                unread_only => filter.unread,
            },
        )
    }

    pub async fn preferences(
        State(state): State<AppState>,
        viewer: PageViewer,
    ) -> Result<impl IntoResponse, PageError> {
        let member_id = viewer.member_id()?;
        let prefs = preferences::load(&state.db, member_id).await?;
        page(
            &state,
            &viewer,
            "preferences.html",
            context! { active => "preferences", prefs => prefs },
        )
    }
}

mod post {
    use super::*;

    pub async fn create(
        State(state): State<AppState>,
        viewer: PageViewer,
        Form(input): Form<NewsletterInput>,
    ) -> Result<Redirect, PageError> {
        let newsletter = newsletters::create(&state.db, &viewer, input).await?;
        Ok(Redirect::to(&format!("/newsletters/{}", newsletter.id)))
    }

    pub async fn update(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
        Form(input): Form<NewsletterInput>,
    ) -> Result<Redirect, PageError> {
        newsletters::update(&state.db, &viewer, id, input).await?;
        Ok(Redirect::to(&format!("/newsletters/{id}")))
    }

    pub async fn delete(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
    ) -> Result<Redirect, PageError> {
        newsletters::delete(&state.db, &viewer, id).await?;
        Ok(Redirect::to("/newsletters"))
    }

    pub async fn schedule(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
        Form(input): Form<ScheduleInput>,
    ) -> Result<Redirect, PageError> {
        newsletters::schedule(&state.db, &viewer, id, input).await?;
        Ok(Redirect::to(&format!("/newsletters/{id}")))
    }

    pub async fn unschedule(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
    ) -> Result<Redirect, PageError> {
        newsletters::unschedule(&state.db, &viewer, id).await?;
        Ok(Redirect::to(&format!("/newsletters/{id}")))
    }

    pub async fn send(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
    ) -> Result<Redirect, PageError> {
        newsletters::send_now(&state.db, &state.mailer, &viewer, id).await?;
        Ok(Redirect::to(&format!("/newsletters/{id}")))
    }

    pub async fn read(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
    ) -> Result<Redirect, PageError> {
        let member_id = viewer.member_id()?;
        let notification = notifications::mark_read(&state.db, member_id, id).await?;
        Ok(Redirect::to(notification.link.as_deref().unwrap_or("/notifications")))
    }

    pub async fn read_all(
        State(state): State<AppState>,
        viewer: PageViewer,
    ) -> Result<Redirect, PageError> {
        let member_id = viewer.member_id()?;
        notifications::mark_all_read(&state.db, member_id).await?;
        Ok(Redirect::to("/notifications"))
    }

    pub async fn preferences(
        State(state): State<AppState>,
        viewer: PageViewer,
        Form(prefs): Form<Preferences>,
    ) -> Result<Redirect, PageError> {
        let member_id = viewer.member_id()?;
        preferences::save(&state.db, member_id, prefs).await?;
        Ok(Redirect::to("/preferences"))
    }
}

mod api {
    use super::*;

    pub async fn newsletters(
        State(state): State<AppState>,
        viewer: Viewer,
        Query(params): Query<PageParams>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(newsletters::list(&state.db, &viewer, params).await?))
    }

    pub async fn newsletter(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(newsletters::get(&state.db, &viewer, id).await?))
    }

    pub async fn create(
        State(state): State<AppState>,
        viewer: Viewer,
        Json(input): Json<NewsletterInput>,
    ) -> Result<impl IntoResponse, AppError> {
        let newsletter = newsletters::create(&state.db, &viewer, input).await?;
        Ok((StatusCode::CREATED, Json(newsletter)))
    }

    pub async fn update(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
        Json(input): Json<NewsletterInput>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(newsletters::update(&state.db, &viewer, id, input).await?))
    }

    pub async fn delete(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
    ) -> Result<impl IntoResponse, AppError> {
        newsletters::delete(&state.db, &viewer, id).await?;
        Ok(StatusCode::NO_CONTENT)
    }

    pub async fn schedule(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
        Json(input): Json<ScheduleInput>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(newsletters::schedule(&state.db, &viewer, id, input).await?))
    }

    pub async fn unschedule(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(newsletters::unschedule(&state.db, &viewer, id).await?))
    }

    pub async fn send(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(newsletters::send_now(&state.db, &state.mailer, &viewer, id).await?))
    }

    pub async fn notifications(
        State(state): State<AppState>,
        viewer: Viewer,
        Query(filter): Query<NotificationFilter>,
        Query(params): Query<PageParams>,
    ) -> Result<impl IntoResponse, AppError> {
        let member_id = viewer.member_id()?;
        Ok(Json(notifications::list_for(&state.db, member_id, &filter, params).await?))
    }

    pub async fn unread_count(
        State(state): State<AppState>,
        viewer: Viewer,
    ) -> Result<impl IntoResponse, AppError> {
        let member_id = viewer.member_id()?;
        let unread = notifications::unread_count(&state.db, member_id).await?;
        Ok(Json(json!({ "unread": unread })))
    }

    pub async fn read(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
    ) -> Result<impl IntoResponse, AppError> {
        let member_id = viewer.member_id()?;
        Ok(Json(notifications::mark_read(&state.db, member_id, id).await?))
    }

    pub async fn read_all(
        State(state): State<AppState>,
        viewer: Viewer,
    ) -> Result<impl IntoResponse, AppError> {
        let member_id = viewer.member_id()?;
        let marked = notifications::mark_all_read(&state.db, member_id).await?;
        Ok(Json(json!({ "marked": marked })))
    }

    pub async fn preferences(
        State(state): State<AppState>,
        viewer: Viewer,
    ) -> Result<impl IntoResponse, AppError> {
        let member_id = viewer.member_id()?;
        Ok(Json(preferences::load(&state.db, member_id).await?))
    }

    pub async fn save_preferences(
        State(state): State<AppState>,
        viewer: Viewer,
        Json(prefs): Json<Preferences>,
    ) -> Result<impl IntoResponse, AppError> {
        let member_id = viewer.member_id()?;
        Ok(Json(preferences::save(&state.db, member_id, prefs).await?))
    }
}
