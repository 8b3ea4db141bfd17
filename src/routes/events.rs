use axum::{
    Form, Json, Router,
    extract::{Path, Query, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Redirect},
    routing::{get, post},
};
use minijinja::context;
use sea_orm::Iterable;
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};

use super::page;
use crate::{
    auth::{PageViewer, Viewer},
    entities::sea_orm_active_enums::{RsvpResponse, Role},
    error::{AppError, PageError},
    events::{self, EventInput, RsvpInput, Scope},
    router::AppState,
    util::{
        form::{choice, empty_as_none},
        pagination::PageParams,
    },
};

#[derive(Debug, Default, Deserialize)]
pub struct ScopeQuery {
    #[serde(default, deserialize_with = "choice")]
    pub scope: Option<Scope>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OnBehalf {
    #[serde(default, deserialize_with = "empty_as_none")]
    pub member_id: Option<i32>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/events", get(self::get::list).post(self::post::create))
        .route("/events/new", get(self::get::new_event))
        .route("/events/{id}", get(self::get::detail).post(self::post::update))
        .route("/events/{id}/edit", get(self::get::edit))
        .route("/events/{id}/cancel", post(self::post::cancel))
        .route("/events/{id}/rsvp", post(self::post::rsvp))
        .route("/events/{id}/rsvp/withdraw", post(self::post::withdraw))
        // Embeddable calendar feed for the church website.
        .route(
            "/api/v1/public/events",
            get(api::public).layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods([Method::GET]),
            ),
        )
        .route("/api/v1/events", get(api::list).post(api::create))
        .route("/api/v1/events/{id}", get(api::get).put(api::update))
        .route("/api/v1/events/{id}/cancel", post(api::cancel))
        .route(
            "/api/v1/events/{id}/rsvp",
            axum::routing::put(api::rsvp).delete(api::withdraw),
        )
        .route("/api/v1/events/{id}/attendees", get(api::attendees))
}

mod get {
    use super::*;

    pub async fn list(
        State(state): State<AppState>,
        viewer: PageViewer,
        Query(query): Query<ScopeQuery>,
        Query(params): Query<PageParams>,
    ) -> Result<impl IntoResponse, PageError> {
        let scope = query.scope.unwrap_or_default();
        let events = events::list(&state.db, scope, params).await?;
        page(
            &state,
            &viewer,
            "events/list.html",
            context! {
                active => "events",
                events => events,
                past => scope == Scope::Past,
                can_manage => viewer.role().can_manage_events(),
            },
        )
    }

    pub async fn new_event(
        State(state): State<AppState>,
        viewer: PageViewer,
    ) -> Result<impl IntoResponse, PageError> {
        viewer.require(Role::can_manage_events, "manage events")?;
        page(&state, &viewer, "events/form.html", context! { active => "events" })
    }

    pub async fn detail(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
    ) -> Result<impl IntoResponse, PageError> {
        let detail = events::get(&state.db, &viewer, id).await?;
        let role = viewer.role();
        let attendees = if role.can_manage_events() || role.can_check_in() {
            events::attendees(&state.db, &viewer, id).await?
        } else {
            Vec::new()
        };
        page(
            &state,
            &viewer,
            "events/show.html",
            context! {
                active => "events",
                detail => detail,
                attendees => attendees,
                responses => RsvpResponse::iter().collect::<Vec<_>>(),
                max_guests => events::MAX_GUESTS,
                can_manage => role.can_manage_events(),
                can_check_in => role.can_check_in(),
            },
        )
    }

    pub async fn edit(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
    ) -> Result<impl IntoResponse, PageError> {
        viewer.require(Role::can_manage_events, "manage events")?;
        let detail = events::get(&state.db, &viewer, id).await?;
        page(
            &state,
            &viewer,
            "events/form.html",
            context! { active => "events", event => detail.event },
        )
    }
}

mod post {
    use super::*;

    pub async fn create(
        State(state): State<AppState>,
        viewer: PageViewer,
        Form(input): Form<EventInput>,
    ) -> Result<Redirect, PageError> {
        let event = events::create(&state.db, &viewer, input).await?;
        Ok(Redirect::to(&format!("/events/{}", event.id)))
    }

    pub async fn update(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
        Form(input): Form<EventInput>,
    ) -> Result<Redirect, PageError> {
        events::update(&state.db, &viewer, id, input).await?;
        Ok(Redirect::to(&format!("/events/{id}")))
    }

    pub async fn cancel(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
    ) -> Result<Redirect, PageError> {
        events::cancel(&state.db, &viewer, id).await?;
        Ok(Redirect::to(&format!("/events/{id}")))
    }

    pub async fn rsvp(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
        Form(input): Form<RsvpInput>,
    ) -> Result<Redirect, PageError> {
        events::respond(&state.db, &viewer, id, input).await?;
        Ok(Redirect::to(&format!("/events/{id}")))
    }

    pub async fn withdraw(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
        Form(on_behalf): Form<OnBehalf>,
    ) -> Result<Redirect, PageError> {
        events::withdraw(&state.db, &viewer, id, on_behalf.member_id).await?;
        Ok(Redirect::to(&format!("/events/{id}")))
    }
}

mod api {
    use super::*;

    pub async fn public(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
        Ok(Json(events::public_upcoming(&state.db, 20).await?))
    }

    pub async fn list(
        State(state): State<AppState>,
        _viewer: Viewer,
        Query(query): Query<ScopeQuery>,
        Query(params): Query<PageParams>,
    ) -> Result<impl IntoResponse, AppError> {
        let scope = query.scope.unwrap_or_default();
        Ok(Json(events::list(&state.db, scope, params).await?))
    }

    pub async fn get(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(events::get(&state.db, &viewer, id).await?))
    }

    pub async fn create(
        State(state): State<AppState>,
        viewer: Viewer,
        Json(input): Json<EventInput>,
    ) -> Result<impl IntoResponse, AppError> {
        let event = events::create(&state.db, &viewer, input).await?;
        Ok((StatusCode::CREATED, Json(event)))
    }

    pub async fn update(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
        Json(input): Json<EventInput>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(events::update(&state.db, &viewer, id, input).await?))
    }

    pub async fn cancel(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(events::cancel(&state.db, &viewer, id).await?))
    }

    pub async fn rsvp(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
        Json(input): Json<RsvpInput>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(events::respond(&state.db, &viewer, id, input).await?))
    }

    pub async fn withdraw(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
        Query(on_behalf): Query<OnBehalf>,
    ) -> Result<impl IntoResponse, AppError> {
        events::withdraw(&state.db, &viewer, id, on_behalf.member_id).await?;
        Ok(StatusCode::NO_CONTENT)
    }

    pub async fn attendees(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(events::attendees(&state.db, &viewer, id).await?))
    }
}
