use axum::{
    Form, Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect},
    routing::{delete, get, post},
};
use chrono::{Duration, NaiveDate};
use minijinja::context;
use serde::Deserialize;

use super::{ShowAll, page};
use crate::{
    auth::{PageViewer, Viewer},
    core::{export::CsvExport, now},
    error::{AppError, PageError},
    members,
    router::AppState,
    util::{
        form::empty_as_none,
        pagination::{MAX_PER_PAGE, PageParams},
    },
    volunteers::{
        self, DateRange, PositionInput, ScheduleInput,
        availability::{self, UnavailabilityInput},
        swaps::{self, SwapRequest},
    },
};

const ROTA_DAYS: i64 = 28;

/// Optional bounds; a missing end runs four weeks past the start.
#[derive(Debug, Default, Deserialize)]
pub struct RangeQuery {
    #[serde(default, deserialize_with = "empty_as_none")]
    pub from: Option<NaiveDate>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub to: Option<NaiveDate>,
}

impl RangeQuery {
    fn range(&self) -> DateRange {
        let from = self.from.unwrap_or_else(|| now().date());
        DateRange {
            from,
            to: self.to.unwrap_or(from + Duration::days(ROTA_DAYS - 1)),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Answer {
    pub accept: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct WhoQuery {
    #[serde(default, deserialize_with = "empty_as_none")]
    pub member_id: Option<i32>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/volunteers", get(self::get::rota))
        .route("/volunteers/mine", get(self::get::mine))
        .route("/volunteers/export.csv", get(self::get::export))
        .route(
            "/volunteers/positions",
            get(self::get::positions).post(self::post::create_position),
        )
        .route("/volunteers/positions/{id}", post(self::post::update_position))
        .route("/volunteers/schedule", post(self::post::schedule))
        .route("/volunteers/schedule/{id}/accept", post(self::post::accept))
        .route("/volunteers/schedule/{id}/decline", post(self::post::decline))
        .route("/volunteers/schedule/{id}/complete", post(self::post::complete))
        .route("/volunteers/schedule/{id}/remove", post(self::post::unschedule))
        .route("/volunteers/schedule/{id}/swap", post(self::post::request_swap))
        .route("/volunteers/swaps/{id}/accept", post(self::post::accept_swap))
        .route("/volunteers/swaps/{id}/decline", post(self::post::decline_swap))
        .route("/volunteers/swaps/{id}/cancel", post(self::post::cancel_swap))
        .route("/volunteers/availability", post(self::post::add_unavailable))
        .route(
            "/volunteers/availability/{id}/remove",
            post(self::post::remove_unavailable),
        )
        .route(
            "/api/v1/volunteers/positions",
            get(api::positions).post(api::create_position),
        )
        .route("/api/v1/volunteers/positions/{id}", axum::routing::put(api::update_position))
        .route("/api/v1/volunteers/rota", get(api::rota))
        .route("/api/v1/volunteers/schedules", post(api::schedule))
        .route("/api/v1/volunteers/schedules/mine", get(api::my_schedule))
        .route("/api/v1/volunteers/schedules/{id}", delete(api::unschedule))
        .route("/api/v1/volunteers/schedules/{id}/respond", post(api::respond))
        .route("/api/v1/volunteers/schedules/{id}/complete", post(api::complete))
        .route("/api/v1/volunteers/schedules/{id}/swaps", post(api::request_swap))
        .route("/api/v1/volunteers/swaps", get(api::open_swaps))
        .route("/api/v1/volunteers/swaps/mine", get(api::my_swaps))
        .route("/api/v1/volunteers/swaps/{id}/accept", post(api::accept_swap))
        .route("/api/v1/volunteers/swaps/{id}/decline", post(api::decline_swap))
        .route("/api/v1/volunteers/swaps/{id}/cancel", post(api::cancel_swap))
        .route(
            "/api/v1/volunteers/availability",
            get(api::availability).post(api::add_unavailable),
        )
        .route("/api/v1/volunteers/availability/{id}", delete(api::remove_unavailable))
}

mod get {
    use super::*;

    pub async fn rota(
        State(state): State<AppState>,
        viewer: PageViewer,
        Query(query): Query<RangeQuery>,
    ) -> Result<impl IntoResponse, PageError> {
        let range = query.range();
        let slots = volunteers::rota(&state.db, range).await?;
        let can_manage = viewer.role().can_manage_volunteers();
        let (positions, roster) = if can_manage {
            let directory = members::list(
                &state.db,
                &viewer,
                &members::DirectoryFilter::default(),
                PageParams {
                    page: Some(1),
                    per_page: Some(MAX_PER_PAGE),
                },
            )
            .await?;
            (volunteers::list_positions(&state.db, false).await?, directory.items)
        } else {
            (Vec::new(), Vec::new())
        };
        page(
            &state,
            &viewer,
            "volunteers/rota.html",
            context! {
                active => "volunteers",
                slots => slots,
                from => range.from,
                to => range.to,
                positions => positions,
                roster => roster,
                can_manage => can_manage,
            },
        )
    }

    pub async fn mine(
        State(state): State<AppState>,
        viewer: PageViewer,
    ) -> Result<impl IntoResponse, PageError> {
        let member_id = viewer.member_id()?;
        let shifts = volunteers::upcoming_for_member(&state.db, member_id).await?;
        let unavailable = availability::list_for(&state.db, &viewer, member_id).await?;
        let open_swaps = swaps::open_for(&state.db, &viewer).await?;
        let my_swaps = swaps::mine(&state.db, &viewer).await?;
        page(
            &state,
            &viewer,
            "volunteers/mine.html",
            context! {
                active => "volunteers",
                shifts => shifts,
                unavailable => unavailable,
                open_swaps => open_swaps,
                my_swaps => my_swaps,
                today => now().date(),
            },
        )
    }

    pub async fn positions(
        State(state): State<AppState>,
        viewer: PageViewer,
    ) -> Result<impl IntoResponse, PageError> {
        let positions = volunteers::list_positions(&state.db, true).await?;
        let groups = members::groups::list(&state.db, false).await?;
        page(
            &state,
            &viewer,
            "volunteers/positions.html",
            context! {
                active => "volunteers",
                positions => positions,
                groups => groups,
                can_manage => viewer.role().can_manage_volunteers(),
            },
        )
    }

    pub async fn export(
        State(state): State<AppState>,
        viewer: PageViewer,
        Query(query): Query<RangeQuery>,
    ) -> Result<impl IntoResponse, PageError> {
        let range = query.range();
        let bytes = volunteers::export_csv(&state.db, &viewer, range).await?;
        Ok(CsvExport::new("rota", range.from, bytes))
    }
}

mod post {
    use super::*;

    pub async fn create_position(
        State(state): State<AppState>,
        viewer: PageViewer,
        Form(input): Form<PositionInput>,
    ) -> Result<Redirect, PageError> {
        volunteers::create_position(&state.db, &viewer, input).await?;
        Ok(Redirect::to("/volunteers/positions"))
    }

    pub async fn update_position(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
        Form(input): Form<PositionInput>,
    ) -> Result<Redirect, PageError> {
        volunteers::update_position(&state.db, &viewer, id, input).await?;
        Ok(Redirect::to("/volunteers/positions"))
    }

    pub async fn schedule(
        State(state): State<AppState>,
        viewer: PageViewer,
        Form(input): Form<ScheduleInput>,
    ) -> Result<Redirect, PageError> {
        let serve_date = input.serve_date;
        volunteers::schedule(&state.db, &viewer, input).await?;
        Ok(Redirect::to(&format!("/volunteers?from={serve_date}")))
    }

    pub async fn accept(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
    ) -> Result<Redirect, PageError> {
        volunteers::respond(&state.db, &viewer, id, true).await?;
        Ok(Redirect::to("/volunteers/mine"))
    }

    pub async fn decline(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
    ) -> Result<Redirect, PageError> {
        volunteers::respond(&state.db, &viewer, id, false).await?;
        Ok(Redirect::to("/volunteers/mine"))
    }

    pub async fn complete(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
    ) -> Result<Redirect, PageError> {
        volunteers::complete(&state.db, &viewer, id).await?;
        Ok(Redirect::to("/volunteers"))
    }

    pub async fn unschedule(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
    ) -> Result<Redirect, PageError> {
        volunteers::unschedule(&state.db, &viewer, id).await?;
        Ok(Redirect::to("/volunteers"))
    }

    pub async fn request_swap(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
        Form(input): Form<SwapRequest>,
    ) -> Result<Redirect, PageError> {
        swaps::request(&state.db, &viewer, id, input).await?;
        Ok(Redirect::to("/volunteers/mine"))
    }

    pub async fn accept_swap(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
    ) -> Result<Redirect, PageError> {
        swaps::accept(&state.db, &viewer, id).await?;
        Ok(Redirect::to("/volunteers/mine"))
    }

    pub async fn decline_swap(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
    ) -> Result<Redirect, PageError> {
        swaps::decline(&state.db, &viewer, id).await?;
        Ok(Redirect::to("/volunteers/mine"))
    }

    pub async fn cancel_swap(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
    ) -> Result<Redirect, PageError> {
        swaps::cancel(&state.db, &viewer, id).await?;
        Ok(Redirect::to("/volunteers/mine"))
    }

    pub async fn add_unavailable(
        State(state): State<AppState>,
        viewer: PageViewer,
        Form(input): Form<UnavailabilityInput>,
    ) -> Result<Redirect, PageError> {
        availability::add(&state.db, &viewer, input).await?;
        Ok(Redirect::to("/volunteers/mine"))
    }

    pub async fn remove_unavailable(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
    ) -> Result<Redirect, PageError> {
        availability::remove(&state.db, &viewer, id).await?;
        Ok(Redirect::to("/volunteers/mine"))
    }
}

mod api {
    use super::*;

    pub async fn positions(
        State(state): State<AppState>,
        _viewer: Viewer,
        Query(show): Query<ShowAll>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(volunteers::list_positions(&state.db, show.all).await?))
    }

    pub async fn create_position(
        State(state): State<AppState>,
        viewer: Viewer,
        Json(input): Json<PositionInput>,
    ) -> Result<impl IntoResponse, AppError> {
        let position = volunteers::create_position(&state.db, &viewer, input).await?;
        Ok((StatusCode::CREATED, Json(position)))
    }

    pub async fn update_position(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
        Json(input): Json<PositionInput>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(volunteers::update_position(&state.db, &viewer, id, input).await?))
    }

    pub async fn rota(
        State(state): State<AppState>,
        _viewer: Viewer,
        Query(query): Query<RangeQuery>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(volunteers::rota(&state.db, query.range()).await?))
    }

    pub async fn schedule(
        State(state): State<AppState>,
        viewer: Viewer,
        Json(input): Json<ScheduleInput>,
    ) -> Result<impl IntoResponse, AppError> {
        let assignment = volunteers::schedule(&state.db, &viewer, input).await?;
        Ok((StatusCode::CREATED, Json(assignment)))
    }

    pub async fn my_schedule(
        State(state): State<AppState>,
        viewer: Viewer,
    ) -> Result<impl IntoResponse, AppError> {
        let member_id = viewer.member_id()?;
        Ok(Json(volunteers::upcoming_for_member(&state.db, member_id).await?))
    }

    pub async fn unschedule(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
    ) -> Result<impl IntoResponse, AppError> {
        volunteers::unschedule(&state.db, &viewer, id).await?;
        Ok(StatusCode::NO_CONTENT)
    }

    pub async fn respond(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
        Json(answer): Json<Answer>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(volunteers::respond(&state.db, &viewer, id, answer.accept).await?))
    }

    pub async fn complete(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(volunteers::complete(&state.db, &viewer, id).await?))
    }

    pub async fn request_swap(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
        Json(input): Json<SwapRequest>,
    ) -> Result<impl IntoResponse, AppError> {
        let swap = swaps::request(&state.db, &viewer, id, input).await?;
        Ok((StatusCode::CREATED, Json(swap)))
    }

    pub async fn open_swaps(
        State(state): State<AppState>,
        viewer: Viewer,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(swaps::open_for(&state.db, &viewer).await?))
    }

    pub async fn my_swaps(
        State(state): State<AppState>,
        viewer: Viewer,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(swaps::mine(&state.db, &viewer).await?))
    }

    pub async fn accept_swap(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(swaps::accept(&state.db, &viewer, id).await?))
    }

    pub async fn decline_swap(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(swaps::decline(&state.db, &viewer, id).await?))
    }

    pub async fn cancel_swap(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(swaps::cancel(&state.db, &viewer, id).await?))
    }

    pub async fn availability(
        State(state): State<AppState>,
        viewer: Viewer,
        Query(who): Query<WhoQuery>,
    ) -> Result<impl IntoResponse, AppError> {
        let member_id = match who.member_id {
            Some(id) => id,
            None => viewer.member_id()?,
        };
        Ok(Json(availability::list_for(&state.db, &viewer, member_id).await?))
    }

    pub async fn add_unavailable(
        State(state): State<AppState>,
        viewer: Viewer,
        Json(input): Json<UnavailabilityInput>,
    ) -> Result<impl IntoResponse, AppError> {
        let day = availability::add(&state.db, &viewer, input).await?;
        Ok((StatusCode::CREATED, Json(day)))
    }

    pub async fn remove_unavailable(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
    ) -> Result<impl IntoResponse, AppError> {
        availability::remove(&state.db, &viewer, id).await?;
        Ok(StatusCode::NO_CONTENT)
    }
}
