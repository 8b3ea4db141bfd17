use axum::{
    Form, Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect},
    routing::{get, post, put},
};
use minijinja::context;
use sea_orm::Iterable;

use super::page;
use crate::{
    auth::{PageViewer, Viewer, accounts},
    entities::sea_orm_active_enums::{InterviewStatus, Role},
    error::{AppError, PageError},
    onboarding::{
        self, EnrollInput, InterviewInput, OutcomeInput, RescheduleInput,
        courses::{self, CourseInput, LessonInput},
    },
    router::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/onboarding", get(self::get::board))
        .route("/onboarding/me", get(self::get::mine))
        .route("/onboarding/members/{id}", get(self::get::progress))
        .route("/onboarding/members/{id}/enroll", post(self::post::enroll))
        .route("/onboarding/members/{id}/interview", post(self::post::interview))
        .route("/onboarding/members/{id}/deactivate", post(self::post::deactivate))
        .route("/onboarding/members/{id}/reactivate", post(self::post::reactivate))
        .route("/onboarding/lessons/{id}/complete", post(self::post::complete))
        .route("/onboarding/lessons/{id}/miss", post(self::post::miss))
        .route("/onboarding/lessons/{id}/reschedule", post(self::post::reschedule))
        .route("/onboarding/interviews/{id}/outcome", post(self::post::outcome))
        .route(
            "/onboarding/courses",
            get(self::get::courses).post(self::post::create_course),
        )
        .route(
            "/onboarding/courses/{id}",
            get(self::get::course).post(self::post::update_course),
        )
        .route("/onboarding/courses/{id}/lessons", post(self::post::add_lesson))
        .route(
            "/onboarding/courses/{course_id}/lessons/{id}",
            post(self::post::update_lesson),
        )
        .route(
            "/onboarding/courses/{course_id}/lessons/{id}/remove",
            post(self::post::remove_lesson),
        )
        .route("/api/v1/onboarding/board", get(api::board))
        .route("/api/v1/onboarding/members/{id}", get(api::progress))
        .route("/api/v1/onboarding/members/{id}/enroll", post(api::enroll))
        .route("/api/v1/onboarding/members/{id}/interview", post(api::interview))
        .route("/api/v1/onboarding/members/{id}/deactivate", post(api::deactivate))
        .route("/api/v1/onboarding/members/{id}/reactivate", post(api::reactivate))
        .route("/api/v1/onboarding/lessons/{id}/complete", post(api::complete))
        .route("/api/v1/onboarding/lessons/{id}/miss", post(api::miss))
        .route("/api/v1/onboarding/lessons/{id}/reschedule", post(api::reschedule))
        .route("/api/v1/onboarding/interviews/{id}/outcome", post(api::outcome))
        .route("/api/v1/courses", get(api::courses).post(api::create_course))
        .route("/api/v1/courses/{id}", get(api::course).put(api::update_course))
        .route("/api/v1/courses/{id}/lessons", post(api::add_lesson))
        .route(
            "/api/v1/lessons/{id}",
            put(api::update_lesson).delete(api::remove_lesson),
        )
}

mod get {
    use super::*;

    pub async fn board(
        State(state): State<AppState>,
        viewer: PageViewer,
    ) -> Result<impl IntoResponse, PageError> {
        let columns = onboarding::board(&state.db, &viewer).await?;
        page(
            &state,
            &viewer,
            "onboarding/board.html",
            context! { active => "onboarding", columns => columns },
        )
    }

    pub async fn mine(viewer: PageViewer) -> Result<Redirect, PageError> {
        let member_id = viewer.member_id()?;
        Ok(Redirect::to(&format!("/onboarding/members/{member_id}")))
    }

    pub async fn progress(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
    ) -> Result<impl IntoResponse, PageError> {
        let progress = onboarding::progress(&state.db, &viewer, id).await?;
        let manages = viewer.role().can_manage_onboarding();
        let (courses, interviewers) = if manages {
            (courses::list(&state.db).await?, accounts::staff(&state.db).await?)
        } else {
            (Vec::new(), Vec::new())
        };
        page(
            &state,
            &viewer,
            "onboarding/progress.html",
            context! {
                active => "onboarding",
                progress => progress,
                courses => courses,
                interviewers => interviewers,
                outcomes => InterviewStatus::iter()
                    .filter(|s| *s != InterviewStatus::Scheduled)
                    .collect::<Vec<_>>(),
                can_manage => manages,
            },
        )
    }

    pub async fn courses(
        State(state): State<AppState>,
        viewer: PageViewer,
    ) -> Result<impl IntoResponse, PageError> {
        viewer.require(Role::can_manage_onboarding, "manage courses")?;
        let courses = courses::list(&state.db).await?;
        page(
            &state,
            &viewer,
            "onboarding/courses.html",
            context! { active => "onboarding", courses => courses },
        )
    }

    pub async fn course(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
    ) -> Result<impl IntoResponse, PageError> {
        viewer.require(Role::can_manage_onboarding, "manage courses")?;
        let course = courses::get(&state.db, id).await?;
        page(
            &state,
            &viewer,
            "onboarding/course.html",
            context! { active => "onboarding", course => course },
        )
    }
}

mod post {
    use super::*;

    fn to_member(member_id: i32) -> Redirect {
        Redirect::to(&format!("/onboarding/members/{member_id}"))
    }

    pub async fn enroll(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
        Form(input): Form<EnrollInput>,
    ) -> Result<Redirect, PageError> {
        onboarding::enroll(&state.db, &viewer, id, input).await?;
        Ok(to_member(id))
    }

    pub async fn interview(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
        Form(input): Form<InterviewInput>,
    ) -> Result<Redirect, PageError> {
        onboarding::schedule_interview(&state.db, &viewer, id, input).await?;
        Ok(to_member(id))
    }

    pub async fn deactivate(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
    ) -> Result<Redirect, PageError> {
        onboarding::deactivate(&state.db, &viewer, id).await?;
        Ok(Redirect::to(&format!("/members/{id}")))
    }

    pub async fn reactivate(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
    ) -> Result<Redirect, PageError> {
        onboarding::reactivate(&state.db, &viewer, id).await?;
        Ok(Redirect::to(&format!("/members/{id}")))
    }

    pub async fn complete(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
    ) -> Result<Redirect, PageError> {
        let booking = onboarding::complete_lesson(&state.db, &viewer, id).await?;
        Ok(to_member(booking.member_id))
    }

    pub async fn miss(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
    ) -> Result<Redirect, PageError> {
        let booking = onboarding::miss_lesson(&state.db, &viewer, id).await?;
        Ok(to_member(booking.member_id))
    }

    pub async fn reschedule(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
        Form(input): Form<RescheduleInput>,
    ) -> Result<Redirect, PageError> {
        let booking = onboarding::reschedule_lesson(&state.db, &viewer, id, input).await?;
        Ok(to_member(booking.member_id))
    }

    pub async fn outcome(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
        Form(input): Form<OutcomeInput>,
    ) -> Result<Redirect, PageError> {
        let interview = onboarding::record_outcome(&state.db, &viewer, id, input).await?;
        Ok(to_member(interview.member_id))
    }

    pub async fn create_course(
        State(state): State<AppState>,
        viewer: PageViewer,
        Form(input): Form<CourseInput>,
    ) -> Result<Redirect, PageError> {
        let course = courses::create(&state.db, &viewer, input).await?;
        Ok(Redirect::to(&format!("/onboarding/courses/{}", course.id)))
    }

    pub async fn update_course(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
        Form(input): Form<CourseInput>,
    ) -> Result<Redirect, PageError> {
        courses::update(&state.db, &viewer, id, input).await?;
        Ok(Redirect::to(&format!("/onboarding/courses/{id}")))
    }

    pub async fn add_lesson(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
        Form(input): Form<LessonInput>,
    ) -> Result<Redirect, PageError> {
        courses::add_lesson(&state.db, &viewer, id, input).await?;
        Ok(Redirect::to(&format!("/onboarding/courses/{id}")))
    }

    pub async fn update_lesson(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path((course_id, id)): Path<(i32, i32)>,
        Form(input): Form<LessonInput>,
    ) -> Result<Redirect, PageError> {
        courses::update_lesson(&state.db, &viewer, id, input).await?;
        Ok(Redirect::to(&format!("/onboarding/courses/{course_id}")))
    }

    pub async fn remove_lesson(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path((course_id, id)): Path<(i32, i32)>,
    ) -> Result<Redirect, PageError> {
        courses::remove_lesson(&state.db, &viewer, id).await?;
        Ok(Redirect::to(&format!("/onboarding/courses/{course_id}")))
    }
}

mod api {
    use super::*;

    pub async fn board(
        State(state): State<AppState>,
        viewer: Viewer,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(onboarding::board(&state.db, &viewer).await?))
    }

    pub async fn progress(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(onboarding::progress(&state.db, &viewer, id).await?))
    }

    pub async fn enroll(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
        Json(input): Json<EnrollInput>,
    ) -> Result<impl IntoResponse, AppError> {
        let bookings = onboarding::enroll(&state.db, &viewer, id, input).await?;
        Ok((StatusCode::CREATED, Json(bookings)))
    }

    pub async fn interview(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
        Json(input): Json<InterviewInput>,
    ) -> Result<impl IntoResponse, AppError> {
        let interview = onboarding::schedule_interview(&state.db, &viewer, id, input).await?;
        Ok((StatusCode::CREATED, Json(interview)))
    }

    pub async fn deactivate(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(onboarding::deactivate(&state.db, &viewer, id).await?))
    }

    pub async fn reactivate(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(onboarding::reactivate(&state.db, &viewer, id).await?))
    }

    pub async fn complete(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(onboarding::complete_lesson(&state.db, &viewer, id).await?))
    }

    pub async fn miss(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(onboarding::miss_lesson(&state.db, &viewer, id).await?))
    }

    pub async fn reschedule(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
        Json(input): Json<RescheduleInput>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(onboarding::reschedule_lesson(&state.db, &viewer, id, input).await?))
    }

    pub async fn outcome(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
        Json(input): Json<OutcomeInput>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(onboarding::record_outcome(&state.db, &viewer, id, input).await?))
    }

    pub async fn courses(
        State(state): State<AppState>,
        viewer: Viewer,
    ) -> Result<impl IntoResponse, AppError> {
        viewer.require(Role::can_manage_onboarding, "manage courses")?;
        Ok(Json(courses::list(&state.db).await?))
    }

    pub async fn course(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
    ) -> Result<impl IntoResponse, AppError> {
        viewer.require(Role::can_manage_onboarding, "manage courses")?;
        Ok(Json(courses::get(&state.db, id).await?))
    }

    pub async fn create_course(
        State(state): State<AppState>,
        viewer: Viewer,
        Json(input): Json<CourseInput>,
    ) -> Result<impl IntoResponse, AppError> {
        let course = courses::create(&state.db, &viewer, input).await?;
        Ok((StatusCode::CREATED, Json(course)))
    }

    pub async fn update_course(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
        Json(input): Json<CourseInput>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(courses::update(&state.db, &viewer, id, input).await?))
    }

    pub async fn add_lesson(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
        Json(input): Json<LessonInput>,
    ) -> Result<impl IntoResponse, AppError> {
        let lesson = courses::add_lesson(&state.db, &viewer, id, input).await?;
        Ok((StatusCode::CREATED, Json(lesson)))
    }

    pub async fn update_lesson(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
        Json(input): Json<LessonInput>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(courses::update_lesson(&state.db, &viewer, id, input).await?))
    }

    pub async fn remove_lesson(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
    ) -> Result<impl IntoResponse, AppError> {
        courses::remove_lesson(&state.db, &viewer, id).await?;
        Ok(StatusCode::NO_CONTENT)
    }
}
