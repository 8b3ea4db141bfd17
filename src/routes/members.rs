use axum::{
    Form, Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect},
    routing::{get, post},
};
use minijinja::context;
use sea_orm::Iterable;

use super::{MemberRef, ShowAll, page};
use crate::{
    auth::{PageViewer, Viewer},
    core::{export::CsvExport, now},
    entities::sea_orm_active_enums::{FamilyRole, GroupKind, MembershipStatus},
    error::{AppError, PageError},
    members::{
        self, ContactInput, DirectoryFilter, MemberInput,
        families::{self, Assignment, FamilyInput},
        groups::{self, GroupInput},
    },
    router::AppState,
    util::pagination::PageParams,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/members", get(self::get::directory).post(self::post::create))
        .route("/members/new", get(self::get::new_member))
        .route("/members/export.csv", get(self::get::export))
        .route("/members/{id}", get(self::get::profile).post(self::post::update))
        .route("/members/{id}/edit", get(self::get::edit))
        .route("/members/{id}/contact", post(self::post::contact))
        .route("/members/{id}/family", post(self::post::assign_family))
        .route("/members/{id}/delete", post(self::post::delete))
        .route("/members/{id}/restore", post(self::post::restore))
        .route("/families", get(self::get::families).post(self::post::create_family))
        .route("/families/{id}", get(self::get::family).post(self::post::update_family))
        .route("/groups", get(self::get::groups).post(self::post::create_group))
        .route("/groups/{id}", get(self::get::group).post(self::post::update_group))
        .route("/groups/{id}/members", post(self::post::add_to_group))
        .route(
            "/groups/{id}/members/{member_id}/remove",
            post(self::post::remove_from_group),
        )
        .route("/api/v1/members", get(api::list).post(api::create))
        .route(
            "/api/v1/members/{id}",
            get(api::get).put(api::update).delete(api::delete),
        )
        .route("/api/v1/members/{id}/contact", axum::routing::patch(api::contact))
        .route("/api/v1/members/{id}/restore", post(api::restore))
        .route("/api/v1/members/{id}/family", axum::routing::put(api::assign_family))
        .route("/api/v1/families", get(api::families).post(api::create_family))
        .route("/api/v1/families/{id}", get(api::family).put(api::update_family))
        .route("/api/v1/groups", get(api::groups).post(api::create_group))
        .route("/api/v1/groups/{id}", get(api::group).put(api::update_group))
        .route(
            "/api/v1/groups/{id}/members/{member_id}",
            post(api::add_to_group).delete(api::remove_from_group),
        )
}

fn form_choices() -> minijinja::Value {
    context! {
        statuses => MembershipStatus::iter().collect::<Vec<_>>(),
        family_roles => FamilyRole::iter().collect::<Vec<_>>(),
        group_kinds => GroupKind::iter().collect::<Vec<_>>(),
    }
}

mod get {
    use super::*;

    pub async fn directory(
        State(state): State<AppState>,
        viewer: PageViewer,
        Query(filter): Query<DirectoryFilter>,
        Query(params): Query<PageParams>,
    ) -> Result<impl IntoResponse, PageError> {
        let members = members::list(&state.db, &viewer, &filter, params).await?;
        let families = families::list(&state.db, &viewer).await?;
        page(
            &state,
            &viewer,
            "members/list.html",
            context! {
                active => "members",
                members => members,
                families => families,
                q => filter.q,
                status => filter.status,
                family_id => filter.family_id,
                include_inactive => filter.include_inactive,
                ..form_choices()
            },
        )
    }

    pub async fn new_member(
        State(state): State<AppState>,
        viewer: PageViewer,
    ) -> Result<impl IntoResponse, PageError> {
        let families = families::list(&state.db, &viewer).await?;
        page(
            &state,
            &viewer,
            "members/form.html",
            context! { active => "members", families => families, ..form_choices() },
        )
    }

    pub async fn profile(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
    ) -> Result<impl IntoResponse, PageError> {
        let member = members::get(&state.db, &viewer, id).await?;
        let family = match member.family_id {
            Some(family_id) => Some(families::get(&state.db, &viewer, family_id).await?),
            None => None,
        };
        let groups = groups::for_member(&state.db, id).await?;
        let families = families::list(&state.db, &viewer).await?;
        page(
            &state,
            &viewer,
            "members/show.html",
            context! {
                active => "members",
                member => member,
                family => family,
                groups => groups,
                families => families,
                is_self => viewer.is_self(id),
                can_manage => viewer.role().can_manage_members(),
                ..form_choices()
            },
        )
    }

    pub async fn edit(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
    ) -> Result<impl IntoResponse, PageError> {
        let member = members::get(&state.db, &viewer, id).await?;
        let families = families::list(&state.db, &viewer).await?;
        page(
            &state,
            &viewer,
            "members/form.html",
            context! {
                active => "members",
                member => member,
                families => families,
                ..form_choices()
            },
        )
    }

    pub async fn export(
        State(state): State<AppState>,
        viewer: PageViewer,
    ) -> Result<impl IntoResponse, PageError> {
        let bytes = members::export_csv(&state.db, &viewer).await?;
        Ok(CsvExport::new("members", now().date(), bytes))
    }

    pub async fn families(
        State(state): State<AppState>,
        viewer: PageViewer,
    ) -> Result<impl IntoResponse, PageError> {
        let families = families::list(&state.db, &viewer).await?;
        page(
            &state,
            &viewer,
            "families/list.html",
            context! {
                active => "families",
                families => families,
                can_manage => viewer.role().can_manage_members(),
            },
        )
    }

    pub async fn family(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
    ) -> Result<impl IntoResponse, PageError> {
        let household = families::get(&state.db, &viewer, id).await?;
        page(
            &state,
            &viewer,
            "families/show.html",
            context! {
                active => "families",
                household => household,
                can_manage => viewer.role().can_manage_members(),
            },
        )
    }

    pub async fn groups(
        State(state): State<AppState>,
        viewer: PageViewer,
        Query(show): Query<ShowAll>,
    ) -> Result<impl IntoResponse, PageError> {
        let groups = groups::list(&state.db, show.all).await?;
        page(
            &state,
            &viewer,
            "groups/list.html",
            context! {
                active => "groups",
                groups => groups,
                all => show.all,
                can_manage => viewer.role().can_manage_members(),
                ..form_choices()
            },
        )
    }

    pub async fn group(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
    ) -> Result<impl IntoResponse, PageError> {
        let detail = groups::get(&state.db, &viewer, id).await?;
        let is_leader = detail
            .group
            .leader_id
            .is_some_and(|leader_id| viewer.is_self(leader_id));
        page(
            &state,
            &viewer,
            "groups/show.html",
            context! {
                active => "groups",
                detail => detail,
                can_manage => is_leader || viewer.role().can_manage_members(),
                ..form_choices()
            },
        )
    }
}

mod post {
    use super::*;

    pub async fn create(
        State(state): State<AppState>,
        viewer: PageViewer,
        Form(input): Form<MemberInput>,
    ) -> Result<Redirect, PageError> {
        let member = members::create(&state.db, &viewer, input).await?;
        Ok(Redirect::to(&format!("/members/{}", member.id)))
    }

    pub async fn update(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
        Form(input): Form<MemberInput>,
    ) -> Result<Redirect, PageError> {
        members::update(&state.db, &viewer, id, input).await?;
        Ok(Redirect::to(&format!("/members/{id}")))
    }

    pub async fn contact(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
        Form(input): Form<ContactInput>,
    ) -> Result<Redirect, PageError> {
        members::update_contact(&state.db, &viewer, id, input).await?;
        Ok(Redirect::to(&format!("/members/{id}")))
    }

    pub async fn assign_family(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
        Form(assignment): Form<Assignment>,
    ) -> Result<Redirect, PageError> {
        families::assign(&state.db, &viewer, id, assignment).await?;
        Ok(Redirect::to(&format!("/members/{id}")))
    }

    pub async fn delete(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
    ) -> Result<Redirect, PageError> {
        members::soft_delete(&state.db, &viewer, id).await?;
        Ok(Redirect::to("/members"))
    }

    pub async fn restore(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
    ) -> Result<Redirect, PageError> {
        members::restore(&state.db, &viewer, id).await?;
        Ok(Redirect::to(&format!("/members/{id}")))
    }

    pub async fn create_family(
        State(state): State<AppState>,
        viewer: PageViewer,
        Form(input): Form<FamilyInput>,
    ) -> Result<Redirect, PageError> {
        let family = families::create(&state.db, &viewer, input).await?;
        Ok(Redirect::to(&format!("/families/{}", family.id)))
    }

    pub async fn update_family(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
        Form(input): Form<FamilyInput>,
    ) -> Result<Redirect, PageError> {
        families::update(&state.db, &viewer, id, input).await?;
        Ok(Redirect::to(&format!("/families/{id}")))
    }

    pub async fn create_group(
        State(state): State<AppState>,
        viewer: PageViewer,
        Form(input): Form<GroupInput>,
    ) -> Result<Redirect, PageError> {
        let group = groups::create(&state.db, &viewer, input).await?;
        Ok(Redirect::to(&format!("/groups/{}", group.id)))
    }

    pub async fn update_group(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
        Form(input): Form<GroupInput>,
    ) -> Result<Redirect, PageError> {
        groups::update(&state.db, &viewer, id, input).await?;
        Ok(Redirect::to(&format!("/groups/{id}")))
    }

    pub async fn add_to_group(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
        Form(MemberRef { member_id }): Form<MemberRef>,
    ) -> Result<Redirect, PageError> {
        groups::add_member(&state.db, &viewer, id, member_id).await?;
        Ok(Redirect::to(&format!("/groups/{id}")))
    }

    pub async fn remove_from_group(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path((id, member_id)): Path<(i32, i32)>,
    ) -> Result<Redirect, PageError> {
        groups::remove_member(&state.db, &viewer, id, member_id).await?;
        Ok(Redirect::to(&format!("/groups/{id}")))
    }
}

mod api {
    use super::*;

    pub async fn list(
        State(state): State<AppState>,
        viewer: Viewer,
        Query(filter): Query<DirectoryFilter>,
        Query(params): Query<PageParams>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(members::list(&state.db, &viewer, &filter, params).await?))
    }

    pub async fn get(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(members::get(&state.db, &viewer, id).await?))
    }

    pub async fn create(
        State(state): State<AppState>,
        viewer: Viewer,
        Json(input): Json<MemberInput>,
    ) -> Result<impl IntoResponse, AppError> {
        let member = members::create(&state.db, &viewer, input).await?;
        Ok((StatusCode::CREATED, Json(member)))
    }

    pub async fn update(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
        Json(input): Json<MemberInput>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(members::update(&state.db, &viewer, id, input).await?))
    }

    pub async fn contact(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
        Json(input): Json<ContactInput>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(members::update_contact(&state.db, &viewer, id, input).await?))
    }

    pub async fn delete(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(members::soft_delete(&state.db, &viewer, id).await?))
    }

    pub async fn restore(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(members::restore(&state.db, &viewer, id).await?))
    }

    pub async fn assign_family(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
        Json(assignment): Json<Assignment>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(families::assign(&state.db, &viewer, id, assignment).await?))
    }

    pub async fn families(
        State(state): State<AppState>,
        viewer: Viewer,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(families::list(&state.db, &viewer).await?))
    }

    pub async fn family(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(families::get(&state.db, &viewer, id).await?))
    }

    pub async fn create_family(
        State(state): State<AppState>,
        viewer: Viewer,
        Json(input): Json<FamilyInput>,
    ) -> Result<impl IntoResponse, AppError> {
        let family = families::create(&state.db, &viewer, input).await?;
        Ok((StatusCode::CREATED, Json(family)))
    }

    pub async fn update_family(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
        Json(input): Json<FamilyInput>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(families::update(&state.db, &viewer, id, input).await?))
    }

    pub async fn groups(
        State(state): State<AppState>,
        _viewer: Viewer,
        Query(show): Query<ShowAll>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(groups::list(&state.db, show.all).await?))
    }

    pub async fn group(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(groups::get(&state.db, &viewer, id).await?))
    }

    pub async fn create_group(
        State(state): State<AppState>,
        viewer: Viewer,
        Json(input): Json<GroupInput>,
    ) -> Result<impl IntoResponse, AppError> {
        let group = groups::create(&state.db, &viewer, input).await?;
        Ok((StatusCode::CREATED, Json(group)))
    }

    pub async fn update_group(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
        Json(input): Json<GroupInput>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(groups::update(&state.db, &viewer, id, input).await?))
    }

    pub async fn add_to_group(
        State(state): State<AppState>,
        viewer: Viewer,
        Path((id, member_id)): Path<(i32, i32)>,
    ) -> Result<impl IntoResponse, AppError> {
        let membership = groups::add_member(&state.db, &viewer, id, member_id).await?;
        Ok((StatusCode::CREATED, Json(membership)))
    }

    pub async fn remove_from_group(
        State(state): State<AppState>,
        viewer: Viewer,
        Path((id, member_id)): Path<(i32, i32)>,
    ) -> Result<impl IntoResponse, AppError> {
        groups::remove_member(&state.db, &viewer, id, member_id).await?;
        Ok(StatusCode::NO_CONTENT)
    }
}
