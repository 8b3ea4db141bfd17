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
    auth::{PageViewer, Viewer},
    entities::sea_orm_active_enums::ServiceItemKind,
    error::{AppError, PageError},
    router::AppState,
    worship::{self, ItemInput, ReorderInput, ServiceInput},
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/worship", get(self::get::upcoming).post(self::post::create))
        .route("/worship/{id}", get(self::get::plan).post(self::post::update))
        .route("/worship/{id}/delete", post(self::post::delete))
        .route("/worship/{id}/items", post(self::post::add_item))
        .route("/worship/{id}/items/{item_id}", post(self::post::update_item))
        .route("/worship/{id}/items/{item_id}/remove", post(self::post::remove_item))
        .route("/worship/{id}/items/{item_id}/up", post(self::post::move_up))
        .route("/worship/{id}/items/{item_id}/down", post(self::post::move_down))
        .route("/api/v1/worship", get(api::upcoming).post(api::create))
        .route(
            "/api/v1/worship/{id}",
            get(api::plan).put(api::update).delete(api::delete),
        )
        .route("/api/v1/worship/{id}/items", post(api::add_item))
        .route("/api/v1/worship/{id}/order", put(api::reorder))
        .route(
            "/api/v1/worship-items/{item_id}",
            put(api::update_item).delete(api::remove_item),
        )
}

/// The order after moving `item_id` one step, or `None` at either end.
fn shifted(ids: &[i32], item_id: i32, up: bool) -> Option<Vec<i32>> {
    let at = ids.iter().position(|id| *id == item_id)?;
    let other = if up { at.checked_sub(1)? } else { at + 1 };
    if other >= ids.len() {
        return None;
    }
    let mut order = ids.to_vec();
    order.swap(at, other);
    Some(order)
}

mod get {
    use super::*;

    pub async fn upcoming(
        State(state): State<AppState>,
        viewer: PageViewer,
    ) -> Result<impl IntoResponse, PageError> {
        let services = worship::upcoming(&state.db).await?;
        page(
            &state,
            &viewer,
            "worship/list.html",
            context! {
                active => "worship",
                services => services,
                can_manage => viewer.role().can_manage_events(),
            },
        )
    }

    pub async fn plan(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
    ) -> Result<impl IntoResponse, PageError> {
        let plan = worship::get(&state.db, id).await?;
        page(
            &state,
            &viewer,
            "worship/plan.html",
            context! {
                active => "worship",
                plan => plan,
                kinds => ServiceItemKind::iter().collect::<Vec<_>>(),
                can_manage => viewer.role().can_manage_events(),
            },
        )
    }
}

mod post {
    use super::*;

    fn to_plan(id: i32) -> Redirect {
        Redirect::to(&format!("/worship/{id}"))
    }

    pub async fn create(
        State(state): State<AppState>,
        viewer: PageViewer,
        Form(input): Form<ServiceInput>,
    ) -> Result<Redirect, PageError> {
        let service = worship::create(&state.db, &viewer, input).await?;
        Ok(to_plan(service.id))
    }

    pub async fn update(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
        Form(input): Form<ServiceInput>,
    ) -> Result<Redirect, PageError> {
        worship::update(&state.db, &viewer, id, input).await?;
        Ok(to_plan(id))
    }

    pub async fn delete(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
    ) -> Result<Redirect, PageError> {
        worship::delete(&state.db, &viewer, id).await?;
        Ok(Redirect::to("/worship"))
    }

    pub async fn add_item(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path(id): Path<i32>,
        Form(input): Form<ItemInput>,
    ) -> Result<Redirect, PageError> {
        worship::add_item(&state.db, &viewer, id, input).await?;
        Ok(to_plan(id))
    }

    pub async fn update_item(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path((id, item_id)): Path<(i32, i32)>,
        Form(input): Form<ItemInput>,
    ) -> Result<Redirect, PageError> {
        worship::update_item(&state.db, &viewer, item_id, input).await?;
        Ok(to_plan(id))
    }

    pub async fn remove_item(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path((id, item_id)): Path<(i32, i32)>,
    ) -> Result<Redirect, PageError> {
        worship::remove_item(&state.db, &viewer, item_id).await?;
        Ok(to_plan(id))
    }

    async fn shift(
        state: &AppState,
        viewer: &Viewer,
        id: i32,
        item_id: i32,
        up: bool,
    ) -> Result<Redirect, PageError> {
        let plan = worship::get(&state.db, id).await?;
        let ids: Vec<i32> = plan.items.iter().map(|item| item.id).collect();
        if let Some(item_ids) = shifted(&ids, item_id, up) {
            worship::reorder(&state.db, viewer, id, ReorderInput { item_ids }).await?;
        }
        Ok(to_plan(id))
    }

    pub async fn move_up(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path((id, item_id)): Path<(i32, i32)>,
    ) -> Result<Redirect, PageError> {
        shift(&state, &viewer, id, item_id, true).await
    }

    pub async fn move_down(
        State(state): State<AppState>,
        viewer: PageViewer,
        Path((id, item_id)): Path<(i32, i32)>,
    ) -> Result<Redirect, PageError> {
        shift(&state, &viewer, id, item_id, false).await
    }
}

mod api {
    use super::*;

    pub async fn upcoming(
        State(state): State<AppState>,
        _viewer: Viewer,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(worship::upcoming(&state.db).await?))
    }

    pub async fn plan(
        State(state): State<AppState>,
        _viewer: Viewer,
        Path(id): Path<i32>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(worship::get(&state.db, id).await?))
    }

    pub async fn create(
        State(state): State<AppState>,
        viewer: Viewer,
        Json(input): Json<ServiceInput>,
    ) -> Result<impl IntoResponse, AppError> {
        let service = worship::create(&state.db, &viewer, input).await?;
        Ok((StatusCode::CREATED, Json(service)))
    }

    pub async fn update(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
        Json(input): Json<ServiceInput>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(worship::update(&state.db, &viewer, id, input).await?))
    }

    pub async fn delete(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
    ) -> Result<impl IntoResponse, AppError> {
        worship::delete(&state.db, &viewer, id).await?;
        Ok(StatusCode::NO_CONTENT)
    }

    pub async fn add_item(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
        Json(input): Json<ItemInput>,
    ) -> Result<impl IntoResponse, AppError> {
        let item = worship::add_item(&state.db, &viewer, id, input).await?;
        Ok((StatusCode::CREATED, Json(item)))
    }

    pub async fn update_item(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(item_id): Path<i32>,
        Json(input): Json<ItemInput>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(worship::update_item(&state.db, &viewer, item_id, input).await?))
    }

    pub async fn remove_item(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(item_id): Path<i32>,
    ) -> Result<impl IntoResponse, AppError> {
        worship::remove_item(&state.db, &viewer, item_id).await?;
        Ok(StatusCode::NO_CONTENT)
    }

    pub async fn reorder(
        State(state): State<AppState>,
        viewer: Viewer,
        Path(id): Path<i32>,
        Json(input): Json<ReorderInput>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(worship::reorder(&state.db, &viewer, id, input).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::shifted;

    #[test]
    fn moves_one_step_and_stops_at_the_ends() {
        assert_eq!(shifted(&[1, 2, 3], 2, true), Some(vec![2, 1, 3]));
        assert_eq!(shifted(&[1, 2, 3], 2, false), Some(vec![1, 3, 2]));
        assert_eq!(shifted(&[1, 2, 3], 1, true), None);
        assert_eq!(shifted(&[1, 2, 3], 3, false), None);
        assert_eq!(shifted(&[1, 2, 3], 9, true), None);
    }
}
