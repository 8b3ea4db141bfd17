//! HTTP surface: server-rendered pages plus the `/api/v1` JSON API.
//!
//! Handlers stay thin. They extract, call into the feature module, and pick a
//! response shape. Pages take a [`PageViewer`](crate::auth::PageViewer) so an
//! expired session lands on the login form; the API takes a bare
//! [`Viewer`] and answers 401.

use axum::{Router, response::Html};
use minijinja::{Value, context};
use serde::Deserialize;

use crate::auth::Viewer;
use crate::error::PageError;
use crate::router::AppState;
use crate::util::form::checkbox;

mod admin;
mod attendance;
mod communication;
mod dashboard;
mod donations;
mod events;
mod help;
mod members;
mod onboarding;
mod payments;
mod volunteers;
mod worship;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(dashboard::routes())
        .merge(members::routes())
        .merge(donations::routes())
        .merge(payments::routes())
        .merge(events::routes())
        .merge(volunteers::routes())
        .merge(communication::routes())
        .merge(help::routes())
        .merge(onboarding::routes())
        .merge(attendance::routes())
        .merge(worship::routes())
        .merge(admin::routes())
}

/// Renders `name` with the viewer merged into `ctx`.
pub(crate) fn page(
    state: &AppState,
    viewer: &Viewer,
    name: &str,
    ctx: Value,
) -> Result<Html<String>, PageError> {
    Ok(state.render(name, context! { viewer => viewer.context(), ..ctx })?)
}

/// Body of forms that pick a single member.
#[derive(Debug, Deserialize)]
pub(crate) struct MemberRef {
    pub member_id: i32,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ShowAll {
    #[serde(default, deserialize_with = "checkbox")]
    pub all: bool,
}
