use axum::{
    Form, Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use minijinja::context;
use serde::Deserialize;
use serde_json::json;

use super::user::{AuthSession, Credentials};
use crate::error::{AppError, PageError};
use crate::router::AppState;

// This allows us to extract the "next" field from the query string. We use this
// to redirect after log in.
#[derive(Debug, Deserialize)]
pub struct NextUrl {
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiCredentials {
    email: String,
    password: String,
}

/// Only same-site paths are honoured as a post-login destination.
fn safe_next(next: Option<&str>) -> &str {
    match next {
        Some(path) if path.starts_with('/') && !path.starts_with("//") => path,
        _ => "/dashboard",
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", post(self::post::login))
        .route("/login", get(self::get::login))
        .route("/logout", get(self::get::logout))
        .route("/api/v1/auth/login", post(self::post::api_login))
        .route("/api/v1/auth/logout", post(self::post::api_logout))
}

mod post {
    use super::*;

    pub async fn login(
        State(state): State<AppState>,
        mut auth_session: AuthSession,
        Form(creds): Form<Credentials>,
    ) -> Result<Response, PageError> {
        let next = creds.next.clone();
        let user = match auth_session.authenticate(creds.clone()).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                let page = state.render(
                    "login.html",
                    context! {
                        next => next,
                        email => creds.email,
                        error => "Invalid email or password.",
                    },
                )?;
                return Ok((StatusCode::UNAUTHORIZED, page).into_response());
            }
            Err(e) => return Err(AppError::Internal(e.to_string()).into()),
        };

        auth_session
            .login(&user)
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;
        tracing::info!(user_id = user.id, "signed in");

        Ok(Redirect::to(safe_next(next.as_deref())).into_response())
    }

    pub async fn api_login(
        mut auth_session: AuthSession,
        Json(body): Json<ApiCredentials>,
    ) -> Result<impl IntoResponse, AppError> {
        let creds = Credentials {
            email: body.email,
            password: body.password,
            next: None,
        };
        let user = auth_session
            .authenticate(creds)
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?
            .ok_or(AppError::Unauthorized)?;
        auth_session
            .login(&user)
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;
        Ok(Json(user))
    }

    pub async fn api_logout(mut auth_session: AuthSession) -> Result<impl IntoResponse, AppError> {
        auth_session
            .logout()
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;
        Ok(Json(json!({ "ok": true })))
    }
}

mod get {
    use super::*;

    pub async fn login(
        State(state): State<AppState>,
        Query(NextUrl { next }): Query<NextUrl>,
    ) -> Result<impl IntoResponse, PageError> {
        Ok(state.render("login.html", context! { next => next })?)
    }

    pub async fn logout(mut auth_session: AuthSession) -> impl IntoResponse {
        match auth_session.logout().await {
            Ok(_) => Redirect::to("/login").into_response(),
            Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        }
    }
}
