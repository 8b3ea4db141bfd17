use axum::{extract::FromRequestParts, http::request::Parts};
use sea_orm::{DatabaseConnection, EntityTrait};
use serde::Serialize;

use super::AuthSession;
use crate::entities::{member, sea_orm_active_enums::Role, user};
use crate::error::{AppError, PageError};
use crate::router::AppState;

/// The signed-in user and, when linked, their member record.
#[derive(Debug, Clone)]
pub struct Viewer {
    pub user: user::Model,
    pub member: Option<member::Model>,
}

/// What templates get to know about the viewer.
#[derive(Debug, Serialize)]
pub struct ViewerContext {
    pub user_id: i32,
    pub email: String,
    pub role: Role,
    pub member_id: Option<i32>,
    pub name: String,
    pub is_staff: bool,
    pub can_view_donations: bool,
    pub can_view_reports: bool,
    pub can_check_in: bool,
}

impl Viewer {
    pub fn role(&self) -> Role {
        self.user.role
    }

    pub fn is_staff(&self) -> bool {
        self.user.role.is_staff()
    }

    /// Forbidden unless the viewer's role passes `check`.
    pub fn require(&self, check: fn(Role) -> bool, action: &str) -> Result<(), AppError> {
        if check(self.user.role) {
            Ok(())
        } else {
            Err(AppError::forbidden(format!("you may not {action}")))
        }
    }

    /// The linked member id, required for anything personal.
    pub fn member_id(&self) -> Result<i32, AppError> {
        self.member
            .as_ref()
            .map(|m| m.id)
            .ok_or_else(|| AppError::forbidden("your account is not linked to a member"))
    }

    pub fn is_self(&self, member_id: i32) -> bool {
        self.member.as_ref().is_some_and(|m| m.id == member_id)
    }

    /// Allowed for the member themselves or anyone passing `check`.
    pub fn require_self_or(
        &self,
        member_id: i32,
        check: fn(Role) -> bool,
        action: &str,
    ) -> Result<(), AppError> {
        if self.is_self(member_id) {
            Ok(())
        } else {
            self.require(check, action)
        }
    }

    pub fn context(&self) -> ViewerContext {
        let role = self.user.role;
        ViewerContext {
            user_id: self.user.id,
            email: self.user.email.clone(),
            role,
            member_id: self.member.as_ref().map(|m| m.id),
            name: self
                .member
                .as_ref()
                .map(member::Model::full_name)
                .unwrap_or_else(|| self.user.email.clone()),
            is_staff: role.is_staff(),
            can_view_donations: role.can_view_donations(),
            can_view_reports: role.can_view_reports(),
            can_check_in: role.can_check_in(),
        }
    }

    pub async fn load(db: &DatabaseConnection, user: user::Model) -> Result<Self, AppError> {
        let member = match user.member_id {
            Some(id) => member::Entity::find_by_id(id).one(db).await?,
            None => None,
        };
        Ok(Self { user, member })
    }
}

impl FromRequestParts<AppState> for Viewer {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_session = AuthSession::from_request_parts(parts, state)
            .await
            .map_err(|_| AppError::Internal("auth layer is not installed".to_string()))?;
        let user = auth_session.user.ok_or(AppError::Unauthorized)?;
        Viewer::load(&state.db, user).await
    }
}

/// Same as [`Viewer`] but rejects like a page: anonymous visitors are
/// redirected to the login form and come back afterwards.
#[derive(Debug, Clone)]
pub struct PageViewer(pub Viewer);

impl FromRequestParts<AppState> for PageViewer {
    type Rejection = PageError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let path = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string());
        Viewer::from_request_parts(parts, state)
            .await
            .map(PageViewer)
            .map_err(|error| PageError { error, path })
    }
}

impl std::ops::Deref for PageViewer {
    type Target = Viewer;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
