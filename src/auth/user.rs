use async_session::async_trait;
use axum_login::{AuthUser, AuthnBackend, UserId};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use serde::Deserialize;
use tracing::debug;

use super::password;
use crate::core::now;
use crate::entities::user;

impl AuthUser for user::Model {
    type Id = i32;

    fn id(&self) -> Self::Id {
        self.id
    }

    // Changing the password invalidates every existing session.
    fn session_auth_hash(&self) -> &[u8] {
        self.password_hash.as_bytes()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
    pub next: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error(transparent)]
    Seaorm(sea_orm::DbErr),

    #[error(transparent)]
    TaskJoin(tokio::task::JoinError),
}

#[derive(Debug, Clone)]
pub struct Backend {
    db: DatabaseConnection,
}

impl Backend {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AuthnBackend for Backend {
    type User = user::Model;
    type Credentials = Credentials;
    type Error = BackendError;

    async fn authenticate(
        &self,
        creds: Self::Credentials,
    ) -> Result<Option<Self::User>, Self::Error> {
        let email = creds.email.trim().to_lowercase();
        let user = user::Entity::find()
            .filter(user::Column::Email.eq(email))
            .filter(user::Column::IsActive.eq(true))
            .one(&self.db)
            .await
            .map_err(Self::Error::Seaorm)?;

        let Some(user) = user else {
            return Ok(None);
        };

        // Keep argon2 off the async workers.
        let stored = user.password_hash.clone();
        let matches = tokio::task::spawn_blocking(move || password::verify(&creds.password, &stored))
            .await
            .map_err(Self::Error::TaskJoin)?;
        if !matches {
            debug!(user_id = user.id, "password mismatch");
            return Ok(None);
        }

        let mut active: user::ActiveModel = user.into();
        active.last_login_at = Set(Some(now()));
        let user = active.update(&self.db).await.map_err(Self::Error::Seaorm)?;

        Ok(Some(user))
    }

    async fn get_user(&self, user_id: &UserId<Self>) -> Result<Option<Self::User>, Self::Error> {
        user::Entity::find_by_id(*user_id)
            .filter(user::Column::IsActive.eq(true))
            .one(&self.db)
            .await
            .map_err(Self::Error::Seaorm)
    }
}

pub type AuthSession = axum_login::AuthSession<Backend>;
