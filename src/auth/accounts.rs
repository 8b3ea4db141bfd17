//! Login accounts. Only admins manage them; everyone may change their own
//! password.

use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::Deserialize;
use tracing::info;

use super::{Viewer, password};
use crate::config::Config;
use crate::core::now;
use crate::entities::{member, sea_orm_active_enums::Role, user};
use crate::error::{AppError, AppResult, FieldErrors};
use crate::util::form::empty_as_none;
use crate::util::validation::is_email;

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub role: Role,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub member_id: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PasswordChange {
    pub current_password: String,
    pub new_password: String,
}

async fn hash_off_thread(plain: String) -> AppResult<String> {
    tokio::task::spawn_blocking(move || password::hash(&plain))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
}

fn check_password(errors: &mut FieldErrors, field: &str, plain: &str) {
    if plain.chars().count() < password::MIN_PASSWORD_LEN {
        errors.add(
            field,
            format!("must be at least {} characters", password::MIN_PASSWORD_LEN),
        );
    }
}

pub async fn list(db: &DatabaseConnection, viewer: &Viewer) -> AppResult<Vec<user::Model>> {
    viewer.require(Role::is_admin, "manage accounts")?;
    Ok(user::Entity::find()
        .order_by_asc(user::Column::Email)
        .all(db)
        .await?)
}

/// Active staff logins, for assignee and interviewer pickers.
pub async fn staff(db: &DatabaseConnection) -> AppResult<Vec<user::Model>> {
    Ok(user::Entity::find()
        .filter(user::Column::IsActive.eq(true))
        .filter(user::Column::Role.is_in([Role::Admin, Role::Pastor]))
        .order_by_asc(user::Column::Email)
        .all(db)
        .await?)
}

pub async fn create(
    db: &DatabaseConnection,
    viewer: &Viewer,
    input: NewUser,
) -> AppResult<user::Model> {
    viewer.require(Role::is_admin, "manage accounts")?;
    insert(db, input).await
}

async fn insert(db: &DatabaseConnection, input: NewUser) -> AppResult<user::Model> {
    let email = input.email.trim().to_lowercase();
    let mut errors = FieldErrors::new();
    if !is_email(&email) {
        errors.add("email", "is not a valid email address");
    }
    check_password(&mut errors, "password", &input.password);
    errors.into_result()?;

    if let Some(member_id) = input.member_id {
        member::Entity::find_by_id(member_id)
            .one(db)
            .await?
            .ok_or(AppError::NotFound("member"))?;
    }

    let password_hash = hash_off_thread(input.password).await?;
    let stamp = now();
    let created = user::ActiveModel {
        email: Set(email),
        password_hash: Set(password_hash),
        role: Set(input.role),
        member_id: Set(input.member_id),
        is_active: Set(true),
        last_login_at: Set(None),
        created_at: Set(stamp),
        updated_at: Set(stamp),
        ..Default::default()
    }
    .insert(db)
    .await?;
    info!(user_id = created.id, role = ?created.role, "account created");
    Ok(created)
}

async fn find(db: &DatabaseConnection, id: i32) -> AppResult<user::Model> {
    user::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or(AppError::NotFound("user"))
}

pub async fn change_role(
    db: &DatabaseConnection,
    viewer: &Viewer,
    id: i32,
    role: Role,
) -> AppResult<user::Model> {
    viewer.require(Role::is_admin, "manage accounts")?;
    if id == viewer.user.id && role != Role::Admin {
        return Err(AppError::conflict("you cannot remove your own admin role"));
    }
    let mut account: user::ActiveModel = find(db, id).await?.into();
    account.role = Set(role);
    account.updated_at = Set(now());
    Ok(account.update(db).await?)
}

pub async fn set_active(
    db: &DatabaseConnection,
    viewer: &Viewer,
    id: i32,
    active: bool,
) -> AppResult<user::Model> {
    viewer.require(Role::is_admin, "manage accounts")?;
    if id == viewer.user.id && !active {
        return Err(AppError::conflict("you cannot deactivate your own account"));
    }
    let mut account: user::ActiveModel = find(db, id).await?.into();
    account.is_active = Set(active);
    account.updated_at = Set(now());
    let account = account.update(db).await?;
    info!(user_id = account.id, active, "account activity changed");
    Ok(account)
}

/// Replaces the viewer's own password after checking the current one. The new
/// hash changes the session auth hash, so other sessions are signed out.
pub async fn change_password(
    db: &DatabaseConnection,
    viewer: &Viewer,
    change: PasswordChange,
) -> AppResult<user::Model> {
    let stored = viewer.user.password_hash.clone();
    let current = change.current_password;
    let matches = tokio::task::spawn_blocking(move || password::verify(&current, &stored))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;
    if !matches {
        return Err(FieldErrors::single("current_password", "is incorrect"));
    }

    let mut errors = FieldErrors::new();
    check_password(&mut errors, "new_password", &change.new_password);
    errors.into_result()?;

    let mut account: user::ActiveModel = viewer.user.clone().into();
    account.password_hash = Set(hash_off_thread(change.new_password).await?);
    account.updated_at = Set(now());
    Ok(account.update(db).await?)
}

/// Creates the configured admin account when no admin exists yet.
pub async fn bootstrap_admin(db: &DatabaseConnection, config: &Config) -> AppResult<()> {
    let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) else {
        return Ok(());
    };
    let admins = user::Entity::find()
        .filter(user::Column::Role.eq(Role::Admin))
        .count(db)
        .await?;
    if admins > 0 {
        return Ok(());
    }
    insert(
        db,
        NewUser {
            email: email.clone(),
            password: password.clone(),
            role: Role::Admin,
            member_id: None,
        },
    )
    .await?;
    info!(%email, "bootstrap admin created");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{create_user, test_db, viewer_for};

    #[tokio::test]
    async fn only_admins_create_accounts() {
        let db = test_db().await;
        let admin = create_user(&db, "admin@example.org", Role::Admin, None).await;
        let pastor = create_user(&db, "pastor@example.org", Role::Pastor, None).await;

        let input = NewUser {
            email: "  New@Example.org ".into(),
            password: "long enough".into(),
            role: Role::Volunteer,
            member_id: None,
        };

        let denied = create(&db, &viewer_for(&db, pastor).await, input.clone()).await;
        assert!(matches!(denied, Err(AppError::Forbidden(_))));

        let created = create(&db, &viewer_for(&db, admin).await, input)
            .await
            .unwrap();
        assert_eq!(created.email, "new@example.org");
        assert!(password::verify("long enough", &created.password_hash));
    }

    #[tokio::test]
    async fn rejects_short_passwords_and_duplicate_emails() {
        let db = test_db().await;
        let admin = viewer_for(&db, create_user(&db, "admin@example.org", Role::Admin, None).await).await;

        let short = create(
            &db,
            &admin,
            NewUser {
                email: "a@example.org".into(),
                password: "short".into(),
                role: Role::Member,
                member_id: None,
            },
        )
        .await;
        assert!(matches!(short, Err(AppError::Validation(ref f)) if f.get("password").is_some()));

        let duplicate = create(
            &db,
            &admin,
            NewUser {
                email: "ADMIN@example.org".into(),
                password: "long enough".into(),
                role: Role::Member,
                member_id: None,
            },
        )
        .await;
        assert!(matches!(duplicate, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn admins_cannot_lock_themselves_out() {
        let db = test_db().await;
        let admin_user = create_user(&db, "admin@example.org", Role::Admin, None).await;
        let admin = viewer_for(&db, admin_user.clone()).await;

        assert!(matches!(
            set_active(&db, &admin, admin_user.id, false).await,
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            change_role(&db, &admin, admin_user.id, Role::Member).await,
            Err(AppError::Conflict(_))
        ));

        let other = create_user(&db, "m@example.org", Role::Member, None).await;
        let updated = change_role(&db, &admin, other.id, Role::Treasurer)
            .await
            .unwrap();
        assert_eq!(updated.role, Role::Treasurer);
        let disabled = set_active(&db, &admin, other.id, false).await.unwrap();
        assert!(!disabled.is_active);
    }

    #[tokio::test]
    async fn password_change_checks_current_password() {
        let db = test_db().await;
        let account = create_user(&db, "m@example.org", Role::Member, None).await;
        let viewer = viewer_for(&db, account).await;

        let wrong = change_password(
            &db,
            &viewer,
            PasswordChange {
                current_password: "nope".into(),
                new_password: "another password".into(),
            },
        )
        .await;
        assert!(matches!(wrong, Err(AppError::Validation(_))));

        let updated = change_password(
            &db,
            &viewer,
            PasswordChange {
                current_password: "password123".into(),
                new_password: "another password".into(),
            },
        )
        .await
        .unwrap();
        assert_ne!(updated.password_hash, viewer.user.password_hash);
        assert!(password::verify("another password", &updated.password_hash));
    }
}
