//! Fixtures shared by unit and integration tests.

use chrono::{NaiveDate, Utc};
use migration::{Migrator, MigratorTrait};
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, Set};

use crate::auth::{Viewer, password};
use crate::entities::{
    member,
    sea_orm_active_enums::{FamilyRole, MembershipStatus, Role},
    user,
};

/// Fresh in-memory SQLite database with every migration applied.
pub async fn test_db() -> DatabaseConnection {
    // One connection: each SQLite memory connection is its own database.
    let mut options = ConnectOptions::new("sqlite::memory:");
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    let db = Database::connect(options)
        .await
        .expect("in-memory sqlite should open");
    Migrator::up(&db, None)
        .await
        .expect("migrations should apply");
    db
}

pub async fn create_member(
    db: &DatabaseConnection,
    first_name: &str,
    last_name: &str,
    status: MembershipStatus,
) -> member::Model {
    member::ActiveModel {
        first_name: Set(first_name.to_string()),
        last_name: Set(last_name.to_string()),
        email: Set(Some(format!(
            "{}.{}@example.org",
            first_name.to_lowercase(),
            last_name.to_lowercase()
        ))),
        family_role: Set(FamilyRole::Other),
        membership_status: Set(status),
        joined_on: Set(Some(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap())),
        is_active: Set(true),
        created_at: Set(Utc::now().naive_utc()),
        updated_at: Set(Utc::now().naive_utc()),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("member insert")
}

/// A login for `member_id` with a fixed password of `password123`.
pub async fn create_user(
    db: &DatabaseConnection,
    email: &str,
    role: Role,
    member_id: Option<i32>,
) -> user::Model {
    user::ActiveModel {
        email: Set(email.to_string()),
        password_hash: Set(password::hash("password123").expect("hash")),
        role: Set(role),
        member_id: Set(member_id),
        is_active: Set(true),
        last_login_at: Set(None),
        created_at: Set(Utc::now().naive_utc()),
        updated_at: Set(Utc::now().naive_utc()),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("user insert")
}

pub async fn viewer_for(db: &DatabaseConnection, user: user::Model) -> Viewer {
    Viewer::load(db, user).await.expect("viewer load")
}

/// A member with a linked login of the given role.
pub async fn member_viewer(
    db: &DatabaseConnection,
    first_name: &str,
    role: Role,
) -> Viewer {
    let member = create_member(db, first_name, "Tester", MembershipStatus::Active).await;
    let email = member.email.clone().unwrap_or_default();
    let user = create_user(db, &email, role, Some(member.id)).await;
    viewer_for(db, user).await
}
