//! Event check-in, by QR code at the door or by hand.

pub mod qr;

use sea_orm::{
    ActiveEnum, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::Viewer;
use crate::core::{export::to_csv, now};
use crate::entities::{
    attendance_record, event, member, member_qr_code,
    sea_orm_active_enums::{CheckInMethod, Role},
};
use crate::error::{AppError, AppResult, FieldErrors};
use crate::util::form::{empty_as_none, trimmed};

/// Either a scanned token or a member picked from the directory.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckInInput {
    #[serde(default, deserialize_with = "trimmed")]
    pub token: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub member_id: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct Attendance {
    pub record: attendance_record::Model,
    pub member: Option<member::Model>,
}

#[derive(Debug, Serialize)]
pub struct Visit {
    pub record: attendance_record::Model,
    pub event: Option<event::Model>,
}

async fn issue(
    db: &DatabaseConnection,
    secret: &str,
    member_id: i32,
    existing: Option<member_qr_code::Model>,
) -> AppResult<member_qr_code::Model> {
    let token = qr::token(secret, member_id, &qr::new_nonce());
    let stamp = now();
    let saved = match existing {
        Some(code) => {
            let mut active: member_qr_code::ActiveModel = code.into();
            active.token = Set(token);
            active.is_active = Set(true);
            active.updated_at = Set(stamp);
            active.update(db).await?
        }
        None => {
            member_qr_code::ActiveModel {
                member_id: Set(member_id),
                token: Set(token),
                is_active: Set(true),
                last_used_at: Set(None),
                created_at: Set(stamp),
                updated_at: Set(stamp),
                ..Default::default()
            }
            .insert(db)
            .await?
        }
    };
    Ok(saved)
}

async fn stored_code(
    db: &DatabaseConnection,
    member_id: i32,
) -> AppResult<Option<member_qr_code::Model>> {
    Ok(member_qr_code::Entity::find()
        .filter(member_qr_code::Column::MemberId.eq(member_id))
        .one(db)
        .await?)
}

/// The member's code, issued on first use.
pub async fn qr_code(
    db: &DatabaseConnection,
    viewer: &Viewer,
    secret: &str,
    member_id: i32,
) -> AppResult<member_qr_code::Model> {
    viewer.require_self_or(member_id, Role::can_check_in, "see this code")?;
    crate::members::find(db, member_id).await?;
    match stored_code(db, member_id).await? {
        Some(code) if code.is_active => Ok(code),
        other => issue(db, secret, member_id, other).await,
    }
}

/// A fresh nonce; the previous token stops working.
pub async fn regenerate(
    db: &DatabaseConnection,
    viewer: &Viewer,
    secret: &str,
    member_id: i32,
) -> AppResult<member_qr_code::Model> {
    viewer.require_self_or(member_id, Role::can_manage_members, "replace this code")?;
    crate::members::find(db, member_id).await?;
    let existing = stored_code(db, member_id).await?;
    let code = issue(db, secret, member_id, existing).await?;
    info!(member_id, "check-in code regenerated");
    Ok(code)
}

/// Resolves a scanned token to its member.
pub async fn validate(
    db: &DatabaseConnection,
    secret: &str,
    token: &str,
) -> AppResult<member::Model> {
    let invalid = || FieldErrors::single("token", "is not a valid check-in code");
    let member_id = qr::verify(secret, token).ok_or_else(invalid)?;
    let code = stored_code(db, member_id)
        .await?
        .filter(|c| c.is_active && c.token == token.trim())
        .ok_or_else(invalid)?;
    let member = member::Entity::find_by_id(code.member_id)
        .one(db)
        .await?
        .filter(|m| m.is_active)
        .ok_or_else(invalid)?;
    Ok(member)
}

pub async fn check_in(
    db: &DatabaseConnection,
    viewer: &Viewer,
    secret: &str,
    event_id: i32,
    input: CheckInInput,
) -> AppResult<attendance_record::Model> {
    viewer.require(Role::can_check_in, "check people in")?;
    let event = crate::events::find(db, event_id).await?;
    if event.is_cancelled {
        return Err(AppError::conflict("this event was cancelled"));
    }
    let (member, method) = match (input.token.as_deref(), input.member_id) {
        (Some(token), None) => (validate(db, secret, token).await?, CheckInMethod::Qr),
        (None, Some(member_id)) => {
            let member = crate::members::find(db, member_id).await?;
            if !member.is_active {
                return Err(FieldErrors::single("member_id", "is archived"));
            }
            (member, CheckInMethod::Manual)
        }
        _ => return Err(FieldErrors::single("token", "give either a code or a member")),
    };

    let already = attendance_record::Entity::find()
        .filter(attendance_record::Column::EventId.eq(event_id))
        .filter(attendance_record::Column::MemberId.eq(member.id))
        .count(db)
        .await?;
    if already > 0 {
        return Err(AppError::conflict(format!(
            "{} is already checked in",
            member.full_name()
        )));
    }

    let stamp = now();
    let record = attendance_record::ActiveModel {
        event_id: Set(event_id),
        member_id: Set(member.id),
        method: Set(method),
        checked_in_at: Set(stamp),
        checked_in_by: Set(Some(viewer.user.id)),
        created_at: Set(stamp),
        updated_at: Set(stamp),
        ..Default::default()
    }
    .insert(db)
    .await?;
    if method == CheckInMethod::Qr {
        member_qr_code::Entity::update_many()
            .col_expr(
                member_qr_code::Column::LastUsedAt,
                sea_orm::sea_query::Expr::value(Some(stamp)),
            )
            .filter(member_qr_code::Column::MemberId.eq(member.id))
            .exec(db)
            .await?;
    }
    info!(event_id, member_id = member.id, method = ?method, "checked in");
    Ok(record)
}

pub async fn for_event(
    db: &DatabaseConnection,
    viewer: &Viewer,
    event_id: i32,
) -> AppResult<Vec<Attendance>> {
    viewer.require(Role::can_check_in, "see attendance")?;
    crate::events::find(db, event_id).await?;
    Ok(attendance_record::Entity::find()
        .filter(attendance_record::Column::EventId.eq(event_id))
        .order_by_asc(attendance_record::Column::CheckedInAt)
        .find_also_related(member::Entity)
        .all(db)
        .await?
        .into_iter()
        .map(|(record, member)| Attendance {
            record,
            member: member.map(|m| crate::members::redact(viewer, m)),
        })
        .collect())
}

pub async fn count(db: &DatabaseConnection, event_id: i32) -> AppResult<u64> {
    Ok(attendance_record::Entity::find()
        .filter(attendance_record::Column::EventId.eq(event_id))
        .count(db)
        .await?)
}

/// Events a member was checked in to, newest first.
pub async fn history(
    db: &DatabaseConnection,
    viewer: &Viewer,
    member_id: i32,
) -> AppResult<Vec<Visit>> {
    viewer.require_self_or(member_id, Role::can_check_in, "see this history")?;
    Ok(attendance_record::Entity::find()
        .filter(attendance_record::Column::MemberId.eq(member_id))
        .order_by_desc(attendance_record::Column::CheckedInAt)
        .find_also_related(event::Entity)
        .all(db)
        .await?
        .into_iter()
        .map(|(record, event)| Visit { record, event })
        .collect())
}

pub async fn export_csv(
    db: &DatabaseConnection,
    viewer: &Viewer,
    event_id: i32,
) -> AppResult<Vec<u8>> {
    let rows = for_event(db, viewer, event_id).await?.into_iter().map(|a| {
        vec![
            a.member.as_ref().map(|m| m.last_name.clone()).unwrap_or_default(),
            a.member.as_ref().map(|m| m.first_name.clone()).unwrap_or_default(),
            a.record.method.to_value(),
            a.record.checked_in_at.format("%Y-%m-%d %H:%M").to_string(),
        ]
    });
    to_csv(&["last_name", "first_name", "method", "checked_in_at"], rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::sea_orm_active_enums::MembershipStatus;
    use crate::events::{EventInput, create as create_event, cancel};
    use crate::testing::{create_member, member_viewer, test_db};
    use chrono::Duration;

    const SECRET: &str = "door-secret";

    async fn service(db: &DatabaseConnection, staff: &Viewer) -> event::Model {
        let starts_at = now() + Duration::hours(1);
        create_event(
            db,
            staff,
            EventInput {
                title: "Sunday service".into(),
                description: None,
                location: None,
                starts_at,
                ends_at: starts_at + Duration::hours(2),
                capacity: None,
                is_public: true,
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn qr_check_in_once() {
        let db = test_db().await;
        let pastor = member_viewer(&db, "Barnabas", Role::Pastor).await;
        let usher = member_viewer(&db, "Mark", Role::Volunteer).await;
        let guest = member_viewer(&db, "Silas", Role::Member).await;
        let event = service(&db, &pastor).await;
        let guest_id = guest.member_id().unwrap();

        let code = qr_code(&db, &guest, SECRET, guest_id).await.unwrap();
        assert_eq!(qr_code(&db, &guest, SECRET, guest_id).await.unwrap().token, code.token);

        let input = CheckInInput { token: Some(code.token.clone()), member_id: None };
        assert!(matches!(
            check_in(&db, &guest, SECRET, event.id, input.clone()).await,
            Err(AppError::Forbidden(_))
        ));
        let record = check_in(&db, &usher, SECRET, event.id, input.clone()).await.unwrap();
        assert_eq!(record.method, CheckInMethod::Qr);
        assert!(matches!(
            check_in(&db, &usher, SECRET, event.id, input).await,
            Err(AppError::Conflict(_))
        ));
        assert_eq!(count(&db, event.id).await.unwrap(), 1);
        assert!(stored_code(&db, guest_id).await.unwrap().unwrap().last_used_at.is_some());
        assert_eq!(history(&db, &guest, guest_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn regenerated_codes_retire_the_old_token() {
        let db = test_db().await;
        let guest = member_viewer(&db, "Silas", Role::Member).await;
        let guest_id = guest.member_id().unwrap();
        let old = qr_code(&db, &guest, SECRET, guest_id).await.unwrap();
        let new = regenerate(&db, &guest, SECRET, guest_id).await.unwrap();

        assert_ne!(old.token, new.token);
        assert!(validate(&db, SECRET, &old.token).await.is_err());
        assert_eq!(validate(&db, SECRET, &new.token).await.unwrap().id, guest_id);
        assert!(validate(&db, "wrong", &new.token).await.is_err());
    }

    #[tokio::test]
    async fn manual_check_in_and_export() {
        let db = test_db().await;
        let pastor = member_viewer(&db, "Barnabas", Role::Pastor).await;
        let walk_in = create_member(&db, "Lydia", "Thyatira", MembershipStatus::Visitor).await;
        let event = service(&db, &pastor).await;

        check_in(
            &db,
            &pastor,
            SECRET,
            event.id,
            CheckInInput { token: None, member_id: Some(walk_in.id) },
        )
        .await
        .unwrap();
        let csv = String::from_utf8(export_csv(&db, &pastor, event.id).await.unwrap()).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("last_name,first_name,method,checked_in_at"));
        assert!(lines.next().unwrap().starts_with("Thyatira,Lydia,manual,"));

        assert!(matches!(
            check_in(&db, &pastor, SECRET, event.id, CheckInInput::default()).await,
            Err(AppError::Validation(_))
        ));
        cancel(&db, &pastor, event.id).await.unwrap();
        let other = create_member(&db, "Phoebe", "Cenchreae", MembershipStatus::Active).await;
        assert!(matches!(
            check_in(
                &db,
                &pastor,
                SECRET,
                event.id,
                CheckInInput { token: None, member_id: Some(other.id) },
            )
            .await,
            Err(AppError::Conflict(_))
        ));
    }
}
