use chrono::NaiveDate;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::Deserialize;

use crate::auth::Viewer;
use crate::core::now;
use crate::entities::{sea_orm_active_enums::Role, volunteer_unavailability};
use crate::error::{AppError, AppResult, FieldErrors};
use crate::util::form::{empty_as_none, trimmed};

#[derive(Debug, Clone, Deserialize)]
pub struct UnavailabilityInput {
    /// Defaults to the viewer's own member record.
    #[serde(default, deserialize_with = "empty_as_none")]
    pub member_id: Option<i32>,
    pub unavailable_on: NaiveDate,
    #[serde(default, deserialize_with = "trimmed")]
    pub reason: Option<String>,
}

pub async fn list_for(
    db: &DatabaseConnection,
    viewer: &Viewer,
    member_id: i32,
) -> AppResult<Vec<volunteer_unavailability::Model>> {
    viewer.require_self_or(member_id, Role::can_manage_volunteers, "see this availability")?;
    Ok(volunteer_unavailability::Entity::find()
        .filter(volunteer_unavailability::Column::MemberId.eq(member_id))
        .filter(volunteer_unavailability::Column::UnavailableOn.gte(now().date()))
        .order_by_asc(volunteer_unavailability::Column::UnavailableOn)
        .all(db)
        .await?)
}

pub async fn add(
    db: &DatabaseConnection,
    viewer: &Viewer,
    input: UnavailabilityInput,
) -> AppResult<volunteer_unavailability::Model> {
    let member_id = match input.member_id {
        Some(id) => id,
        None => viewer.member_id()?,
    };
    viewer.require_self_or(member_id, Role::can_manage_volunteers, "change this availability")?;
    if input.unavailable_on < now().date() {
        return Err(FieldErrors::single("unavailable_on", "cannot be in the past"));
    }
    let existing = volunteer_unavailability::Entity::find()
        .filter(volunteer_unavailability::Column::MemberId.eq(member_id))
        .filter(volunteer_unavailability::Column::UnavailableOn.eq(input.unavailable_on))
        .one(db)
        .await?;
    if existing.is_some() {
        return Err(AppError::conflict("that day is already marked unavailable"));
    }
    let stamp = now();
    Ok(volunteer_unavailability::ActiveModel {
        member_id: Set(member_id),
        unavailable_on: Set(input.unavailable_on),
        reason: Set(input.reason),
        created_at: Set(stamp),
        updated_at: Set(stamp),
        ..Default::default()
    }
    .insert(db)
    .await?)
}

pub async fn remove(db: &DatabaseConnection, viewer: &Viewer, id: i32) -> AppResult<()> {
    let found = volunteer_unavailability::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or(AppError::NotFound("unavailability"))?;
    viewer.require_self_or(found.member_id, Role::can_manage_volunteers, "change this availability")?;
    found.delete(db).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{member_viewer, test_db};
    use chrono::Duration;

    #[tokio::test]
    async fn members_manage_their_own_days() {
        let db = test_db().await;
        let volunteer = member_viewer(&db, "Dorcas", Role::Volunteer).await;
        let other = member_viewer(&db, "Rhoda", Role::Volunteer).await;
        let day = now().date() + Duration::days(3);

        let added = add(
            &db,
            &volunteer,
            UnavailabilityInput {
                member_id: None,
                unavailable_on: day,
                reason: None,
            },
        )
        .await
        .unwrap();
        assert!(matches!(
            add(
                &db,
                &volunteer,
                UnavailabilityInput {
                    member_id: None,
                    unavailable_on: day,
                    reason: None,
                },
            )
            .await,
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            remove(&db, &other, added.id).await,
            Err(AppError::Forbidden(_))
        ));
        let own_id = volunteer.member_id().unwrap();
        assert_eq!(list_for(&db, &volunteer, own_id).await.unwrap().len(), 1);
        remove(&db, &volunteer, added.id).await.unwrap();
        assert!(list_for(&db, &volunteer, own_id).await.unwrap().is_empty());
    }
}
