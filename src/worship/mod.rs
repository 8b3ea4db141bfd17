//! Orders of service.

use std::collections::HashSet;

use chrono::{NaiveDate, NaiveTime};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};

use crate::auth::Viewer;
use crate::core::now;
use crate::entities::{
    service_item, worship_service,
    sea_orm_active_enums::{Role, ServiceItemKind},
};
use crate::error::{AppError, AppResult, FieldErrors};
use crate::util::form::{empty_as_none, trimmed};
use crate::util::validation::{check_length, require_text};

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceInput {
    pub title: String,
    pub service_date: NaiveDate,
    /// `HH:MM`
    pub start_time: String,
    #[serde(default, deserialize_with = "trimmed")]
    pub theme: Option<String>,
    #[serde(default, deserialize_with = "trimmed")]
    pub preacher: Option<String>,
    #[serde(default, deserialize_with = "trimmed")]
    pub scripture: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub event_id: Option<i32>,
}

impl ServiceInput {
    fn validate(&self) -> AppResult<()> {
        let mut errors = FieldErrors::new();
        require_text(&mut errors, "title", &self.title);
        check_length(&mut errors, "title", &self.title, 200);
        if NaiveTime::parse_from_str(self.start_time.trim(), "%H:%M").is_err() {
            errors.add("start_time", "must look like 10:30");
        }
        errors.into_result()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemInput {
    pub kind: ServiceItemKind,
    pub title: String,
    #[serde(default)]
    pub duration_minutes: i32,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub leader_id: Option<i32>,
}

impl ItemInput {
    fn validate(&self) -> AppResult<()> {
        let mut errors = FieldErrors::new();
        require_text(&mut errors, "title", &self.title);
        if !(0..=240).contains(&self.duration_minutes) {
            errors.add("duration_minutes", "must be between 0 and 240");
        }
        errors.into_result()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReorderInput {
    pub item_ids: Vec<i32>,
}

#[derive(Debug, Serialize)]
pub struct ServicePlan {
    pub service: worship_service::Model,
    pub items: Vec<service_item::Model>,
    pub total_minutes: i32,
}

/// Services from today on, soonest first.
pub async fn upcoming(db: &DatabaseConnection) -> AppResult<Vec<worship_service::Model>> {
    Ok(worship_service::Entity::find()
        .filter(worship_service::Column::ServiceDate.gte(now().date()))
        .order_by_asc(worship_service::Column::ServiceDate)
        .order_by_asc(worship_service::Column::StartTime)
        .all(db)
        .await?)
}

async fn find(db: &DatabaseConnection, id: i32) -> AppResult<worship_service::Model> {
    worship_service::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or(AppError::NotFound("service"))
}

async fn items(db: &DatabaseConnection, service_id: i32) -> AppResult<Vec<service_item::Model>> {
    Ok(service_item::Entity::find()
        .filter(service_item::Column::ServiceId.eq(service_id))
        .order_by_asc(service_item::Column::Position)
        .all(db)
        .await?)
}

pub async fn get(db: &DatabaseConnection, id: i32) -> AppResult<ServicePlan> {
    let service = find(db, id).await?;
    let items = items(db, id).await?;
    let total_minutes = items.iter().map(|i| i.duration_minutes).sum();
    Ok(ServicePlan {
        service,
        items,
        total_minutes,
    })
}

async fn check_links(db: &DatabaseConnection, input: &ServiceInput) -> AppResult<()> {
    if let Some(event_id) = input.event_id {
        crate::events::find(db, event_id)
            .await
            .map_err(|_| FieldErrors::single("event_id", "does not exist"))?;
    }
    Ok(())
}

pub async fn create(
    db: &DatabaseConnection,
    viewer: &Viewer,
    input: ServiceInput,
) -> AppResult<worship_service::Model> {
    viewer.require(Role::can_manage_events, "plan services")?;
    input.validate()?;
    check_links(db, &input).await?;
    let stamp = now();
    Ok(worship_service::ActiveModel {
        title: Set(input.title.trim().to_string()),
        service_date: Set(input.service_date),
        start_time: Set(input.start_time.trim().to_string()),
        theme: Set(input.theme),
        preacher: Set(input.preacher),
        scripture: Set(input.scripture),
        event_id: Set(input.event_id),
        created_at: Set(stamp),
        updated_at: Set(stamp),
        ..Default::default()
    }
    .insert(db)
    .await?)
}

pub async fn update(
    db: &DatabaseConnection,
    viewer: &Viewer,
    id: i32,
    input: ServiceInput,
) -> AppResult<worship_service::Model> {
    viewer.require(Role::can_manage_events, "plan services")?;
    input.validate()?;
    check_links(db, &input).await?;
    let mut active: worship_service::ActiveModel = find(db, id).await?.into();
    active.title = Set(input.title.trim().to_string());
    active.service_date = Set(input.service_date);
    active.start_time = Set(input.start_time.trim().to_string());
    active.theme = Set(input.theme);
    active.preacher = Set(input.preacher);
    active.scripture = Set(input.scripture);
    active.event_id = Set(input.event_id);
    active.updated_at = Set(now());
    Ok(active.update(db).await?)
}

pub async fn delete(db: &DatabaseConnection, viewer: &Viewer, id: i32) -> AppResult<()> {
    viewer.require(Role::can_manage_events, "plan services")?;
    find(db, id).await?.delete(db).await?;
    Ok(())
}

async fn check_leader(db: &DatabaseConnection, leader_id: Option<i32>) -> AppResult<()> {
    if let Some(id) = leader_id {
        crate::members::find(db, id)
            .await
            .map_err(|_| FieldErrors::single("leader_id", "does not exist"))?;
    }
    Ok(())
}

/// Appends an item at the end of the order.
pub async fn add_item(
    db: &DatabaseConnection,
    viewer: &Viewer,
    service_id: i32,
    input: ItemInput,
) -> AppResult<service_item::Model> {
    viewer.require(Role::can_manage_events, "plan services")?;
    input.validate()?;
    find(db, service_id).await?;
    check_leader(db, input.leader_id).await?;
    let existing = service_item::Entity::find()
        .filter(service_item::Column::ServiceId.eq(service_id))
        .count(db)
        .await?;
    let stamp = now();
    Ok(service_item::ActiveModel {
        service_id: Set(service_id),
        position: Set(existing as i32 + 1),
        kind: Set(input.kind),
        title: Set(input.title.trim().to_string()),
        duration_minutes: Set(input.duration_minutes),
        leader_id: Set(input.leader_id),
        created_at: Set(stamp),
        updated_at: Set(stamp),
        ..Default::default()
    }
    .insert(db)
    .await?)
}

async fn find_item(db: &DatabaseConnection, id: i32) -> AppResult<service_item::Model> {
    service_item::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or(AppError::NotFound("service item"))
}

pub async fn update_item(
    db: &DatabaseConnection,
    viewer: &Viewer,
    id: i32,
    input: ItemInput,
) -> AppResult<service_item::Model> {
    viewer.require(Role::can_manage_events, "plan services")?;
    input.validate()?;
    check_leader(db, input.leader_id).await?;
    let mut active: service_item::ActiveModel = find_item(db, id).await?.into();
    active.kind = Set(input.kind);
    active.title = Set(input.title.trim().to_string());
    active.duration_minutes = Set(input.duration_minutes);
    active.leader_id = Set(input.leader_id);
    active.updated_at = Set(now());
    Ok(active.update(db).await?)
}

/// Removes an item and closes the gap it leaves.
pub async fn remove_item(db: &DatabaseConnection, viewer: &Viewer, id: i32) -> AppResult<()> {
    viewer.require(Role::can_manage_events, "plan services")?;
    let item = find_item(db, id).await?;
    let service_id = item.service_id;
    let txn = db.begin().await?;
    item.delete(&txn).await?;
    let rest = service_item::Entity::find()
        .filter(service_item::Column::ServiceId.eq(service_id))
        .order_by_asc(service_item::Column::Position)
        .all(&txn)
        .await?;
    for (index, item) in rest.into_iter().enumerate() {
        let position = index as i32 + 1;
        if item.position != position {
            let mut active: service_item::ActiveModel = item.into();
            active.position = Set(position);
            active.update(&txn).await?;
        }
    }
    txn.commit().await?;
    Ok(())
}

/// `ids` must name every item of the service exactly once.
pub fn is_permutation(current: &[i32], ids: &[i32]) -> bool {
    let wanted: HashSet<i32> = ids.iter().copied().collect();
    wanted.len() == ids.len()
        && ids.len() == current.len()
        && current.iter().all(|id| wanted.contains(id))
}

pub async fn reorder(
    db: &DatabaseConnection,
    viewer: &Viewer,
    service_id: i32,
    input: ReorderInput,
) -> AppResult<ServicePlan> {
    viewer.require(Role::can_manage_events, "plan services")?;
    find(db, service_id).await?;
    let current = items(db, service_id).await?;
    let current_ids: Vec<i32> = current.iter().map(|i| i.id).collect();
    if !is_permutation(&current_ids, &input.item_ids) {
        return Err(FieldErrors::single(
            "item_ids",
            "must list every item of this service once",
        ));
    }
    let txn = db.begin().await?;
    let stamp = now();
    for item in current {
        let position = input
            .item_ids
            .iter()
            .position(|id| *id == item.id)
            .map(|p| p as i32 + 1)
            .ok_or_else(|| AppError::Internal("reorder lost an item".into()))?;
        let mut active: service_item::ActiveModel = item.into();
        active.position = Set(position);
        active.updated_at = Set(stamp);
        active.update(&txn).await?;
    }
    txn.commit().await?;
    get(db, service_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{member_viewer, test_db};
    use chrono::Duration;

    fn sunday() -> ServiceInput {
        ServiceInput {
            title: "Morning worship".into(),
            service_date: now().date() + Duration::days(3),
            start_time: "10:30".into(),
            theme: Some("Hope".into()),
            preacher: None,
            scripture: Some("Romans 5".into()),
            event_id: None,
        }
    }

    fn item(kind: ServiceItemKind, title: &str, minutes: i32) -> ItemInput {
        ItemInput { kind, title: title.into(), duration_minutes: minutes, leader_id: None }
    }

    #[test]
    fn permutations() {
        assert!(is_permutation(&[1, 2, 3], &[3, 1, 2]));
        assert!(!is_permutation(&[1, 2, 3], &[1, 2]));
        assert!(!is_permutation(&[1, 2, 3], &[1, 1, 2]));
        assert!(!is_permutation(&[1, 2, 3], &[1, 2, 4]));
        assert!(is_permutation(&[], &[]));
    }

    #[tokio::test]
    async fn plan_a_service() {
        let db = test_db().await;
        let leader = member_viewer(&db, "Asaph", Role::GroupLeader).await;
        let service = create(&db, &leader, sunday()).await.unwrap();
        let hymn = add_item(&db, &leader, service.id, item(ServiceItemKind::Song, "Hymn", 5)).await.unwrap();
        let reading = add_item(&db, &leader, service.id, item(ServiceItemKind::Reading, "Romans 5", 4)).await.unwrap();
        let sermon = add_item(&db, &leader, service.id, item(ServiceItemKind::Sermon, "Hope", 25)).await.unwrap();
        assert_eq!(sermon.position, 3);

        let plan = reorder(
            &db,
            &leader,
            service.id,
            ReorderInput { item_ids: vec![reading.id, hymn.id, sermon.id] },
        )
        .await
        .unwrap();
        let order: Vec<_> = plan.items.iter().map(|i| (i.id, i.position)).collect();
        assert_eq!(order, vec![(reading.id, 1), (hymn.id, 2), (sermon.id, 3)]);
        assert_eq!(plan.total_minutes, 34);

        assert!(matches!(
            reorder(&db, &leader, service.id, ReorderInput { item_ids: vec![hymn.id] }).await,
            Err(AppError::Validation(_))
        ));

        remove_item(&db, &leader, reading.id).await.unwrap();
        let plan = get(&db, service.id).await.unwrap();
        let order: Vec<_> = plan.items.iter().map(|i| (i.id, i.position)).collect();
        assert_eq!(order, vec![(hymn.id, 1), (sermon.id, 2)]);
        assert_eq!(upcoming(&db).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn start_time_is_checked_and_members_cannot_plan() {
        let db = test_db().await;
        let leader = member_viewer(&db, "Asaph", Role::GroupLeader).await;
        let member = member_viewer(&db, "Heman", Role::Member).await;
        let mut bad = sunday();
        bad.start_time = "half ten".into();
        assert!(matches!(create(&db, &leader, bad).await, Err(AppError::Validation(_))));
        assert!(matches!(create(&db, &member, sunday()).await, Err(AppError::Forbidden(_))));
    }
}
