use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};

use super::{find as find_member, redact};
use crate::auth::Viewer;
use crate::core::now;
use crate::entities::{
    group, group_membership, member,
    sea_orm_active_enums::{GroupKind, Role},
};
use crate::error::{AppError, AppResult, FieldErrors};
use crate::util::form::{checkbox, empty_as_none, trimmed};
use crate::util::validation::require_text;

#[derive(Debug, Clone, Deserialize)]
pub struct GroupInput {
    pub name: String,
    #[serde(default, deserialize_with = "trimmed")]
    pub description: Option<String>,
    pub kind: GroupKind,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub leader_id: Option<i32>,
    #[serde(default = "default_true", deserialize_with = "checkbox")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct GroupDetail {
    #[serde(flatten)]
    pub group: group::Model,
    pub leader: Option<member::Model>,
    pub members: Vec<member::Model>,
}

pub async fn list(db: &DatabaseConnection, include_inactive: bool) -> AppResult<Vec<group::Model>> {
    let mut select = group::Entity::find().order_by_asc(group::Column::Name);
    if !include_inactive {
        select = select.filter(group::Column::IsActive.eq(true));
    }
    Ok(select.all(db).await?)
}

async fn find(db: &DatabaseConnection, id: i32) -> AppResult<group::Model> {
    group::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or(AppError::NotFound("group"))
}

async fn roster(db: &DatabaseConnection, group_id: i32) -> AppResult<Vec<member::Model>> {
    let ids: Vec<i32> = group_membership::Entity::find()
        .filter(group_membership::Column::GroupId.eq(group_id))
        .all(db)
        .await?
        .into_iter()
        .map(|row| row.member_id)
        .collect();
    Ok(member::Entity::find()
        .filter(member::Column::Id.is_in(ids))
        .filter(member::Column::IsActive.eq(true))
        .order_by_asc(member::Column::LastName)
        .order_by_asc(member::Column::FirstName)
        .all(db)
        .await?)
}

pub async fn get(db: &DatabaseConnection, viewer: &Viewer, id: i32) -> AppResult<GroupDetail> {
    let group = find(db, id).await?;
    let leader = match group.leader_id {
        Some(leader_id) => member::Entity::find_by_id(leader_id)
            .one(db)
            .await?
            .map(|m| redact(viewer, m)),
        None => None,
    };
    let members = roster(db, id)
        .await?
        .into_iter()
        .map(|m| redact(viewer, m))
        .collect();
    Ok(GroupDetail {
        group,
        leader,
        members,
    })
}

/// Groups a member belongs to.
pub async fn for_member(db: &DatabaseConnection, member_id: i32) -> AppResult<Vec<group::Model>> {
    let ids: Vec<i32> = group_membership::Entity::find()
        .filter(group_membership::Column::MemberId.eq(member_id))
        .all(db)
        .await?
        .into_iter()
        .map(|row| row.group_id)
        .collect();
    Ok(group::Entity::find()
        .filter(group::Column::Id.is_in(ids))
        .order_by_asc(group::Column::Name)
        .all(db)
        .await?)
}

async fn validate(db: &DatabaseConnection, input: &GroupInput) -> AppResult<()> {
    let mut errors = FieldErrors::new();
    require_text(&mut errors, "name", &input.name);
    if let Some(leader_id) = input.leader_id {
        if member::Entity::find_by_id(leader_id).one(db).await?.is_none() {
            errors.add("leader_id", "does not exist");
        }
    }
    errors.into_result()
}

pub async fn create(
    db: &DatabaseConnection,
    viewer: &Viewer,
    input: GroupInput,
) -> AppResult<group::Model> {
    viewer.require(Role::can_manage_members, "manage groups")?;
    validate(db, &input).await?;
    let stamp = now();
    Ok(group::ActiveModel {
        name: Set(input.name.trim().to_string()),
        description: Set(input.description),
        kind: Set(input.kind),
        leader_id: Set(input.leader_id),
        is_active: Set(input.is_active),
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
    input: GroupInput,
) -> AppResult<group::Model> {
    viewer.require(Role::can_manage_members, "manage groups")?;
    validate(db, &input).await?;
    let mut active: group::ActiveModel = find(db, id).await?.into();
    active.name = Set(input.name.trim().to_string());
    active.description = Set(input.description);
    active.kind = Set(input.kind);
    active.leader_id = Set(input.leader_id);
    active.is_active = Set(input.is_active);
    active.updated_at = Set(now());
    Ok(active.update(db).await?)
}

/// Staff manage every roster; a group's leader manages their own.
fn ensure_roster_access(viewer: &Viewer, group: &group::Model) -> AppResult<()> {
    if group.leader_id.is_some_and(|id| viewer.is_self(id)) {
        return Ok(());
    }
    viewer.require(Role::can_manage_members, "change this group's members")
}

pub async fn add_member(
    db: &DatabaseConnection,
    viewer: &Viewer,
    group_id: i32,
    member_id: i32,
) -> AppResult<group_membership::Model> {
    let group = find(db, group_id).await?;
    ensure_roster_access(viewer, &group)?;
    let joining = find_member(db, member_id).await?;
    if !joining.is_active {
        return Err(AppError::conflict("archived members cannot join groups"));
    }
    let existing = group_membership::Entity::find()
        .filter(group_membership::Column::GroupId.eq(group_id))
        .filter(group_membership::Column::MemberId.eq(member_id))
        .one(db)
        .await?;
    if existing.is_some() {
        return Err(AppError::conflict("member is already in this group"));
    }
    let stamp = now();
    Ok(group_membership::ActiveModel {
        group_id: Set(group_id),
        member_id: Set(member_id),
        created_at: Set(stamp),
        updated_at: Set(stamp),
        ..Default::default()
    }
    .insert(db)
    .await?)
}

pub async fn remove_member(
    db: &DatabaseConnection,
    viewer: &Viewer,
    group_id: i32,
    member_id: i32,
) -> AppResult<()> {
    let group = find(db, group_id).await?;
    ensure_roster_access(viewer, &group)?;
    let row = group_membership::Entity::find()
        .filter(group_membership::Column::GroupId.eq(group_id))
        .filter(group_membership::Column::MemberId.eq(member_id))
        .one(db)
        .await?
        .ok_or(AppError::NotFound("group membership"))?;
    row.delete(db).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::sea_orm_active_enums::MembershipStatus;
    use crate::testing::{create_member, member_viewer, test_db};

    fn input(name: &str, leader_id: Option<i32>) -> GroupInput {
        GroupInput {
            name: name.into(),
            description: None,
            kind: GroupKind::SmallGroup,
            leader_id,
            is_active: true,
        }
    }

    #[tokio::test]
    async fn duplicate_membership_conflicts() {
        let db = test_db().await;
        let pastor = member_viewer(&db, "Paul", Role::Pastor).await;
        let group = create(&db, &pastor, input("Tuesday Bible Study", None))
            .await
            .unwrap();
        let member = create_member(&db, "Timothy", "Lystra", MembershipStatus::Active).await;

        add_member(&db, &pastor, group.id, member.id).await.unwrap();
        assert!(matches!(
            add_member(&db, &pastor, group.id, member.id).await,
            Err(AppError::Conflict(_))
        ));

        let groups = for_member(&db, member.id).await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(get(&db, &pastor, group.id).await.unwrap().members.len(), 1);

        remove_member(&db, &pastor, group.id, member.id).await.unwrap();
        assert!(for_member(&db, member.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn leaders_manage_their_own_roster_only() {
        let db = test_db().await;
        let pastor = member_viewer(&db, "Paul", Role::Pastor).await;
        let leader = member_viewer(&db, "Silas", Role::GroupLeader).await;
        let theirs = create(&db, &pastor, input("Youth", leader.member_id().ok()))
            .await
            .unwrap();
        let other = create(&db, &pastor, input("Choir", None)).await.unwrap();
        let newcomer = create_member(&db, "Eutychus", "Window", MembershipStatus::Active).await;

        add_member(&db, &leader, theirs.id, newcomer.id).await.unwrap();
        assert!(matches!(
            add_member(&db, &leader, other.id, newcomer.id).await,
            Err(AppError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn unknown_leader_is_a_field_error() {
        let db = test_db().await;
        let pastor = member_viewer(&db, "Paul", Role::Pastor).await;
        let result = create(&db, &pastor, input("Ghosts", Some(4242))).await;
        assert!(matches!(result, Err(AppError::Validation(ref f)) if f.get("leader_id").is_some()));
    }
}
