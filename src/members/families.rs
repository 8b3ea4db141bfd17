use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryOrder, Set};
use serde::{Deserialize, Serialize};

use super::{find as find_member, redact};
use crate::auth::Viewer;
use crate::core::now;
use crate::entities::{
    family, member,
    sea_orm_active_enums::{FamilyRole, Role},
};
use crate::error::{AppError, AppResult, FieldErrors};
use crate::util::form::{empty_as_none, trimmed};
use crate::util::validation::require_text;

#[derive(Debug, Clone, Deserialize)]
pub struct FamilyInput {
    pub name: String,
    #[serde(default, deserialize_with = "trimmed")]
    pub address: Option<String>,
    #[serde(default, deserialize_with = "trimmed")]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Assignment {
    #[serde(default, deserialize_with = "empty_as_none")]
    pub family_id: Option<i32>,
    pub family_role: FamilyRole,
}

#[derive(Debug, Serialize)]
pub struct Household {
    #[serde(flatten)]
    pub family: family::Model,
    pub members: Vec<member::Model>,
}

/// Every family with its active members, by name.
pub async fn list(db: &DatabaseConnection, viewer: &Viewer) -> AppResult<Vec<Household>> {
    let rows = family::Entity::find()
        .order_by_asc(family::Column::Name)
        .find_with_related(member::Entity)
        .all(db)
        .await?;
    Ok(rows
        .into_iter()
        .map(|(family, members)| Household {
            family,
            members: members
                .into_iter()
                .filter(|m| m.is_active)
                .map(|m| redact(viewer, m))
                .collect(),
        })
        .collect())
}

pub async fn get(db: &DatabaseConnection, viewer: &Viewer, id: i32) -> AppResult<Household> {
    let family = family::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or(AppError::NotFound("family"))?;
    let members = family
        .find_related(member::Entity)
        .order_by_asc(member::Column::FirstName)
        .all(db)
        .await?
        .into_iter()
        .filter(|m| m.is_active)
        .map(|m| redact(viewer, m))
        .collect();
    Ok(Household { family, members })
}

fn validate(input: &FamilyInput) -> AppResult<()> {
    let mut errors = FieldErrors::new();
    require_text(&mut errors, "name", &input.name);
    errors.into_result()
}

pub async fn create(
    db: &DatabaseConnection,
    viewer: &Viewer,
    input: FamilyInput,
) -> AppResult<family::Model> {
    viewer.require(Role::can_manage_members, "manage families")?;
    validate(&input)?;
    let stamp = now();
    Ok(family::ActiveModel {
        name: Set(input.name.trim().to_string()),
        address: Set(input.address),
        phone: Set(input.phone),
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
    input: FamilyInput,
) -> AppResult<family::Model> {
    viewer.require(Role::can_manage_members, "manage families")?;
    validate(&input)?;
    let mut active: family::ActiveModel = family::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or(AppError::NotFound("family"))?
        .into();
    active.name = Set(input.name.trim().to_string());
    active.address = Set(input.address);
    active.phone = Set(input.phone);
    active.updated_at = Set(now());
    Ok(active.update(db).await?)
}

/// Moves a member into a family, or out of any when `family_id` is empty.
pub async fn assign(
    db: &DatabaseConnection,
    viewer: &Viewer,
    member_id: i32,
    assignment: Assignment,
) -> AppResult<member::Model> {
    viewer.require(Role::can_manage_members, "manage families")?;
    if let Some(family_id) = assignment.family_id {
        family::Entity::find_by_id(family_id)
            .one(db)
            .await?
            .ok_or(AppError::NotFound("family"))?;
    }
    let mut active: member::ActiveModel = find_member(db, member_id).await?.into();
    active.family_id = Set(assignment.family_id);
    active.family_role = Set(assignment.family_role);
    active.updated_at = Set(now());
    Ok(active.update(db).await?)
}
