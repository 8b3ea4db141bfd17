use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::sea_orm_active_enums::{HelpCategory, HelpStatus, Urgency};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "help_request")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub requester_id: i32,
    pub title: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    pub category: HelpCategory,
    pub urgency: Urgency,
    pub status: HelpStatus,
    pub assigned_to: Option<i32>,
    pub is_confidential: bool,
    pub resolved_at: Option<DateTime>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::help_request_comment::Entity")]
    HelpRequestComment,
}

impl Related<super::help_request_comment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::HelpRequestComment.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
