use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::sea_orm_active_enums::ServiceItemKind;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "service_item")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub service_id: i32,
    pub position: i32,
    pub kind: ServiceItemKind,
    pub title: String,
    pub duration_minutes: i32,
    pub leader_id: Option<i32>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::worship_service::Entity",
        from = "Column::ServiceId",
        to = "super::worship_service::Column::Id",
        on_delete = "Cascade"
    )]
    WorshipService,
}

impl Related<super::worship_service::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::WorshipService.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
