use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "worship_service")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub title: String,
    pub service_date: Date,
    /// Local wall-clock start, `HH:MM`.
    pub start_time: String,
    pub theme: Option<String>,
    pub preacher: Option<String>,
    pub scripture: Option<String>,
    pub event_id: Option<i32>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::service_item::Entity")]
    ServiceItem,
}

impl Related<super::service_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ServiceItem.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
