use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "volunteer_position")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    pub group_id: Option<i32>,
    pub slots_needed: i32,
    pub is_active: bool,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::volunteer_schedule::Entity")]
    VolunteerSchedule,
}

impl Related<super::volunteer_schedule::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::VolunteerSchedule.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
