use sea_orm_migration::{prelude::*, schema::*};

use crate::iden::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let table = table_auto(VolunteerPosition::Table)
            .col(pk_auto(VolunteerPosition::Id))
            .col(string(VolunteerPosition::Name))
            .col(text_null(VolunteerPosition::Description))
            .col(integer_null(VolunteerPosition::GroupId))
            .col(integer(VolunteerPosition::SlotsNeeded).default(1))
            .col(boolean(VolunteerPosition::IsActive).default(true))
            .foreign_key(
                ForeignKey::create()
                    .name("fk_position_group")
                    .from(VolunteerPosition::Table, VolunteerPosition::GroupId)
                    .to(Group::Table, Group::Id)
                    .on_delete(ForeignKeyAction::SetNull),
            )
            .check(Expr::col(VolunteerPosition::SlotsNeeded).gte(1))
            .to_owned();
        manager.create_table(table).await?;

        let table = table_auto(VolunteerSchedule::Table)
            .col(pk_auto(VolunteerSchedule::Id))
            .col(integer(VolunteerSchedule::PositionId))
            .col(integer(VolunteerSchedule::MemberId))
            .col(date(VolunteerSchedule::ServeDate))
            .col(string(VolunteerSchedule::Status).default("scheduled"))
            .col(boolean(VolunteerSchedule::ReminderSent).default(false))
            .foreign_key(
                ForeignKey::create()
                    .name("fk_schedule_position")
                    .from(VolunteerSchedule::Table, VolunteerSchedule::PositionId)
                    .to(VolunteerPosition::Table, VolunteerPosition::Id)
                    .on_delete(ForeignKeyAction::Cascade),
            )
            .foreign_key(
                ForeignKey::create()
                    .name("fk_schedule_member")
                    .from(VolunteerSchedule::Table, VolunteerSchedule::MemberId)
                    .to(Member::Table, Member::Id)
                    .on_delete(ForeignKeyAction::Cascade),
            )
            .to_owned();
        manager.create_table(table).await?;

        let table = table_auto(VolunteerUnavailability::Table)
            .col(pk_auto(VolunteerUnavailability::Id))
            .col(integer(VolunteerUnavailability::MemberId))
            .col(date(VolunteerUnavailability::UnavailableOn))
            .col(string_null(VolunteerUnavailability::Reason))
            .foreign_key(
                ForeignKey::create()
                    .name("fk_unavailability_member")
                    .from(
                        VolunteerUnavailability::Table,
                        VolunteerUnavailability::MemberId,
                    )
                    .to(Member::Table, Member::Id)
                    .on_delete(ForeignKeyAction::Cascade),
            )
            .to_owned();
        manager.create_table(table).await?;

        let table = table_auto(ShiftSwap::Table)
            .col(pk_auto(ShiftSwap::Id))
            .col(integer(ShiftSwap::ScheduleId))
            .col(integer(ShiftSwap::RequestedBy))
            .col(integer_null(ShiftSwap::OfferedTo))
            .col(integer_null(ShiftSwap::AcceptedBy))
            .col(string(ShiftSwap::Status).default("pending"))
            .col(string_null(ShiftSwap::Reason))
            .foreign_key(
                ForeignKey::create()
                    .name("fk_swap_schedule")
                    .from(ShiftSwap::Table, ShiftSwap::ScheduleId)
                    .to(VolunteerSchedule::Table, VolunteerSchedule::Id)
                    .on_delete(ForeignKeyAction::Cascade),
            )
            .foreign_key(
                ForeignKey::create()
                    .name("fk_swap_requested_by")
                    .from(ShiftSwap::Table, ShiftSwap::RequestedBy)
                    .to(Member::Table, Member::Id)
                    .on_delete(ForeignKeyAction::Cascade),
            )
            .foreign_key(
                ForeignKey::create()
                    .name("fk_swap_offered_to")
                    .from(ShiftSwap::Table, ShiftSwap::OfferedTo)
                    .to(Member::Table, Member::Id)
                    .on_delete(ForeignKeyAction::SetNull),
            )
            .foreign_key(
                ForeignKey::create()
                    .name("fk_swap_accepted_by")
                    .from(ShiftSwap::Table, ShiftSwap::AcceptedBy)
                    .to(Member::Table, Member::Id)
                    .on_delete(ForeignKeyAction::SetNull),
            )
            .to_owned();
        manager.create_table(table).await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_schedule_position_member_date")
                    .table(VolunteerSchedule::Table)
                    .col(VolunteerSchedule::PositionId)
                    .col(VolunteerSchedule::MemberId)
                    .col(VolunteerSchedule::ServeDate)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_unavailability_member_date")
                    .table(VolunteerUnavailability::Table)
                    .col(VolunteerUnavailability::MemberId)
                    .col(VolunteerUnavailability::UnavailableOn)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_schedule_serve_date")
                    .table(VolunteerSchedule::Table)
                    .col(VolunteerSchedule::ServeDate)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ShiftSwap::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(VolunteerUnavailability::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(VolunteerSchedule::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(VolunteerPosition::Table).to_owned())
            .await?;

        Ok(())
    }
}
