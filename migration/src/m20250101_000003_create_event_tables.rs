use sea_orm_migration::{prelude::*, schema::*};

use crate::iden::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let table = table_auto(Event::Table)
            .col(pk_auto(Event::Id))
            .col(string(Event::Title))
            .col(text_null(Event::Description))
            .col(string_null(Event::Location))
            .col(timestamp(Event::StartsAt))
            .col(timestamp(Event::EndsAt))
            .col(integer_null(Event::Capacity))
            .col(boolean(Event::IsPublic).default(true))
            .col(boolean(Event::IsCancelled).default(false))
            .col(integer_null(Event::CreatedBy))
            .foreign_key(
                ForeignKey::create()
                    .name("fk_event_created_by")
                    .from(Event::Table, Event::CreatedBy)
                    .to(User::Table, User::Id)
                    .on_delete(ForeignKeyAction::SetNull),
            )
            .check(Expr::col(Event::EndsAt).gt(Expr::col(Event::StartsAt)))
            .to_owned();
        manager.create_table(table).await?;

        let table = table_auto(Rsvp::Table)
            .col(pk_auto(Rsvp::Id))
            .col(integer(Rsvp::EventId))
            .col(integer(Rsvp::MemberId))
            .col(string(Rsvp::Response))
            .col(integer(Rsvp::Guests).default(0))
            .col(boolean(Rsvp::ReminderSent).default(false))
            .foreign_key(
                ForeignKey::create()
                    .name("fk_rsvp_event")
                    .from(Rsvp::Table, Rsvp::EventId)
                    .to(Event::Table, Event::Id)
                    .on_delete(ForeignKeyAction::Cascade),
            )
            .foreign_key(
                ForeignKey::create()
                    .name("fk_rsvp_member")
                    .from(Rsvp::Table, Rsvp::MemberId)
                    .to(Member::Table, Member::Id)
                    .on_delete(ForeignKeyAction::Cascade),
            )
            .to_owned();
        manager.create_table(table).await?;

        let table = table_auto(MemberQrCode::Table)
            .col(pk_auto(MemberQrCode::Id))
            .col(integer_uniq(MemberQrCode::MemberId))
            .col(string_uniq(MemberQrCode::Token))
            .col(boolean(MemberQrCode::IsActive).default(true))
            .col(timestamp_null(MemberQrCode::LastUsedAt))
            .foreign_key(
                ForeignKey::create()
                    .name("fk_qr_code_member")
                    .from(MemberQrCode::Table, MemberQrCode::MemberId)
                    .to(Member::Table, Member::Id)
                    .on_delete(ForeignKeyAction::Cascade),
            )
            .to_owned();
        manager.create_table(table).await?;

        let table = table_auto(AttendanceRecord::Table)
            .col(pk_auto(AttendanceRecord::Id))
            .col(integer(AttendanceRecord::EventId))
            .col(integer(AttendanceRecord::MemberId))
            .col(string(AttendanceRecord::Method))
            .col(timestamp(AttendanceRecord::CheckedInAt))
            .col(integer_null(AttendanceRecord::CheckedInBy))
            .foreign_key(
                ForeignKey::create()
                    .name("fk_attendance_event")
                    .from(AttendanceRecord::Table, AttendanceRecord::EventId)
                    .to(Event::Table, Event::Id)
                    .on_delete(ForeignKeyAction::Cascade),
            )
            .foreign_key(
                ForeignKey::create()
                    .name("fk_attendance_member")
                    .from(AttendanceRecord::Table, AttendanceRecord::MemberId)
                    .to(Member::Table, Member::Id)
                    .on_delete(ForeignKeyAction::Cascade),
            )
            .foreign_key(
                ForeignKey::create()
                    .name("fk_attendance_checked_in_by")
                    .from(AttendanceRecord::Table, AttendanceRecord::CheckedInBy)
                    .to(User::Table, User::Id)
                    .on_delete(ForeignKeyAction::SetNull),
            )
            .to_owned();
        manager.create_table(table).await?;

        let table = table_auto(WorshipService::Table)
            .col(pk_auto(WorshipService::Id))
            .col(string(WorshipService::Title))
            .col(date(WorshipService::ServiceDate))
            .col(string(WorshipService::StartTime))
            .col(string_null(WorshipService::Theme))
            .col(string_null(WorshipService::Preacher))
            .col(string_null(WorshipService::Scripture))
            .col(integer_null(WorshipService::EventId))
            .foreign_key(
                ForeignKey::create()
                    .name("fk_worship_service_event")
                    .from(WorshipService::Table, WorshipService::EventId)
                    .to(Event::Table, Event::Id)
                    .on_delete(ForeignKeyAction::SetNull),
            )
            .to_owned();
        manager.create_table(table).await?;

        let table = table_auto(ServiceItem::Table)
            .col(pk_auto(ServiceItem::Id))
            .col(integer(ServiceItem::ServiceId))
            .col(integer(ServiceItem::Position))
            .col(string(ServiceItem::Kind))
            .col(string(ServiceItem::Title))
            .col(integer(ServiceItem::DurationMinutes).default(0))
            .col(integer_null(ServiceItem::LeaderId))
            .foreign_key(
                ForeignKey::create()
                    .name("fk_service_item_service")
                    .from(ServiceItem::Table, ServiceItem::ServiceId)
                    .to(WorshipService::Table, WorshipService::Id)
                    .on_delete(ForeignKeyAction::Cascade),
            )
            .foreign_key(
                ForeignKey::create()
                    .name("fk_service_item_leader")
                    .from(ServiceItem::Table, ServiceItem::LeaderId)
                    .to(Member::Table, Member::Id)
                    .on_delete(ForeignKeyAction::SetNull),
            )
            .to_owned();
        manager.create_table(table).await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_rsvp_event_member")
                    .table(Rsvp::Table)
                    .col(Rsvp::EventId)
                    .col(Rsvp::MemberId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_attendance_event_member")
                    .table(AttendanceRecord::Table)
                    .col(AttendanceRecord::EventId)
                    .col(AttendanceRecord::MemberId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_event_starts_at")
                    .table(Event::Table)
                    .col(Event::StartsAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_service_item_service")
                    .table(ServiceItem::Table)
                    .col(ServiceItem::ServiceId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ServiceItem::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(WorshipService::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(AttendanceRecord::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(MemberQrCode::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Rsvp::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Event::Table).to_owned())
            .await?;

        Ok(())
    }
}
