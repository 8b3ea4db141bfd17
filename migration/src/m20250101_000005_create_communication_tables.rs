use sea_orm_migration::{prelude::*, schema::*};

use crate::iden::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let table = table_auto(Newsletter::Table)
            .col(pk_auto(Newsletter::Id))
            .col(string(Newsletter::Subject))
            .col(text(Newsletter::Body))
            .col(string(Newsletter::Status).default("draft"))
            .col(timestamp_null(Newsletter::ScheduledFor))
            .col(timestamp_null(Newsletter::SentAt))
            .col(integer(Newsletter::RecipientCount).default(0))
            .col(integer_null(Newsletter::CreatedBy))
            .foreign_key(
                ForeignKey::create()
                    .name("fk_newsletter_created_by")
                    .from(Newsletter::Table, Newsletter::CreatedBy)
                    .to(User::Table, User::Id)
                    .on_delete(ForeignKeyAction::SetNull),
            )
            .to_owned();
        manager.create_table(table).await?;

        let table = table_auto(Notification::Table)
            .col(pk_auto(Notification::Id))
            .col(integer(Notification::MemberId))
            .col(string(Notification::Category))
            .col(string(Notification::Title))
            .col(text(Notification::Body))
            .col(string_null(Notification::Link))
            .col(boolean(Notification::IsRead).default(false))
            .col(timestamp_null(Notification::ReadAt))
            .foreign_key(
                ForeignKey::create()
                    .name("fk_notification_member")
                    .from(Notification::Table, Notification::MemberId)
                    .to(Member::Table, Member::Id)
                    .on_delete(ForeignKeyAction::Cascade),
            )
            .to_owned();
        manager.create_table(table).await?;

        let table = table_auto(NotificationPreference::Table)
            .col(pk_auto(NotificationPreference::Id))
            .col(integer_uniq(NotificationPreference::MemberId))
            .col(boolean(NotificationPreference::EmailEnabled).default(true))
            .col(boolean(NotificationPreference::InAppEnabled).default(true))
            .col(boolean(NotificationPreference::Events).default(true))
            .col(boolean(NotificationPreference::Volunteers).default(true))
            .col(boolean(NotificationPreference::Newsletters).default(true))
            .col(boolean(NotificationPreference::HelpRequests).default(true))
            .col(boolean(NotificationPreference::Onboarding).default(true))
            .foreign_key(
                ForeignKey::create()
                    .name("fk_preference_member")
                    .from(
                        NotificationPreference::Table,
                        NotificationPreference::MemberId,
                    )
                    .to(Member::Table, Member::Id)
                    .on_delete(ForeignKeyAction::Cascade),
            )
            .to_owned();
        manager.create_table(table).await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_notification_member_read")
                    .table(Notification::Table)
                    .col(Notification::MemberId)
                    .col(Notification::IsRead)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(NotificationPreference::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Notification::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Newsletter::Table).to_owned())
            .await?;

        Ok(())
    }
}
