use sea_orm_migration::{prelude::*, schema::*};

use crate::iden::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let table = table_auto(HelpRequest::Table)
            .col(pk_auto(HelpRequest::Id))
            .col(integer(HelpRequest::RequesterId))
            .col(string(HelpRequest::Title))
            .col(text(HelpRequest::Description))
            .col(string(HelpRequest::Category))
            .col(string(HelpRequest::Urgency).default("normal"))
            .col(string(HelpRequest::Status).default("open"))
            .col(integer_null(HelpRequest::AssignedTo))
            .col(boolean(HelpRequest::IsConfidential).default(false))
            .col(timestamp_null(HelpRequest::ResolvedAt))
            .foreign_key(
                ForeignKey::create()
                    .name("fk_help_request_requester")
                    .from(HelpRequest::Table, HelpRequest::RequesterId)
                    .to(Member::Table, Member::Id)
                    .on_delete(ForeignKeyAction::Cascade),
            )
            .foreign_key(
                ForeignKey::create()
                    .name("fk_help_request_assignee")
                    .from(HelpRequest::Table, HelpRequest::AssignedTo)
                    .to(User::Table, User::Id)
                    .on_delete(ForeignKeyAction::SetNull),
            )
            .to_owned();
        manager.create_table(table).await?;

        let table = table_auto(HelpRequestComment::Table)
            .col(pk_auto(HelpRequestComment::Id))
            .col(integer(HelpRequestComment::RequestId))
            .col(integer(HelpRequestComment::AuthorId))
            .col(text(HelpRequestComment::Body))
            .col(boolean(HelpRequestComment::IsInternal).default(false))
            .foreign_key(
                ForeignKey::create()
                    .name("fk_comment_request")
                    .from(HelpRequestComment::Table, HelpRequestComment::RequestId)
                    .to(HelpRequest::Table, HelpRequest::Id)
                    .on_delete(ForeignKeyAction::Cascade),
            )
            .foreign_key(
                ForeignKey::create()
                    .name("fk_comment_author")
                    .from(HelpRequestComment::Table, HelpRequestComment::AuthorId)
                    .to(User::Table, User::Id)
                    .on_delete(ForeignKeyAction::Cascade),
            )
            .to_owned();
        manager.create_table(table).await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_help_request_status")
                    .table(HelpRequest::Table)
                    .col(HelpRequest::Status)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(HelpRequestComment::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(HelpRequest::Table).to_owned())
            .await?;

        Ok(())
    }
}
