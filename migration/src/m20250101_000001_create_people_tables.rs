use sea_orm_migration::{prelude::*, schema::*};

use crate::iden::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let table = table_auto(Family::Table)
            .col(pk_auto(Family::Id))
            .col(string(Family::Name))
            .col(string_null(Family::Address))
            .col(string_null(Family::Phone))
            .to_owned();
        manager.create_table(table).await?;

        let table = table_auto(Member::Table)
            .col(pk_auto(Member::Id))
            .col(string(Member::FirstName))
            .col(string(Member::LastName))
            .col(string_null(Member::Email))
            .col(string_null(Member::Phone))
            .col(date_null(Member::BirthDate))
            .col(string_null(Member::Address))
            .col(integer_null(Member::FamilyId))
            .col(string(Member::FamilyRole).default("other"))
            .col(string(Member::MembershipStatus).default("visitor"))
            .col(date_null(Member::JoinedOn))
            .col(boolean(Member::IsActive).default(true))
            .col(text_null(Member::Notes))
            .foreign_key(
                ForeignKey::create()
                    .name("fk_member_family")
                    .from(Member::Table, Member::FamilyId)
                    .to(Family::Table, Family::Id)
                    .on_delete(ForeignKeyAction::SetNull),
            )
            .to_owned();
        manager.create_table(table).await?;

        let table = table_auto(User::Table)
            .col(pk_auto(User::Id))
            .col(string_uniq(User::Email))
            .col(string(User::PasswordHash))
            .col(string(User::Role).default("member"))
            .col(integer_null(User::MemberId).unique_key())
            .col(boolean(User::IsActive).default(true))
            .col(timestamp_null(User::LastLoginAt))
            .foreign_key(
                ForeignKey::create()
                    .name("fk_user_member")
                    .from(User::Table, User::MemberId)
                    .to(Member::Table, Member::Id)
                    .on_delete(ForeignKeyAction::SetNull),
            )
            .to_owned();
        manager.create_table(table).await?;

        let table = table_auto(Group::Table)
            .col(pk_auto(Group::Id))
            .col(string(Group::Name))
            .col(text_null(Group::Description))
            .col(string(Group::Kind).default("small_group"))
            .col(integer_null(Group::LeaderId))
            .col(boolean(Group::IsActive).default(true))
            .foreign_key(
                ForeignKey::create()
                    .name("fk_group_leader")
                    .from(Group::Table, Group::LeaderId)
                    .to(Member::Table, Member::Id)
                    .on_delete(ForeignKeyAction::SetNull),
            )
            .to_owned();
        manager.create_table(table).await?;

        let table = table_auto(GroupMembership::Table)
            .col(pk_auto(GroupMembership::Id))
            .col(integer(GroupMembership::GroupId))
            .col(integer(GroupMembership::MemberId))
            .foreign_key(
                ForeignKey::create()
                    .name("fk_group_membership_group")
                    .from(GroupMembership::Table, GroupMembership::GroupId)
                    .to(Group::Table, Group::Id)
                    .on_delete(ForeignKeyAction::Cascade),
            )
            .foreign_key(
                ForeignKey::create()
                    .name("fk_group_membership_member")
                    .from(GroupMembership::Table, GroupMembership::MemberId)
                    .to(Member::Table, Member::Id)
                    .on_delete(ForeignKeyAction::Cascade),
            )
            .to_owned();
        manager.create_table(table).await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_member_email")
                    .table(Member::Table)
                    .col(Member::Email)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_member_family")
                    .table(Member::Table)
                    .col(Member::FamilyId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_member_status")
                    .table(Member::Table)
                    .col(Member::MembershipStatus)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_group_membership")
                    .table(GroupMembership::Table)
                    .col(GroupMembership::GroupId)
                    .col(GroupMembership::MemberId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(GroupMembership::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Group::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(User::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Member::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Family::Table).to_owned())
            .await?;

        Ok(())
    }
}
