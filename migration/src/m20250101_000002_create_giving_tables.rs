use sea_orm_migration::{prelude::*, schema::*};

use crate::iden::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let table = table_auto(Campaign::Table)
            .col(pk_auto(Campaign::Id))
            .col(string(Campaign::Name))
            .col(text_null(Campaign::Description))
            .col(big_integer(Campaign::GoalCents).default(0))
            .col(date(Campaign::StartsOn))
            .col(date_null(Campaign::EndsOn))
            .col(boolean(Campaign::IsActive).default(true))
            .check(Expr::col(Campaign::GoalCents).gte(0))
            .to_owned();
        manager.create_table(table).await?;

        let table = table_auto(Donation::Table)
            .col(pk_auto(Donation::Id))
            .col(integer_null(Donation::MemberId))
            .col(integer_null(Donation::CampaignId))
            .col(big_integer(Donation::AmountCents))
            .col(date(Donation::DonatedOn))
            .col(string(Donation::Method))
            .col(string_null(Donation::Reference))
            .col(boolean(Donation::IsTaxDeductible).default(true))
            .col(text_null(Donation::Notes))
            .col(integer_null(Donation::RecordedBy))
            .foreign_key(
                ForeignKey::create()
                    .name("fk_donation_member")
                    .from(Donation::Table, Donation::MemberId)
                    .to(Member::Table, Member::Id)
                    .on_delete(ForeignKeyAction::SetNull),
            )
            .foreign_key(
                ForeignKey::create()
                    .name("fk_donation_campaign")
                    .from(Donation::Table, Donation::CampaignId)
                    .to(Campaign::Table, Campaign::Id)
                    .on_delete(ForeignKeyAction::SetNull),
            )
            .foreign_key(
                ForeignKey::create()
                    .name("fk_donation_recorded_by")
                    .from(Donation::Table, Donation::RecordedBy)
                    .to(User::Table, User::Id)
                    .on_delete(ForeignKeyAction::SetNull),
            )
            .check(Expr::col(Donation::AmountCents).gt(0))
            .to_owned();
        manager.create_table(table).await?;

        let table = table_auto(Payment::Table)
            .col(pk_auto(Payment::Id))
            .col(integer_null(Payment::MemberId))
            .col(integer_null(Payment::CampaignId))
            .col(big_integer(Payment::AmountCents))
            .col(string(Payment::Currency).default("usd"))
            .col(string_uniq(Payment::ProviderRef))
            .col(string(Payment::Status).default("pending"))
            .col(integer_null(Payment::DonationId))
            .col(string_null(Payment::FailureReason))
            .foreign_key(
                ForeignKey::create()
                    .name("fk_payment_member")
                    .from(Payment::Table, Payment::MemberId)
                    .to(Member::Table, Member::Id)
                    .on_delete(ForeignKeyAction::SetNull),
            )
            .foreign_key(
                ForeignKey::create()
                    .name("fk_payment_campaign")
                    .from(Payment::Table, Payment::CampaignId)
                    .to(Campaign::Table, Campaign::Id)
                    .on_delete(ForeignKeyAction::SetNull),
            )
            .foreign_key(
                ForeignKey::create()
                    .name("fk_payment_donation")
                    .from(Payment::Table, Payment::DonationId)
                    .to(Donation::Table, Donation::Id)
                    .on_delete(ForeignKeyAction::SetNull),
            )
            .check(Expr::col(Payment::AmountCents).gt(0))
            .to_owned();
        manager.create_table(table).await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_donation_member")
                    .table(Donation::Table)
                    .col(Donation::MemberId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_donation_donated_on")
                    .table(Donation::Table)
                    .col(Donation::DonatedOn)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Payment::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Donation::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Campaign::Table).to_owned())
            .await?;

        Ok(())
    }
}
