use chrono::NaiveDate;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use serde::Serialize;

use super::year_bounds;
use crate::auth::Viewer;
use crate::entities::{
    campaign, donation, member,
    sea_orm_active_enums::{DonationMethod, Role},
};
use crate::error::AppResult;

#[derive(Debug, Clone, Serialize)]
pub struct ReceiptLine {
    pub donation_id: i32,
    pub donated_on: NaiveDate,
    pub amount_cents: i64,
    pub method: DonationMethod,
    pub campaign: Option<String>,
    pub reference: Option<String>,
}

/// Annual statement of tax-deductible giving.
#[derive(Debug, Clone, Serialize)]
pub struct TaxReceipt {
    pub receipt_number: String,
    pub member: member::Model,
    pub year: i32,
    pub lines: Vec<ReceiptLine>,
    pub total_cents: i64,
}

pub fn receipt_number(year: i32, member_id: i32) -> String {
    format!("TR-{year}-{member_id:05}")
}

pub async fn tax_receipt(
    db: &DatabaseConnection,
    viewer: &Viewer,
    member_id: i32,
    year: i32,
) -> AppResult<TaxReceipt> {
    viewer.require_self_or(member_id, Role::can_view_donations, "view this receipt")?;
    let member = crate::members::redact(viewer, crate::members::find(db, member_id).await?);
    let (start, end) = year_bounds(year)?;

    let rows = donation::Entity::find()
        .filter(donation::Column::MemberId.eq(member_id))
        .filter(donation::Column::IsTaxDeductible.eq(true))
        .filter(donation::Column::DonatedOn.between(start, end))
        .order_by_asc(donation::Column::DonatedOn)
        .order_by_asc(donation::Column::Id)
        .find_also_related(campaign::Entity)
        .all(db)
        .await?;

    let lines: Vec<ReceiptLine> = rows
        .into_iter()
        .map(|(d, c)| ReceiptLine {
            donation_id: d.id,
            donated_on: d.donated_on,
            amount_cents: d.amount_cents,
            method: d.method,
            campaign: c.map(|c| c.name),
            reference: d.reference,
        })
        .collect();
    let total_cents = lines.iter().map(|l| l.amount_cents).sum();

    Ok(TaxReceipt {
        receipt_number: receipt_number(year, member_id),
        member,
        year,
        lines,
        total_cents,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::donations::{DonationInput, record};
    use crate::entities::sea_orm_active_enums::MembershipStatus;
    use crate::error::AppError;
    use crate::testing::{create_member, member_viewer, test_db};
    use sea_orm::{ActiveModelTrait, Set};

    fn gift(member_id: i32, amount: i64, on: NaiveDate, deductible: bool) -> DonationInput {
        DonationInput {
            member_id: Some(member_id),
            campaign_id: None,
            amount,
            donated_on: on,
            method: DonationMethod::Cash,
            reference: None,
            is_tax_deductible: deductible,
            notes: None,
        }
    }

    #[test]
    fn receipt_numbers_are_zero_padded() {
        assert_eq!(receipt_number(2024, 42), "TR-2024-00042");
        assert_eq!(receipt_number(2025, 123456), "TR-2025-123456");
    }

    #[tokio::test]
    async fn only_deductible_gifts_in_the_year_count() {
        let db = test_db().await;
        let treasurer = member_viewer(&db, "Matthew", Role::Treasurer).await;
        let giver = create_member(&db, "Cornelius", "Centurion", MembershipStatus::Active).await;
        let mut noted: member::ActiveModel = giver.clone().into();
        noted.notes = Set(Some("prefers anonymity".into()));
        noted.update(&db).await.unwrap();
        let on = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap();

        record(&db, &treasurer, gift(giver.id, 1000, on(2024, 1, 1), true)).await.unwrap();
        record(&db, &treasurer, gift(giver.id, 2000, on(2024, 12, 31), true)).await.unwrap();
        record(&db, &treasurer, gift(giver.id, 4000, on(2024, 6, 1), false)).await.unwrap();
        record(&db, &treasurer, gift(giver.id, 8000, on(2023, 12, 31), true)).await.unwrap();

        let receipt = tax_receipt(&db, &treasurer, giver.id, 2024).await.unwrap();
        assert_eq!(receipt.receipt_number, format!("TR-2024-{:05}", giver.id));
        assert_eq!(receipt.lines.len(), 2);
        assert_eq!(receipt.total_cents, 3000);
        assert!(receipt.member.notes.is_none());
    }

    #[tokio::test]
    async fn members_fetch_only_their_own_receipt() {
        let db = test_db().await;
        let member = member_viewer(&db, "Lydia", Role::Member).await;
        let other = create_member(&db, "Cornelius", "Centurion", MembershipStatus::Active).await;

        let own = tax_receipt(&db, &member, member.member_id().unwrap(), 2024)
            .await
            .unwrap();
        assert_eq!(own.total_cents, 0);
        assert!(matches!(
            tax_receipt(&db, &member, other.id, 2024).await,
            Err(AppError::Forbidden(_))
        ));
    }
}
